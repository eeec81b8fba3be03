//! High-level USDA stage loading.
//!
//! This module provides the entry points that read a `.usda` layer and
//! build a `Stage` from it, typing every parsed value by the attribute's
//! declared type.

use std::path::Path;

use stagelink_math::{Mat4, Quat, Vec2, Vec3};

use crate::path::PrimPath;
use crate::stage::{Stage, StageError, StageResult};
use crate::stage_info::UpAxis;
use crate::usd::parser::{parse_usda, ParseError};
use crate::usd::types::{LayerSpec, PrimSpec, PropertySpec, RawValue, Specifier};
use crate::value::{AttrValue, Attribute};

/// Load a `.usda` file into a stage.
///
/// # Example
///
/// ```ignore
/// use stagelink_core::usd::load_usda;
///
/// let stage = load_usda("scene.usda")?;
/// println!("Loaded {} prims", stage.prim_count());
/// ```
pub fn load_usda<P: AsRef<Path>>(path: P) -> StageResult<Stage> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let stage = load_usda_from_string(&content, &path.display().to_string())?;
    log::info!("Loaded {} prims from {}", stage.prim_count(), path.display());
    Ok(stage)
}

/// Build a stage from USDA text.
pub fn load_usda_from_string(content: &str, identifier: &str) -> StageResult<Stage> {
    let layer = parse_usda(content)?;
    build_stage(layer, identifier)
}

fn build_stage(layer: LayerSpec, identifier: &str) -> StageResult<Stage> {
    let mut stage = Stage::new(identifier);

    if let Some(token) = &layer.metadata.up_axis {
        match UpAxis::from_token(token) {
            Some(axis) => stage.set_up_axis(axis),
            None => log::warn!("Unknown upAxis '{}', keeping {:?}", token, stage.stage_info().up_axis),
        }
    }
    if let Some(meters_per_unit) = layer.metadata.meters_per_unit {
        if meters_per_unit > 0.0 {
            stage.set_meters_per_unit(meters_per_unit);
        } else {
            log::warn!("Ignoring non-positive metersPerUnit {}", meters_per_unit);
        }
    }
    stage.set_default_prim(layer.metadata.default_prim.clone());

    let root = PrimPath::root();
    for prim in &layer.prims {
        add_prim(&mut stage, &root, prim)?;
    }

    Ok(stage)
}

fn add_prim(stage: &mut Stage, parent: &PrimPath, spec: &PrimSpec) -> StageResult<()> {
    if spec.specifier == Specifier::Class {
        log::debug!("Skipping class prim '{}' at line {}", spec.name, spec.line);
        return Ok(());
    }

    let path = parent.child(&spec.name)?;

    // An `over` keeps whatever type an earlier spec declared.
    let keep_type = spec.type_name.is_empty() && stage.has_prim(&path);
    if !keep_type {
        stage.define_prim(&path, &spec.type_name)?;
    }
    if let Some(kind) = &spec.kind {
        stage.set_kind(&path, Some(kind))?;
    }
    if let Some(active) = spec.active {
        stage.set_active(&path, active)?;
    }

    for property in &spec.properties {
        if let Some(attribute) = build_attribute(property)? {
            stage.put_attribute(&path, &property.name, attribute)?;
        }
    }

    for child in &spec.children {
        add_prim(stage, &path, child)?;
    }
    Ok(())
}

/// Type a parsed property. Returns `None` for unsupported value types.
fn build_attribute(property: &PropertySpec) -> StageResult<Option<Attribute>> {
    let malformed = |message: String| {
        StageError::Parse(ParseError::Parse {
            line: property.line,
            message: format!("{} '{}': {}", property.type_name, property.name, message),
        })
    };

    let mut attribute = Attribute::new(property.type_name.clone());

    if let Some(raw) = &property.default {
        match convert_value(&property.type_name, raw).map_err(malformed)? {
            Some(value) => attribute.default = Some(value),
            None => {
                log::debug!(
                    "Skipping attribute {} of unsupported type {}",
                    property.name,
                    property.type_name
                );
                return Ok(None);
            }
        }
    }

    for (time, raw) in &property.time_samples {
        match convert_value(&property.type_name, raw).map_err(malformed)? {
            Some(value) => attribute.set_sample(*time, value),
            None => return Ok(None),
        }
    }

    Ok(Some(attribute))
}

const VEC3_TYPES: &[&str] = &[
    "point3f", "point3d", "point3h", "vector3f", "vector3d", "vector3h", "normal3f", "normal3d",
    "normal3h", "color3f", "color3d", "color3h", "float3", "double3", "half3",
];

/// Convert a raw value to the declared type.
///
/// `Ok(None)` means the type is not one we model; `Err` means the value
/// does not fit the declared type.
fn convert_value(type_name: &str, raw: &RawValue) -> Result<Option<AttrValue>, String> {
    if type_name == "rel" {
        let targets = match raw {
            RawValue::Path(p) => vec![to_path(p)?],
            RawValue::List(items) => items
                .iter()
                .map(|item| match item {
                    RawValue::Path(p) => to_path(p),
                    other => Err(format!("expected target path, found {:?}", other)),
                })
                .collect::<Result<Vec<_>, _>>()?,
            RawValue::Ident(none) if none == "None" => Vec::new(),
            other => return Err(format!("expected target path, found {:?}", other)),
        };
        return Ok(Some(AttrValue::PathArray(targets)));
    }

    let (base, is_array) = match type_name.strip_suffix("[]") {
        Some(base) => (base, true),
        None => (type_name, false),
    };

    if is_array {
        let items: &[RawValue] = match raw {
            RawValue::List(items) => items.as_slice(),
            RawValue::Ident(none) if none == "None" => &[],
            other => return Err(format!("expected array, found {:?}", other)),
        };
        let value = match base {
            "bool" | "int" | "uint" | "int64" | "uint64" | "uchar" => AttrValue::IntArray(
                items
                    .iter()
                    .map(|v| to_number(v).map(|n| n as i32))
                    .collect::<Result<_, _>>()?,
            ),
            "float" | "half" | "double" | "timecode" => AttrValue::FloatArray(
                items
                    .iter()
                    .map(|v| to_number(v).map(|n| n as f32))
                    .collect::<Result<_, _>>()?,
            ),
            "token" | "string" | "asset" => {
                AttrValue::TokenArray(items.iter().map(to_text).collect::<Result<_, _>>()?)
            }
            "quatf" | "quatd" | "quath" => {
                AttrValue::QuatArray(items.iter().map(to_quat).collect::<Result<_, _>>()?)
            }
            base if VEC3_TYPES.contains(&base) => {
                AttrValue::Vec3Array(items.iter().map(to_vec3).collect::<Result<_, _>>()?)
            }
            _ => return Ok(None),
        };
        return Ok(Some(value));
    }

    let value = match base {
        "bool" => AttrValue::Bool(to_bool(raw)?),
        "int" | "uint" | "int64" | "uint64" | "uchar" => AttrValue::Int(to_number(raw)? as i64),
        "float" | "half" => AttrValue::Float(to_number(raw)? as f32),
        "double" | "timecode" => AttrValue::Double(to_number(raw)?),
        "token" => AttrValue::Token(to_text(raw)?),
        "string" | "asset" => AttrValue::String(to_text(raw)?),
        "quatf" | "quatd" | "quath" => AttrValue::Quat(to_quat(raw)?),
        "matrix4d" => AttrValue::Matrix4(to_matrix(raw)?),
        "float2" | "double2" | "half2" | "texCoord2f" => AttrValue::Vec2(to_vec2(raw)?),
        base if VEC3_TYPES.contains(&base) => AttrValue::Vec3(to_vec3(raw)?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn to_path(text: &str) -> Result<PrimPath, String> {
    // Property targets (`</Mat.outputs:surface>`) point at the owning prim.
    let prim_part = text.split('.').next().unwrap_or(text);
    PrimPath::new(prim_part).map_err(|e| e.to_string())
}

fn to_number(raw: &RawValue) -> Result<f64, String> {
    match raw {
        RawValue::Number(n) => Ok(*n),
        RawValue::Ident(s) if s == "inf" => Ok(f64::INFINITY),
        RawValue::Ident(s) if s == "nan" => Ok(f64::NAN),
        RawValue::Ident(s) if s == "true" => Ok(1.0),
        RawValue::Ident(s) if s == "false" => Ok(0.0),
        other => Err(format!("expected number, found {:?}", other)),
    }
}

fn to_bool(raw: &RawValue) -> Result<bool, String> {
    to_number(raw).map(|n| n != 0.0)
}

fn to_text(raw: &RawValue) -> Result<String, String> {
    match raw {
        RawValue::Str(s) | RawValue::Ident(s) | RawValue::Asset(s) => Ok(s.clone()),
        other => Err(format!("expected string, found {:?}", other)),
    }
}

fn to_tuple<const N: usize>(raw: &RawValue) -> Result<[f64; N], String> {
    let RawValue::Tuple(items) = raw else {
        return Err(format!("expected tuple, found {:?}", raw));
    };
    if items.len() != N {
        return Err(format!("expected {} components, found {}", N, items.len()));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = to_number(item)?;
    }
    Ok(out)
}

fn to_vec2(raw: &RawValue) -> Result<Vec2, String> {
    let [x, y] = to_tuple::<2>(raw)?;
    Ok(Vec2::new(x as f32, y as f32))
}

fn to_vec3(raw: &RawValue) -> Result<Vec3, String> {
    let [x, y, z] = to_tuple::<3>(raw)?;
    Ok(Vec3::new(x as f32, y as f32, z as f32))
}

/// USDA writes quaternions real part first: `(w, x, y, z)`.
fn to_quat(raw: &RawValue) -> Result<Quat, String> {
    let [w, x, y, z] = to_tuple::<4>(raw)?;
    Ok(Quat::from_xyzw(x as f32, y as f32, z as f32, w as f32).normalize())
}

/// Rows of a `matrix4d` are glam columns (USD uses row vectors).
fn to_matrix(raw: &RawValue) -> Result<Mat4, String> {
    let RawValue::Tuple(rows) = raw else {
        return Err(format!("expected matrix, found {:?}", raw));
    };
    if rows.len() != 4 {
        return Err(format!("expected 4 matrix rows, found {}", rows.len()));
    }
    let mut cols = [[0.0f32; 4]; 4];
    for (col, row) in cols.iter_mut().zip(rows) {
        let values = to_tuple::<4>(row)?;
        for (slot, v) in col.iter_mut().zip(values) {
            *slot = v as f32;
        }
    }
    Ok(Mat4::from_cols_array_2d(&cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> PrimPath {
        PrimPath::new(p).unwrap()
    }

    const SCENE: &str = r#"#usda 1.0
(
    defaultPrim = "World"
    metersPerUnit = 1
    upAxis = "Z"
)

def Xform "World"
{
    def Xform "Chair" (
        kind = "component"
    )
    {
        double3 xformOp:translate = (1, 2, 3)
        uniform token[] xformOpOrder = ["xformOp:translate"]

        def Mesh "Seat"
        {
            point3f[] points = [(0, 0, 0), (1, 0, 0), (1, 1, 0)]
            int[] faceVertexCounts = [3]
            int[] faceVertexIndices = [0, 1, 2]
            rel material:binding = </World/Looks/Wood>
        }
    }

    def Xform "Hidden" (
        active = false
    )
    {
    }

    def Camera "Cam"
    {
        float focalLength.timeSamples = {
            1: 35,
            24: 50,
        }
    }
}

class "Template"
{
}
"#;

    #[test]
    fn test_load_scene_structure() {
        let stage = load_usda_from_string(SCENE, "test.usda").unwrap();

        assert_eq!(stage.stage_info().up_axis, UpAxis::Z);
        assert_eq!(stage.stage_info().meters_per_unit, 1.0);
        assert_eq!(stage.default_prim(), Some("World"));

        assert_eq!(stage.prim_type(&path("/World/Chair/Seat")), Some("Mesh"));
        assert_eq!(stage.kind(&path("/World/Chair")), Some("component"));
        assert!(!stage.is_active(&path("/World/Hidden")));
        assert!(!stage.has_prim(&path("/Template")));
        assert_eq!(stage.prim_count(), 5);
    }

    #[test]
    fn test_values_are_typed() {
        let stage = load_usda_from_string(SCENE, "test.usda").unwrap();
        let seat = path("/World/Chair/Seat");

        let points = stage
            .attribute_value(&seat, "points", 0.0)
            .and_then(AttrValue::as_vec3_array)
            .unwrap();
        assert_eq!(points[1], Vec3::X);

        let binding = stage
            .attribute_value(&seat, "material:binding", 0.0)
            .and_then(AttrValue::as_path_array)
            .unwrap();
        assert_eq!(binding, &[path("/World/Looks/Wood")]);

        let translate = stage.local_transform(&path("/World/Chair"), 0.0);
        assert_eq!(translate.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_time_samples() {
        let stage = load_usda_from_string(SCENE, "test.usda").unwrap();
        let cam = path("/World/Cam");

        assert!(stage.has_time_varying_attributes(&cam));
        assert_eq!(stage.attribute_value(&cam, "focalLength", 0.0), Some(&AttrValue::Float(35.0)));
        assert_eq!(stage.attribute_value(&cam, "focalLength", 30.0), Some(&AttrValue::Float(50.0)));
    }

    #[test]
    fn test_over_keeps_type_and_merges() {
        let usda = r#"
def Mesh "Thing" {}
over "Thing" {
    token visibility = "invisible"
}
"#;
        let stage = load_usda_from_string(usda, "over.usda").unwrap();
        assert_eq!(stage.prim_type(&path("/Thing")), Some("Mesh"));
        assert!(!stage.is_visible(&path("/Thing"), 0.0));
    }

    #[test]
    fn test_matrix_and_quat_conversion() {
        let raw = RawValue::Tuple(vec![
            RawValue::Number(1.0),
            RawValue::Number(0.0),
            RawValue::Number(0.0),
            RawValue::Number(0.0),
        ]);
        assert_eq!(convert_value("quatf", &raw).unwrap(), Some(AttrValue::Quat(Quat::IDENTITY)));

        let row = |v: [f64; 4]| RawValue::Tuple(v.iter().map(|n| RawValue::Number(*n)).collect());
        let matrix = RawValue::Tuple(vec![
            row([1.0, 0.0, 0.0, 0.0]),
            row([0.0, 1.0, 0.0, 0.0]),
            row([0.0, 0.0, 1.0, 0.0]),
            row([5.0, 6.0, 7.0, 1.0]),
        ]);
        let converted = convert_value("matrix4d", &matrix).unwrap();
        assert_eq!(
            converted,
            Some(AttrValue::Matrix4(Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0))))
        );
    }

    #[test]
    fn test_unsupported_type_is_skipped() {
        let usda = r#"
def Mesh "M" {
    texCoord2f[] primvars:st = [(0, 0), (1, 0)]
    float3[] extent = [(-1, -1, -1), (1, 1, 1)]
}
"#;
        let stage = load_usda_from_string(usda, "m.usda").unwrap();
        assert!(stage.attribute(&path("/M"), "primvars:st").is_none());
        assert!(stage.attribute(&path("/M"), "extent").is_some());
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let usda = "def Xform \"X\" {\n    double3 xformOp:translate = (1, 2)\n}\n";
        match load_usda_from_string(usda, "bad.usda") {
            Err(StageError::Parse(ParseError::Parse { line, .. })) => assert_eq!(line, 2),
            other => panic!("Expected parse error, got {:?}", other.map(|s| s.prim_count())),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_usda("/nonexistent/scene.usda"),
            Err(StageError::Io(_))
        ));
    }
}
