//! Transform operations (xformOps) and their evaluation.

use std::collections::BTreeMap;

use stagelink_math::{Mat4, Vec3};

use crate::value::{AttrValue, Attribute};

/// Transform operation types found in USD xformOps.
#[derive(Clone, Debug, PartialEq)]
pub enum XformOp {
    /// Translation (xformOp:translate)
    Translate(Vec3),

    /// Rotation in degrees around X axis
    RotateX(f32),

    /// Rotation in degrees around Y axis
    RotateY(f32),

    /// Rotation in degrees around Z axis
    RotateZ(f32),

    /// Euler rotation in degrees, X applied first
    RotateXYZ(Vec3),

    /// Scale (uniform or non-uniform)
    Scale(Vec3),

    /// Full 4x4 transform matrix
    Transform(Mat4),
}

/// Op attributes evaluated, in this order, when no `xformOpOrder` is authored.
pub const DEFAULT_OP_ORDER: &[&str] = &[
    "xformOp:translate",
    "xformOp:rotateX",
    "xformOp:rotateY",
    "xformOp:rotateZ",
    "xformOp:rotateXYZ",
    "xformOp:scale",
    "xformOp:transform",
];

impl XformOp {
    /// Build an op from an attribute name and its value.
    ///
    /// Names may carry a suffix (`xformOp:translate:pivot`); the op kind is
    /// the second name element.
    pub fn from_attribute(name: &str, value: &AttrValue) -> Option<XformOp> {
        let mut parts = name.split(':');
        if parts.next() != Some("xformOp") {
            return None;
        }
        match parts.next()? {
            "translate" => value.as_vec3().map(XformOp::Translate),
            "rotateX" => value.as_f32().map(XformOp::RotateX),
            "rotateY" => value.as_f32().map(XformOp::RotateY),
            "rotateZ" => value.as_f32().map(XformOp::RotateZ),
            "rotateXYZ" => value.as_vec3().map(XformOp::RotateXYZ),
            "scale" => value
                .as_vec3()
                .or_else(|| value.as_f32().map(Vec3::splat))
                .map(XformOp::Scale),
            "transform" => value.as_matrix().map(XformOp::Transform),
            _ => None,
        }
    }

    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            XformOp::Translate(t) => Mat4::from_translation(*t),
            XformOp::RotateX(deg) => Mat4::from_rotation_x(deg.to_radians()),
            XformOp::RotateY(deg) => Mat4::from_rotation_y(deg.to_radians()),
            XformOp::RotateZ(deg) => Mat4::from_rotation_z(deg.to_radians()),
            XformOp::RotateXYZ(euler) => {
                Mat4::from_rotation_z(euler.z.to_radians())
                    * Mat4::from_rotation_y(euler.y.to_radians())
                    * Mat4::from_rotation_x(euler.x.to_radians())
            }
            XformOp::Scale(s) => Mat4::from_scale(*s),
            XformOp::Transform(m) => *m,
        }
    }
}

/// Combine a list of xformOps into a single matrix.
pub fn compose_xform_ops(ops: &[XformOp]) -> Mat4 {
    ops.iter()
        .fold(Mat4::IDENTITY, |result, op| result * op.to_matrix())
}

/// Evaluate the local transform of a prim from its attributes at `time`.
///
/// Honors `xformOpOrder` (including `!invert!` entries) when authored.
pub fn evaluate_local_transform(attributes: &BTreeMap<String, Attribute>, time: f64) -> Mat4 {
    let order: Vec<String> = match attributes
        .get("xformOpOrder")
        .and_then(|a| a.get(time))
        .and_then(AttrValue::as_token_array)
    {
        Some(order) => order.to_vec(),
        None => DEFAULT_OP_ORDER
            .iter()
            .filter(|name| attributes.contains_key(**name))
            .map(|name| name.to_string())
            .collect(),
    };

    let mut result = Mat4::IDENTITY;
    for entry in &order {
        if entry == "!resetXformStack!" {
            result = Mat4::IDENTITY;
            continue;
        }
        let (name, invert) = match entry.strip_prefix("!invert!") {
            Some(name) => (name, true),
            None => (entry.as_str(), false),
        };
        let Some(value) = attributes.get(name).and_then(|a| a.get(time)) else {
            log::debug!("xformOpOrder names missing op {}", name);
            continue;
        };
        if let Some(op) = XformOp::from_attribute(name, value) {
            let matrix = op.to_matrix();
            result *= if invert { matrix.inverse() } else { matrix };
        }
    }
    result
}

/// True if any attribute that feeds the local transform is time-varying.
pub fn has_animated_xform(attributes: &BTreeMap<String, Attribute>) -> bool {
    attributes
        .iter()
        .any(|(name, attr)| name.starts_with("xformOp:") && attr.is_time_varying())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(entries: Vec<(&str, AttrValue)>) -> BTreeMap<String, Attribute> {
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), Attribute::with_default("", value)))
            .collect()
    }

    #[test]
    fn test_xform_ops() {
        let translate = XformOp::Translate(Vec3::new(1.0, 2.0, 3.0));
        let origin = translate.to_matrix().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 3.0)).length() < 0.001);
    }

    #[test]
    fn test_default_order_translate_then_scale() {
        let attributes = attrs(vec![
            ("xformOp:scale", AttrValue::Vec3(Vec3::splat(2.0))),
            ("xformOp:translate", AttrValue::Vec3(Vec3::new(10.0, 0.0, 0.0))),
        ]);
        let m = evaluate_local_transform(&attributes, 0.0);
        // Scale applies to the point first, then the translation.
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(12.0, 0.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_explicit_order_and_invert() {
        let attributes = attrs(vec![
            ("xformOp:translate:pivot", AttrValue::Vec3(Vec3::new(1.0, 0.0, 0.0))),
            ("xformOp:rotateZ", AttrValue::Float(90.0)),
            (
                "xformOpOrder",
                AttrValue::TokenArray(vec![
                    "xformOp:translate:pivot".into(),
                    "xformOp:rotateZ".into(),
                    "!invert!xformOp:translate:pivot".into(),
                ]),
            ),
        ]);
        let m = evaluate_local_transform(&attributes, 0.0);
        // Rotating about the pivot leaves the pivot in place.
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::X).length() < 0.001);
    }

    #[test]
    fn test_rotate_xyz_applies_x_first() {
        let m = XformOp::RotateXYZ(Vec3::new(90.0, 0.0, 90.0)).to_matrix();
        // Y -> Z under rotateX, then Z stays under rotateZ.
        let p = m.transform_point3(Vec3::Y);
        assert!((p - Vec3::Z).length() < 0.001);
    }

    #[test]
    fn test_uniform_scale_from_scalar() {
        let op = XformOp::from_attribute("xformOp:scale", &AttrValue::Double(3.0));
        assert_eq!(op, Some(XformOp::Scale(Vec3::splat(3.0))));
    }
}
