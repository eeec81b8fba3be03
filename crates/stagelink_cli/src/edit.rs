//! Parsing of `--set /path.attr=value` edits.

use anyhow::{anyhow, bail, Context, Result};
use stagelink_core::{AttrValue, PrimPath, Stage};
use stagelink_math::Vec3;

/// One attribute edit from the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct SetEdit {
    pub path: PrimPath,
    pub attribute: String,
    pub value: String,
}

impl SetEdit {
    /// Parse `/Prim/Path.attr:name=value`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (target, value) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("expected /path.attr=value, got '{}'", spec))?;
        let (path, attribute) = target
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("missing attribute name in '{}'", target))?;
        if attribute.is_empty() {
            bail!("missing attribute name in '{}'", target);
        }
        Ok(Self {
            path: PrimPath::new(path)?,
            attribute: attribute.to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Author the edit, typed like the existing attribute or inferred.
    pub fn apply(&self, stage: &mut Stage) -> Result<()> {
        let type_name = match stage.attribute(&self.path, &self.attribute) {
            Some(existing) => existing.type_name.clone(),
            None => infer_type(&self.value).to_string(),
        };
        let value = parse_value(&type_name, &self.value)
            .with_context(|| format!("invalid value for {}.{}", self.path, self.attribute))?;
        stage.set_attribute(&self.path, &self.attribute, &type_name, value)?;
        log::info!("Set {}.{} = {}", self.path, self.attribute, self.value);
        Ok(())
    }
}

fn infer_type(value: &str) -> &'static str {
    if value.parse::<f64>().is_ok() {
        "double"
    } else if value.split(',').count() == 3 && parse_vec3(value).is_ok() {
        "double3"
    } else if value == "true" || value == "false" {
        "bool"
    } else {
        "token"
    }
}

fn parse_vec3(text: &str) -> Result<Vec3> {
    let parts: Vec<f32> = text
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => bail!("expected three components, got {}", parts.len()),
    }
}

fn parse_value(type_name: &str, text: &str) -> Result<AttrValue> {
    Ok(match type_name {
        "bool" => AttrValue::Bool(text.parse()?),
        "int" | "uint" | "int64" | "uint64" | "uchar" => AttrValue::Int(text.parse()?),
        "float" | "half" => AttrValue::Float(text.parse()?),
        "double" | "timecode" => AttrValue::Double(text.parse()?),
        "token" => AttrValue::Token(text.to_string()),
        "string" | "asset" => AttrValue::String(text.to_string()),
        t if t.ends_with('3') || t.ends_with("3f") || t.ends_with("3d") || t.ends_with("3h") => {
            AttrValue::Vec3(parse_vec3(text)?)
        }
        other => bail!("editing '{}' attributes is not supported", other),
    })
}
