//! Attribute values and time-sampled attributes.

use stagelink_math::{Mat4, Quat, Vec2, Vec3};

use crate::path::PrimPath;

/// A resolved attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Token(String),
    String(String),
    Vec2(Vec2),
    Vec3(Vec3),
    Quat(Quat),
    Matrix4(Mat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vec3>),
    QuatArray(Vec<Quat>),
    TokenArray(Vec<String>),
    /// Relationship targets
    PathArray(Vec<PrimPath>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Any scalar numeric value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f as f64),
            AttrValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            AttrValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AttrValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            AttrValue::Quat(q) => Some(*q),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Mat4> {
        match self {
            AttrValue::Matrix4(m) => Some(*m),
            _ => None,
        }
    }

    /// Token or string contents.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            AttrValue::Token(s) | AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            AttrValue::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f32]> {
        match self {
            AttrValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3_array(&self) -> Option<&[Vec3]> {
        match self {
            AttrValue::Vec3Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_quat_array(&self) -> Option<&[Quat]> {
        match self {
            AttrValue::QuatArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_token_array(&self) -> Option<&[String]> {
        match self {
            AttrValue::TokenArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_path_array(&self) -> Option<&[PrimPath]> {
        match self {
            AttrValue::PathArray(v) => Some(v),
            _ => None,
        }
    }
}

/// An attribute with an optional default and optional time samples.
///
/// Samples are kept sorted by time. Evaluation uses held interpolation.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Declared value type (e.g. `point3f[]`, `double3`, `token`)
    pub type_name: String,

    /// Value used when there are no samples
    pub default: Option<AttrValue>,

    samples: Vec<(f64, AttrValue)>,
}

impl Attribute {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            default: None,
            samples: Vec::new(),
        }
    }

    /// Create an attribute holding only a default value.
    pub fn with_default(type_name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            type_name: type_name.into(),
            default: Some(value),
            samples: Vec::new(),
        }
    }

    /// Insert or replace the sample at `time`.
    pub fn set_sample(&mut self, time: f64, value: AttrValue) {
        match self
            .samples
            .binary_search_by(|(t, _)| t.total_cmp(&time))
        {
            Ok(idx) => self.samples[idx].1 = value,
            Err(idx) => self.samples.insert(idx, (time, value)),
        }
    }

    pub fn samples(&self) -> &[(f64, AttrValue)] {
        &self.samples
    }

    /// Resolve the value at `time`.
    ///
    /// The last sample at or before `time` wins; before the first sample the
    /// first sample is held. Without samples the default is returned.
    pub fn get(&self, time: f64) -> Option<&AttrValue> {
        if self.samples.is_empty() {
            return self.default.as_ref();
        }
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        let idx = idx.saturating_sub(1);
        self.samples.get(idx).map(|(_, v)| v)
    }

    /// True if the value can differ between two times.
    pub fn is_time_varying(&self) -> bool {
        self.samples.len() > 1
    }

    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }
}
