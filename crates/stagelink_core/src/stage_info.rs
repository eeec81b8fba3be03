//! Stage-level metadata and the coordinate conversion it implies.

use std::fmt;

use serde::{Deserialize, Serialize};
use stagelink_math::{Mat4, Vec3};

/// Which axis points up in a stage or in the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpAxis {
    Y,
    Z,
}

impl UpAxis {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Y" | "y" => Some(UpAxis::Y),
            "Z" | "z" => Some(UpAxis::Z),
            _ => None,
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            UpAxis::Y => "Y",
            UpAxis::Z => "Z",
        }
    }
}

/// Imageable purpose, used to filter what gets translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Default,
    Render,
    Proxy,
    Guide,
}

impl Purpose {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "default" => Some(Purpose::Default),
            "render" => Some(Purpose::Render),
            "proxy" => Some(Purpose::Proxy),
            "guide" => Some(Purpose::Guide),
            _ => None,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Purpose::Default => "default",
            Purpose::Render => "render",
            Purpose::Proxy => "proxy",
            Purpose::Guide => "guide",
        };
        f.write_str(token)
    }
}

/// Up axis and linear unit of a stage (or of the engine).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageInfo {
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
}

impl Default for StageInfo {
    /// USD fallback values: Y up, centimeters.
    fn default() -> Self {
        Self {
            up_axis: UpAxis::Y,
            meters_per_unit: 0.01,
        }
    }
}

/// Converts stage-space data into engine space.
///
/// Rotations handle the up-axis change; translations and points are scaled
/// by the ratio of linear units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionInfo {
    pub source: StageInfo,
    pub target: StageInfo,
}

impl ConversionInfo {
    pub fn new(source: StageInfo, target: StageInfo) -> Self {
        Self { source, target }
    }

    /// Conversion that changes nothing.
    pub fn identity() -> Self {
        Self::new(StageInfo::default(), StageInfo::default())
    }

    /// Rotation taking the source up axis onto the target up axis.
    pub fn basis(&self) -> Mat4 {
        match (self.source.up_axis, self.target.up_axis) {
            (UpAxis::Y, UpAxis::Z) => Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2),
            (UpAxis::Z, UpAxis::Y) => Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            _ => Mat4::IDENTITY,
        }
    }

    /// Linear unit ratio (source units to target units).
    pub fn unit_scale(&self) -> f32 {
        if self.target.meters_per_unit <= 0.0 {
            return 1.0;
        }
        (self.source.meters_per_unit / self.target.meters_per_unit) as f32
    }

    pub fn is_identity(&self) -> bool {
        self.source.up_axis == self.target.up_axis && (self.unit_scale() - 1.0).abs() < 1e-6
    }

    /// Convert a local transform matrix.
    pub fn convert_matrix(&self, matrix: Mat4) -> Mat4 {
        if self.is_identity() {
            return matrix;
        }
        let basis = self.basis();
        let mut converted = basis * matrix * basis.inverse();
        let scale = self.unit_scale();
        converted.w_axis.x *= scale;
        converted.w_axis.y *= scale;
        converted.w_axis.z *= scale;
        converted
    }

    /// Matrix taking stage-space geometry into engine space.
    pub fn geometry_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.unit_scale())) * self.basis()
    }

    /// Convert a position.
    pub fn convert_point(&self, point: Vec3) -> Vec3 {
        self.basis().transform_point3(point) * self.unit_scale()
    }

    /// Convert a direction (normals are not scaled).
    pub fn convert_vector(&self, vector: Vec3) -> Vec3 {
        self.basis().transform_vector3(vector)
    }
}
