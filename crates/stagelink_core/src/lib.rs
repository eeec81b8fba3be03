//! stagelink core - the scene-description document model.
//!
//! This crate provides:
//!
//! - **Paths and values**: `PrimPath`, `AttrValue`, time-sampled `Attribute`
//! - **Schemas**: `SchemaRegistry`, the is-a hierarchy of prim types
//! - **Stage**: an in-memory stage with authoring and change notices
//! - **USD support**: USDA text parsing into a `Stage`
//! - **Geometry**: `Mesh`, triangulated from polygon data
//!
//! # Example
//!
//! ```ignore
//! use stagelink_core::usd::load_usda;
//!
//! let stage = load_usda("scene.usda")?;
//! for path in stage.descendants(&stagelink_core::PrimPath::root()) {
//!     println!("{} ({})", path, stage.prim_type(&path).unwrap_or(""));
//! }
//! ```

pub mod mesh;
pub mod path;
pub mod schema;
pub mod stage;
pub mod stage_info;
pub mod usd;
pub mod value;
pub mod xform;

// Re-export commonly used types
pub use mesh::{Mesh, MeshError};
pub use path::PrimPath;
pub use schema::SchemaRegistry;
pub use stage::{ObjectsChanged, PrimData, Stage, StageError, StageResult};
pub use stage_info::{ConversionInfo, Purpose, StageInfo, UpAxis};
pub use usd::{load_usda, load_usda_from_string};
pub use value::{AttrValue, Attribute};
