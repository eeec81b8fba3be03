//! USD (Universal Scene Description) text support.
//!
//! This module provides parsing of USDA (ASCII) files into a `Stage`.
//!
//! ## Supported USD Features
//!
//! - Layer metadata: `upAxis`, `metersPerUnit`, `defaultPrim`
//! - `def` / `over` prims of any type, nested to any depth
//! - Prim metadata: `kind`, `active`
//! - Attributes with default values and `.timeSamples`
//! - Relationships (`rel prototypes = [</A>, </B>]`)
//!
//! ## Not Yet Supported
//!
//! - Binary `.usdc` format
//! - References, payloads, variants and other composition arcs
//!
//! # Example
//!
//! ```ignore
//! use stagelink_core::usd::load_usda;
//!
//! let stage = load_usda("path/to/scene.usda")?;
//! println!("Loaded {} prims", stage.prim_count());
//! ```

mod loader;
mod parser;
mod types;

pub use loader::*;
pub use parser::*;
pub use types::*;
