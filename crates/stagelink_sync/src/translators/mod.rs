//! Built-in schema translators.

mod camera;
mod light;
mod mesh;
mod point_instancer;
mod skel_root;
mod xformable;

pub use camera::CameraTranslator;
pub use light::LightTranslator;
pub use mesh::MeshTranslator;
pub use point_instancer::PointInstancerTranslator;
pub use skel_root::SkelRootTranslator;
pub use xformable::XformableTranslator;

pub(crate) use mesh::{schedule_mesh_asset, MeshBuild};
