//! Point instancers.

use stagelink_core::{AttrValue, PrimPath};
use stagelink_math::{Mat4, Quat, Transform, Vec3};

use crate::context::TranslationContext;
use crate::translator::{CollapsingAxis, SchemaTranslator};
use crate::world::{ComponentId, ComponentKind};

/// Translator for `PointInstancer` prims.
///
/// Prototypes are translated into assets like any other prim, but get no
/// components of their own: the instancer's component draws them.
pub struct PointInstancerTranslator {
    path: PrimPath,
}

impl PointInstancerTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn kind(&self, ctx: &TranslationContext) -> ComponentKind {
        let value = |name: &str| ctx.stage.attribute_value(&self.path, name, ctx.time);

        let prototypes = value("prototypes")
            .and_then(AttrValue::as_path_array)
            .unwrap_or_default()
            .iter()
            .map(|target| ctx.assets.first_under(target))
            .collect();
        let proto_indices = value("protoIndices")
            .and_then(AttrValue::as_int_array)
            .unwrap_or_default()
            .to_vec();
        let positions = value("positions")
            .and_then(AttrValue::as_vec3_array)
            .unwrap_or_default();
        let orientations = value("orientations")
            .and_then(AttrValue::as_quat_array)
            .unwrap_or_default();
        let scales = value("scales")
            .and_then(AttrValue::as_vec3_array)
            .unwrap_or_default();

        let transforms: Vec<Mat4> = (0..proto_indices.len())
            .map(|i| {
                let instance = Transform {
                    translation: positions.get(i).copied().unwrap_or(Vec3::ZERO),
                    rotation: orientations.get(i).copied().unwrap_or(Quat::IDENTITY),
                    scale: scales.get(i).copied().unwrap_or(Vec3::ONE),
                };
                ctx.conversion.convert_matrix(instance.to_matrix())
            })
            .collect();

        ComponentKind::InstancedMesh {
            prototypes,
            proto_indices,
            transforms,
        }
    }
}

impl SchemaTranslator for PointInstancerTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = self.kind(ctx);
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = self.kind(ctx);
        ctx.refresh_component(component, &self.path, Some(kind));
    }

    fn collapses_children(&self, _ctx: &TranslationContext, axis: CollapsingAxis) -> bool {
        axis == CollapsingAxis::Components
    }

    fn can_be_collapsed(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        false
    }
}
