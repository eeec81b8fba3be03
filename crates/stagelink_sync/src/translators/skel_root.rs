//! Skeleton roots.

use stagelink_core::PrimPath;

use crate::context::TranslationContext;
use crate::translator::{CollapsingAxis, SchemaTranslator};
use crate::translators::{schedule_mesh_asset, MeshBuild};
use crate::world::{ComponentId, ComponentKind};

/// Translator for `SkelRoot` prims: the skinned meshes below the root and
/// the first skeleton become a single skeletal mesh.
pub struct SkelRootTranslator {
    path: PrimPath,
}

impl SkelRootTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn kind(&self, ctx: &TranslationContext) -> ComponentKind {
        ComponentKind::SkeletalMesh {
            asset: ctx.assets.hash_for(&self.path),
        }
    }
}

impl SchemaTranslator for SkelRootTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_assets(&self, ctx: &mut TranslationContext) {
        schedule_mesh_asset(ctx, &self.path, MeshBuild::Skeletal);
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = self.kind(ctx);
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = self.kind(ctx);
        ctx.refresh_component(component, &self.path, Some(kind));
    }

    fn collapses_children(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        true
    }

    fn can_be_collapsed(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        false
    }
}
