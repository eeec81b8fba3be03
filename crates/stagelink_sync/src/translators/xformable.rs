//! Generic transformable prims, and kind-based collapsing.

use stagelink_core::PrimPath;

use crate::context::TranslationContext;
use crate::translator::{CollapsingAxis, SchemaTranslator};
use crate::translators::{schedule_mesh_asset, MeshBuild};
use crate::world::{ComponentId, ComponentKind};

/// Translator for `Xformable` prims without a more specific translator.
///
/// A prim whose model kind is listed in `kinds_to_collapse` folds its whole
/// subtree into itself: one merged mesh asset, one component.
pub struct XformableTranslator {
    path: PrimPath,
}

impl XformableTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn kind(&self, ctx: &TranslationContext) -> ComponentKind {
        match ctx.assets.hash_for(&self.path) {
            Some(asset) => ComponentKind::StaticMesh { asset: Some(asset) },
            None => ComponentKind::Scene,
        }
    }
}

impl SchemaTranslator for XformableTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_assets(&self, ctx: &mut TranslationContext) {
        if self.collapses_children(ctx, CollapsingAxis::Assets) {
            schedule_mesh_asset(ctx, &self.path, MeshBuild::Merged);
        }
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = self.kind(ctx);
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = self.kind(ctx);
        ctx.refresh_component(component, &self.path, Some(kind));
    }

    fn collapses_children(&self, ctx: &TranslationContext, axis: CollapsingAxis) -> bool {
        let collapsible_kind = ctx
            .stage
            .kind(&self.path)
            .map_or(false, |kind| ctx.settings.collapses_kind(kind));
        if !collapsible_kind {
            return false;
        }

        ctx.translatable_descendants(&self.path)
            .iter()
            .all(|path| ctx.translator_for(path).can_be_collapsed(ctx, axis))
    }
}
