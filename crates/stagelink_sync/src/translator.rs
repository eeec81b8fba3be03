//! The schema translator interface.

use stagelink_core::PrimPath;

use crate::context::TranslationContext;
use crate::world::{ComponentId, ComponentKind};

/// The two things a prim can be collapsed into its ancestor for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollapsingAxis {
    Assets,
    Components,
}

/// Turns one prim into assets and a component.
///
/// A translator is created fresh for every prim on every pass and holds
/// the prim's path. The default methods produce a plain scene component
/// and no assets.
pub trait SchemaTranslator {
    fn path(&self) -> &PrimPath;

    /// Build the prim's assets, usually by scheduling a task chain.
    fn create_assets(&self, _ctx: &mut TranslationContext) {}

    /// Create the prim's component under the context's current parent.
    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        Some(ctx.spawn_component(self.path(), ComponentKind::Scene))
    }

    /// Refresh an existing component in place.
    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        ctx.refresh_component(component, self.path(), None);
    }

    /// True if the prim's descendants are folded into this prim on `axis`.
    fn collapses_children(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        false
    }

    /// True if an ancestor may fold this prim into itself on `axis`.
    fn can_be_collapsed(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        true
    }
}

/// Used for prims no registered translator handles (scopes, untyped prims).
pub struct FallbackTranslator {
    path: PrimPath,
}

impl FallbackTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }
}

impl SchemaTranslator for FallbackTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }
}
