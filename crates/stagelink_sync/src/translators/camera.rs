//! Camera prims.

use stagelink_core::{AttrValue, PrimPath};

use crate::context::TranslationContext;
use crate::translator::{CollapsingAxis, SchemaTranslator};
use crate::world::{CameraSettings, ComponentId, ComponentKind};

/// Translator for `Camera` prims. Cameras build no assets.
pub struct CameraTranslator {
    path: PrimPath,
}

impl CameraTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn settings(&self, ctx: &TranslationContext) -> CameraSettings {
        let float = |name: &str, default: f32| {
            ctx.stage
                .attribute_value(&self.path, name, ctx.time)
                .and_then(AttrValue::as_f32)
                .unwrap_or(default)
        };
        let clipping_range = ctx
            .stage
            .attribute_value(&self.path, "clippingRange", ctx.time)
            .and_then(AttrValue::as_vec2)
            .map_or((1.0, 1_000_000.0), |range| (range.x, range.y));

        CameraSettings {
            focal_length: float("focalLength", 50.0),
            horizontal_aperture: float("horizontalAperture", 20.955),
            vertical_aperture: float("verticalAperture", 15.2908),
            clipping_range,
            focus_distance: float("focusDistance", 0.0),
        }
    }
}

impl SchemaTranslator for CameraTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = ComponentKind::Camera(self.settings(ctx));
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = ComponentKind::Camera(self.settings(ctx));
        ctx.refresh_component(component, &self.path, Some(kind));
    }

    fn can_be_collapsed(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        false
    }
}
