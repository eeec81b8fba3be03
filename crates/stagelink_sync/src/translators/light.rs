//! Light prims.

use stagelink_core::{AttrValue, PrimPath};
use stagelink_math::Vec3;

use crate::context::TranslationContext;
use crate::translator::{CollapsingAxis, SchemaTranslator};
use crate::world::{ComponentId, ComponentKind, LightSettings, LightType};

/// Translator for boundable and non-boundable lights.
pub struct LightTranslator {
    path: PrimPath,
}

impl LightTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn light_type(type_name: &str) -> LightType {
        match type_name {
            "SphereLight" => LightType::Sphere,
            "RectLight" => LightType::Rect,
            "DiskLight" => LightType::Disk,
            "CylinderLight" => LightType::Cylinder,
            "DistantLight" => LightType::Distant,
            "DomeLight" => LightType::Dome,
            _ => LightType::Other,
        }
    }

    /// Value of `inputs:<name>`, or of the older unprefixed `<name>`.
    fn input<'a>(&self, ctx: &'a TranslationContext, name: &str) -> Option<&'a AttrValue> {
        ctx.stage
            .attribute_value(&self.path, &format!("inputs:{}", name), ctx.time)
            .or_else(|| ctx.stage.attribute_value(&self.path, name, ctx.time))
    }

    fn settings(&self, ctx: &TranslationContext) -> LightSettings {
        let float = |name: &str| self.input(ctx, name).and_then(AttrValue::as_f32);
        LightSettings {
            light_type: Self::light_type(ctx.stage.prim_type(&self.path).unwrap_or("")),
            intensity: float("intensity").unwrap_or(1.0),
            exposure: float("exposure").unwrap_or(0.0),
            color: self
                .input(ctx, "color")
                .and_then(AttrValue::as_vec3)
                .unwrap_or(Vec3::ONE),
            radius: float("radius"),
            angle: float("angle"),
        }
    }
}

impl SchemaTranslator for LightTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = ComponentKind::Light(self.settings(ctx));
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = ComponentKind::Light(self.settings(ctx));
        ctx.refresh_component(component, &self.path, Some(kind));
    }

    fn can_be_collapsed(&self, _ctx: &TranslationContext, _axis: CollapsingAxis) -> bool {
        false
    }
}
