//! Prim schema type hierarchy.
//!
//! Translators are matched against prims with an is-a check, so the stage
//! has to know which types derive from which. The built-in hierarchy covers
//! the geometry, camera, light and skeleton types the engine translates;
//! plugins may register further types before the registry is shared.

use std::collections::HashMap;

/// Maps each known schema type to its parent type.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    parents: HashMap<String, Option<String>>,
}

const BUILTIN_SCHEMAS: &[(&str, Option<&str>)] = &[
    ("Typed", None),
    ("Imageable", Some("Typed")),
    ("Scope", Some("Imageable")),
    ("Xformable", Some("Imageable")),
    ("Xform", Some("Xformable")),
    ("Camera", Some("Xformable")),
    ("Skeleton", Some("Xformable")),
    ("NonboundableLightBase", Some("Xformable")),
    ("DistantLight", Some("NonboundableLightBase")),
    ("DomeLight", Some("NonboundableLightBase")),
    ("Boundable", Some("Xformable")),
    ("PointInstancer", Some("Boundable")),
    ("SkelRoot", Some("Boundable")),
    ("Gprim", Some("Boundable")),
    ("Mesh", Some("Gprim")),
    ("Cube", Some("Gprim")),
    ("Sphere", Some("Gprim")),
    ("BoundableLightBase", Some("Boundable")),
    ("SphereLight", Some("BoundableLightBase")),
    ("RectLight", Some("BoundableLightBase")),
    ("DiskLight", Some("BoundableLightBase")),
    ("CylinderLight", Some("BoundableLightBase")),
    ("NodeGraph", Some("Typed")),
    ("Material", Some("NodeGraph")),
    ("Shader", Some("Typed")),
];

impl SchemaRegistry {
    /// An empty registry (nothing is-a anything except itself).
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in schema types.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (name, parent) in BUILTIN_SCHEMAS {
            registry.register(name, parent.map(str::to_string));
        }
        registry
    }

    /// Register (or re-parent) a schema type.
    pub fn register(&mut self, type_name: &str, parent: Option<String>) {
        self.parents.insert(type_name.to_string(), parent);
    }

    pub fn is_known(&self, type_name: &str) -> bool {
        self.parents.contains_key(type_name)
    }

    /// True if `type_name` is `base` or derives from it.
    pub fn is_a(&self, type_name: &str, base: &str) -> bool {
        if type_name.is_empty() {
            return false;
        }
        let mut current = Some(type_name);
        // Bounded walk so a cyclic registration cannot hang lookups.
        for _ in 0..=self.parents.len() {
            match current {
                Some(name) if name == base => return true,
                Some(name) => {
                    current = self.parents.get(name).and_then(|p| p.as_deref());
                }
                None => return false,
            }
        }
        false
    }

    /// Number of inheritance steps from `type_name` to the root type.
    pub fn depth(&self, type_name: &str) -> usize {
        let mut depth = 0;
        let mut current = self.parents.get(type_name).and_then(|p| p.as_deref());
        while let Some(name) = current {
            depth += 1;
            if depth > self.parents.len() {
                break;
            }
            current = self.parents.get(name).and_then(|p| p.as_deref());
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_a() {
        let schemas = SchemaRegistry::with_builtin();
        assert!(schemas.is_a("Mesh", "Mesh"));
        assert!(schemas.is_a("Mesh", "Gprim"));
        assert!(schemas.is_a("Mesh", "Xformable"));
        assert!(schemas.is_a("SphereLight", "BoundableLightBase"));
        assert!(!schemas.is_a("Scope", "Xformable"));
        assert!(!schemas.is_a("Xformable", "Mesh"));
        assert!(schemas.is_a("Material", "NodeGraph"));
        assert!(!schemas.is_a("Shader", "Material"));
    }

    #[test]
    fn test_untyped_and_unknown() {
        let schemas = SchemaRegistry::with_builtin();
        assert!(!schemas.is_a("", "Typed"));
        assert!(schemas.is_a("MyCustom", "MyCustom"));
        assert!(!schemas.is_a("MyCustom", "Xformable"));
    }

    #[test]
    fn test_register_plugin_schema() {
        let mut schemas = SchemaRegistry::with_builtin();
        schemas.register("HairCurves", Some("Gprim".to_string()));
        assert!(schemas.is_a("HairCurves", "Xformable"));
        assert!(schemas.depth("HairCurves") > schemas.depth("Gprim"));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut schemas = SchemaRegistry::new();
        schemas.register("A", Some("B".to_string()));
        schemas.register("B", Some("A".to_string()));
        assert!(!schemas.is_a("A", "C"));
    }
}
