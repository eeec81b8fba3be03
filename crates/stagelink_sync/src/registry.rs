//! Registry mapping prim schema types to translator factories.
//!
//! Entries are kept ordered so that a schema type always comes before the
//! types it derives from; the first entry a prim is-a wins. Registering a
//! type that already has an entry stacks the new factory on top of the
//! old one, and unregistering it restores the previous factory.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stagelink_core::{PrimPath, SchemaRegistry, Stage};

use crate::translator::{FallbackTranslator, SchemaTranslator};
use crate::translators::{
    CameraTranslator, LightTranslator, MeshTranslator, PointInstancerTranslator,
    SkelRootTranslator, XformableTranslator,
};

/// Creates a translator for a prim path.
pub type TranslatorFactory = Arc<dyn Fn(PrimPath) -> Box<dyn SchemaTranslator> + Send + Sync>;

/// Identifies one registration, for `unregister`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TranslatorHandle {
    schema: String,
    id: u64,
}

impl TranslatorHandle {
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

struct RegistryEntry {
    schema: String,
    /// Factories for this exact type; the last one is active
    factories: Vec<(u64, TranslatorFactory)>,
}

#[derive(Default)]
struct Entries {
    list: Vec<RegistryEntry>,
    next_id: u64,
}

/// Schema type to translator lookup, shared behind an `Arc`.
pub struct TranslatorRegistry {
    schemas: Arc<SchemaRegistry>,
    entries: RwLock<Entries>,
}

impl TranslatorRegistry {
    /// An empty registry ordering types with `schemas`.
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// A registry with the built-in translators registered.
    pub fn with_defaults(schemas: Arc<SchemaRegistry>) -> Self {
        let registry = Self::new(schemas);
        registry.register("Xformable", |path| Box::new(XformableTranslator::new(path)));
        registry.register("Mesh", |path| Box::new(MeshTranslator::new(path)));
        registry.register("Camera", |path| Box::new(CameraTranslator::new(path)));
        registry.register("BoundableLightBase", |path| Box::new(LightTranslator::new(path)));
        registry.register("NonboundableLightBase", |path| Box::new(LightTranslator::new(path)));
        registry.register("PointInstancer", |path| {
            Box::new(PointInstancerTranslator::new(path))
        });
        registry.register("SkelRoot", |path| Box::new(SkelRootTranslator::new(path)));
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a factory for prims that are-a `schema`.
    pub fn register<F>(&self, schema: &str, factory: F) -> TranslatorHandle
    where
        F: Fn(PrimPath) -> Box<dyn SchemaTranslator> + Send + Sync + 'static,
    {
        if !self.schemas.is_known(schema) {
            log::warn!("Registering translator for unknown schema type {}", schema);
        }

        let mut entries = self.write();
        entries.next_id += 1;
        let id = entries.next_id;
        let factory: TranslatorFactory = Arc::new(factory);

        if let Some(index) = entries.list.iter().position(|e| e.schema == schema) {
            entries.list[index].factories.push((id, factory));
        } else {
            // Before the first type `schema` derives from.
            let position = entries
                .list
                .iter()
                .position(|e| self.schemas.is_a(schema, &e.schema))
                .unwrap_or(entries.list.len());
            entries.list.insert(
                position,
                RegistryEntry {
                    schema: schema.to_string(),
                    factories: vec![(id, factory)],
                },
            );
        }
        log::debug!("Registered translator #{} for {}", id, schema);

        TranslatorHandle {
            schema: schema.to_string(),
            id,
        }
    }

    /// Remove exactly the registration `handle` refers to. No-op if absent.
    pub fn unregister(&self, handle: &TranslatorHandle) {
        let mut entries = self.write();
        let Some(index) = entries.list.iter().position(|e| e.schema == handle.schema) else {
            return;
        };
        entries.list[index].factories.retain(|(id, _)| *id != handle.id);
        if entries.list[index].factories.is_empty() {
            entries.list.remove(index);
        }
    }

    /// Schema types in lookup order.
    pub fn schemas_in_order(&self) -> Vec<String> {
        self.read().list.iter().map(|e| e.schema.clone()).collect()
    }

    /// Translator from the first entry the prim is-a, or `None`.
    pub fn create_translator(&self, stage: &Stage, path: &PrimPath) -> Option<Box<dyn SchemaTranslator>> {
        let factory = {
            let entries = self.read();
            entries
                .list
                .iter()
                .find(|e| stage.is_a(path, &e.schema))
                .and_then(|e| e.factories.last())
                .map(|(_, factory)| Arc::clone(factory))
        }?;
        Some(factory(path.clone()))
    }

    /// Like `create_translator`, falling back to a plain scene translator.
    pub fn translator_for(&self, stage: &Stage, path: &PrimPath) -> Box<dyn SchemaTranslator> {
        self.create_translator(stage, path)
            .unwrap_or_else(|| Box::new(FallbackTranslator::new(path.clone())))
    }
}
