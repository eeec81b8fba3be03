//! Shared state handed to translators during a pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::ThreadPool;
use stagelink_core::{ConversionInfo, PrimPath, Stage};
use stagelink_math::Mat4;

use crate::asset::AssetCache;
use crate::error::ErrorLog;
use crate::registry::TranslatorRegistry;
use crate::settings::SyncSettings;
use crate::task_chain::{ChainSet, TaskChain};
use crate::translator::SchemaTranslator;
use crate::twin::TwinTree;
use crate::world::{ComponentId, ComponentKind, SceneWorld};

/// Main-thread state that synchronous chain steps operate on.
pub struct SyncState {
    pub stage: Stage,
    pub world: SceneWorld,
    pub twins: TwinTree,
    pub assets: AssetCache,
    /// Failures recorded by chain steps, reported with the pass
    pub errors: ErrorLog,
}

impl SyncState {
    pub fn new(stage: Stage, merge_identical_assets: bool) -> Self {
        Self {
            stage,
            world: SceneWorld::new(),
            twins: TwinTree::new(),
            assets: AssetCache::new(merge_identical_assets),
            errors: ErrorLog::new(),
        }
    }
}

/// Everything a translator may read or write while translating one prim.
///
/// Translators receive the context as an argument; they never hold on to
/// it. Asset work that should not block the main thread is scheduled as a
/// `TaskChain` with `schedule`.
pub struct TranslationContext<'a> {
    pub stage: &'a Stage,
    pub world: &'a mut SceneWorld,
    pub assets: &'a mut AssetCache,
    pub settings: &'a SyncSettings,
    pub registry: &'a TranslatorRegistry,
    pub time: f64,
    pub conversion: ConversionInfo,
    chains: &'a mut ChainSet<PrimPath, SyncState>,
    pool: &'a Arc<ThreadPool>,
    still_valid: &'a Arc<AtomicBool>,
    parents: Vec<(ComponentId, PrimPath)>,
}

impl<'a> TranslationContext<'a> {
    pub fn new(
        stage: &'a Stage,
        world: &'a mut SceneWorld,
        assets: &'a mut AssetCache,
        settings: &'a SyncSettings,
        registry: &'a TranslatorRegistry,
        chains: &'a mut ChainSet<PrimPath, SyncState>,
        pool: &'a Arc<ThreadPool>,
        still_valid: &'a Arc<AtomicBool>,
        time: f64,
    ) -> Self {
        let conversion = ConversionInfo::new(stage.stage_info(), settings.target_info());
        Self {
            stage,
            world,
            assets,
            settings,
            registry,
            time,
            conversion,
            chains,
            pool,
            still_valid,
            parents: Vec::new(),
        }
    }

    /// False for inactive prims and prims with a purpose that is not loaded.
    pub fn should_translate(&self, path: &PrimPath) -> bool {
        !path.is_root()
            && self.stage.is_active(path)
            && self.settings.loads_purpose(self.stage.purpose(path))
    }

    /// The registered translator for `path`, or the generic fallback.
    pub fn translator_for(&self, path: &PrimPath) -> Box<dyn SchemaTranslator> {
        self.registry.translator_for(self.stage, path)
    }

    /// Translatable descendants of `path`, pre-order.
    pub fn translatable_descendants(&self, path: &PrimPath) -> Vec<PrimPath> {
        self.stage
            .descendants(path)
            .into_iter()
            .filter(|p| self.should_translate(p))
            .collect()
    }

    // ------------------------------------------------------------------
    // Parent component stack
    // ------------------------------------------------------------------

    pub fn push_parent(&mut self, component: ComponentId, path: PrimPath) {
        self.parents.push((component, path));
    }

    pub fn pop_parent(&mut self) {
        self.parents.pop();
    }

    pub fn parent_component(&self) -> Option<ComponentId> {
        self.parents.last().map(|(c, _)| *c)
    }

    /// Prim of the parent component, or the root.
    pub fn parent_prim(&self) -> PrimPath {
        self.parents
            .last()
            .map(|(_, p)| p.clone())
            .unwrap_or_else(PrimPath::root)
    }

    // ------------------------------------------------------------------
    // Component helpers
    // ------------------------------------------------------------------

    /// Engine-space transform of `path` relative to the parent component.
    pub fn component_transform(&self, path: &PrimPath) -> Mat4 {
        let relative = self
            .stage
            .relative_transform(path, &self.parent_prim(), self.time);
        self.conversion.convert_matrix(relative)
    }

    /// Create a component for `path` under the current parent.
    pub fn spawn_component(&mut self, path: &PrimPath, kind: ComponentKind) -> ComponentId {
        let transform = self.component_transform(path);
        let visible = self.stage.is_visible(path, self.time);
        let parent = self.parent_component();
        let id = self
            .world
            .spawn_component(path.name(), path.clone(), kind, transform, parent);
        if let Some(component) = self.world.modify(id) {
            component.visible = visible;
        }
        id
    }

    /// Refresh transform and visibility, and replace the kind when given.
    pub fn refresh_component(
        &mut self,
        id: ComponentId,
        path: &PrimPath,
        kind: Option<ComponentKind>,
    ) {
        let transform = self.component_transform(path);
        let visible = self.stage.is_visible(path, self.time);
        let Some(component) = self.world.component(id) else {
            return;
        };
        let kind_changed = kind.as_ref().map_or(false, |k| *k != component.kind);
        if component.transform == transform && component.visible == visible && !kind_changed {
            return;
        }
        if let Some(component) = self.world.modify(id) {
            component.transform = transform;
            component.visible = visible;
            if let Some(kind) = kind {
                component.kind = kind;
            }
        }
    }

    // ------------------------------------------------------------------
    // Deferred work
    // ------------------------------------------------------------------

    pub fn pool(&self) -> &Arc<ThreadPool> {
        self.pool
    }

    /// Flag cleared when the stage is closed; steps check it before
    /// touching the scene.
    pub fn validity(&self) -> Arc<AtomicBool> {
        Arc::clone(self.still_valid)
    }

    pub fn is_valid(&self) -> bool {
        self.still_valid.load(Ordering::Acquire)
    }

    /// Queue a chain; it is driven to completion by the pass that owns
    /// this context.
    pub fn schedule(&mut self, key: PrimPath, chain: TaskChain<SyncState>) {
        self.chains.push(key, chain);
    }
}
