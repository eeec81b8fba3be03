//! Tree walks that translate a stage into the scene.
//!
//! Translation runs in two phases. The asset phase walks the stage,
//! letting each translator schedule its asset chains, and drives every
//! chain to completion. The component phase then walks the stage again,
//! creating components under their parent and materializing the twin tree.
//! Both walks stop descending below a prim whose translator collapses its
//! children on that phase's axis.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::ThreadPool;
use stagelink_core::{PrimPath, Stage};

use crate::asset::{AssetCache, AssetSnapshot};
use crate::context::{SyncState, TranslationContext};
use crate::error::{SyncError, SyncResult};
use crate::registry::TranslatorRegistry;
use crate::settings::SyncSettings;
use crate::task_chain::{build_worker_pool, ChainSet};
use crate::translator::CollapsingAxis;
use crate::twin::TwinTree;
use crate::world::SceneWorld;

/// Model kinds that get an actor when `spawn_actors_for_models` is set.
const MODEL_KINDS: &[&str] = &["assembly", "group", "component"];

/// Twin tree, asset cache and animated prims saved before a batch of scene
/// edits, restored when the batch is undone.
#[derive(Debug)]
pub struct SyncSnapshot {
    twins: TwinTree,
    assets: AssetSnapshot,
    animated: BTreeSet<PrimPath>,
}

/// Drives translators over a stage and owns everything they produce.
pub struct SyncEngine {
    state: SyncState,
    chains: ChainSet<PrimPath, SyncState>,
    registry: Arc<TranslatorRegistry>,
    pool: Arc<ThreadPool>,
    settings: SyncSettings,
    still_valid: Arc<AtomicBool>,
    time: f64,
    /// Prims with time-varying attributes, refreshed by `set_time`
    animated: BTreeSet<PrimPath>,
}

impl SyncEngine {
    pub fn new(
        stage: Stage,
        settings: SyncSettings,
        registry: Arc<TranslatorRegistry>,
    ) -> SyncResult<Self> {
        settings.validate()?;
        let pool = build_worker_pool(settings.worker_threads)?;
        Ok(Self {
            state: SyncState::new(stage, settings.merge_identical_assets),
            chains: ChainSet::new(),
            registry,
            pool,
            time: settings.initial_time,
            settings,
            still_valid: Arc::new(AtomicBool::new(true)),
            animated: BTreeSet::new(),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn stage(&self) -> &Stage {
        &self.state.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.state.stage
    }

    pub fn world(&self) -> &SceneWorld {
        &self.state.world
    }

    pub fn world_mut(&mut self) -> &mut SceneWorld {
        &mut self.state.world
    }

    pub fn twins(&self) -> &TwinTree {
        &self.state.twins
    }

    pub fn assets(&self) -> &AssetCache {
        &self.state.assets
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<TranslatorRegistry> {
        &self.registry
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn animated_prims(&self) -> impl Iterator<Item = &PrimPath> {
        self.animated.iter()
    }

    pub fn is_valid(&self) -> bool {
        self.still_valid.load(Ordering::Acquire)
    }

    /// A translation context over the engine's state, plus the parts of the
    /// state the walks need alongside it.
    fn split(&mut self) -> (TranslationContext<'_>, &mut TwinTree, &mut BTreeSet<PrimPath>) {
        let SyncState {
            stage,
            world,
            twins,
            assets,
            ..
        } = &mut self.state;
        let ctx = TranslationContext::new(
            stage,
            world,
            assets,
            &self.settings,
            &self.registry,
            &mut self.chains,
            &self.pool,
            &self.still_valid,
            self.time,
        );
        (ctx, twins, &mut self.animated)
    }

    // ------------------------------------------------------------------
    // Translation
    // ------------------------------------------------------------------

    /// Translate the whole stage.
    pub fn load(&mut self) {
        let root = PrimPath::root();
        self.translate_assets(&root);
        self.translate_components(&root);
        log::info!(
            "Translated {}: {} twins, {} components, {} actors, {} assets",
            self.state.stage.identifier(),
            self.state.twins.len(),
            self.state.world.component_count(),
            self.state.world.actor_count(),
            self.state.assets.len()
        );
    }

    /// Asset phase for the subtree at `root`; returns once every chain it
    /// scheduled has finished.
    pub fn translate_assets(&mut self, root: &PrimPath) {
        {
            let (mut ctx, _, _) = self.split();
            let mut stack = vec![root.clone()];
            while let Some(path) = stack.pop() {
                if !path.is_root() {
                    if !ctx.should_translate(&path) {
                        continue;
                    }
                    let translator = ctx.translator_for(&path);
                    translator.create_assets(&mut ctx);
                    if translator.collapses_children(&ctx, CollapsingAxis::Assets) {
                        continue;
                    }
                }
                stack.extend(ctx.stage.children(&path).into_iter().rev());
            }
        }
        self.finish_chains();
    }

    fn finish_chains(&mut self) {
        for path in self.chains.run_to_completion(&mut self.state) {
            log::warn!("Task chain for {} was aborted", path);
            self.state.errors.push(SyncError::ChainAborted(path));
        }
    }

    /// Drop the links of the subtree at `root` and build its assets again.
    pub fn rebuild_assets(&mut self, root: &PrimPath) {
        let unlinked = self.state.assets.unlink_subtree(root);
        log::debug!("Rebuilding assets under {} ({} unlinked)", root, unlinked);
        self.translate_assets(root);
    }

    /// Component phase for the subtree at `root`, under the component of
    /// the nearest translated ancestor.
    pub fn translate_components(&mut self, root: &PrimPath) {
        let (mut ctx, twins, animated) = self.split();
        if let Some((component, prim)) = twins.parent_component(root) {
            ctx.push_parent(component, prim);
        }
        visit_components(&mut ctx, twins, animated, root);
    }

    /// Refresh the component of the twin at `path` in place.
    pub fn update_components(&mut self, path: &PrimPath) {
        let (mut ctx, twins, _) = self.split();
        let Some(component) = twins.find(path).and_then(|twin| twin.component) else {
            return;
        };
        if !ctx.stage.has_prim(path) {
            return;
        }
        if let Some((parent, prim)) = twins.parent_component(path) {
            ctx.push_parent(parent, prim);
        }
        let translator = ctx.translator_for(path);
        translator.update_components(&mut ctx, component);
    }

    /// Release the twins, components and actors of the subtree at `root`.
    pub fn clear_components(&mut self, root: &PrimPath) {
        self.state.twins.clear(root, &mut self.state.world);
        self.animated.retain(|path| !path.has_prefix(root));
    }

    /// Move the time cursor and refresh every animated prim.
    pub fn set_time(&mut self, time: f64) {
        if time == self.time {
            return;
        }
        self.time = time;
        let animated: Vec<PrimPath> = self.animated.iter().cloned().collect();
        for path in &animated {
            self.update_components(path);
        }
        log::debug!("Time set to {}, refreshed {} prim(s)", time, animated.len());
    }

    // ------------------------------------------------------------------
    // Collapsing
    // ------------------------------------------------------------------

    /// True if an ancestor of `path` folds it into itself on `axis`.
    pub fn is_collapsed(&mut self, path: &PrimPath, axis: CollapsingAxis) -> bool {
        let (ctx, _, _) = self.split();
        collapsed_by_ancestor(&ctx, path, axis)
    }

    /// The nearest path at or above `path` that exists on the stage and is
    /// not collapsed on `axis`: where a change to `path` must be handled.
    pub fn unwind(&mut self, path: &PrimPath, axis: CollapsingAxis) -> PrimPath {
        let (ctx, _, _) = self.split();
        let mut current = path.clone();
        while !current.is_root()
            && (!ctx.stage.has_prim(&current) || collapsed_by_ancestor(&ctx, &current, axis))
        {
            current = current.parent().unwrap_or_else(PrimPath::root);
        }
        current
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    pub fn collect_unused_assets(&mut self) -> usize {
        self.state.assets.collect_unused()
    }

    /// Report and reset the errors collected since the last flush.
    pub fn flush_errors(&mut self, context: &str) -> Vec<String> {
        self.state.errors.flush(context)
    }

    pub fn record_error(&mut self, error: SyncError) {
        self.state.errors.push(error);
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            twins: self.state.twins.clone(),
            assets: self.state.assets.snapshot(),
            animated: self.animated.clone(),
        }
    }

    /// Restore the twin tree and assets saved by `snapshot`. The scene itself
    /// is reverted separately through `SceneWorld::undo`.
    pub fn restore(&mut self, snapshot: SyncSnapshot) {
        self.finish_chains();
        self.state.twins = snapshot.twins;
        self.state.assets.restore(snapshot.assets);
        self.animated = snapshot.animated;
    }

    /// Invalidate outstanding chains and release everything translated.
    pub fn close(&mut self) {
        self.still_valid.store(false, Ordering::Release);
        self.finish_chains();
        let root = PrimPath::root();
        self.state.twins.clear(&root, &mut self.state.world);
        self.state.world.clear();
        self.state.assets.clear();
        self.animated.clear();
        self.state.errors.flush("Closing stage");
    }
}

fn collapsed_by_ancestor(ctx: &TranslationContext, path: &PrimPath, axis: CollapsingAxis) -> bool {
    path.ancestors()
        .filter(|ancestor| !ancestor.is_root() && ctx.stage.has_prim(ancestor))
        .any(|ancestor| ctx.translator_for(&ancestor).collapses_children(ctx, axis))
}

fn spawns_actor(ctx: &TranslationContext, path: &PrimPath) -> bool {
    if path.element_count() == 1 {
        return true;
    }
    ctx.settings.spawn_actors_for_models
        && ctx
            .stage
            .kind(path)
            .map_or(false, |kind| MODEL_KINDS.contains(&kind))
}

fn visit_components(
    ctx: &mut TranslationContext,
    twins: &mut TwinTree,
    animated: &mut BTreeSet<PrimPath>,
    path: &PrimPath,
) {
    let mut pushed = false;
    if !path.is_root() {
        if !ctx.should_translate(path) {
            return;
        }

        let translator = ctx.translator_for(path);
        let component = translator.create_components(ctx);
        let twin = twins.get_or_create(path);
        twin.component = component;
        if let Some(component) = component {
            if spawns_actor(ctx, path) {
                match ctx.world.spawn_actor(path.name(), path.clone(), component) {
                    Ok(actor) => twin.actor = Some(actor),
                    Err(e) => log::warn!("Failed to spawn actor for {}: {}", path, e),
                }
            }
        }

        let collapsed = translator.collapses_children(ctx, CollapsingAxis::Components);
        let varying = ctx.stage.has_time_varying_attributes(path)
            || (collapsed
                && ctx
                    .translatable_descendants(path)
                    .iter()
                    .any(|p| ctx.stage.has_time_varying_attributes(p)));
        if varying {
            animated.insert(path.clone());
        }
        if collapsed {
            return;
        }
        if let Some(component) = component {
            ctx.push_parent(component, path.clone());
            pushed = true;
        }
    }

    for child in ctx.stage.children(path) {
        visit_components(ctx, twins, animated, &child);
    }
    if pushed {
        ctx.pop_parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ComponentKind;
    use stagelink_core::{AttrValue, Attribute, UpAxis};
    use stagelink_math::Vec3;

    fn path(p: &str) -> PrimPath {
        PrimPath::new(p).unwrap()
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            target_up_axis: UpAxis::Y,
            target_meters_per_unit: 0.01,
            worker_threads: 2,
            ..SyncSettings::default()
        }
    }

    fn engine(stage: Stage) -> SyncEngine {
        let registry = Arc::new(TranslatorRegistry::with_defaults(stage.schemas().clone()));
        SyncEngine::new(stage, settings(), registry).unwrap()
    }

    fn add_quad(stage: &mut Stage, p: &PrimPath, offset: f32) {
        stage.define_prim(p, "Mesh").unwrap();
        let points = vec![
            Vec3::new(offset, 0.0, 0.0),
            Vec3::new(offset + 1.0, 0.0, 0.0),
            Vec3::new(offset + 1.0, 1.0, 0.0),
            Vec3::new(offset, 1.0, 0.0),
        ];
        stage
            .set_attribute(p, "points", "point3f[]", AttrValue::Vec3Array(points))
            .unwrap();
        stage
            .set_attribute(p, "faceVertexCounts", "int[]", AttrValue::IntArray(vec![4]))
            .unwrap();
        stage
            .set_attribute(p, "faceVertexIndices", "int[]", AttrValue::IntArray(vec![0, 1, 2, 3]))
            .unwrap();
    }

    #[test]
    fn test_scope_and_mesh_hierarchy() {
        let mut stage = Stage::new("test");
        stage.define_prim(&path("/World"), "Scope").unwrap();
        add_quad(&mut stage, &path("/World/Quad"), 0.0);

        let mut engine = engine(stage);
        engine.load();

        let world_twin = engine.twins().find(&path("/World")).unwrap();
        let quad_twin = engine.twins().find(&path("/World/Quad")).unwrap();
        let quad = engine.world().component(quad_twin.component.unwrap()).unwrap();
        assert_eq!(quad.parent, world_twin.component);
        assert!(matches!(quad.kind, ComponentKind::StaticMesh { asset: Some(_) }));
        assert!(world_twin.actor.is_some());
        assert!(quad_twin.actor.is_none());
    }

    #[test]
    fn test_unwind_walks_past_missing_and_collapsed() {
        let mut stage = Stage::new("test");
        stage.define_prim(&path("/A"), "Xform").unwrap();
        stage.set_kind(&path("/A"), Some("component")).unwrap();
        add_quad(&mut stage, &path("/A/B"), 0.0);

        let mut engine = engine(stage);
        assert_eq!(engine.unwind(&path("/A/B"), CollapsingAxis::Components), path("/A"));
        assert_eq!(engine.unwind(&path("/A/Missing/C"), CollapsingAxis::Assets), path("/A"));
        assert_eq!(engine.unwind(&path("/Nope"), CollapsingAxis::Assets), PrimPath::root());
        assert!(engine.is_collapsed(&path("/A/B"), CollapsingAxis::Assets));
        assert!(!engine.is_collapsed(&path("/A"), CollapsingAxis::Assets));
    }

    #[test]
    fn test_set_time_refreshes_animated_prims() {
        let mut stage = Stage::new("test");
        stage.set_meters_per_unit(1.0);
        let mover = path("/Mover");
        stage.define_prim(&mover, "Xform").unwrap();
        let mut translate = Attribute::new("double3");
        translate.set_sample(0.0, AttrValue::Vec3(Vec3::ZERO));
        translate.set_sample(10.0, AttrValue::Vec3(Vec3::new(0.0, 5.0, 0.0)));
        stage.put_attribute(&mover, "xformOp:translate", translate).unwrap();
        stage
            .set_attribute(
                &mover,
                "xformOpOrder",
                "token[]",
                AttrValue::TokenArray(vec!["xformOp:translate".to_string()]),
            )
            .unwrap();

        let mut engine = engine(stage);
        engine.load();
        assert_eq!(engine.animated_prims().count(), 1);

        let id = engine.twins().find(&mover).unwrap().component.unwrap();
        assert_eq!(engine.world().component(id).unwrap().transform.w_axis.y, 0.0);

        engine.set_time(10.0);
        // Meters to centimeters.
        let y = engine.world().component(id).unwrap().transform.w_axis.y;
        assert!((y - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_close_releases_everything() {
        let mut stage = Stage::new("test");
        add_quad(&mut stage, &path("/Quad"), 0.0);
        let mut engine = engine(stage);
        engine.load();
        assert_eq!(engine.assets().len(), 1);

        engine.close();
        assert!(engine.twins().is_empty());
        assert_eq!(engine.world().component_count(), 0);
        assert!(engine.assets().is_empty());
        assert!(!engine.is_valid());
    }
}
