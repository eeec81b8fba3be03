//! The stage actor: one opened stage mirrored into the scene.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use serde::Serialize;
use stagelink_core::{ObjectsChanged, PrimPath, Stage};

use crate::asset::AssetCache;
use crate::engine::{SyncEngine, SyncSnapshot};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{ChangeReconciler, ReconcileReport};
use crate::registry::TranslatorRegistry;
use crate::settings::SyncSettings;
use crate::twin::TwinTree;
use crate::world::SceneWorld;

/// Events broadcast to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum StageEvent {
    /// The stage was loaded, reloaded or closed
    StageChanged,
    /// Prims changed, with their structural flag
    PrimsChanged(Vec<(PrimPath, bool)>),
    /// An actor was spawned for the prim
    ActorLoaded(PrimPath),
}

/// Owns a stage and keeps the scene in sync with it.
///
/// ```ignore
/// let registry = Arc::new(TranslatorRegistry::with_defaults(schemas));
/// let mut actor = StageActor::open("scene.usda", SyncSettings::default(), registry)?;
/// actor.load()?;
/// actor.stage_mut().remove_prim(&path)?;
/// let report = actor.poll_changes();
/// ```
pub struct StageActor {
    engine: SyncEngine,
    notices: Receiver<ObjectsChanged>,
    subscribers: Vec<Sender<StageEvent>>,
    /// One entry per transaction on the scene's undo stack
    history: Vec<SyncSnapshot>,
    loaded: bool,
    closed: bool,
}

impl StageActor {
    /// Open a stage file. Failing to open is reported once and returned.
    pub fn open<P: AsRef<Path>>(
        path: P,
        settings: SyncSettings,
        registry: Arc<TranslatorRegistry>,
    ) -> SyncResult<Self> {
        let path = path.as_ref();
        let stage = Stage::open(path).map_err(|e| {
            log::error!("Failed to open stage {}: {}", path.display(), e);
            SyncError::from(e)
        })?;
        Self::new(stage, settings, registry)
    }

    /// Wrap an already opened stage.
    pub fn new(
        mut stage: Stage,
        settings: SyncSettings,
        registry: Arc<TranslatorRegistry>,
    ) -> SyncResult<Self> {
        let notices = stage.subscribe();
        let engine = SyncEngine::new(stage, settings, registry)?;
        Ok(Self {
            engine,
            notices,
            subscribers: Vec::new(),
            history: Vec::new(),
            loaded: false,
            closed: false,
        })
    }

    /// Receive events from now on.
    pub fn subscribe(&mut self) -> Receiver<StageEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn broadcast(&mut self, event: StageEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Translate the whole stage. Edits made before loading are already
    /// part of the stage, so pending notices are dropped.
    pub fn load(&mut self) -> SyncResult<()> {
        if self.closed {
            return Err(SyncError::StageClosed);
        }
        while self.notices.try_recv().is_ok() {}
        self.engine.world_mut().clear_history();
        self.history.clear();

        if self.loaded {
            let root = PrimPath::root();
            self.engine.clear_components(&root);
            self.engine.rebuild_assets(&root);
            self.engine.translate_components(&root);
        } else {
            self.engine.load();
            self.loaded = true;
        }
        self.engine.collect_unused_assets();
        self.engine.flush_errors("Loading stage");

        self.broadcast(StageEvent::StageChanged);
        let mut loaded: Vec<PrimPath> = self
            .engine
            .world()
            .actors()
            .map(|(_, actor)| actor.prim_path.clone())
            .collect();
        loaded.sort();
        for path in loaded {
            self.broadcast(StageEvent::ActorLoaded(path));
        }
        Ok(())
    }

    /// Reconcile every pending change notice.
    ///
    /// All scene edits of the poll are grouped in a single undoable
    /// transaction. Returns `None` when nothing was pending.
    pub fn poll_changes(&mut self) -> Option<ReconcileReport> {
        if self.closed || !self.loaded {
            return None;
        }
        let notices: Vec<ObjectsChanged> = self.notices.try_iter().collect();
        if notices.is_empty() {
            return None;
        }

        let snapshot = self.engine.snapshot();
        self.engine.world_mut().begin_transaction("Stage changes");
        let mut report = ReconcileReport::default();
        for notice in &notices {
            let batch = ChangeReconciler::reconcile(&mut self.engine, notice);
            if !batch.changed.is_empty() {
                self.broadcast(StageEvent::PrimsChanged(batch.changed.clone()));
            }
            report.merge(batch);
        }
        if self.engine.world_mut().end_transaction().is_some() {
            self.history.push(snapshot);
        }
        Some(report)
    }

    /// Revert the scene to how it was before the last poll that changed it.
    ///
    /// Components, actors, twin links and assets are restored together. The
    /// stage keeps its edits. Returns the label of the undone transaction.
    pub fn undo(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        let label = self.engine.world_mut().undo()?;
        if let Some(snapshot) = self.history.pop() {
            self.engine.restore(snapshot);
        }
        log::info!("Undid {}", label);
        Some(label)
    }

    /// Number of polls `undo` can revert.
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    /// Move the time cursor, refreshing animated prims.
    pub fn set_time(&mut self, time: f64) {
        self.engine.set_time(time);
    }

    pub fn time(&self) -> f64 {
        self.engine.time()
    }

    pub fn stage(&self) -> &Stage {
        self.engine.stage()
    }

    /// The stage, for authoring back. Edits are picked up by `poll_changes`.
    pub fn stage_mut(&mut self) -> &mut Stage {
        self.engine.stage_mut()
    }

    pub fn world(&self) -> &SceneWorld {
        self.engine.world()
    }

    pub fn twins(&self) -> &TwinTree {
        self.engine.twins()
    }

    pub fn assets(&self) -> &AssetCache {
        self.engine.assets()
    }

    pub fn settings(&self) -> &SyncSettings {
        self.engine.settings()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release everything translated from the stage.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.engine.close();
        self.history.clear();
        self.closed = true;
        log::info!("Closed stage {}", self.engine.stage().identifier());
        self.broadcast(StageEvent::StageChanged);
    }
}

impl Drop for StageActor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, MaterialSlot};
    use crate::world::{ComponentKind, LightType};
    use stagelink_core::{AttrValue, StageError, UpAxis};
    use stagelink_math::Vec3;

    const TRIANGLE: &str = r#"
        int[] faceVertexCounts = [3]
        int[] faceVertexIndices = [0, 1, 2]
        point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
    "#;

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

    fn actor_with(usda: &str, settings: SyncSettings) -> StageActor {
        let _ = env_logger::builder().is_test(true).try_init();
        let stage = Stage::from_usda_str(usda, "test.usda").unwrap();
        let registry = Arc::new(TranslatorRegistry::with_defaults(stage.schemas().clone()));
        let mut actor = StageActor::new(stage, settings, registry).unwrap();
        actor.load().unwrap();
        actor
    }

    fn actor(usda: &str) -> StageActor {
        actor_with(usda, settings())
    }

    fn component_kind(actor: &StageActor, p: &str) -> ComponentKind {
        let id = actor.twins().find(&path(p)).unwrap().component.unwrap();
        actor.world().component(id).unwrap().kind.clone()
    }

    fn collapsed_stage() -> String {
        format!(
            r#"#usda 1.0
            def Xform "A" (
                kind = "component"
            )
            {{
                def Mesh "B"
                {{
                    {}
                }}
            }}
            "#,
            TRIANGLE
        )
    }

    #[test]
    fn test_single_mesh_gets_twin_component_and_asset() {
        let actor = actor(&format!("def Mesh \"A\"\n{{\n{}\n}}\n", TRIANGLE));

        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/A")]);
        assert_eq!(actor.assets().len(), 1);

        let hash = actor.assets().hash_for(&path("/A")).unwrap();
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::StaticMesh { asset: Some(hash) });
        let asset = actor.assets().get(hash).unwrap();
        assert_eq!(asset.content_hash(), hash);
        assert_eq!(asset.mesh().triangle_count(), 1);
    }

    #[test]
    fn test_collapsed_container_owns_merged_asset() {
        let actor = actor(&collapsed_stage());

        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/A")]);
        assert!(actor.twins().find(&path("/A/B")).is_none());
        assert!(actor.assets().hash_for(&path("/A/B")).is_none());

        let hash = actor.assets().hash_for(&path("/A")).unwrap();
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::StaticMesh { asset: Some(hash) });
        assert_eq!(actor.assets().get(hash).unwrap().mesh().vertex_count(), 3);
    }

    #[test]
    fn test_removing_collapsed_child_rebuilds_ancestor() {
        let mut actor = actor(&collapsed_stage());
        let events = actor.subscribe();

        actor.stage_mut().remove_prim(&path("/A/B")).unwrap();
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.changed, vec![(path("/A/B"), true)]);
        assert_eq!(report.resynced, vec![path("/A")]);
        assert!(report.errors.is_empty());
        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/A")]);
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::Scene);
        assert!(actor.assets().is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            StageEvent::PrimsChanged(vec![(path("/A/B"), true)])
        );
    }

    #[test]
    fn test_sibling_chains_install_their_own_assets() {
        let mut usda = String::new();
        for i in 0..8 {
            usda.push_str(&format!(
                r#"
                def Mesh "M{i}"
                {{
                    int[] faceVertexCounts = [3]
                    int[] faceVertexIndices = [0, 1, 2]
                    point3f[] points = [({i}, 0, 0), ({i}, 1, 0), ({i}, 0, 1)]
                }}
                "#,
                i = i
            ));
        }
        let actor = actor(&usda);
        assert_eq!(actor.assets().len(), 8);

        for i in 0..8 {
            let p = path(&format!("/M{}", i));
            let hash = actor.assets().hash_for(&p).unwrap();
            assert_eq!(
                component_kind(&actor, p.as_str()),
                ComponentKind::StaticMesh { asset: Some(hash) }
            );
            let asset = actor.assets().asset_for(&p).unwrap();
            assert!(asset.mesh().positions.iter().all(|v| v.x == i as f32));
        }
    }

    #[test]
    fn test_empty_stage() {
        let actor = actor("#usda 1.0\n");
        assert!(actor.twins().is_empty());
        assert!(actor.assets().is_empty());
        assert_eq!(actor.world().component_count(), 0);
    }

    #[test]
    fn test_identical_meshes_share_an_asset() {
        let usda = format!(
            "def Mesh \"One\"\n{{\n{0}\n}}\ndef Mesh \"Two\"\n{{\n{0}\n}}\n",
            TRIANGLE
        );
        let merged = actor(&usda);
        assert_eq!(merged.assets().len(), 1);
        assert_eq!(
            merged.assets().hash_for(&path("/One")),
            merged.assets().hash_for(&path("/Two"))
        );

        let separate = actor_with(
            &usda,
            SyncSettings {
                merge_identical_assets: false,
                ..settings()
            },
        );
        assert_eq!(separate.assets().len(), 2);
    }

    fn material_stage() -> String {
        format!(
            r#"#usda 1.0
            def Scope "Looks"
            {{
                def Material "Wood"
                {{
                }}
                def Material "Steel"
                {{
                }}
                def Xform "NotAMaterial"
                {{
                }}
            }}
            def Mesh "Table"
            {{
                {0}
                rel material:binding = </Looks/Wood>
            }}
            def Mesh "Chair"
            {{
                {0}
                rel material:binding = </Looks/Wood>
            }}
            def Mesh "Rail"
            {{
                {0}
                rel material:binding = </Looks/Steel>
            }}
            def Xform "Shelf"
            {{
                rel material:binding = </Looks/Steel>
                def Mesh "Board"
                {{
                    {0}
                }}
            }}
            def Mesh "Painted"
            {{
                {0}
                rel material:binding = </Looks/NotAMaterial>
                color3f[] primvars:displayColor = [(1, 0, 0)]
                float[] primvars:displayOpacity = [0.5]
                uniform bool doubleSided = 1
            }}
            def Mesh "Plain"
            {{
                {0}
            }}
            "#,
            TRIANGLE
        )
    }

    fn slots(actor: &StageActor, p: &str) -> Vec<MaterialSlot> {
        actor.assets().asset_for(&path(p)).unwrap().materials().slots.clone()
    }

    #[test]
    fn test_material_binding_keeps_identical_geometry_apart() {
        let actor = actor(&material_stage());
        let hash = |p: &str| actor.assets().hash_for(&path(p)).unwrap();

        assert_eq!(hash("/Table"), hash("/Chair"));
        assert_ne!(hash("/Table"), hash("/Rail"));
        assert_ne!(hash("/Table"), hash("/Plain"));
        assert_eq!(slots(&actor, "/Table"), vec![MaterialSlot::Bound(path("/Looks/Wood"))]);
        assert_eq!(slots(&actor, "/Rail"), vec![MaterialSlot::Bound(path("/Looks/Steel"))]);
        assert_eq!(slots(&actor, "/Plain"), vec![MaterialSlot::Default]);
    }

    #[test]
    fn test_material_binding_is_inherited() {
        let actor = actor(&material_stage());
        assert_eq!(
            slots(&actor, "/Shelf/Board"),
            vec![MaterialSlot::Bound(path("/Looks/Steel"))]
        );
        assert_eq!(
            actor.assets().hash_for(&path("/Shelf/Board")),
            actor.assets().hash_for(&path("/Rail"))
        );
    }

    #[test]
    fn test_non_material_binding_falls_back_to_display_color() {
        let actor = actor(&material_stage());
        assert_eq!(
            slots(&actor, "/Painted"),
            vec![MaterialSlot::DisplayColor {
                translucent: true,
                double_sided: true,
            }]
        );
    }

    #[test]
    fn test_rebinding_material_rebuilds_asset() {
        let mut actor = actor(&material_stage());
        let before = actor.assets().hash_for(&path("/Table")).unwrap();

        actor
            .stage_mut()
            .set_attribute(
                &path("/Table"),
                "material:binding",
                "rel",
                AttrValue::PathArray(vec![path("/Looks/Steel")]),
            )
            .unwrap();
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.rebuilt_assets, vec![path("/Table")]);
        assert_ne!(actor.assets().hash_for(&path("/Table")), Some(before));
        assert_eq!(
            actor.assets().hash_for(&path("/Table")),
            actor.assets().hash_for(&path("/Rail"))
        );
        assert_eq!(
            component_kind(&actor, "/Table"),
            ComponentKind::StaticMesh {
                asset: actor.assets().hash_for(&path("/Rail"))
            }
        );
    }

    #[test]
    fn test_merged_asset_assigns_slots_per_source_mesh() {
        let actor = actor(&format!(
            r#"#usda 1.0
            def Scope "Looks"
            {{
                def Material "Wood"
                {{
                }}
            }}
            def Xform "A" (
                kind = "component"
            )
            {{
                def Mesh "Top"
                {{
                    {0}
                    rel material:binding = </Looks/Wood>
                }}
                def Mesh "Leg"
                {{
                    {0}
                }}
            }}
            "#,
            TRIANGLE
        ));

        let asset = actor.assets().asset_for(&path("/A")).unwrap();
        let materials = asset.materials();
        assert_eq!(materials.slots.len(), 2);
        assert!(materials.slots.contains(&MaterialSlot::Bound(path("/Looks/Wood"))));
        assert!(materials.slots.contains(&MaterialSlot::Default));
        assert_eq!(materials.triangle_slots.len(), asset.mesh().triangle_count());
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut actor = actor(&collapsed_stage());
        let paths = actor.twins().paths();
        let hash = actor.assets().hash_for(&path("/A"));

        actor.load().unwrap();
        assert_eq!(actor.twins().paths(), paths);
        assert_eq!(actor.assets().hash_for(&path("/A")), hash);
        assert_eq!(actor.assets().len(), 1);
        assert_eq!(actor.world().component_count(), 1);
    }

    #[test]
    fn test_noop_value_update_keeps_shape() {
        let mut actor = actor(&collapsed_stage());
        let id = actor.twins().find(&path("/A")).unwrap().component;

        actor
            .stage_mut()
            .set_attribute(&path("/A"), "visibility", "token", AttrValue::Token("inherited".into()))
            .unwrap();
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.updated, vec![path("/A")]);
        assert!(report.resynced.is_empty());
        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/A")]);
        assert_eq!(actor.twins().find(&path("/A")).unwrap().component, id);
        assert_eq!(actor.world().undo_depth(), 0);
    }

    #[test]
    fn test_transform_update_is_undoable() {
        let mut actor = actor(&collapsed_stage());
        let id = actor.twins().find(&path("/A")).unwrap().component.unwrap();

        actor
            .stage_mut()
            .set_attribute(
                &path("/A"),
                "xformOp:translate",
                "double3",
                AttrValue::Vec3(Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap();
        actor.poll_changes().unwrap();
        assert_eq!(actor.world().component(id).unwrap().transform.w_axis.y, 2.0);

        assert_eq!(actor.undo(), Some("Stage changes".to_string()));
        assert_eq!(actor.world().component(id).unwrap().transform.w_axis.y, 0.0);
    }

    #[test]
    fn test_undo_removal_restores_twin_component_and_asset() {
        let mut actor = actor(&collapsed_stage());
        let id = actor.twins().find(&path("/A")).unwrap().component.unwrap();
        let hash = actor.assets().hash_for(&path("/A")).unwrap();
        let components = actor.world().component_count();

        actor.stage_mut().remove_prim(&path("/A/B")).unwrap();
        actor.poll_changes().unwrap();
        assert_ne!(actor.twins().find(&path("/A")).unwrap().component, Some(id));
        assert!(actor.assets().get(hash).is_none());
        assert_eq!(actor.undo_depth(), 1);

        assert_eq!(actor.undo(), Some("Stage changes".to_string()));
        assert_eq!(actor.undo_depth(), 0);
        assert_eq!(actor.twins().find(&path("/A")).unwrap().component, Some(id));
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::StaticMesh { asset: Some(hash) });
        assert_eq!(actor.world().component_count(), components);
        assert_eq!(actor.assets().hash_for(&path("/A")), Some(hash));
        assert_eq!(actor.assets().get(hash).unwrap().mesh().vertex_count(), 3);
        assert_eq!(actor.undo(), None);
    }

    #[test]
    fn test_reload_after_undo_leaves_no_stale_components() {
        let mut actor = actor(&collapsed_stage());
        actor.stage_mut().remove_prim(&path("/A/B")).unwrap();
        actor.poll_changes().unwrap();
        let edited = actor.world().component_count();

        actor.undo().unwrap();
        actor.load().unwrap();

        assert_eq!(actor.world().component_count(), edited);
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::Scene);
        assert!(actor.assets().is_empty());
        assert_eq!(actor.undo_depth(), 0);
        assert_eq!(actor.world().undo_depth(), 0);
    }

    #[test]
    fn test_edits_after_undo_reconcile_against_restored_twins() {
        let mut actor = actor(&collapsed_stage());
        actor
            .stage_mut()
            .set_attribute(
                &path("/A"),
                "xformOp:translate",
                "double3",
                AttrValue::Vec3(Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap();
        actor.poll_changes().unwrap();
        actor.undo().unwrap();
        let components = actor.world().component_count();

        actor.stage_mut().remove_prim(&path("/A/B")).unwrap();
        actor.poll_changes().unwrap();

        assert_eq!(actor.world().component_count(), components);
        assert_eq!(component_kind(&actor, "/A"), ComponentKind::Scene);
        assert!(actor.assets().is_empty());
    }

    #[test]
    fn test_batched_changes_are_reported_together() {
        let mut actor = actor(&collapsed_stage());
        let events = actor.subscribe();

        actor.stage_mut().change_block(|stage| {
            stage.remove_prim(&path("/A/B")).unwrap();
            stage
                .set_attribute(&path("/A"), "visibility", "token", AttrValue::Token("invisible".into()))
                .unwrap();
        });
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.changed, vec![(path("/A"), false), (path("/A/B"), true)]);
        assert_eq!(report.resynced, vec![path("/A")]);
        let id = actor.twins().find(&path("/A")).unwrap().component.unwrap();
        assert!(!actor.world().component(id).unwrap().visible);

        assert!(matches!(events.try_recv(), Ok(StageEvent::PrimsChanged(_))));
        assert!(events.try_recv().is_err());
        assert!(actor.poll_changes().is_none());
    }

    #[test]
    fn test_failed_build_keeps_component_and_reports_once() {
        let mut actor = actor(
            r#"
            def Mesh "Bad"
            {
                int[] faceVertexCounts = [3]
                int[] faceVertexIndices = [0, 1, 7]
                point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
            }
            "#,
        );
        assert_eq!(component_kind(&actor, "/Bad"), ComponentKind::StaticMesh { asset: None });

        actor.stage_mut().change_block(|stage| {
            let bad = path("/Bad");
            stage
                .set_attribute(&bad, "faceVertexIndices", "int[]", AttrValue::IntArray(vec![0, 1, 9]))
                .unwrap();
            stage
                .set_attribute(&bad, "faceVertexIndices", "int[]", AttrValue::IntArray(vec![0, 1, 8]))
                .unwrap();
        });
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("/Bad"));
        assert_eq!(component_kind(&actor, "/Bad"), ComponentKind::StaticMesh { asset: None });
        assert!(actor.assets().is_empty());
    }

    #[test]
    fn test_point_instancer_references_prototype_assets() {
        let actor = actor(&format!(
            r#"
            def PointInstancer "Inst"
            {{
                rel prototypes = [</Inst/Protos/Tri>]
                int[] protoIndices = [0, 0, 0]
                point3f[] positions = [(0, 0, 0), (5, 0, 0), (10, 0, 0)]

                def Scope "Protos"
                {{
                    def Mesh "Tri"
                    {{
                        {}
                    }}
                }}
            }}
            "#,
            TRIANGLE
        ));

        assert!(actor.twins().find(&path("/Inst/Protos")).is_none());
        let prototype = actor.assets().hash_for(&path("/Inst/Protos/Tri"));
        assert!(prototype.is_some());

        let ComponentKind::InstancedMesh {
            prototypes,
            proto_indices,
            transforms,
        } = component_kind(&actor, "/Inst")
        else {
            panic!("expected an instanced mesh");
        };
        assert_eq!(prototypes, vec![prototype]);
        assert_eq!(proto_indices, vec![0, 0, 0]);
        assert_eq!(transforms.len(), 3);
        assert_eq!(transforms[1].w_axis.x, 5.0);
    }

    #[test]
    fn test_prototype_points_edit_relinks_instancer() {
        let mut actor = actor(&format!(
            r#"
            def PointInstancer "Inst"
            {{
                rel prototypes = [</Inst/Protos/Tri>]
                int[] protoIndices = [0, 0]
                point3f[] positions = [(0, 0, 0), (5, 0, 0)]

                def Scope "Protos"
                {{
                    def Mesh "Tri"
                    {{
                        {}
                    }}
                }}
            }}
            "#,
            TRIANGLE
        ));
        let old = actor.assets().hash_for(&path("/Inst/Protos/Tri")).unwrap();

        actor
            .stage_mut()
            .set_attribute(
                &path("/Inst/Protos/Tri"),
                "points",
                "point3f[]",
                AttrValue::Vec3Array(vec![Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), Vec3::new(0.0, 4.0, 0.0)]),
            )
            .unwrap();
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.rebuilt_assets, vec![path("/Inst/Protos/Tri")]);
        assert_eq!(report.updated, vec![path("/Inst")]);
        assert!(report.resynced.is_empty());

        let new = actor.assets().hash_for(&path("/Inst/Protos/Tri")).unwrap();
        assert_ne!(new, old);
        let ComponentKind::InstancedMesh { prototypes, .. } = component_kind(&actor, "/Inst") else {
            panic!("expected an instanced mesh");
        };
        assert_eq!(prototypes, vec![Some(new)]);
        assert!(actor.assets().get(old).is_none());
        assert_eq!(actor.assets().len(), 1);
    }

    #[test]
    fn test_skips_inactive_and_unloaded_purposes() {
        let actor = actor(&format!(
            r#"
            def Xform "Root"
            {{
                def Mesh "Guide"
                {{
                    uniform token purpose = "guide"
                    {0}
                }}
                def Mesh "Off" (
                    active = false
                )
                {{
                    {0}
                }}
                def Mesh "On"
                {{
                    {0}
                }}
            }}
            "#,
            TRIANGLE
        ));

        assert_eq!(
            actor.twins().paths(),
            vec![PrimPath::root(), path("/Root"), path("/Root/On")]
        );
        assert_eq!(actor.assets().linked_paths(), vec![path("/Root/On")]);
    }

    #[test]
    fn test_camera_and_light_components() {
        let actor = actor(
            r#"
            def Camera "Cam"
            {
                float focalLength = 35
                float2 clippingRange = (0.1, 1000)
            }
            def SphereLight "Key"
            {
                float inputs:intensity = 500
                float inputs:radius = 2
                color3f inputs:color = (1, 0.5, 0.25)
            }
            "#,
        );

        let ComponentKind::Camera(camera) = component_kind(&actor, "/Cam") else {
            panic!("expected a camera");
        };
        assert_eq!(camera.focal_length, 35.0);
        assert_eq!(camera.clipping_range, (0.1, 1000.0));

        let ComponentKind::Light(light) = component_kind(&actor, "/Key") else {
            panic!("expected a light");
        };
        assert_eq!(light.light_type, LightType::Sphere);
        assert_eq!(light.intensity, 500.0);
        assert_eq!(light.radius, Some(2.0));
        assert_eq!(light.angle, None);
        assert_eq!(light.color, Vec3::new(1.0, 0.5, 0.25));
    }

    #[test]
    fn test_skel_root_builds_skeletal_asset() {
        let actor = actor(&format!(
            r#"
            def SkelRoot "Char"
            {{
                def Skeleton "Skel"
                {{
                    uniform token[] joints = ["hip", "hip/knee"]
                }}
                def Mesh "Body"
                {{
                    {}
                }}
            }}
            "#,
            TRIANGLE
        ));

        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/Char")]);
        let hash = actor.assets().hash_for(&path("/Char")).unwrap();
        assert_eq!(component_kind(&actor, "/Char"), ComponentKind::SkeletalMesh { asset: Some(hash) });
        let asset = actor.assets().get(hash).unwrap();
        let Asset::SkeletalMesh { joints, .. } = asset.as_ref() else {
            panic!("expected a skeletal mesh");
        };
        assert_eq!(joints, &vec!["hip".to_string(), "hip/knee".to_string()]);
    }

    #[test]
    fn test_stage_metadata_change_resyncs_everything() {
        let mut actor = actor(&collapsed_stage());
        actor.stage_mut().set_up_axis(UpAxis::Z);
        let report = actor.poll_changes().unwrap();

        assert_eq!(report.resynced, vec![PrimPath::root()]);
        assert_eq!(actor.twins().paths(), vec![PrimPath::root(), path("/A")]);
        assert_eq!(actor.assets().len(), 1);
    }

    #[test]
    fn test_load_announces_actors() {
        let stage = Stage::from_usda_str(&collapsed_stage(), "test.usda").unwrap();
        let registry = Arc::new(TranslatorRegistry::with_defaults(stage.schemas().clone()));
        let mut actor = StageActor::new(stage, settings(), registry).unwrap();
        let events = actor.subscribe();
        actor.load().unwrap();

        assert_eq!(events.try_recv().unwrap(), StageEvent::StageChanged);
        assert_eq!(events.try_recv().unwrap(), StageEvent::ActorLoaded(path("/A")));
    }

    #[test]
    fn test_close_releases_scene() {
        let mut actor = actor(&collapsed_stage());
        let events = actor.subscribe();
        actor.close();

        assert!(actor.is_closed());
        assert!(actor.twins().is_empty());
        assert!(actor.assets().is_empty());
        assert_eq!(actor.world().component_count(), 0);
        assert_eq!(events.try_recv().unwrap(), StageEvent::StageChanged);
        assert!(actor.poll_changes().is_none());
        assert!(matches!(actor.load(), Err(SyncError::StageClosed)));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let schemas = Stage::new("schemas").schemas().clone();
        let registry = Arc::new(TranslatorRegistry::with_defaults(schemas));
        let result = StageActor::open("/nonexistent/scene.usda", settings(), registry);
        assert!(matches!(result, Err(SyncError::Stage(StageError::Io(_)))));
    }
}
