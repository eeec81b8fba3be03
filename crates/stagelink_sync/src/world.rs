//! The engine-side scene: components, actors and undo transactions.
//!
//! `SceneWorld` is the host object model the synchronization engine
//! writes into. Components form a parent/child hierarchy; an actor owns a
//! root component. Edits made between `begin_transaction` and
//! `end_transaction` can be undone as one step.

use std::collections::BTreeMap;

use serde::Serialize;
use stagelink_core::PrimPath;
use stagelink_math::{Mat4, Vec3};

use crate::asset::AssetHash;
use crate::error::{SyncError, SyncResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActorId(pub u64);

/// Camera parameters read from a camera prim.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSettings {
    pub focal_length: f32,
    pub horizontal_aperture: f32,
    pub vertical_aperture: f32,
    pub clipping_range: (f32, f32),
    pub focus_distance: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightType {
    Sphere,
    Rect,
    Disk,
    Cylinder,
    Distant,
    Dome,
    Other,
}

/// Light parameters read from a light prim.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSettings {
    pub light_type: LightType,
    pub intensity: f32,
    pub exposure: f32,
    pub color: Vec3,
    pub radius: Option<f32>,
    pub angle: Option<f32>,
}

/// What a component renders.
#[derive(Clone, Debug, PartialEq)]
pub enum ComponentKind {
    /// Transform only
    Scene,

    /// A mesh asset (`None` when the asset could not be built)
    StaticMesh { asset: Option<AssetHash> },

    /// Instances of prototype assets
    InstancedMesh {
        prototypes: Vec<Option<AssetHash>>,
        proto_indices: Vec<i32>,
        transforms: Vec<Mat4>,
    },

    SkeletalMesh { asset: Option<AssetHash> },

    Camera(CameraSettings),

    Light(LightSettings),
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Scene => "Scene",
            ComponentKind::StaticMesh { .. } => "StaticMesh",
            ComponentKind::InstancedMesh { .. } => "InstancedMesh",
            ComponentKind::SkeletalMesh { .. } => "SkeletalMesh",
            ComponentKind::Camera(_) => "Camera",
            ComponentKind::Light(_) => "Light",
        }
    }

    /// Assets this component renders.
    pub fn assets(&self) -> Vec<AssetHash> {
        match self {
            ComponentKind::StaticMesh { asset } | ComponentKind::SkeletalMesh { asset } => {
                asset.iter().copied().collect()
            }
            ComponentKind::InstancedMesh { prototypes, .. } => {
                prototypes.iter().flatten().copied().collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub name: String,

    /// Prim this component was translated from
    pub prim_path: PrimPath,

    pub kind: ComponentKind,

    /// Transform relative to the parent component
    pub transform: Mat4,

    pub visible: bool,

    pub parent: Option<ComponentId>,

    pub children: Vec<ComponentId>,

    pub owner_actor: Option<ActorId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Actor {
    pub label: String,
    pub prim_path: PrimPath,
    pub root_component: ComponentId,
}

/// State of everything touched since a transaction began, as it was
/// before the first touch (`None` = did not exist).
#[derive(Debug, Default)]
struct Transaction {
    label: String,
    components: BTreeMap<ComponentId, Option<Component>>,
    actors: BTreeMap<ActorId, Option<Actor>>,
}

impl Transaction {
    fn is_empty(&self) -> bool {
        self.components.is_empty() && self.actors.is_empty()
    }
}

/// The engine scene.
#[derive(Debug, Default)]
pub struct SceneWorld {
    components: BTreeMap<ComponentId, Component>,
    actors: BTreeMap<ActorId, Actor>,
    next_id: u64,
    transaction: Option<Transaction>,
    undo_stack: Vec<Transaction>,
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record_component(&mut self, id: ComponentId) {
        if let Some(transaction) = &mut self.transaction {
            let before = self.components.get(&id).cloned();
            transaction.components.entry(id).or_insert(before);
        }
    }

    fn record_actor(&mut self, id: ActorId) {
        if let Some(transaction) = &mut self.transaction {
            let before = self.actors.get(&id).cloned();
            transaction.actors.entry(id).or_insert(before);
        }
    }

    // ------------------------------------------------------------------
    // Construction and attachment
    // ------------------------------------------------------------------

    /// Create a component, attached under `parent` when given.
    pub fn spawn_component(
        &mut self,
        name: impl Into<String>,
        prim_path: PrimPath,
        kind: ComponentKind,
        transform: Mat4,
        parent: Option<ComponentId>,
    ) -> ComponentId {
        let id = ComponentId(self.next_id());
        self.record_component(id);
        self.components.insert(
            id,
            Component {
                name: name.into(),
                prim_path,
                kind,
                transform,
                visible: true,
                parent: None,
                children: Vec::new(),
                owner_actor: None,
            },
        );
        if let Some(parent) = parent {
            if let Err(e) = self.attach(id, parent) {
                log::warn!("Spawned component left unattached: {}", e);
            }
        }
        id
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    pub fn attach(&mut self, child: ComponentId, parent: ComponentId) -> SyncResult<()> {
        if !self.components.contains_key(&parent) {
            return Err(SyncError::UnknownComponent(parent));
        }
        let old_parent = match self.components.get(&child) {
            Some(component) => component.parent,
            None => return Err(SyncError::UnknownComponent(child)),
        };
        if let Some(old) = old_parent {
            self.record_component(old);
            if let Some(old) = self.components.get_mut(&old) {
                old.children.retain(|c| *c != child);
            }
        }
        self.record_component(parent);
        self.record_component(child);
        if let Some(p) = self.components.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.components.get_mut(&child) {
            c.parent = Some(parent);
        }
        Ok(())
    }

    /// Create an actor owning `root_component`.
    pub fn spawn_actor(
        &mut self,
        label: impl Into<String>,
        prim_path: PrimPath,
        root_component: ComponentId,
    ) -> SyncResult<ActorId> {
        if !self.components.contains_key(&root_component) {
            return Err(SyncError::UnknownComponent(root_component));
        }
        let id = ActorId(self.next_id());
        self.record_actor(id);
        self.record_component(root_component);
        self.actors.insert(
            id,
            Actor {
                label: label.into(),
                prim_path,
                root_component,
            },
        );
        if let Some(component) = self.components.get_mut(&root_component) {
            component.owner_actor = Some(id);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Destroy a component and everything attached below it.
    ///
    /// Actors rooted at a destroyed component are destroyed too. Missing
    /// components are ignored.
    pub fn destroy_component(&mut self, id: ComponentId) {
        let Some(component) = self.components.get(&id) else {
            return;
        };
        if let Some(parent) = component.parent {
            self.record_component(parent);
            if let Some(parent) = self.components.get_mut(&parent) {
                parent.children.retain(|c| *c != id);
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.record_component(current);
            let Some(removed) = self.components.remove(&current) else {
                continue;
            };
            if let Some(actor) = removed.owner_actor {
                if self.actors.get(&actor).map(|a| a.root_component) == Some(current) {
                    self.record_actor(actor);
                    self.actors.remove(&actor);
                }
            }
            stack.extend(removed.children);
        }
    }

    /// Destroy an actor and its root component tree.
    pub fn destroy_actor(&mut self, id: ActorId) {
        if let Some(root) = self.actors.get(&id).map(|a| a.root_component) {
            self.destroy_component(root);
        }
        if self.actors.contains_key(&id) {
            self.record_actor(id);
            self.actors.remove(&id);
        }
    }

    /// Destroy every component and actor (not undoable) and drop history.
    pub fn clear(&mut self) {
        self.components.clear();
        self.actors.clear();
        self.transaction = None;
        self.undo_stack.clear();
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Start recording edits. Nested calls join the open transaction.
    pub fn begin_transaction(&mut self, label: &str) {
        if self.transaction.is_none() {
            self.transaction = Some(Transaction {
                label: label.to_string(),
                ..Default::default()
            });
        }
    }

    /// Mark a component as about to change and return it for editing.
    pub fn modify(&mut self, id: ComponentId) -> Option<&mut Component> {
        if !self.components.contains_key(&id) {
            return None;
        }
        self.record_component(id);
        self.components.get_mut(&id)
    }

    /// Close the open transaction. Empty transactions are discarded.
    ///
    /// Returns the label of the recorded transaction.
    pub fn end_transaction(&mut self) -> Option<String> {
        let transaction = self.transaction.take()?;
        if transaction.is_empty() {
            return None;
        }
        let label = transaction.label.clone();
        self.undo_stack.push(transaction);
        Some(label)
    }

    /// Revert the most recent transaction. Returns its label.
    pub fn undo(&mut self) -> Option<String> {
        if self.transaction.is_some() {
            log::warn!("Cannot undo while a transaction is open");
            return None;
        }
        let transaction = self.undo_stack.pop()?;
        for (id, before) in transaction.components {
            match before {
                Some(component) => self.components.insert(id, component),
                None => self.components.remove(&id),
            };
        }
        for (id, before) in transaction.actors {
            match before {
                Some(actor) => self.actors.insert(id, actor),
                None => self.actors.remove(&id),
            };
        }
        Some(transaction.label)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Forget recorded transactions, keeping the scene as it is.
    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components.iter().map(|(id, c)| (*id, c))
    }

    pub fn actors(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.actors.iter().map(|(id, a)| (*id, a))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Components without a parent.
    pub fn roots(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .filter(|(_, c)| c.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> PrimPath {
        PrimPath::new(p).unwrap()
    }

    fn spawn(world: &mut SceneWorld, p: &str, parent: Option<ComponentId>) -> ComponentId {
        world.spawn_component(
            path(p).name().to_string(),
            path(p),
            ComponentKind::Scene,
            Mat4::IDENTITY,
            parent,
        )
    }

    #[test]
    fn test_attach_and_roots() {
        let mut world = SceneWorld::new();
        let a = spawn(&mut world, "/A", None);
        let b = spawn(&mut world, "/A/B", Some(a));

        assert_eq!(world.roots(), vec![a]);
        assert_eq!(world.component(a).unwrap().children, vec![b]);
        assert_eq!(world.component(b).unwrap().parent, Some(a));
    }

    #[test]
    fn test_destroy_is_recursive_and_removes_actor() {
        let mut world = SceneWorld::new();
        let a = spawn(&mut world, "/A", None);
        let b = spawn(&mut world, "/A/B", Some(a));
        spawn(&mut world, "/A/B/C", Some(b));
        world.spawn_actor("A", path("/A"), a).unwrap();

        world.destroy_component(b);
        assert_eq!(world.component_count(), 1);
        assert!(world.component(a).unwrap().children.is_empty());

        world.destroy_component(a);
        assert_eq!(world.component_count(), 0);
        assert_eq!(world.actor_count(), 0);
    }

    #[test]
    fn test_attach_unknown_parent_fails() {
        let mut world = SceneWorld::new();
        let a = spawn(&mut world, "/A", None);
        assert!(matches!(
            world.attach(a, ComponentId(999)),
            Err(SyncError::UnknownComponent(ComponentId(999)))
        ));
    }

    #[test]
    fn test_undo_restores_modified_and_removes_spawned() {
        let mut world = SceneWorld::new();
        let a = spawn(&mut world, "/A", None);

        world.begin_transaction("Edit");
        world.modify(a).unwrap().visible = false;
        let b = spawn(&mut world, "/A/B", Some(a));
        assert_eq!(world.end_transaction().as_deref(), Some("Edit"));

        assert_eq!(world.undo().as_deref(), Some("Edit"));
        assert!(world.component(a).unwrap().visible);
        assert!(world.component(a).unwrap().children.is_empty());
        assert!(world.component(b).is_none());
        assert_eq!(world.undo_depth(), 0);
    }

    #[test]
    fn test_undo_restores_destroyed_subtree() {
        let mut world = SceneWorld::new();
        let a = spawn(&mut world, "/A", None);
        let b = spawn(&mut world, "/A/B", Some(a));
        let actor = world.spawn_actor("A", path("/A"), a).unwrap();

        world.begin_transaction("Delete");
        world.destroy_component(a);
        world.end_transaction();
        assert_eq!(world.component_count(), 0);

        world.undo();
        assert_eq!(world.component_count(), 2);
        assert_eq!(world.component(b).unwrap().parent, Some(a));
        assert_eq!(world.actor(actor).unwrap().root_component, a);
    }

    #[test]
    fn test_empty_transaction_is_discarded() {
        let mut world = SceneWorld::new();
        world.begin_transaction("Nothing");
        assert_eq!(world.end_transaction(), None);
        assert_eq!(world.undo_depth(), 0);
    }
}
