//! The scene twin tree.
//!
//! One `TwinNode` exists per translated (uncollapsed) prim path. A node
//! owns its children by path; its parent is reached by looking the parent
//! path up, so there is a single ownership edge per node.

use std::collections::HashMap;

use stagelink_core::PrimPath;

use crate::world::{ActorId, ComponentId, SceneWorld};

/// Engine-side proxy of one translated prim.
#[derive(Clone, Debug, PartialEq)]
pub struct TwinNode {
    pub path: PrimPath,
    pub parent: Option<PrimPath>,
    pub children: Vec<PrimPath>,
    pub component: Option<ComponentId>,
    pub actor: Option<ActorId>,
}

impl TwinNode {
    fn new(path: PrimPath, parent: Option<PrimPath>) -> Self {
        Self {
            path,
            parent,
            children: Vec::new(),
            component: None,
            actor: None,
        }
    }
}

/// Tree of twin nodes keyed by path. The root twin always exists.
#[derive(Clone, Debug)]
pub struct TwinTree {
    nodes: HashMap<PrimPath, TwinNode>,
}

impl Default for TwinTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TwinTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(PrimPath::root(), TwinNode::new(PrimPath::root(), None));
        Self { nodes }
    }

    pub fn root(&self) -> Option<&TwinNode> {
        self.nodes.get(&PrimPath::root())
    }

    /// Exact-path lookup.
    pub fn find(&self, path: &PrimPath) -> Option<&TwinNode> {
        self.nodes.get(path)
    }

    pub fn find_mut(&mut self, path: &PrimPath) -> Option<&mut TwinNode> {
        self.nodes.get_mut(path)
    }

    /// Get the twin at `path`, creating it and any missing ancestors.
    pub fn get_or_create(&mut self, path: &PrimPath) -> &mut TwinNode {
        if !self.nodes.contains_key(path) {
            let mut missing: Vec<PrimPath> = std::iter::once(path.clone())
                .chain(path.ancestors())
                .take_while(|p| !self.nodes.contains_key(p))
                .collect();
            missing.reverse();
            for new_path in missing {
                let parent = new_path.parent().unwrap_or_else(PrimPath::root);
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.push(new_path.clone());
                }
                self.nodes
                    .insert(new_path.clone(), TwinNode::new(new_path, Some(parent)));
            }
        }
        self.nodes
            .entry(path.clone())
            .or_insert_with(|| TwinNode::new(path.clone(), path.parent()))
    }

    /// Destroy the subtree at `path`, releasing its components and actors.
    ///
    /// Clearing the root empties the tree but keeps the root twin. Missing
    /// paths are ignored.
    pub fn clear(&mut self, path: &PrimPath, world: &mut SceneWorld) {
        if !self.nodes.contains_key(path) {
            return;
        }

        for subtree_path in self.subtree_paths(path) {
            let keep = subtree_path.is_root();
            let released = if keep {
                self.nodes.get_mut(&subtree_path).map(|node| {
                    node.children.clear();
                    (node.actor.take(), node.component.take())
                })
            } else {
                self.nodes
                    .remove(&subtree_path)
                    .map(|node| (node.actor, node.component))
            };
            if let Some((actor, component)) = released {
                if let Some(actor) = actor {
                    world.destroy_actor(actor);
                }
                if let Some(component) = component {
                    world.destroy_component(component);
                }
            }
        }

        if let Some(parent) = path.parent() {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| child != path);
            }
        }
    }

    /// Paths of `root` and all twins below it, depth-first pre-order.
    fn subtree_paths(&self, root: &PrimPath) -> Vec<PrimPath> {
        let mut result = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
                result.push(current);
            }
        }
        result
    }

    /// All paths, depth-first pre-order from the root.
    pub fn paths(&self) -> Vec<PrimPath> {
        self.subtree_paths(&PrimPath::root())
    }

    /// All nodes, depth-first pre-order from the root.
    pub fn iter(&self) -> impl Iterator<Item = &TwinNode> {
        self.paths()
            .into_iter()
            .filter_map(move |path| self.nodes.get(&path))
    }

    /// Number of twins, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root twin exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Nearest ancestor of `path` (excluding the root) holding a component.
    pub fn parent_component(&self, path: &PrimPath) -> Option<(ComponentId, PrimPath)> {
        path.ancestors()
            .filter(|a| !a.is_root())
            .find_map(|a| {
                self.nodes
                    .get(&a)
                    .and_then(|node| node.component)
                    .map(|c| (c, a))
            })
    }
}
