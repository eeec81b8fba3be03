//! Engine assets and the content-addressed asset cache.
//!
//! Assets are keyed by a hash of their content, so prims that produce
//! identical data share one asset. The `AssetStore` half of the cache is
//! shared with worker threads, which insert built assets into it; the
//! prim-path links live in `AssetCache` and are only touched on the main
//! thread.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use stagelink_core::{Mesh, PrimPath};
use stagelink_math::{u32_bytes, vec3_bytes};

/// Content hash identifying an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssetHash(pub u64);

impl fmt::Display for AssetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Where the material of a run of triangles comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MaterialSlot {
    /// A `Material` prim bound with `material:binding`
    Bound(PrimPath),
    /// Generic vertex-color material driven by `primvars:displayColor`
    DisplayColor { translucent: bool, double_sided: bool },
    /// Nothing assigned
    Default,
}

/// Material slots of a mesh asset and the slot each triangle uses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialAssignment {
    pub slots: Vec<MaterialSlot>,
    pub triangle_slots: Vec<u32>,
}

impl MaterialAssignment {
    /// Assign `slot` to the next `triangles` triangles, reusing an existing
    /// slot when one is equal.
    pub fn push(&mut self, slot: MaterialSlot, triangles: usize) {
        let index = match self.slots.iter().position(|s| *s == slot) {
            Some(index) => index,
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.triangle_slots
            .extend(std::iter::repeat(index as u32).take(triangles));
    }

    /// A single slot covering every triangle.
    pub fn uniform(slot: MaterialSlot, triangles: usize) -> Self {
        let mut assignment = Self::default();
        assignment.push(slot, triangles);
        assignment
    }
}

/// Renderable data built from one or more prims.
#[derive(Clone, Debug, PartialEq)]
pub enum Asset {
    StaticMesh {
        mesh: Mesh,
        materials: MaterialAssignment,
    },
    SkeletalMesh {
        mesh: Mesh,
        materials: MaterialAssignment,
        joints: Vec<String>,
    },
}

impl Asset {
    /// A static mesh with no material assigned.
    pub fn static_mesh(mesh: Mesh) -> Self {
        let materials = MaterialAssignment::uniform(MaterialSlot::Default, mesh.triangle_count());
        Asset::StaticMesh { mesh, materials }
    }

    pub fn mesh(&self) -> &Mesh {
        match self {
            Asset::StaticMesh { mesh, .. } => mesh,
            Asset::SkeletalMesh { mesh, .. } => mesh,
        }
    }

    pub fn materials(&self) -> &MaterialAssignment {
        match self {
            Asset::StaticMesh { materials, .. } => materials,
            Asset::SkeletalMesh { materials, .. } => materials,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Asset::StaticMesh { .. } => "StaticMesh",
            Asset::SkeletalMesh { .. } => "SkeletalMesh",
        }
    }

    /// Hash of the asset's content, material assignment included.
    pub fn content_hash(&self) -> AssetHash {
        let mut hasher = DefaultHasher::new();
        self.kind_name().hash(&mut hasher);
        let mesh = self.mesh();
        vec3_bytes(&mesh.positions).hash(&mut hasher);
        u32_bytes(&mesh.indices).hash(&mut hasher);
        if let Some(normals) = &mesh.normals {
            vec3_bytes(normals).hash(&mut hasher);
        }
        let materials = self.materials();
        materials.slots.hash(&mut hasher);
        u32_bytes(&materials.triangle_slots).hash(&mut hasher);
        if let Asset::SkeletalMesh { joints, .. } = self {
            joints.hash(&mut hasher);
        }
        AssetHash(hasher.finish())
    }

    /// Cache key: the content hash, salted with the owning path when
    /// identical assets must stay separate.
    pub fn cache_key(&self, unique_to: Option<&PrimPath>) -> AssetHash {
        let content = self.content_hash();
        match unique_to {
            None => content,
            Some(path) => {
                let mut hasher = DefaultHasher::new();
                content.0.hash(&mut hasher);
                path.hash(&mut hasher);
                AssetHash(hasher.finish())
            }
        }
    }
}

/// Hash-to-asset map shared between the main thread and workers.
#[derive(Clone, Default)]
pub struct AssetStore {
    inner: Arc<Mutex<HashMap<AssetHash, Arc<Asset>>>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetHash, Arc<Asset>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `asset` under `key` unless an asset is already stored there.
    ///
    /// Returns true if the asset was inserted.
    pub fn insert_if_absent(&self, key: AssetHash, asset: Asset) -> bool {
        let mut map = self.lock();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, Arc::new(asset));
        true
    }

    pub fn get(&self, key: AssetHash) -> Option<Arc<Asset>> {
        self.lock().get(&key).cloned()
    }

    pub fn contains(&self, key: AssetHash) -> bool {
        self.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn retain(&self, mut keep: impl FnMut(&AssetHash) -> bool) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|key, _| keep(key));
        before - map.len()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn entries(&self) -> HashMap<AssetHash, Arc<Asset>> {
        self.lock().clone()
    }

    fn replace(&self, entries: HashMap<AssetHash, Arc<Asset>>) {
        *self.lock() = entries;
    }
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore").field("len", &self.len()).finish()
    }
}

/// Links and stored assets of an `AssetCache` at one point in time.
#[derive(Clone, Debug)]
pub struct AssetSnapshot {
    links: HashMap<PrimPath, AssetHash>,
    assets: HashMap<AssetHash, Arc<Asset>>,
}

/// Assets by content hash plus the prim paths that produced them.
#[derive(Debug)]
pub struct AssetCache {
    store: AssetStore,
    links: HashMap<PrimPath, AssetHash>,
    merge_identical: bool,
}

impl AssetCache {
    pub fn new(merge_identical: bool) -> Self {
        Self {
            store: AssetStore::new(),
            links: HashMap::new(),
            merge_identical,
        }
    }

    /// Handle to the shared store, for worker threads.
    pub fn store(&self) -> AssetStore {
        self.store.clone()
    }

    pub fn merges_identical(&self) -> bool {
        self.merge_identical
    }

    /// Store an asset built on the main thread and link it to `path`.
    pub fn add(&mut self, path: &PrimPath, asset: Asset) -> AssetHash {
        let unique_to = (!self.merge_identical).then_some(path);
        let key = asset.cache_key(unique_to);
        self.store.insert_if_absent(key, asset);
        self.link(path, key);
        key
    }

    pub fn link(&mut self, path: &PrimPath, hash: AssetHash) {
        self.links.insert(path.clone(), hash);
    }

    pub fn unlink(&mut self, path: &PrimPath) -> Option<AssetHash> {
        self.links.remove(path)
    }

    /// Remove the links of `root` and every path below it.
    pub fn unlink_subtree(&mut self, root: &PrimPath) -> usize {
        let before = self.links.len();
        self.links.retain(|path, _| !path.has_prefix(root));
        before - self.links.len()
    }

    pub fn hash_for(&self, path: &PrimPath) -> Option<AssetHash> {
        self.links.get(path).copied()
    }

    pub fn asset_for(&self, path: &PrimPath) -> Option<Arc<Asset>> {
        self.hash_for(path).and_then(|hash| self.store.get(hash))
    }

    pub fn get(&self, hash: AssetHash) -> Option<Arc<Asset>> {
        self.store.get(hash)
    }

    /// The asset linked at `root`, or else the first one linked below it.
    pub fn first_under(&self, root: &PrimPath) -> Option<AssetHash> {
        if let Some(hash) = self.hash_for(root) {
            return Some(hash);
        }
        self.links
            .iter()
            .filter(|(path, _)| path.has_prefix(root))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, hash)| *hash)
    }

    /// Linked paths, sorted.
    pub fn linked_paths(&self) -> Vec<PrimPath> {
        let mut paths: Vec<PrimPath> = self.links.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of distinct assets held.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop assets no path links to. Returns how many were dropped.
    pub fn collect_unused(&mut self) -> usize {
        let links = &self.links;
        let removed = self.store.retain(|key| links.values().any(|h| h == key));
        if removed > 0 {
            log::debug!("Collected {} unused asset(s)", removed);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.store.clear();
    }

    pub fn snapshot(&self) -> AssetSnapshot {
        AssetSnapshot {
            links: self.links.clone(),
            assets: self.store.entries(),
        }
    }

    /// Put links and stored assets back the way `snapshot` saw them.
    pub fn restore(&mut self, snapshot: AssetSnapshot) {
        self.links = snapshot.links;
        self.store.replace(snapshot.assets);
    }
}
