//! Mesh prims and the mesh asset chain shared by the collapsing translators.
//!
//! Mesh assets are built by a three-step chain:
//!
//! 1. sync: snapshot the polygon data of the source prims at the current time
//! 2. async: triangulate, compute normals, hash, insert into the shared store
//! 3. sync: link the prim path to the asset's hash
//!
//! Only the snapshot crosses to the worker, so the build never sees the
//! stage or the scene.
//!
//! Each source mesh contributes one material slot: the `Material` bound to
//! it or inherited from an ancestor, else a display-color material when it
//! authors `primvars:displayColor` or `primvars:displayOpacity`, else the
//! default slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stagelink_core::{AttrValue, Mesh, MeshError, PrimPath, Stage};
use stagelink_math::{Mat4, Vec3};

use crate::asset::{Asset, AssetHash, AssetStore, MaterialAssignment, MaterialSlot};
use crate::context::{SyncState, TranslationContext};
use crate::error::SyncError;
use crate::task_chain::{Handoff, TaskChain};
use crate::translator::SchemaTranslator;
use crate::world::{ComponentId, ComponentKind};

/// What a mesh asset chain builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MeshBuild {
    /// The prim's own polygon data
    Single,
    /// Every translatable mesh at or below the prim, merged
    Merged,
    /// Merged meshes plus the joint names of the first skeleton below the prim
    Skeletal,
}

/// Polygon data of one mesh prim, copied off the stage.
struct MeshSource {
    path: PrimPath,
    points: Vec<Vec3>,
    counts: Vec<i32>,
    indices: Vec<i32>,
    normals: Option<Vec<Vec3>>,
    material: MaterialSlot,
    /// Prim space to engine space relative to the asset root
    transform: Mat4,
}

impl MeshSource {
    fn read(stage: &Stage, path: &PrimPath, root: &PrimPath, time: f64, geometry: Mat4) -> Option<Self> {
        let points = stage
            .attribute_value(path, "points", time)
            .and_then(AttrValue::as_vec3_array)?;
        let counts = stage
            .attribute_value(path, "faceVertexCounts", time)
            .and_then(AttrValue::as_int_array)?;
        let indices = stage
            .attribute_value(path, "faceVertexIndices", time)
            .and_then(AttrValue::as_int_array)?;
        let normals = stage
            .attribute_value(path, "normals", time)
            .and_then(AttrValue::as_vec3_array)
            .map(<[Vec3]>::to_vec);

        Some(Self {
            path: path.clone(),
            points: points.to_vec(),
            counts: counts.to_vec(),
            indices: indices.to_vec(),
            normals,
            material: resolve_material(stage, path, time),
            transform: geometry * stage.relative_transform(path, root, time),
        })
    }

    fn triangulate(self) -> Result<(Mesh, MaterialSlot), MeshError> {
        let mut mesh = Mesh::from_polygons(self.points, &self.counts, &self.indices, self.normals)?;
        mesh.ensure_normals();
        Ok((mesh.transformed(&self.transform), self.material))
    }
}

fn resolve_material(stage: &Stage, path: &PrimPath, time: f64) -> MaterialSlot {
    let target = std::iter::once(path.clone())
        .chain(path.ancestors())
        .find_map(|p| {
            stage
                .attribute_value(&p, "material:binding", time)
                .and_then(AttrValue::as_path_array)
                .and_then(|targets| targets.first().cloned())
        });
    if let Some(target) = target {
        if stage.is_a(&target, "Material") {
            return MaterialSlot::Bound(target);
        }
        log::warn!(
            "Ignoring material binding of {} to {}, which is not a Material",
            path,
            target
        );
    }

    let color = stage.attribute_value(path, "primvars:displayColor", time);
    let opacity = stage
        .attribute_value(path, "primvars:displayOpacity", time)
        .and_then(AttrValue::as_float_array);
    if color.is_none() && opacity.is_none() {
        return MaterialSlot::Default;
    }
    MaterialSlot::DisplayColor {
        translucent: opacity.map_or(false, |values| {
            values.iter().any(|o| (o - 1.0).abs() > f32::EPSILON)
        }),
        double_sided: stage
            .attribute_value(path, "doubleSided", time)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false),
    }
}

struct MeshSnapshot {
    sources: Vec<MeshSource>,
    joints: Option<Vec<String>>,
}

impl MeshSnapshot {
    /// Build the asset. `Ok(None)` when there is no geometry to build from.
    fn build(self, build: MeshBuild) -> Result<Option<Asset>, String> {
        let mut merged = Mesh::empty();
        let mut materials = MaterialAssignment::default();
        for source in self.sources {
            let path = source.path.clone();
            match source.triangulate() {
                Ok((mesh, material)) => {
                    materials.push(material, mesh.triangle_count());
                    merged.append(&mesh);
                }
                Err(e) if build == MeshBuild::Single => return Err(e.to_string()),
                Err(e) => log::warn!("Skipping mesh {} while merging: {}", path, e),
            }
        }
        if merged.is_empty() {
            return Ok(None);
        }

        Ok(Some(match self.joints {
            Some(joints) => Asset::SkeletalMesh {
                mesh: merged,
                materials,
                joints,
            },
            None => Asset::StaticMesh {
                mesh: merged,
                materials,
            },
        }))
    }
}

fn build_and_store(
    snapshot: MeshSnapshot,
    build: MeshBuild,
    store: &AssetStore,
    unique_to: Option<&PrimPath>,
) -> Option<Result<AssetHash, String>> {
    match snapshot.build(build) {
        Ok(Some(asset)) => {
            let key = asset.cache_key(unique_to);
            if store.insert_if_absent(key, asset) {
                log::debug!("Built asset {}", key);
            }
            Some(Ok(key))
        }
        Ok(None) => None,
        Err(reason) => Some(Err(reason)),
    }
}

/// Schedule the chain building the mesh asset linked at `root`.
pub(crate) fn schedule_mesh_asset(ctx: &mut TranslationContext, root: &PrimPath, build: MeshBuild) {
    let sources: Vec<PrimPath> = match build {
        MeshBuild::Single => vec![root.clone()],
        MeshBuild::Merged | MeshBuild::Skeletal => std::iter::once(root.clone())
            .chain(ctx.translatable_descendants(root))
            .filter(|p| ctx.stage.is_a(p, "Mesh"))
            .collect(),
    };
    let skeleton = match build {
        MeshBuild::Skeletal => ctx
            .translatable_descendants(root)
            .into_iter()
            .find(|p| ctx.stage.is_a(p, "Skeleton")),
        _ => None,
    };

    let time = ctx.time;
    let geometry = ctx.conversion.geometry_matrix();
    let store = ctx.assets.store();
    let unique_to = (!ctx.assets.merges_identical()).then(|| root.clone());
    let still_valid = ctx.validity();
    let snapshot_valid = Arc::clone(&still_valid);

    let snapshot = Handoff::new();
    let snapshot_in = snapshot.clone();
    let built: Handoff<Result<AssetHash, String>> = Handoff::new();
    let built_in = built.clone();
    let snapshot_root = root.clone();
    let key = root.clone();

    let chain = TaskChain::start_sync(ctx.pool(), move |state: &mut SyncState| {
        if !snapshot_valid.load(Ordering::Acquire) {
            return false;
        }
        let stage = &state.stage;
        let sources: Vec<MeshSource> = sources
            .iter()
            .filter_map(|p| MeshSource::read(stage, p, &snapshot_root, time, geometry))
            .collect();
        if sources.is_empty() {
            return true;
        }
        let joints = skeleton.map(|skel| {
            stage
                .attribute_value(&skel, "joints", time)
                .and_then(AttrValue::as_token_array)
                .map(<[String]>::to_vec)
                .unwrap_or_default()
        });
        snapshot_in.put(MeshSnapshot { sources, joints });
        true
    })
    .then_async(move || {
        if let Some(snapshot) = snapshot.take() {
            if let Some(result) = build_and_store(snapshot, build, &store, unique_to.as_ref()) {
                built_in.put(result);
            }
        }
        true
    })
    .then_sync(move |state: &mut SyncState| link_built_asset(state, &key, built.take(), &still_valid));

    ctx.schedule(root.clone(), chain);
}

fn link_built_asset(
    state: &mut SyncState,
    path: &PrimPath,
    built: Option<Result<AssetHash, String>>,
    still_valid: &AtomicBool,
) -> bool {
    if !still_valid.load(Ordering::Acquire) {
        return false;
    }
    match built {
        Some(Ok(hash)) => state.assets.link(path, hash),
        Some(Err(reason)) => {
            log::warn!("Failed to build mesh asset for {}: {}", path, reason);
            state.assets.unlink(path);
            state.errors.push(SyncError::AssetBuild {
                path: path.clone(),
                reason,
            });
        }
        None => {
            state.assets.unlink(path);
        }
    }
    true
}

/// Translator for `Mesh` prims.
pub struct MeshTranslator {
    path: PrimPath,
}

impl MeshTranslator {
    pub fn new(path: PrimPath) -> Self {
        Self { path }
    }

    fn kind(&self, ctx: &TranslationContext) -> ComponentKind {
        ComponentKind::StaticMesh {
            asset: ctx.assets.hash_for(&self.path),
        }
    }
}

impl SchemaTranslator for MeshTranslator {
    fn path(&self) -> &PrimPath {
        &self.path
    }

    fn create_assets(&self, ctx: &mut TranslationContext) {
        schedule_mesh_asset(ctx, &self.path, MeshBuild::Single);
    }

    fn create_components(&self, ctx: &mut TranslationContext) -> Option<ComponentId> {
        let kind = self.kind(ctx);
        Some(ctx.spawn_component(&self.path, kind))
    }

    fn update_components(&self, ctx: &mut TranslationContext, component: ComponentId) {
        let kind = self.kind(ctx);
        ctx.refresh_component(component, &self.path, Some(kind));
    }
}
