//! Turning stage change notices into scene updates.
//!
//! A notice is reduced to one `PrimChange` per prim, sorted so that
//! ancestors are handled before their descendants. Each change is then
//! unwound on both collapsing axes to the prim that actually owns the
//! affected asset and component, and applied unless an earlier change in
//! the same batch already covered it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stagelink_core::{ObjectsChanged, PrimPath};

use crate::engine::SyncEngine;
use crate::translator::CollapsingAxis;

/// Fields whose change always rebuilds the prim.
pub const ALWAYS_STRUCTURAL: &[&str] = &["metersPerUnit", "upAxis", "kind", "active", "purpose"];

/// Attributes that feed asset data rather than just the component.
pub const ASSET_DATA_ATTRIBUTES: &[&str] = &[
    "points",
    "faceVertexCounts",
    "faceVertexIndices",
    "normals",
    "positions",
    "protoIndices",
    "orientations",
    "scales",
    "joints",
    "material:binding",
    "primvars:displayColor",
    "primvars:displayOpacity",
    "doubleSided",
];

/// Everything that changed on one prim in a notice.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimChange {
    pub path: PrimPath,
    pub structural: bool,
    pub fields: BTreeSet<String>,
}

impl PrimChange {
    fn feeds_assets(&self) -> bool {
        self.fields
            .iter()
            .any(|field| ASSET_DATA_ATTRIBUTES.contains(&field.as_str()))
    }
}

/// Reduce a notice to per-prim changes, shortest paths first.
///
/// Any change on the pseudo-root is stage metadata and resyncs the stage.
pub fn collect_changes(notice: &ObjectsChanged) -> Vec<PrimChange> {
    fn entry<'a>(changes: &'a mut BTreeMap<PrimPath, PrimChange>, path: &PrimPath) -> &'a mut PrimChange {
        changes.entry(path.clone()).or_insert_with(|| PrimChange {
            path: path.clone(),
            structural: false,
            fields: BTreeSet::new(),
        })
    }

    let mut changes: BTreeMap<PrimPath, PrimChange> = BTreeMap::new();
    for path in &notice.resynced {
        entry(&mut changes, path).structural = true;
    }
    for (path, fields) in &notice.info_changed {
        let change = entry(&mut changes, path);
        change.fields.extend(fields.iter().cloned());
        if path.is_root() || fields.iter().any(|f| ALWAYS_STRUCTURAL.contains(&f.as_str())) {
            change.structural = true;
        }
    }

    let mut changes: Vec<PrimChange> = changes.into_values().collect();
    changes.sort_by_key(|change| change.path.element_count());
    changes
}

/// What one reconciliation did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// The changed prims as reported, with their structural flag
    pub changed: Vec<(PrimPath, bool)>,
    /// Component roots torn down and rebuilt
    pub resynced: Vec<PrimPath>,
    /// Asset roots rebuilt or refreshed
    pub rebuilt_assets: Vec<PrimPath>,
    /// Components refreshed in place
    pub updated: Vec<PrimPath>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Fold a later report into this one.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.changed.extend(other.changed);
        self.resynced.extend(other.resynced);
        self.rebuilt_assets.extend(other.rebuilt_assets);
        self.updated.extend(other.updated);
        self.errors.extend(other.errors);
    }
}

/// Per-axis bookkeeping for one batch.
#[derive(Default)]
struct AxisLedger {
    rebuilt: Vec<PrimPath>,
    updated: BTreeSet<PrimPath>,
}

impl AxisLedger {
    /// True if `path` lies in a subtree already rebuilt in this batch.
    fn covers(&self, path: &PrimPath) -> bool {
        self.rebuilt.iter().any(|root| path.has_prefix(root))
    }
}

/// Applies change notices to a `SyncEngine`.
#[derive(Default)]
pub struct ChangeReconciler {
    assets: AxisLedger,
    components: AxisLedger,
    report: ReconcileReport,
}

impl ChangeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one notice and return what was done.
    ///
    /// Failures are collected while the batch runs and reported once at
    /// the end; one failing prim does not stop the others.
    pub fn reconcile(engine: &mut SyncEngine, notice: &ObjectsChanged) -> ReconcileReport {
        let changes = collect_changes(notice);
        let mut reconciler = Self::new();
        for change in &changes {
            reconciler.apply(engine, change);
        }
        engine.collect_unused_assets();

        let mut report = reconciler.report;
        report.changed = changes.iter().map(|c| (c.path.clone(), c.structural)).collect();
        report.errors = engine.flush_errors("Reconciling stage changes");
        if !report.is_empty() {
            log::debug!(
                "Reconciled {} change(s): {} resynced, {} asset roots, {} updated",
                report.changed.len(),
                report.resynced.len(),
                report.rebuilt_assets.len(),
                report.updated.len()
            );
        }
        report
    }

    fn apply(&mut self, engine: &mut SyncEngine, change: &PrimChange) {
        let asset_root = engine.unwind(&change.path, CollapsingAxis::Assets);
        let component_root = engine.unwind(&change.path, CollapsingAxis::Components);

        if change.structural {
            let components_due = !self.components.covers(&component_root);
            let assets_due = !self.assets.covers(&asset_root);

            if components_due {
                engine.clear_components(&component_root);
            }
            if assets_due {
                engine.rebuild_assets(&asset_root);
                self.report.rebuilt_assets.push(asset_root.clone());
                self.assets.rebuilt.push(asset_root);
            }
            if components_due {
                engine.translate_components(&component_root);
                self.report.resynced.push(component_root.clone());
                self.components.rebuilt.push(component_root);
            }
            return;
        }

        // A collapsed prim only exists as part of its ancestor's asset.
        let feeds_assets = change.feeds_assets() || asset_root != change.path;
        if feeds_assets
            && !self.assets.covers(&asset_root)
            && self.assets.updated.insert(asset_root.clone())
        {
            engine.translate_assets(&asset_root);
            self.report.rebuilt_assets.push(asset_root);
        }
        if !self.components.covers(&component_root)
            && self.components.updated.insert(component_root.clone())
        {
            engine.update_components(&component_root);
            self.report.updated.push(component_root);
        }
    }
}
