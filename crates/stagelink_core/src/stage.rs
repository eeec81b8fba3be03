//! The in-memory stage.
//!
//! A `Stage` owns every prim of a scene-description document, keyed by
//! path. It answers read queries at a time code, accepts authoring edits,
//! and reports every edit to its subscribers as an `ObjectsChanged` notice.
//! Edits made inside `change_block` are batched into a single notice.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use stagelink_math::Mat4;
use thiserror::Error;

use crate::path::PrimPath;
use crate::schema::SchemaRegistry;
use crate::stage_info::{Purpose, StageInfo, UpAxis};
use crate::usd::ParseError;
use crate::value::{AttrValue, Attribute};
use crate::xform;

/// Errors raised by stage reads and authoring.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Invalid prim path: {0}")]
    InvalidPath(String),

    #[error("No prim at path {0}")]
    UnknownPrim(PrimPath),

    #[error("The pseudo-root cannot be {0}")]
    PseudoRoot(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Stage-level attribute names reported on the pseudo-root.
pub const UP_AXIS_TOKEN: &str = "upAxis";
pub const METERS_PER_UNIT_TOKEN: &str = "metersPerUnit";

/// Field name reported when a prim's kind changes.
pub const KIND_TOKEN: &str = "kind";

/// One prim's authored data.
#[derive(Clone, Debug, Default)]
pub struct PrimData {
    /// Schema type name; empty for untyped prims
    pub type_name: String,

    /// Child names in authored order
    pub children: Vec<String>,

    /// Attributes and relationships by name
    pub attributes: BTreeMap<String, Attribute>,

    /// Model kind (`component`, `assembly`, `group`, ...)
    pub kind: Option<String>,

    /// Inactive prims are not composed into the scene
    pub active: bool,
}

impl PrimData {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            active: true,
            ..Default::default()
        }
    }
}

/// A batch of changes reported by the stage.
///
/// `resynced` paths changed structurally (added, removed, retyped,
/// (de)activated). `info_changed` lists property or metadata edits per prim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectsChanged {
    pub resynced: BTreeSet<PrimPath>,
    pub info_changed: BTreeMap<PrimPath, BTreeSet<String>>,
}

impl ObjectsChanged {
    pub fn is_empty(&self) -> bool {
        self.resynced.is_empty() && self.info_changed.is_empty()
    }

    pub fn resync(path: PrimPath) -> Self {
        let mut notice = Self::default();
        notice.resynced.insert(path);
        notice
    }

    pub fn info(path: PrimPath, field: &str) -> Self {
        let mut notice = Self::default();
        notice
            .info_changed
            .entry(path)
            .or_default()
            .insert(field.to_string());
        notice
    }

    /// Fold another notice into this one.
    pub fn merge(&mut self, other: ObjectsChanged) {
        self.resynced.extend(other.resynced);
        for (path, fields) in other.info_changed {
            self.info_changed.entry(path).or_default().extend(fields);
        }
    }
}

/// An in-memory scene-description stage.
pub struct Stage {
    identifier: String,
    prims: HashMap<PrimPath, PrimData>,
    schemas: Arc<SchemaRegistry>,
    info: StageInfo,
    default_prim: Option<String>,
    subscribers: Vec<Sender<ObjectsChanged>>,
    block_depth: usize,
    pending: ObjectsChanged,
}

impl Stage {
    /// Create an empty stage (pseudo-root only) with the built-in schemas.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_schemas(identifier, Arc::new(SchemaRegistry::with_builtin()))
    }

    /// Create an empty stage sharing an existing schema registry.
    pub fn with_schemas(identifier: impl Into<String>, schemas: Arc<SchemaRegistry>) -> Self {
        let mut prims = HashMap::new();
        prims.insert(PrimPath::root(), PrimData::new(""));
        Self {
            identifier: identifier.into(),
            prims,
            schemas,
            info: StageInfo::default(),
            default_prim: None,
            subscribers: Vec::new(),
            block_depth: 0,
            pending: ObjectsChanged::default(),
        }
    }

    /// Open a `.usda` file.
    pub fn open<P: AsRef<Path>>(path: P) -> StageResult<Stage> {
        crate::usd::load_usda(path)
    }

    /// Build a stage from USDA text.
    pub fn from_usda_str(content: &str, identifier: &str) -> StageResult<Stage> {
        crate::usd::load_usda_from_string(content, identifier)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn prim(&self, path: &PrimPath) -> Option<&PrimData> {
        self.prims.get(path)
    }

    pub fn has_prim(&self, path: &PrimPath) -> bool {
        self.prims.contains_key(path)
    }

    /// Number of prims, not counting the pseudo-root.
    pub fn prim_count(&self) -> usize {
        self.prims.len() - 1
    }

    pub fn prim_type(&self, path: &PrimPath) -> Option<&str> {
        self.prims.get(path).map(|p| p.type_name.as_str())
    }

    /// Child paths in authored order.
    pub fn children(&self, path: &PrimPath) -> Vec<PrimPath> {
        let Some(prim) = self.prims.get(path) else {
            return Vec::new();
        };
        prim.children
            .iter()
            .filter_map(|name| path.child(name).ok())
            .collect()
    }

    /// All descendants of `path` in depth-first pre-order (excluding `path`).
    pub fn descendants(&self, path: &PrimPath) -> Vec<PrimPath> {
        let mut result = Vec::new();
        let mut stack: Vec<PrimPath> = self.children(path).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            stack.extend(self.children(&current).into_iter().rev());
            result.push(current);
        }
        result
    }

    pub fn attribute(&self, path: &PrimPath, name: &str) -> Option<&Attribute> {
        self.prims.get(path)?.attributes.get(name)
    }

    /// Resolve an attribute at a time code.
    pub fn attribute_value(&self, path: &PrimPath, name: &str, time: f64) -> Option<&AttrValue> {
        self.attribute(path, name)?.get(time)
    }

    pub fn kind(&self, path: &PrimPath) -> Option<&str> {
        self.prims.get(path)?.kind.as_deref()
    }

    /// False for missing prims and for prims under an inactive ancestor.
    pub fn is_active(&self, path: &PrimPath) -> bool {
        match self.prims.get(path) {
            Some(prim) if prim.active => path
                .ancestors()
                .all(|ancestor| self.prims.get(&ancestor).map_or(true, |p| p.active)),
            _ => false,
        }
    }

    /// Computed purpose: the nearest purpose authored on the prim or an
    /// ancestor, `default` when none is authored or recognised.
    pub fn purpose(&self, path: &PrimPath) -> Purpose {
        std::iter::once(path.clone())
            .chain(path.ancestors())
            .find_map(|p| {
                self.attribute_value(&p, "purpose", 0.0)
                    .and_then(AttrValue::as_token)
                    .and_then(Purpose::from_token)
            })
            .unwrap_or(Purpose::Default)
    }

    /// Visibility at `time`; invisibility is inherited from ancestors.
    pub fn is_visible(&self, path: &PrimPath, time: f64) -> bool {
        let invisible = |p: &PrimPath| {
            self.attribute_value(p, "visibility", time)
                .and_then(AttrValue::as_token)
                == Some("invisible")
        };
        !invisible(path) && !path.ancestors().any(|a| invisible(&a))
    }

    /// True if the prim's type is-a `schema`.
    pub fn is_a(&self, path: &PrimPath, schema: &str) -> bool {
        self.prim_type(path)
            .map_or(false, |type_name| self.schemas.is_a(type_name, schema))
    }

    /// Local transform from the prim's xformOps at `time`.
    pub fn local_transform(&self, path: &PrimPath, time: f64) -> Mat4 {
        self.prims
            .get(path)
            .map_or(Mat4::IDENTITY, |prim| {
                xform::evaluate_local_transform(&prim.attributes, time)
            })
    }

    /// Transform of `path` relative to `ancestor` (identity if equal).
    pub fn relative_transform(&self, path: &PrimPath, ancestor: &PrimPath, time: f64) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if &p == ancestor || p.is_root() {
                break;
            }
            matrix = self.local_transform(&p, time) * matrix;
            current = p.parent();
        }
        matrix
    }

    /// True if any attribute of the prim has more than one time sample.
    pub fn has_time_varying_attributes(&self, path: &PrimPath) -> bool {
        self.prims
            .get(path)
            .map_or(false, |prim| prim.attributes.values().any(Attribute::is_time_varying))
    }

    pub fn stage_info(&self) -> StageInfo {
        self.info
    }

    pub fn default_prim(&self) -> Option<&str> {
        self.default_prim.as_deref()
    }

    // ---------------------------------------------------------------------
    // Authoring
    // ---------------------------------------------------------------------

    /// Define a prim, creating missing ancestors as untyped prims.
    ///
    /// Redefining an existing prim with a different type resyncs it.
    pub fn define_prim(&mut self, path: &PrimPath, type_name: &str) -> StageResult<()> {
        if path.is_root() {
            return Err(StageError::PseudoRoot("defined"));
        }
        if let Some(prim) = self.prims.get_mut(path) {
            if prim.type_name != type_name {
                prim.type_name = type_name.to_string();
                self.notify(ObjectsChanged::resync(path.clone()));
            }
            return Ok(());
        }

        let mut missing: Vec<PrimPath> = path
            .ancestors()
            .take_while(|a| !self.prims.contains_key(a))
            .collect();
        missing.reverse();
        // Topmost prim that did not exist yet is what gets resynced.
        let topmost_new = missing.first().cloned().unwrap_or_else(|| path.clone());
        for ancestor in missing {
            self.insert_prim(&ancestor, PrimData::new(""));
        }
        self.insert_prim(path, PrimData::new(type_name));

        self.notify(ObjectsChanged::resync(topmost_new));
        Ok(())
    }

    fn insert_prim(&mut self, path: &PrimPath, data: PrimData) {
        if let Some(parent) = path.parent() {
            if let Some(parent_data) = self.prims.get_mut(&parent) {
                let name = path.name().to_string();
                if !parent_data.children.contains(&name) {
                    parent_data.children.push(name);
                }
            }
        }
        self.prims.insert(path.clone(), data);
    }

    /// Remove a prim and its whole subtree.
    pub fn remove_prim(&mut self, path: &PrimPath) -> StageResult<()> {
        if path.is_root() {
            return Err(StageError::PseudoRoot("removed"));
        }
        if !self.prims.contains_key(path) {
            return Err(StageError::UnknownPrim(path.clone()));
        }
        for descendant in self.descendants(path) {
            self.prims.remove(&descendant);
        }
        self.prims.remove(path);
        if let Some(parent) = path.parent() {
            if let Some(parent_data) = self.prims.get_mut(&parent) {
                parent_data.children.retain(|name| name != path.name());
            }
        }
        self.notify(ObjectsChanged::resync(path.clone()));
        Ok(())
    }

    /// Author the default value of an attribute.
    pub fn set_attribute(
        &mut self,
        path: &PrimPath,
        name: &str,
        type_name: &str,
        value: AttrValue,
    ) -> StageResult<()> {
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        let attribute = prim
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| Attribute::new(type_name));
        attribute.default = Some(value);
        self.notify(ObjectsChanged::info(path.clone(), name));
        Ok(())
    }

    /// Author one time sample of an attribute.
    pub fn set_time_sample(
        &mut self,
        path: &PrimPath,
        name: &str,
        type_name: &str,
        time: f64,
        value: AttrValue,
    ) -> StageResult<()> {
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        prim.attributes
            .entry(name.to_string())
            .or_insert_with(|| Attribute::new(type_name))
            .set_sample(time, value);
        self.notify(ObjectsChanged::info(path.clone(), name));
        Ok(())
    }

    /// Insert a fully-formed attribute (used by the loader).
    pub fn put_attribute(&mut self, path: &PrimPath, name: &str, attribute: Attribute) -> StageResult<()> {
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        prim.attributes.insert(name.to_string(), attribute);
        self.notify(ObjectsChanged::info(path.clone(), name));
        Ok(())
    }

    /// Remove an attribute; no-op if it is not authored.
    pub fn clear_attribute(&mut self, path: &PrimPath, name: &str) -> StageResult<()> {
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        if prim.attributes.remove(name).is_some() {
            self.notify(ObjectsChanged::info(path.clone(), name));
        }
        Ok(())
    }

    /// Set or clear the model kind.
    pub fn set_kind(&mut self, path: &PrimPath, kind: Option<&str>) -> StageResult<()> {
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        let kind = kind.map(str::to_string);
        if prim.kind != kind {
            prim.kind = kind;
            self.notify(ObjectsChanged::info(path.clone(), KIND_TOKEN));
        }
        Ok(())
    }

    /// Activate or deactivate a prim (a structural change).
    pub fn set_active(&mut self, path: &PrimPath, active: bool) -> StageResult<()> {
        if path.is_root() {
            return Err(StageError::PseudoRoot("deactivated"));
        }
        let prim = self
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::UnknownPrim(path.clone()))?;
        if prim.active != active {
            prim.active = active;
            self.notify(ObjectsChanged::resync(path.clone()));
        }
        Ok(())
    }

    pub fn set_up_axis(&mut self, up_axis: UpAxis) {
        if self.info.up_axis != up_axis {
            self.info.up_axis = up_axis;
            self.notify(ObjectsChanged::info(PrimPath::root(), UP_AXIS_TOKEN));
        }
    }

    pub fn set_meters_per_unit(&mut self, meters_per_unit: f64) {
        if self.info.meters_per_unit != meters_per_unit {
            self.info.meters_per_unit = meters_per_unit;
            self.notify(ObjectsChanged::info(PrimPath::root(), METERS_PER_UNIT_TOKEN));
        }
    }

    pub fn set_default_prim(&mut self, name: Option<String>) {
        self.default_prim = name;
    }

    // ---------------------------------------------------------------------
    // Change notification
    // ---------------------------------------------------------------------

    /// Subscribe to change notices.
    pub fn subscribe(&mut self) -> Receiver<ObjectsChanged> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Run `f` with notices batched into a single notice sent at the end.
    pub fn change_block<R>(&mut self, f: impl FnOnce(&mut Stage) -> R) -> R {
        self.block_depth += 1;
        let result = f(self);
        self.block_depth -= 1;
        if self.block_depth == 0 {
            let pending = std::mem::take(&mut self.pending);
            self.send(pending);
        }
        result
    }

    fn notify(&mut self, notice: ObjectsChanged) {
        if self.block_depth > 0 {
            self.pending.merge(notice);
        } else {
            self.send(notice);
        }
    }

    fn send(&mut self, notice: ObjectsChanged) {
        if notice.is_empty() {
            return;
        }
        // Drop subscribers whose receiver has gone away.
        self.subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PrimPath {
        PrimPath::new(s).unwrap()
    }

    #[test]
    fn test_empty_stage_has_only_root() {
        let stage = Stage::new("empty");
        assert_eq!(stage.prim_count(), 0);
        assert!(stage.has_prim(&PrimPath::root()));
        assert!(stage.children(&PrimPath::root()).is_empty());
    }

    #[test]
    fn test_define_creates_ancestors() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/World/Geom/Mesh"), "Mesh").unwrap();

        assert_eq!(stage.prim_type(&p("/World")), Some(""));
        assert_eq!(stage.prim_type(&p("/World/Geom/Mesh")), Some("Mesh"));
        assert_eq!(stage.children(&p("/World")), vec![p("/World/Geom")]);
        assert!(stage.is_a(&p("/World/Geom/Mesh"), "Xformable"));
    }

    #[test]
    fn test_descendants_preorder() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/A/B"), "Xform").unwrap();
        stage.define_prim(&p("/A/C"), "Xform").unwrap();
        stage.define_prim(&p("/A/B/D"), "Mesh").unwrap();

        assert_eq!(
            stage.descendants(&PrimPath::root()),
            vec![p("/A"), p("/A/B"), p("/A/B/D"), p("/A/C")]
        );
    }

    #[test]
    fn test_remove_prim_subtree() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/A/B/C"), "Mesh").unwrap();
        stage.remove_prim(&p("/A/B")).unwrap();

        assert!(!stage.has_prim(&p("/A/B")));
        assert!(!stage.has_prim(&p("/A/B/C")));
        assert!(stage.children(&p("/A")).is_empty());
        assert!(matches!(
            stage.remove_prim(&p("/A/B")),
            Err(StageError::UnknownPrim(_))
        ));
    }

    #[test]
    fn test_notices_resync_and_info() {
        let mut stage = Stage::new("test");
        let rx = stage.subscribe();

        stage.define_prim(&p("/A/B"), "Mesh").unwrap();
        stage
            .set_attribute(&p("/A/B"), "doubleSided", "bool", AttrValue::Bool(true))
            .unwrap();

        let first = rx.try_recv().unwrap();
        assert!(first.resynced.contains(&p("/A")));
        let second = rx.try_recv().unwrap();
        assert!(second.info_changed[&p("/A/B")].contains("doubleSided"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_change_block_batches_notices() {
        let mut stage = Stage::new("test");
        let rx = stage.subscribe();

        stage.change_block(|stage| {
            stage.define_prim(&p("/A"), "Xform").unwrap();
            stage.define_prim(&p("/B"), "Xform").unwrap();
            stage.set_kind(&p("/A"), Some("component")).unwrap();
        });

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.resynced.len(), 2);
        assert!(notice.info_changed[&p("/A")].contains(KIND_TOKEN));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inactive_ancestor_hides_descendants() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/A/B"), "Mesh").unwrap();
        stage.set_active(&p("/A"), false).unwrap();
        assert!(!stage.is_active(&p("/A/B")));
        assert!(!stage.is_active(&p("/Missing")));
    }

    #[test]
    fn test_visibility_is_inherited() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/A/B"), "Mesh").unwrap();
        stage
            .set_attribute(&p("/A"), "visibility", "token", AttrValue::Token("invisible".into()))
            .unwrap();
        assert!(!stage.is_visible(&p("/A/B"), 0.0));
    }

    #[test]
    fn test_relative_transform() {
        let mut stage = Stage::new("test");
        stage.define_prim(&p("/A/B/C"), "Mesh").unwrap();
        for path in ["/A", "/A/B", "/A/B/C"] {
            stage
                .set_attribute(
                    &p(path),
                    "xformOp:translate",
                    "double3",
                    AttrValue::Vec3(stagelink_math::Vec3::X),
                )
                .unwrap();
        }
        let m = stage.relative_transform(&p("/A/B/C"), &p("/A"), 0.0);
        let origin = m.transform_point3(stagelink_math::Vec3::ZERO);
        assert!((origin.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut stage = Stage::new("test");
        let rx = stage.subscribe();
        drop(rx);
        stage.define_prim(&p("/A"), "Xform").unwrap();
        assert!(stage.subscribers.is_empty());
    }
}
