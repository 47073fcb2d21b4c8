//! Transactional tree store for location records: the store contract the
//! sync engine consumes, plus a snapshot-file backed in-memory implementation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use gaz_core::{Geometry, LocationId, RemapHistory};
pub use gaz_core::LocationRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "gaz-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated for ({name}, {p_code})")]
    UniqueViolation { name: String, p_code: String },
    #[error("no location with id {0}")]
    NotFound(LocationId),
    #[error("location {0} still has children")]
    HasChildren(LocationId),
    #[error("location tree is corrupted: {0}")]
    TreeCorrupted(String),
    #[error("snapshot io at {path}: {source}")]
    SnapshotIo {
        path: String,
        source: std::io::Error,
    },
    #[error("snapshot decode at {path}: {source}")]
    SnapshotDecode {
        path: String,
        source: serde_json::Error,
    },
}

/// Attributes accepted by `create` and `update`. Geometry columns are both
/// optional here; the caller decides which one the incoming GeoJSON targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationAttrs {
    pub p_code: String,
    pub name: String,
    pub admin_level: i16,
    pub admin_level_name: String,
    pub parent: Option<LocationId>,
    pub point: Option<Geometry>,
    pub geom: Option<Geometry>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcodeMatch {
    None,
    One(LocationId),
    Many(Vec<LocationId>),
}

/// The store contract consumed by the synchronization engine. Implementors
/// provide exclusive transactions; everything inside one transaction either
/// commits atomically or leaves the store untouched.
pub trait LocationStore {
    type Txn<'a>: LocationTxn
    where
        Self: 'a;

    /// Opens a transaction, taking the write-intent lock over the full
    /// active-location set for its lifetime.
    fn begin(&self) -> Result<Self::Txn<'_>, StoreError>;

    /// Active p-codes, optionally scoped to one admin level. Read-only view
    /// of the last committed state.
    fn active_pcodes(&self, admin_level: Option<i16>) -> Vec<String>;
}

pub trait LocationTxn {
    fn find_active_by_pcode(&self, p_code: &str) -> PcodeMatch;
    fn find_active_in(&self, p_codes: &[String]) -> Vec<LocationId>;
    fn get(&self, id: LocationId) -> Option<LocationRecord>;
    fn create(&mut self, attrs: LocationAttrs) -> Result<LocationId, StoreError>;
    fn update(&mut self, id: LocationId, attrs: LocationAttrs) -> Result<(), StoreError>;
    fn set_name(&mut self, id: LocationId, name: &str) -> Result<(), StoreError>;
    fn deactivate(&mut self, id: LocationId) -> Result<(), StoreError>;
    fn delete(&mut self, id: LocationId) -> Result<(), StoreError>;
    fn children(&self, id: LocationId) -> Vec<LocationId>;
    /// References from outside the tree structure (remap history rows).
    fn count_references(&self, id: LocationId) -> usize;
    fn inactive_at_level(&self, admin_level: i16) -> Vec<LocationId>;
    fn record_remap(&mut self, old: LocationId, new: LocationId, comment: &str);
    /// Suspends per-mutation ordering upkeep until `rebuild_ordering`.
    fn defer_ordering(&mut self);
    /// Recomputes materialized paths and depths in one pass, failing on
    /// cycles or dangling parents.
    fn rebuild_ordering(&mut self) -> Result<(), StoreError>;
    fn commit(self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: LocationId,
    locations: BTreeMap<LocationId, LocationRecord>,
    remap_history: Vec<RemapHistory>,
}

/// In-memory location store with optional JSON snapshot persistence.
/// Transactions copy the state on begin and publish it back on commit, so a
/// dropped transaction rolls back completely; the state mutex doubles as the
/// write-intent lock serializing concurrent passes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a snapshot-backed store, loading the file when it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::SnapshotIo {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::SnapshotDecode {
                path: path.display().to_string(),
                source,
            })?
        } else {
            StoreState::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Serialized view of the committed state. Useful for before/after
    /// comparisons around a pass.
    pub fn snapshot_json(&self) -> String {
        let state = self.state.lock().expect("location store lock poisoned");
        serde_json::to_string_pretty(&*state).expect("store state serializes")
    }

    pub fn remap_history(&self) -> Vec<RemapHistory> {
        let state = self.state.lock().expect("location store lock poisoned");
        state.remap_history.clone()
    }

    pub fn all_locations(&self) -> Vec<LocationRecord> {
        let state = self.state.lock().expect("location store lock poisoned");
        state.locations.values().cloned().collect()
    }
}

impl LocationStore for MemoryStore {
    type Txn<'a>
        = MemoryTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<MemoryTxn<'_>, StoreError> {
        let guard = self.state.lock().expect("location store lock poisoned");
        let work = (*guard).clone();
        Ok(MemoryTxn {
            guard,
            work,
            deferred: false,
            dirty: false,
            snapshot_path: self.snapshot_path.as_deref(),
        })
    }

    fn active_pcodes(&self, admin_level: Option<i16>) -> Vec<String> {
        let state = self.state.lock().expect("location store lock poisoned");
        state
            .locations
            .values()
            .filter(|loc| loc.is_active)
            .filter(|loc| admin_level.map_or(true, |lvl| loc.admin_level == lvl))
            .map(|loc| loc.p_code.clone())
            .collect()
    }
}

pub struct MemoryTxn<'a> {
    guard: MutexGuard<'a, StoreState>,
    work: StoreState,
    deferred: bool,
    dirty: bool,
    snapshot_path: Option<&'a Path>,
}

impl MemoryTxn<'_> {
    fn ensure_unique(
        &self,
        name: &str,
        p_code: &str,
        exclude: Option<LocationId>,
    ) -> Result<(), StoreError> {
        let clash = self.work.locations.values().any(|loc| {
            Some(loc.id) != exclude && loc.name == name && loc.p_code == p_code
        });
        if clash {
            return Err(StoreError::UniqueViolation {
                name: name.to_string(),
                p_code: p_code.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_parent_exists(&self, parent: Option<LocationId>) -> Result<(), StoreError> {
        if let Some(parent) = parent {
            if !self.work.locations.contains_key(&parent) {
                return Err(StoreError::NotFound(parent));
            }
        }
        Ok(())
    }

    fn touch_ordering(&mut self) -> Result<(), StoreError> {
        if self.deferred {
            self.dirty = true;
            Ok(())
        } else {
            rebuild_paths(&mut self.work)
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.snapshot_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.work).expect("store state serializes");
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StoreError::SnapshotIo {
            path: path.display().to_string(),
            source,
        };
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

impl LocationTxn for MemoryTxn<'_> {
    fn find_active_by_pcode(&self, p_code: &str) -> PcodeMatch {
        let ids: Vec<LocationId> = self
            .work
            .locations
            .values()
            .filter(|loc| loc.is_active && loc.p_code == p_code)
            .map(|loc| loc.id)
            .collect();
        match ids.as_slice() {
            [] => PcodeMatch::None,
            [id] => PcodeMatch::One(*id),
            _ => PcodeMatch::Many(ids),
        }
    }

    fn find_active_in(&self, p_codes: &[String]) -> Vec<LocationId> {
        let wanted: HashSet<&str> = p_codes.iter().map(String::as_str).collect();
        self.work
            .locations
            .values()
            .filter(|loc| loc.is_active && wanted.contains(loc.p_code.as_str()))
            .map(|loc| loc.id)
            .collect()
    }

    fn get(&self, id: LocationId) -> Option<LocationRecord> {
        self.work.locations.get(&id).cloned()
    }

    fn create(&mut self, attrs: LocationAttrs) -> Result<LocationId, StoreError> {
        self.ensure_unique(&attrs.name, &attrs.p_code, None)?;
        self.ensure_parent_exists(attrs.parent)?;
        let id = self.work.next_id + 1;
        self.work.next_id = id;
        let now = Utc::now();
        self.work.locations.insert(
            id,
            LocationRecord {
                id,
                p_code: attrs.p_code,
                name: attrs.name,
                admin_level: attrs.admin_level,
                admin_level_name: attrs.admin_level_name,
                parent: attrs.parent,
                point: attrs.point,
                geom: attrs.geom,
                is_active: attrs.is_active,
                created: now,
                modified: now,
                path: String::new(),
                depth: 0,
            },
        );
        self.touch_ordering()?;
        Ok(id)
    }

    fn update(&mut self, id: LocationId, attrs: LocationAttrs) -> Result<(), StoreError> {
        self.ensure_unique(&attrs.name, &attrs.p_code, Some(id))?;
        self.ensure_parent_exists(attrs.parent)?;
        let loc = self
            .work
            .locations
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        loc.p_code = attrs.p_code;
        loc.name = attrs.name;
        loc.admin_level = attrs.admin_level;
        loc.admin_level_name = attrs.admin_level_name;
        loc.parent = attrs.parent;
        loc.point = attrs.point;
        loc.geom = attrs.geom;
        loc.is_active = attrs.is_active;
        loc.modified = Utc::now();
        self.touch_ordering()
    }

    fn set_name(&mut self, id: LocationId, name: &str) -> Result<(), StoreError> {
        let p_code = self
            .work
            .locations
            .get(&id)
            .ok_or(StoreError::NotFound(id))?
            .p_code
            .clone();
        self.ensure_unique(name, &p_code, Some(id))?;
        let loc = self.work.locations.get_mut(&id).expect("checked above");
        loc.name = name.to_string();
        loc.modified = Utc::now();
        // Sibling ordering keys off the name.
        self.touch_ordering()
    }

    fn deactivate(&mut self, id: LocationId) -> Result<(), StoreError> {
        let loc = self
            .work
            .locations
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        loc.is_active = false;
        loc.modified = Utc::now();
        Ok(())
    }

    fn delete(&mut self, id: LocationId) -> Result<(), StoreError> {
        if !self.work.locations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if !self.children(id).is_empty() {
            return Err(StoreError::HasChildren(id));
        }
        self.work.locations.remove(&id);
        self.touch_ordering()
    }

    fn children(&self, id: LocationId) -> Vec<LocationId> {
        self.work
            .locations
            .values()
            .filter(|loc| loc.parent == Some(id))
            .map(|loc| loc.id)
            .collect()
    }

    fn count_references(&self, id: LocationId) -> usize {
        self.work
            .remap_history
            .iter()
            .filter(|entry| entry.old_location == id || entry.new_location == id)
            .count()
    }

    fn inactive_at_level(&self, admin_level: i16) -> Vec<LocationId> {
        self.work
            .locations
            .values()
            .filter(|loc| !loc.is_active && loc.admin_level == admin_level)
            .map(|loc| loc.id)
            .collect()
    }

    fn record_remap(&mut self, old: LocationId, new: LocationId, comment: &str) {
        self.work.remap_history.push(RemapHistory {
            old_location: old,
            new_location: new,
            comment: comment.to_string(),
            created_at: Utc::now(),
        });
    }

    fn defer_ordering(&mut self) {
        self.deferred = true;
    }

    fn rebuild_ordering(&mut self) -> Result<(), StoreError> {
        rebuild_paths(&mut self.work)?;
        self.dirty = false;
        self.deferred = false;
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        if self.dirty {
            rebuild_paths(&mut self.work)?;
            self.dirty = false;
        }
        self.persist()?;
        debug!(
            locations = self.work.locations.len(),
            "committing location store transaction"
        );
        *self.guard = self.work;
        Ok(())
    }
}

/// Full recomputation of the materialized-path ordering: children sorted by
/// name under their parent, path segments taken from the position among the
/// sorted siblings so lexicographic path order is tree order. Nodes
/// unreachable from any root mean a parent cycle.
fn rebuild_paths(state: &mut StoreState) -> Result<(), StoreError> {
    for loc in state.locations.values() {
        match loc.parent {
            Some(parent) if parent == loc.id => {
                return Err(StoreError::TreeCorrupted(format!(
                    "location {} is its own parent",
                    loc.id
                )));
            }
            Some(parent) if !state.locations.contains_key(&parent) => {
                return Err(StoreError::TreeCorrupted(format!(
                    "location {} points at missing parent {}",
                    loc.id, parent
                )));
            }
            _ => {}
        }
    }

    let mut order: BTreeMap<Option<LocationId>, Vec<(String, LocationId)>> = BTreeMap::new();
    for loc in state.locations.values() {
        order
            .entry(loc.parent)
            .or_default()
            .push((loc.name.clone(), loc.id));
    }
    for siblings in order.values_mut() {
        siblings.sort();
    }

    let mut visited: BTreeSet<LocationId> = BTreeSet::new();
    let mut stack: Vec<(LocationId, String, u32)> = Vec::new();
    if let Some(roots) = order.get(&None) {
        for (position, (_, id)) in roots.iter().enumerate().rev() {
            stack.push((*id, format!("{:04}", position + 1), 0));
        }
    }
    while let Some((id, path, depth)) = stack.pop() {
        visited.insert(id);
        if let Some(children) = order.get(&Some(id)) {
            for (position, (_, child)) in children.iter().enumerate().rev() {
                stack.push((*child, format!("{path}.{:04}", position + 1), depth + 1));
            }
        }
        let loc = state.locations.get_mut(&id).expect("visited id exists");
        loc.path = path;
        loc.depth = depth;
    }

    if visited.len() != state.locations.len() {
        let stranded: Vec<String> = state
            .locations
            .keys()
            .filter(|id| !visited.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(StoreError::TreeCorrupted(format!(
            "parent cycle detected involving locations {}",
            stranded.join(",")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn attrs(p_code: &str, name: &str, parent: Option<LocationId>) -> LocationAttrs {
        LocationAttrs {
            p_code: p_code.to_string(),
            name: name.to_string(),
            admin_level: 1,
            admin_level_name: "Province".to_string(),
            parent,
            point: None,
            geom: None,
            is_active: true,
        }
    }

    #[test]
    fn paths_follow_parent_pointers_and_sibling_names() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        let root = txn.create(attrs("RW", "Rwanda", None)).expect("root");
        let b = txn.create(attrs("RW02", "Butare", Some(root))).expect("b");
        let a = txn.create(attrs("RW01", "Astrida", Some(root))).expect("a");
        txn.commit().expect("commit");

        let locations = store.all_locations();
        let get = |id| {
            locations
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .expect("location")
        };
        assert_eq!(get(root).depth, 0);
        assert_eq!(get(a).depth, 1);
        assert!(get(a).path.starts_with(&get(root).path));
        // "Astrida" sorts before "Butare" under the same parent.
        assert!(get(a).path < get(b).path);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin().expect("begin");
            txn.create(attrs("RW", "Rwanda", None)).expect("create");
            // no commit
        }
        assert!(store.active_pcodes(None).is_empty());
    }

    #[test]
    fn duplicate_name_pcode_pair_is_rejected() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        txn.create(attrs("RW", "Rwanda", None)).expect("first");
        let err = txn.create(attrs("RW", "Rwanda", None)).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[test]
    fn parent_cycle_is_reported_as_corruption() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        let a = txn.create(attrs("RW", "Rwanda", None)).expect("a");
        let b = txn.create(attrs("RW01", "Kigali", Some(a))).expect("b");
        let mut looped = attrs("RW", "Rwanda", Some(b));
        looped.is_active = true;
        let err = txn.update(a, looped).unwrap_err();
        assert!(matches!(err, StoreError::TreeCorrupted(_)));
    }

    #[test]
    fn deferred_ordering_rebuilds_once() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        txn.defer_ordering();
        let root = txn.create(attrs("RW", "Rwanda", None)).expect("root");
        let child = txn.create(attrs("RW01", "Kigali", Some(root))).expect("child");
        assert_eq!(txn.get(child).expect("child").path, "");
        txn.rebuild_ordering().expect("rebuild");
        assert_eq!(txn.get(child).expect("child").depth, 1);
        txn.commit().expect("commit");
    }

    #[test]
    fn delete_refuses_non_leaf_nodes() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        let root = txn.create(attrs("RW", "Rwanda", None)).expect("root");
        txn.create(attrs("RW01", "Kigali", Some(root))).expect("child");
        assert!(matches!(
            txn.delete(root).unwrap_err(),
            StoreError::HasChildren(_)
        ));
    }

    #[test]
    fn remap_history_counts_as_reference() {
        let store = MemoryStore::new();
        let mut txn = store.begin().expect("begin");
        let old = txn.create(attrs("RWA", "Rwanda", None)).expect("old");
        let new = txn.create(attrs("RW", "Rwanda Rep", None)).expect("new");
        assert_eq!(txn.count_references(old), 0);
        txn.record_remap(old, new, "RWA -> RW");
        assert_eq!(txn.count_references(old), 1);
        assert_eq!(txn.count_references(new), 1);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gazetteer.json");
        {
            let store = MemoryStore::open(&path).expect("open");
            let mut txn = store.begin().expect("begin");
            txn.create(attrs("RW", "Rwanda", None)).expect("create");
            txn.commit().expect("commit");
        }
        let reopened = MemoryStore::open(&path).expect("reopen");
        assert_eq!(reopened.active_pcodes(None), vec!["RW".to_string()]);
    }
}
