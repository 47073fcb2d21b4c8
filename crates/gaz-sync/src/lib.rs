//! Location synchronization engine: remap resolution, duplicate validation,
//! per-row upserts, obsolescence pruning and the orchestrating pass.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use gaz_adapters::{fetch_all_rows, fetch_remap_rows, FeatureSource, RetryPolicy, SourceError};
use gaz_core::{FeatureRow, GeometryKind, LocationId, RemapRow, SourceTableConfig};
use gaz_storage::{LocationAttrs, LocationStore, LocationTxn, PcodeMatch, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "gaz-sync";

/// The YAML registry of source tables driven by this deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct TableRegistry {
    pub tables: Vec<SourceTableConfig>,
}

impl TableRegistry {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn table(&self, name: &str) -> Option<&SourceTableConfig> {
        self.tables.iter().find(|table| table.name == name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    #[error("old p-code {0} cannot be remapped twice")]
    DuplicateOldPcode(String),
    #[error("remap table references new p-codes absent from the incoming dataset: {}", .0.join(","))]
    UnknownNewPcodes(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remap(#[from] RemapError),
    #[error("duplicate p-codes found in the {scope}: {}", .codes.join(","))]
    DuplicatePcodes { scope: String, codes: Vec<String> },
    #[error("{matches} active locations share p-code {p_code}")]
    AmbiguousPcode { p_code: String, matches: usize },
}

/// Acyclic relabeling plan computed from a raw remap table. `assignments`
/// is safe to apply as a sequence of single-key renames in order: sources
/// that are themselves rename targets are routed through synthetic
/// `temp{N}` keys so no value is overwritten before it is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapPlan {
    pub assignments: Vec<(String, String)>,
    pub to_deactivate: Vec<String>,
    synthetic: HashSet<String>,
    old_pcodes: Vec<String>,
}

impl RemapPlan {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.to_deactivate.is_empty()
    }

    /// Every old p-code mentioned by the remap table, renames and
    /// retirements alike, in input order. Feeds the duplicate check and the
    /// orphan arithmetic.
    pub fn old_pcodes(&self) -> &[String] {
        &self.old_pcodes
    }

    /// Rename sources resolved to their final targets, synthetic keys
    /// collapsed away.
    pub fn final_targets(&self) -> BTreeMap<String, String> {
        let by_key: HashMap<&str, &str> = self
            .assignments
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let mut out = BTreeMap::new();
        for (key, value) in &self.assignments {
            if self.synthetic.contains(key.as_str()) {
                continue;
            }
            let mut target = value.as_str();
            while self.synthetic.contains(target) {
                target = by_key.get(target).copied().unwrap_or(target);
            }
            out.insert(key.clone(), target.to_string());
        }
        out
    }

    /// Groups rename sources by their final target, dropping self-renames:
    /// the shape remap absorption consumes.
    pub fn fold_by_new(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (old, new) in self.final_targets() {
            if old != new {
                out.entry(new).or_default().push(old);
            }
        }
        out
    }
}

/// Validates and normalizes raw remap rows. Flag-driven semantics:
/// `matching` means "merge old into new", otherwise the old code is retired
/// with no successor. Fails closed on a rename source listed twice or a
/// rename target the incoming dataset does not carry. Old codes are not
/// required to still be active locally — a remap applied on an earlier pass
/// must degrade to a no-op.
pub fn resolve_remap(
    rows: &[RemapRow],
    incoming_pcodes: &HashSet<String>,
) -> Result<RemapPlan, RemapError> {
    let mut renames: Vec<(String, String)> = Vec::new();
    let mut to_deactivate = Vec::new();
    let mut old_pcodes = Vec::new();
    let mut seen_sources: HashSet<String> = HashSet::new();
    let mut bad_new: Vec<String> = Vec::new();

    for row in rows {
        let old = row.old_pcode.trim().to_string();
        let new = row.new_pcode.trim().to_string();
        old_pcodes.push(old.clone());
        if row.matching {
            if !seen_sources.insert(old.clone()) {
                return Err(RemapError::DuplicateOldPcode(old));
            }
            if !incoming_pcodes.contains(&new) {
                bad_new.push(new.clone());
            }
            renames.push((old, new));
        } else {
            to_deactivate.push(old);
        }
    }
    if !bad_new.is_empty() {
        error!(
            "invalid new p-codes found in the remap table: {}",
            bad_new.join(",")
        );
        return Err(RemapError::UnknownNewPcodes(bad_new));
    }

    // Rename pairs can form cycles (A->B, B->A). Any source that is also a
    // target gets parked under a synthetic key first; the deferred
    // adjustments then move the parked values to their real targets.
    let targets: HashSet<&String> = renames.iter().map(|(_, value)| value).collect();
    let mut assignments: Vec<(String, String)> = Vec::new();
    let mut adjusters: Vec<(String, String)> = Vec::new();
    let mut synthetic: HashSet<String> = HashSet::new();
    for (key, value) in &renames {
        if targets.contains(key) && key != value {
            let slot = format!("temp{}", synthetic.len());
            assignments.push((key.clone(), slot.clone()));
            adjusters.push((slot.clone(), value.clone()));
            synthetic.insert(slot);
        } else {
            assignments.push((key.clone(), value.clone()));
        }
    }
    assignments.extend(adjusters);

    Ok(RemapPlan {
        assignments,
        to_deactivate,
        synthetic,
        old_pcodes,
    })
}

/// Values appearing at least twice, deduplicated and sorted.
pub fn duplicates_in<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut dupes: BTreeSet<String> = BTreeSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            dupes.insert(value.clone());
        }
    }
    dupes.into_iter().collect()
}

/// Duplicates in any of the three code lists make the "exactly one matching
/// row" assumption of the upsert step unsafe, so the pass aborts before any
/// mutation.
pub fn ensure_no_duplicate_pcodes(
    local: &[String],
    incoming: &[String],
    remap_old: &[String],
) -> Result<(), SyncError> {
    let scopes = [
        ("local store p-codes", local),
        ("incoming p-codes", incoming),
        ("remap table old p-codes", remap_old),
    ];
    for (scope, values) in scopes {
        let codes = duplicates_in(values.iter());
        if !codes.is_empty() {
            error!("duplicates found in the {scope}: {}", codes.join(","));
            return Err(SyncError::DuplicatePcodes {
                scope: scope.to_string(),
                codes,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub remapped: u64,
}

/// `(new_id, old_id)` pairing for observability: absorptions carry the
/// retired location, ordinary creates/updates carry no old id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemapPair {
    pub new_id: LocationId,
    pub old_id: Option<LocationId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub table: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: SyncCounts,
    pub pairs: Vec<RemapPair>,
}

#[derive(Debug, Default)]
struct PassTally {
    counts: SyncCounts,
    pairs: Vec<RemapPair>,
}

/// Retires the active locations behind `old_pcodes` in favour of the row
/// carrying `new_pcode`. The successor is the existing active row for that
/// code, or a placeholder named after the p-code until the ordinary update
/// later in the pass fills in the real name and geometry. No active old
/// rows means the remap was absorbed on an earlier pass.
fn absorb_remap<T: LocationTxn>(
    txn: &mut T,
    table: &SourceTableConfig,
    new_pcode: &str,
    old_pcodes: &[String],
) -> Result<Vec<RemapPair>, SyncError> {
    let old_ids = txn.find_active_in(old_pcodes);
    if old_ids.is_empty() {
        info!(
            "remapped p-codes [{}] are no longer active, nothing to absorb",
            old_pcodes.join(",")
        );
        return Ok(Vec::new());
    }

    let successor = match txn.find_active_by_pcode(new_pcode) {
        PcodeMatch::One(id) => id,
        PcodeMatch::Many(_) => {
            warn!("multiple active locations found for remap target {new_pcode}");
            return Ok(Vec::new());
        }
        PcodeMatch::None => txn.create(LocationAttrs {
            p_code: new_pcode.to_string(),
            name: new_pcode.to_string(),
            admin_level: table.admin_level,
            admin_level_name: table.admin_level_name.clone(),
            parent: None,
            point: None,
            geom: None,
            is_active: true,
        })?,
    };

    let mut pairs = Vec::new();
    for old_id in old_ids {
        let old = txn.get(old_id).ok_or(StoreError::NotFound(old_id))?;
        txn.deactivate(old_id)?;
        txn.record_remap(old_id, successor, &format!("{} -> {new_pcode}", old.p_code));
        info!("remapped {} to {new_pcode}", old.p_code);
        pairs.push(RemapPair {
            new_id: successor,
            old_id: Some(old_id),
        });
    }
    Ok(pairs)
}

/// One-row reconciliation: create, update or skip, with parentage fully
/// re-derived from the current pass. Row-scoped problems are counted as
/// not-added; more than one active match for the p-code is pre-existing
/// corruption and fails the whole pass.
fn upsert_feature<T: LocationTxn>(
    txn: &mut T,
    table: &SourceTableConfig,
    row: &FeatureRow,
    tally: &mut PassTally,
) -> Result<(), SyncError> {
    let pcode = row.pcode.trim();
    let name = row.name.trim();
    if pcode.is_empty() || name.is_empty() {
        warn!("no name for location with p-code {pcode:?}");
        tally.counts.skipped += 1;
        return Ok(());
    }

    let mut parent = None;
    if table.parent_code_col.is_some() {
        if let Some(parent_code) = row
            .parent_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            match txn.find_active_by_pcode(parent_code) {
                PcodeMatch::One(id) => parent = Some(id),
                PcodeMatch::None => {
                    warn!("no locations found for parent code {parent_code}");
                    tally.counts.skipped += 1;
                    return Ok(());
                }
                PcodeMatch::Many(_) => {
                    warn!("multiple locations found for parent code {parent_code}");
                    tally.counts.skipped += 1;
                    return Ok(());
                }
            }
        }
    }

    match txn.find_active_by_pcode(pcode) {
        PcodeMatch::Many(ids) => Err(SyncError::AmbiguousPcode {
            p_code: pcode.to_string(),
            matches: ids.len(),
        }),
        PcodeMatch::One(id) => {
            let Some(geometry) = &row.geometry else {
                // an incomplete source row must not blank out a good geometry
                info!("skipping {pcode}: source row carries no geometry");
                tally.counts.skipped += 1;
                return Ok(());
            };
            let existing = txn.get(id).ok_or(StoreError::NotFound(id))?;
            let mut attrs = LocationAttrs {
                p_code: existing.p_code,
                name: name.to_string(),
                admin_level: table.admin_level,
                admin_level_name: table.admin_level_name.clone(),
                parent,
                point: existing.point,
                geom: existing.geom,
                is_active: true,
            };
            match geometry.kind() {
                GeometryKind::Point => attrs.point = Some(geometry.clone()),
                GeometryKind::Polygon => attrs.geom = Some(geometry.clone()),
            }
            match txn.update(id, attrs) {
                Ok(()) => {
                    tally.counts.updated += 1;
                    tally.pairs.push(RemapPair {
                        new_id: id,
                        old_id: None,
                    });
                    info!("updated {name} ({pcode})");
                    Ok(())
                }
                Err(StoreError::UniqueViolation { .. }) => {
                    warn!("constraint violation while updating {name} ({pcode})");
                    tally.counts.skipped += 1;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
        PcodeMatch::None => {
            let Some(geometry) = &row.geometry else {
                info!("skipping {pcode}: source row carries no geometry");
                tally.counts.skipped += 1;
                return Ok(());
            };
            let mut attrs = LocationAttrs {
                p_code: pcode.to_string(),
                name: name.to_string(),
                admin_level: table.admin_level,
                admin_level_name: table.admin_level_name.clone(),
                parent,
                point: None,
                geom: None,
                is_active: true,
            };
            match geometry.kind() {
                GeometryKind::Point => attrs.point = Some(geometry.clone()),
                GeometryKind::Polygon => attrs.geom = Some(geometry.clone()),
            }
            match txn.create(attrs) {
                Ok(id) => {
                    tally.counts.created += 1;
                    tally.pairs.push(RemapPair {
                        new_id: id,
                        old_id: None,
                    });
                    info!("added {name} ({pcode})");
                    Ok(())
                }
                Err(StoreError::UniqueViolation { .. }) => {
                    warn!("constraint violation while creating {name} ({pcode})");
                    tally.counts.skipped += 1;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

/// Obsolete locations keep existing as archived rows while anything still
/// points at them; unreferenced childless leaves are removed outright. The
/// dated name suffix lets a successor reuse the `(name, p_code)` pair.
fn handle_obsolete<T: LocationTxn>(txn: &mut T, p_codes: &[String]) -> Result<(), SyncError> {
    if p_codes.is_empty() {
        return Ok(());
    }
    for id in txn.find_active_in(p_codes) {
        let loc = txn.get(id).ok_or(StoreError::NotFound(id))?;
        if txn.count_references(id) > 0 || !txn.children(id).is_empty() {
            let archived = format!("{} [{}]", loc.name, Utc::now().format("%Y-%m-%d"));
            txn.set_name(id, &archived)?;
            txn.deactivate(id)?;
            info!("deactivating {loc}");
        } else {
            txn.delete(id)?;
            info!("deleting {loc}");
        }
    }
    Ok(())
}

/// Orphaned codes: present locally, absent from both the fresh dataset and
/// the remap table.
fn deactivate_orphans<T: LocationTxn>(
    txn: &mut T,
    local_pcodes: &[String],
    incoming: &HashSet<String>,
    remap_old: &HashSet<String>,
) -> Result<(), SyncError> {
    let orphaned: Vec<String> = local_pcodes
        .iter()
        .filter(|code| !incoming.contains(*code) && !remap_old.contains(*code))
        .cloned()
        .collect();
    if orphaned.is_empty() {
        return Ok(());
    }
    warn!("archiving unused p-codes: {}", orphaned.join(","));
    handle_obsolete(txn, &orphaned)
}

/// One level up from the synchronized one, inactive unreferenced leaves are
/// left over from earlier pruning and can go.
fn clean_upper_level<T: LocationTxn>(txn: &mut T, admin_level: i16) -> Result<(), SyncError> {
    for id in txn.inactive_at_level(admin_level - 1) {
        if txn.count_references(id) == 0 && txn.children(id).is_empty() {
            let loc = txn.get(id).ok_or(StoreError::NotFound(id))?;
            txn.delete(id)?;
            info!("deleting parent {loc}");
        }
    }
    Ok(())
}

/// Advisory per-table locks serializing passes over the same source table.
#[derive(Debug, Default)]
pub struct TableLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, table: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().expect("table lock registry poisoned");
            map.entry(table.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// Drives one synchronization pass for one source table: fetch, validate,
/// remap, upsert, prune, rebuild — all mutation inside a single store
/// transaction that either commits whole or not at all.
pub struct Synchronizer<'a, S: LocationStore> {
    store: &'a S,
    source: &'a dyn FeatureSource,
    table: &'a SourceTableConfig,
    retry: RetryPolicy,
}

impl<'a, S: LocationStore> Synchronizer<'a, S> {
    pub fn new(
        store: &'a S,
        source: &'a dyn FeatureSource,
        table: &'a SourceTableConfig,
    ) -> Self {
        Self {
            store,
            source,
            table,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(table = %self.table.name, %run_id, "starting location synchronization pass");

        // Everything remote happens before the transaction opens: a fetch
        // failure must leave the store untouched.
        let rows = fetch_all_rows(self.source, self.retry).await?;
        let remap_rows = fetch_remap_rows(self.source, self.retry).await?;

        let incoming: Vec<String> = rows.iter().map(|row| row.pcode.trim().to_string()).collect();
        let incoming_set: HashSet<String> = incoming.iter().cloned().collect();
        let local = self.store.active_pcodes(Some(self.table.admin_level));

        let plan = resolve_remap(&remap_rows, &incoming_set)?;
        ensure_no_duplicate_pcodes(&local, &incoming, plan.old_pcodes())?;
        let remap_old_set: HashSet<String> = plan.old_pcodes().iter().cloned().collect();

        let mut txn = self.store.begin()?;
        txn.defer_ordering();
        let mut tally = PassTally::default();

        handle_obsolete(&mut txn, &plan.to_deactivate)?;

        // Renames are applied before ordinary create/update so that a
        // freshly remapped code is not misclassified as a brand new row in
        // the same pass.
        let folded = plan.fold_by_new();
        let mut absorbed: HashSet<String> = HashSet::new();
        for pcode in &incoming {
            if let Some(old_pcodes) = folded.get(pcode) {
                if absorbed.insert(pcode.clone()) {
                    let pairs = absorb_remap(&mut txn, self.table, pcode, old_pcodes)?;
                    tally.counts.remapped += pairs.len() as u64;
                    tally.pairs.extend(pairs);
                }
            }
        }

        for row in &rows {
            upsert_feature(&mut txn, self.table, row, &mut tally)?;
        }

        deactivate_orphans(&mut txn, &local, &incoming_set, &remap_old_set)?;
        clean_upper_level(&mut txn, self.table.admin_level)?;
        txn.rebuild_ordering()?;
        txn.commit()?;

        let counts = tally.counts;
        info!(
            "table {}: {} sites created, {} sites updated, {} sites remapped, {} sites skipped",
            self.table.dataset_name(),
            counts.created,
            counts.updated,
            counts.remapped,
            counts.skipped
        );
        Ok(SyncReport {
            run_id,
            table: self.table.name.clone(),
            started_at,
            finished_at: Utc::now(),
            counts,
            pairs: tally.pairs,
        })
    }
}

/// Runs one pass under the table's advisory lock.
pub async fn run_table_sync<S: LocationStore>(
    store: &S,
    locks: &TableLocks,
    source: &dyn FeatureSource,
    table: &SourceTableConfig,
) -> Result<SyncReport, SyncError> {
    let _guard = locks.acquire(&table.name).await;
    Synchronizer::new(store, source, table).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(old: &str, new: &str) -> RemapRow {
        RemapRow {
            old_pcode: old.to_string(),
            new_pcode: new.to_string(),
            matching: true,
        }
    }

    fn retire(old: &str) -> RemapRow {
        RemapRow {
            old_pcode: old.to_string(),
            new_pcode: String::new(),
            matching: false,
        }
    }

    fn codes(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn swap_cycle_is_rewritten_through_temporaries() {
        let plan = resolve_remap(
            &[rename("RWA", "RW"), rename("RW", "RWA")],
            &codes(&["RW", "RWA"]),
        )
        .expect("plan");
        assert_eq!(
            plan.assignments,
            vec![
                pair("RWA", "temp0"),
                pair("RW", "temp1"),
                pair("temp0", "RW"),
                pair("temp1", "RWA"),
            ]
        );
        let targets = plan.final_targets();
        assert_eq!(targets.get("RWA").map(String::as_str), Some("RW"));
        assert_eq!(targets.get("RW").map(String::as_str), Some("RWA"));
        let folded = plan.fold_by_new();
        assert_eq!(folded["RW"], vec!["RWA".to_string()]);
        assert_eq!(folded["RWA"], vec!["RW".to_string()]);
    }

    #[test]
    fn non_matching_rows_retire_without_successor() {
        let plan = resolve_remap(&[retire("RWA")], &codes(&[])).expect("plan");
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.to_deactivate, vec!["RWA".to_string()]);
        assert_eq!(plan.old_pcodes().to_vec(), vec!["RWA".to_string()]);
    }

    #[test]
    fn rename_source_listed_twice_is_invalid() {
        let err = resolve_remap(
            &[rename("RWA", "RW"), rename("RWA", "RW")],
            &codes(&["RW"]),
        )
        .unwrap_err();
        assert!(matches!(err, RemapError::DuplicateOldPcode(code) if code == "RWA"));
    }

    #[test]
    fn rename_target_missing_upstream_fails_closed() {
        let err = resolve_remap(&[rename("RWA", "RW")], &codes(&["PE"])).unwrap_err();
        assert!(matches!(err, RemapError::UnknownNewPcodes(codes) if codes == vec!["RW"]));
    }

    #[test]
    fn self_renames_do_not_absorb_anything() {
        let plan = resolve_remap(&[rename("RW", "RW")], &codes(&["RW"])).expect("plan");
        assert_eq!(plan.assignments, vec![pair("RW", "RW")]);
        assert!(plan.fold_by_new().is_empty());
    }

    #[test]
    fn duplicate_detection_is_per_scope() {
        let local = vec!["RW".to_string(), "RW01".to_string()];
        let incoming = vec!["RW".to_string(), "RW".to_string()];
        let err = ensure_no_duplicate_pcodes(&local, &incoming, &[]).unwrap_err();
        match err {
            SyncError::DuplicatePcodes { scope, codes } => {
                assert_eq!(scope, "incoming p-codes");
                assert_eq!(codes, vec!["RW".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ensure_no_duplicate_pcodes(&local, &local, &[]).is_ok());
    }

    #[test]
    fn registry_parses_cartodb_and_arcgis_tables() {
        let yaml = r#"
tables:
  - name: rwa_admin1
    provider:
      type: cartodb
      domain: unicef
      table_name: rwa_admbnda_adm1
      remap_table: rwa_admin1_remap
    parent_code_col: parent_pcode
    admin_level: 1
    admin_level_name: Province
  - name: rwa_admin2
    provider:
      type: arcgis
      service_url: https://services.arcgis.com/demo/FeatureServer/0
    admin_level: 2
    admin_level_name: District
"#;
        let registry: TableRegistry = serde_yaml::from_str(yaml).expect("registry");
        assert_eq!(registry.tables.len(), 2);
        let carto = registry.table("rwa_admin1").expect("carto table");
        assert!(carto.has_remap_table());
        assert_eq!(carto.pcode_col, "pcode");
        let arcgis = registry.table("rwa_admin2").expect("arcgis table");
        assert!(!arcgis.has_remap_table());
        assert_eq!(arcgis.admin_level, 2);
    }
}
