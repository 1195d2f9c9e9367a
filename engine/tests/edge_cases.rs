//! Edge case tests for orchard-engine
//!
//! These tests drive the engine through its public API with in-memory and
//! hand-written sources, covering unusual record shapes and store failures.

use async_trait::async_trait;
use orchard_engine::{
    source::{collect_pages, Page},
    CancellationToken, CloudStore, ComparePolicy, CreateOutcome, Error, FieldValue, GeoPoint, MemoryStore, RawTreeRecord, ReconcileEngine,
    RecordSource, SkipReason, SourceError, SourceOrigin, TimePoint, TreeRecord, WriteError,
};
use orchard_engine::MigrationOptions;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn tree(id: &str, origin: SourceOrigin) -> TreeRecord {
    TreeRecord::new(id, "farm-1", 1000, origin).with_field("name", id)
}

fn raw(origin: SourceOrigin, value: serde_json::Value) -> TreeRecord {
    serde_json::from_value::<RawTreeRecord>(value)
        .unwrap()
        .normalize(origin)
        .unwrap()
}

/// A source that returns whatever it was built with, regardless of farm.
struct FixedSource(Vec<TreeRecord>);

#[async_trait]
impl RecordSource for FixedSource {
    async fn fetch_farm(&self, _farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        Ok(self.0.clone())
    }

    async fn fetch_one(&self, _farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        Ok(self.0.iter().find(|r| r.id == id).cloned())
    }
}

// ============================================================================
// Reconcile and Migrate Scenarios
// ============================================================================

#[tokio::test]
async fn mobile_only_record_is_migrated_once() {
    let mobile = MemoryStore::with_records(vec![
        tree("T1", SourceOrigin::Mobile),
        tree("T2", SourceOrigin::Mobile),
    ]);
    let cloud = MemoryStore::with_records(vec![
        tree("T1", SourceOrigin::Cloud),
        tree("T3", SourceOrigin::Cloud),
    ]);
    let engine = ReconcileEngine::new(mobile, cloud);

    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.is_matched("T1"));
    assert_eq!(report.only_in_mobile, vec!["T2"]);
    assert_eq!(report.only_in_cloud, vec!["T3"]);
    assert_eq!(report.summary.trees_to_migrate, 1);

    let first = engine.migrate("farm-1", vec!["T2".to_string()]).await.unwrap();
    assert_eq!(first.migrated, vec!["T2"]);

    let second = engine.migrate("farm-1", vec!["T2".to_string()]).await.unwrap();
    assert!(second.migrated.is_empty());
    assert_eq!(second.skipped[0].reason, SkipReason::AlreadyInCloud);
    assert_eq!(engine.cloud().write_count(), 1);

    let after = engine.reconcile("farm-1").await.unwrap();
    assert!(after.is_matched("T2"));
    assert_eq!(after.only_in_cloud, vec!["T3"]);
}

#[tokio::test]
async fn conflicting_record_is_reported_not_resolved() {
    let mobile = MemoryStore::with_records(vec![
        TreeRecord::new("T4", "farm-1", 1000, SourceOrigin::Mobile).with_field("fruitCount", 10.0),
    ]);
    let cloud = MemoryStore::with_records(vec![
        TreeRecord::new("T4", "farm-1", 2000, SourceOrigin::Cloud).with_field("fruitCount", 12.0),
    ]);
    let engine = ReconcileEngine::new(mobile, cloud);

    let report = engine.reconcile("farm-1").await.unwrap();
    let conflict = report.conflict("T4").unwrap();
    assert_eq!(conflict.diffs.len(), 1);
    assert_eq!(conflict.newer_side, Some(SourceOrigin::Cloud));
    assert!(report.only_in_mobile.is_empty());

    // Migrating the conflicted id explicitly still leaves the cloud copy alone.
    let outcome = engine.migrate("farm-1", vec!["T4".to_string()]).await.unwrap();
    assert_eq!(outcome.skipped_ids(), vec!["T4"]);
    assert_eq!(
        engine.cloud().get("farm-1", "T4").unwrap().field("fruitCount"),
        Some(&FieldValue::Number(12.0))
    );
}

#[tokio::test]
async fn gps_jitter_within_tolerance_matches() {
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T5", "farmId": "farm-1", "fields": {"gps": {"latitude": 10.762622, "longitude": 106.660172}}}),
    );
    let cloud = raw(
        SourceOrigin::Cloud,
        json!({"id": "T5", "farmId": "farm-1", "fields": {"gps": {"lat": 10.76262201, "lng": 106.660172}}}),
    );
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![mobile]),
        MemoryStore::with_records(vec![cloud]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.conflicts.is_empty());
    assert!(report.matched[0].within_tolerance);
}

#[tokio::test]
async fn gps_outside_tolerance_conflicts() {
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![
            tree("T5", SourceOrigin::Mobile).with_field("gps", GeoPoint::new(10.7626, 106.6601))
        ]),
        MemoryStore::with_records(vec![
            tree("T5", SourceOrigin::Cloud).with_field("gps", GeoPoint::new(10.7627, 106.6601))
        ]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.conflict("T5").unwrap().diff("gps").is_some());
}

#[tokio::test]
async fn custom_tolerance_widens_matching() {
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![tree("T6", SourceOrigin::Mobile).with_field("height", 2.50)]),
        MemoryStore::with_records(vec![tree("T6", SourceOrigin::Cloud).with_field("height", 2.51)]),
    )
    .with_policy(ComparePolicy::default().with_float_epsilon(0.05));

    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.is_matched("T6"));
}

// ============================================================================
// Field Shape Edge Cases
// ============================================================================

#[tokio::test]
async fn timestamp_shapes_normalize_to_same_value() {
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T7", "farmId": "farm-1", "fields": {"plantedAt": {"seconds": 1700000000, "nanoseconds": 500000000}}}),
    );
    let cloud = raw(
        SourceOrigin::Cloud,
        json!({"id": "T7", "farmId": "farm-1", "fields": {"plantedAt": {"_seconds": 1700000000, "_nanoseconds": 500000000}}}),
    );
    assert_eq!(
        mobile.field("plantedAt"),
        Some(&FieldValue::Timestamp(TimePoint::new(1_700_000_000, 500_000_000)))
    );

    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![mobile]),
        MemoryStore::with_records(vec![cloud]),
    );
    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.is_matched("T7"));
    assert!(!report.matched[0].within_tolerance);
}

#[tokio::test]
async fn timestamps_within_one_millisecond_still_conflict() {
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T1", "farmId": "farm-1", "fields": {"inspectedAt": {"seconds": 1706745600, "nanoseconds": 1000}}}),
    );
    let cloud = raw(
        SourceOrigin::Cloud,
        json!({"id": "T1", "farmId": "farm-1", "fields": {"inspectedAt": {"_seconds": 1706745600, "_nanoseconds": 999000}}}),
    );
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![mobile]),
        MemoryStore::with_records(vec![cloud]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    assert!(report.matched.is_empty());
    assert!(report.conflict("T1").unwrap().diff("inspectedAt").is_some());
}

#[tokio::test]
async fn large_integers_differing_by_one_conflict() {
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T1", "farmId": "farm-1", "fields": {"sensorSerial": 9007199254740993u64}}),
    );
    let cloud = raw(
        SourceOrigin::Cloud,
        json!({"id": "T1", "farmId": "farm-1", "fields": {"sensorSerial": 9007199254740992u64}}),
    );
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![mobile]),
        MemoryStore::with_records(vec![cloud]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    assert_eq!(report.summary.trees_with_conflicts, 1);
}

#[tokio::test]
async fn migration_writes_mobile_document_unchanged() {
    let document = json!({
        "fruitCount": 12,
        "gps": {"latitude": 10.5, "longitude": 106.25},
        "plantedAt": {"_seconds": 1706745600, "_nanoseconds": 123456789},
        "sensorSerial": 9007199254740993u64
    });
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T1", "farmId": "farm-1", "updatedAt": 1000, "fields": document.clone()}),
    );
    let engine = ReconcileEngine::new(MemoryStore::with_records(vec![mobile]), MemoryStore::new());

    let outcome = engine.migrate("farm-1", vec!["T1".to_string()]).await.unwrap();
    assert_eq!(outcome.migrated, vec!["T1"]);

    let stored = engine.cloud().get("farm-1", "T1").unwrap();
    let written = RawTreeRecord::from_record(&stored);
    assert_eq!(
        serde_json::to_string(&written.fields).unwrap(),
        serde_json::to_string(&document).unwrap()
    );
    assert!(engine.reconcile("farm-1").await.unwrap().is_clean());
}

#[tokio::test]
async fn null_field_equals_missing_field() {
    let mobile = raw(
        SourceOrigin::Mobile,
        json!({"id": "T8", "farmId": "farm-1", "fields": {"name": "Cay", "note": null}}),
    );
    let cloud = raw(
        SourceOrigin::Cloud,
        json!({"id": "T8", "farmId": "farm-1", "fields": {"name": "Cay"}}),
    );
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![mobile]),
        MemoryStore::with_records(vec![cloud]),
    );

    assert!(engine.reconcile("farm-1").await.unwrap().is_clean());
}

#[tokio::test]
async fn field_missing_on_one_side_conflicts() {
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![tree("T9", SourceOrigin::Mobile).with_field("variety", "Ri6")]),
        MemoryStore::with_records(vec![tree("T9", SourceOrigin::Cloud)]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    let diff = report.conflict("T9").unwrap().diff("variety").unwrap();
    assert_eq!(diff.mobile, Some(FieldValue::from("Ri6")));
    assert_eq!(diff.cloud, None);
}

#[test]
fn nested_values_are_rejected() {
    let result = serde_json::from_value::<RawTreeRecord>(
        json!({"id": "T1", "farmId": "farm-1", "fields": {"tags": ["a", "b"]}}),
    )
    .unwrap()
    .normalize(SourceOrigin::Mobile);

    assert!(matches!(
        result,
        Err(Error::UnsupportedFieldValue { ref field, .. }) if field == "tags"
    ));
}

#[tokio::test]
async fn ids_with_special_characters() {
    let ids = ["cây-01", "tree/with/slashes", "tree with spaces", "🌳"];
    let mobile = MemoryStore::with_records(ids.iter().map(|id| tree(id, SourceOrigin::Mobile)));
    let engine = ReconcileEngine::new(mobile, MemoryStore::new());

    let outcome = engine.migrate_pending("farm-1").await.unwrap();
    assert_eq!(outcome.migrated.len(), ids.len());
    for id in ids {
        assert!(engine.cloud().get("farm-1", id).is_some(), "missing {}", id);
    }
}

#[tokio::test]
async fn ids_are_case_sensitive() {
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![tree("tree-a", SourceOrigin::Mobile)]),
        MemoryStore::with_records(vec![tree("TREE-A", SourceOrigin::Cloud)]),
    );

    let report = engine.reconcile("farm-1").await.unwrap();
    assert_eq!(report.only_in_mobile, vec!["tree-a"]);
    assert_eq!(report.only_in_cloud, vec!["TREE-A"]);
}

// ============================================================================
// Store Failures
// ============================================================================

#[tokio::test]
async fn cloud_fetch_failure_fails_closed() {
    let cloud = MemoryStore::with_records(vec![tree("T1", SourceOrigin::Cloud)]);
    cloud.fail_fetches_with("deadline exceeded");
    let engine = ReconcileEngine::new(
        MemoryStore::with_records(vec![tree("T1", SourceOrigin::Mobile)]),
        cloud,
    );

    let err = engine.reconcile("farm-1").await.unwrap_err();
    assert_eq!(
        err,
        Error::FetchFailure {
            origin: SourceOrigin::Cloud,
            message: "deadline exceeded".into(),
        }
    );

    // A failed read must not turn into "migrate everything".
    assert!(engine.migrate_pending("farm-1").await.is_err());
    assert_eq!(engine.cloud().write_count(), 0);
}

#[tokio::test]
async fn foreign_record_aborts_reconciliation() {
    let stray = TreeRecord::new("T1", "farm-2", 1000, SourceOrigin::Mobile);
    let engine = ReconcileEngine::new(FixedSource(vec![stray]), MemoryStore::new());

    let err = engine.reconcile("farm-1").await.unwrap_err();
    assert!(matches!(err, Error::ForeignRecord { ref found, .. } if found == "farm-2"));
}

#[tokio::test]
async fn duplicate_ids_abort_reconciliation() {
    let engine = ReconcileEngine::new(
        FixedSource(vec![tree("T1", SourceOrigin::Mobile), tree("T1", SourceOrigin::Mobile)]),
        MemoryStore::new(),
    );

    let err = engine.reconcile("farm-1").await.unwrap_err();
    assert_eq!(
        err,
        Error::DuplicateRecordId {
            origin: SourceOrigin::Mobile,
            id: "T1".into(),
        }
    );
}

#[tokio::test]
async fn partial_write_failure_is_retryable() {
    let mobile = MemoryStore::with_records(vec![
        tree("a", SourceOrigin::Mobile),
        tree("b", SourceOrigin::Mobile),
    ]);
    let cloud = MemoryStore::new();
    cloud.fail_writes_for("b", WriteError::Transient("connection reset".into()));
    let engine = ReconcileEngine::new(mobile, cloud);

    let first = engine.migrate_pending("farm-1").await.unwrap();
    assert_eq!(first.migrated, vec!["a"]);
    assert!(first.is_partial_failure());

    engine.cloud().clear_write_failures();
    let retry = engine.migrate("farm-1", first.retryable_ids()).await.unwrap();
    assert_eq!(retry.migrated, vec!["b"]);
    assert!(engine.reconcile("farm-1").await.unwrap().is_clean());
}

/// A cloud store that cancels the run once it has accepted `cancel_after`
/// writes.
struct CancellingCloud {
    store: MemoryStore,
    cancel: CancellationToken,
    cancel_after: usize,
    accepted: AtomicUsize,
}

#[async_trait]
impl RecordSource for CancellingCloud {
    async fn fetch_farm(&self, farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        self.store.fetch_farm(farm_id).await
    }

    async fn fetch_one(&self, farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        self.store.fetch_one(farm_id, id).await
    }
}

#[async_trait]
impl CloudStore for CancellingCloud {
    async fn create_if_absent(&self, record: &TreeRecord) -> Result<CreateOutcome, WriteError> {
        let outcome = self.store.create_if_absent(record).await?;
        if self.accepted.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
            self.cancel.cancel();
        }
        Ok(outcome)
    }
}

#[tokio::test]
async fn cancellation_between_records_leaves_rest_pending() {
    let ids: Vec<String> = (0..5).map(|i| format!("t{}", i)).collect();
    let mobile = MemoryStore::with_records(ids.iter().map(|id| tree(id, SourceOrigin::Mobile)));
    let cancel = CancellationToken::new();
    let cloud = CancellingCloud {
        store: MemoryStore::new(),
        cancel: cancel.clone(),
        cancel_after: 2,
        accepted: AtomicUsize::new(0),
    };
    let engine = ReconcileEngine::new(mobile, cloud)
        .with_migration_options(MigrationOptions { concurrency: 1 });

    let outcome = engine
        .migrate_with_cancel("farm-1", ids.clone(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.migrated, vec!["t0", "t1"]);
    assert_eq!(outcome.cancelled, vec!["t2", "t3", "t4"]);
    assert_eq!(
        outcome.migrated.len() + outcome.cancelled.len(),
        outcome.attempted.len()
    );
    assert_eq!(engine.cloud().store.write_count(), 2);

    let report = engine.reconcile("farm-1").await.unwrap();
    assert_eq!(report.only_in_mobile, outcome.cancelled);
    assert_eq!(outcome.retryable_ids(), outcome.cancelled);

    let resumed = engine.migrate("farm-1", outcome.retryable_ids()).await.unwrap();
    assert_eq!(resumed.migrated, vec!["t2", "t3", "t4"]);
    assert!(engine.reconcile("farm-1").await.unwrap().is_clean());
}

#[tokio::test]
async fn concurrent_runs_share_one_cloud() {
    let mobile = Arc::new(MemoryStore::with_records(
        (0..25).map(|i| tree(&format!("t{:02}", i), SourceOrigin::Mobile)),
    ));
    let cloud = Arc::new(MemoryStore::new());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = ReconcileEngine::new(mobile.clone(), cloud.clone());
        handles.push(tokio::spawn(async move {
            engine.migrate_pending("farm-1").await.unwrap()
        }));
    }

    let mut migrated = 0;
    for handle in handles {
        migrated += handle.await.unwrap().migrated.len();
    }
    assert_eq!(migrated, 25);
    assert_eq!(cloud.write_count(), 25);
}

// ============================================================================
// Paginated Sources
// ============================================================================

/// A source that serves its records in fixed-size pages keyed by the last id,
/// optionally failing one page.
struct PagedSource {
    records: Vec<TreeRecord>,
    page_size: usize,
    fail_after: Option<String>,
}

impl PagedSource {
    fn page(&self, after: Option<String>) -> Result<Page, SourceError> {
        if after.is_some() && after == self.fail_after {
            return Err(SourceError::new("page read timed out"));
        }
        let start = match &after {
            Some(id) => self.records.iter().position(|r| &r.id == id).map_or(0, |i| i + 1),
            None => 0,
        };
        let records: Vec<TreeRecord> = self.records.iter().skip(start).take(self.page_size).cloned().collect();
        let next_cursor = if start + records.len() < self.records.len() {
            records.last().map(|r| r.id.clone())
        } else {
            None
        };
        Ok(Page {
            records,
            next_cursor,
        })
    }
}

#[async_trait]
impl RecordSource for PagedSource {
    async fn fetch_farm(&self, _farm_id: &str) -> Result<Vec<TreeRecord>, SourceError> {
        collect_pages(|cursor| {
            let page = self.page(cursor);
            async move { page }
        })
        .await
    }

    async fn fetch_one(&self, _farm_id: &str, id: &str) -> Result<Option<TreeRecord>, SourceError> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }
}

fn paged(count: usize, fail_after: Option<&str>) -> PagedSource {
    PagedSource {
        records: (0..count)
            .map(|i| tree(&format!("t{:02}", i), SourceOrigin::Cloud))
            .collect(),
        page_size: 3,
        fail_after: fail_after.map(String::from),
    }
}

#[tokio::test]
async fn paginated_cloud_is_read_completely() {
    let mobile = MemoryStore::with_records((0..10).map(|i| tree(&format!("t{:02}", i), SourceOrigin::Mobile)));
    let engine = ReconcileEngine::new(mobile, paged(10, None));

    let report = engine.reconcile("farm-1").await.unwrap();
    assert_eq!(report.summary.trees_matched, 10);
    assert!(report.only_in_mobile.is_empty());
}

#[tokio::test]
async fn failed_page_fails_the_whole_read() {
    let mobile = MemoryStore::with_records((0..10).map(|i| tree(&format!("t{:02}", i), SourceOrigin::Mobile)));
    let engine = ReconcileEngine::new(mobile, paged(10, Some("t05")));

    let err = engine.reconcile("farm-1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::FetchFailure {
            origin: SourceOrigin::Cloud,
            ..
        }
    ));
}
