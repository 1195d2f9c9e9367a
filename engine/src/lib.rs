//! # Orchard Engine
//!
//! Reconciliation and migration of tree records held in two independently
//! mutated stores: the offline-capable mobile store and the canonical cloud
//! document store.
//!
//! The engine compares both copies of a farm's tree inventory, classifies
//! every record, and copies records that only exist on the mobile side into
//! the cloud without overwriting or duplicating anything.
//!
//! ## Design Principles
//!
//! - **Exact identity**: records pair by id only, never by name or GPS proximity
//! - **No silent resolution**: conflicting records are reported, never merged
//! - **Fail closed**: a failed fetch aborts the run instead of producing a one-sided report
//! - **Create-only writes**: migration never overwrites a cloud record
//! - **No global state**: every run is scoped to one farm and one engine value
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`TreeRecord`] carries an id, its farm, a flat map of typed
//! [`FieldValue`]s, a last-modified timestamp and its [`SourceOrigin`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] pairs two [`RecordSet`]s by id and classifies each pair
//! with a [`ComparePolicy`]:
//! - [`Classification::Identical`] / [`Classification::Equivalent`] - matched
//! - [`Classification::Conflict`] - at least one field differs
//! - [`Classification::OnlyInMobile`] - migration candidate
//! - [`Classification::OnlyInCloud`]
//!
//! ### Migration
//!
//! The [`MigrationExecutor`] writes mobile-only records into a [`CloudStore`]
//! with create-if-absent semantics. Cloud-side existence is the idempotency
//! token, so re-running a migration reports `skipped` instead of writing twice.
//!
//! ## Quick Start
//!
//! ```rust
//! use orchard_engine::{
//!     ComparePolicy, FieldValue, Reconciler, RecordSet, SourceOrigin, TreeRecord,
//! };
//!
//! let mobile = vec![
//!     TreeRecord::new("t1", "farm-1", 1000, SourceOrigin::Mobile)
//!         .with_field("name", FieldValue::String("Cay A".into())),
//!     TreeRecord::new("t2", "farm-1", 1000, SourceOrigin::Mobile)
//!         .with_field("name", FieldValue::String("Cay B".into())),
//! ];
//! let cloud = vec![TreeRecord::new("t1", "farm-1", 2000, SourceOrigin::Cloud)
//!     .with_field("name", FieldValue::String("Cay A".into()))];
//!
//! let mobile = RecordSet::from_records(SourceOrigin::Mobile, "farm-1", mobile).unwrap();
//! let cloud = RecordSet::from_records(SourceOrigin::Cloud, "farm-1", cloud).unwrap();
//!
//! let result = Reconciler::new(ComparePolicy::default()).compare("farm-1", &mobile, &cloud);
//! assert_eq!(result.summary.trees_matched, 1);
//! assert_eq!(result.only_in_mobile, vec!["t2".to_string()]);
//! assert_eq!(result.summary.trees_to_migrate, 1);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module exposes the pure comparison to the mobile client through
//! C-compatible functions. All data is exchanged as JSON strings.

pub mod diff;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod guard;
pub mod identity;
pub mod memory;
pub mod migration;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod source;
pub mod value;

// Re-export main types at crate root
pub use diff::{Classification, ComparePolicy, Equality, FieldDiff, DEFAULT_FLOAT_EPSILON};
pub use engine::ReconcileEngine;
pub use error::{Error, SourceError, WriteError};
pub use guard::GuardDecision;
pub use identity::Resolved;
pub use memory::MemoryStore;
pub use migration::{
    FailureKind, MigrationExecutor, MigrationFailure, MigrationOptions, MigrationOutcome,
    SkipReason, SkippedRecord,
};
pub use reconcile::Reconciler;
pub use record::{RawTreeRecord, RecordSet, SourceOrigin, TreeRecord};
pub use report::{ConflictEntry, MatchedTree, ReconciliationResult, ReportBuilder, Summary};
pub use source::{CloudStore, CreateOutcome, Page, RecordSource};
pub use value::{FieldValue, GeoPoint, TimePoint};

/// Re-exported so callers can cancel migrations without a direct dependency.
pub use tokio_util::sync::CancellationToken;

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Type aliases for clarity
pub type RecordId = String;
pub type FarmId = String;
pub type FieldName = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;
