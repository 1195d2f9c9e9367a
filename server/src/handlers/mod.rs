//! Request handlers for reconciliation and migration.

mod migrate;
mod reconcile;

pub use migrate::*;
pub use reconcile::*;
