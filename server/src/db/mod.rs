//! Database module for PostgreSQL persistence.

mod pool;
mod trees;

pub use pool::*;
pub use trees::*;
