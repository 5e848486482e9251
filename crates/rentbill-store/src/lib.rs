//! # Rentbill Store
//!
//! Implementations of the ledger gateway and the settings store.
//!
//! - [`memory`]: process-local backend on `DashMap`, used by tests and
//!   single-node deployments without Redis
//! - [`redis_store`]: Redis backend; orders as JSON documents, wallets as
//!   integer keys mutated with `INCRBY`
//! - [`migrate`]: versioned upgrade of persisted order records, run once at
//!   startup

pub mod memory;
pub mod migrate;
pub mod redis_store;

pub use memory::{InMemoryLedger, InMemorySettings};
pub use migrate::{run_migrations, MigrationReport, MigrationTarget, CURRENT_SCHEMA_VERSION};
pub use redis_store::{RedisLedger, RedisSettings};
