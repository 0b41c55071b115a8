//! SQLite backend implementation.
//!
//! Implements every store trait on top of an `r2d2` pool of `rusqlite`
//! connections. Works with file databases and with `:memory:` (a single
//! pooled connection is kept alive so the in-memory database survives).
//!
//! # Example
//!
//! ```no_run
//! use cam_servicetree::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::open("./servicetree.db")?;
//! backend.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE nodes (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     uid TEXT,
//!     name TEXT NOT NULL,
//!     parent_id INTEGER NOT NULL DEFAULT 0,
//!     level INTEGER NOT NULL,
//!     path TEXT NOT NULL DEFAULT '',
//!     tenant_id TEXT NOT NULL,
//!     ...
//! );
//! CREATE UNIQUE INDEX idx_nodes_tenant_uid ON nodes(tenant_id, uid) WHERE uid IS NOT NULL;
//!
//! CREATE TABLE bindings (...);
//! CREATE UNIQUE INDEX idx_bindings_resource ON bindings(tenant_id, resource_type, resource_id);
//!
//! CREATE TABLE rules (...);   -- conditions stored as a JSON array
//! CREATE TABLE environments (...);
//! CREATE UNIQUE INDEX idx_environments_code ON environments(tenant_id, code);
//! ```

mod backend;
mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
