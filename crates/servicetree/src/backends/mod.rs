//! Storage backend implementations.
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | Process-local maps, for tests and tooling |
//! | SQLite | `sqlite` | Embedded database with a versioned schema |
//!
//! Both backends implement every store trait from [`crate::core`] and
//! enforce the same uniqueness constraints.
//!
//! # Example
//!
//! ```no_run
//! use cam_servicetree::backends::memory::MemoryBackend;
//! # #[cfg(feature = "sqlite")]
//! use cam_servicetree::backends::sqlite::SqliteBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let memory = MemoryBackend::new();
//!
//! let sqlite = SqliteBackend::open("./data/servicetree.db")?;
//! sqlite.init_schema()?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
