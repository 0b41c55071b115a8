//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::ServiceTreeResult;

use super::backend::internal_error;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> ServiceTreeResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate_schema(conn, 1)?;
    } else if current_version < SCHEMA_VERSION {
        migrate_schema(conn, current_version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> ServiceTreeResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| internal_error(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> ServiceTreeResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| internal_error(format!("Failed to clear schema_version: {}", e)))?;

    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| internal_error(format!("Failed to set schema_version: {}", e)))?;

    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> ServiceTreeResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid TEXT,
            name TEXT NOT NULL,
            parent_id INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1,
            path TEXT NOT NULL DEFAULT '',
            tenant_id TEXT NOT NULL,
            owner TEXT NOT NULL DEFAULT '',
            team TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            sort_order INTEGER NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 1,
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bindings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL,
            env_id INTEGER NOT NULL DEFAULT 0,
            resource_type TEXT NOT NULL,
            resource_id INTEGER NOT NULL,
            tenant_id TEXT NOT NULL,
            bind_type TEXT NOT NULL,
            rule_id INTEGER,
            create_time TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL,
            env_id INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            conditions TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            description TEXT NOT NULL DEFAULT '',
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS environments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 1,
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL
        );",
    )
    .map_err(|e| internal_error(format!("Failed to create tables: {}", e)))?;

    create_indexes(conn)
}

/// Create indexes, including the uniqueness constraints the services rely on.
fn create_indexes(conn: &Connection) -> ServiceTreeResult<()> {
    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_tenant_uid
            ON nodes(tenant_id, uid) WHERE uid IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_nodes_tenant_path ON nodes(tenant_id, path);
        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_resource
            ON bindings(tenant_id, resource_type, resource_id);
        CREATE INDEX IF NOT EXISTS idx_bindings_node_env ON bindings(node_id, env_id);
        CREATE INDEX IF NOT EXISTS idx_bindings_rule ON bindings(rule_id);

        CREATE INDEX IF NOT EXISTS idx_rules_tenant_priority
            ON rules(tenant_id, enabled, priority);
        CREATE INDEX IF NOT EXISTS idx_rules_node ON rules(node_id);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_environments_code
            ON environments(tenant_id, code);",
    )
    .map_err(|e| internal_error(format!("Failed to create indexes: {}", e)))
}

/// Run migrations from `from_version` to [`SCHEMA_VERSION`].
fn migrate_schema(conn: &Connection, from_version: i32) -> ServiceTreeResult<()> {
    let mut version = from_version;
    while version < SCHEMA_VERSION {
        // No migrations yet; future versions add a migrate_vN_to_vN+1 step here.
        version += 1;
        set_schema_version(conn, version)?;
    }
    Ok(())
}
