//! Table definitions and forward migrations

use rusqlite::Connection;

use super::StateResult;

pub const SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> StateResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS containers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            image_ref TEXT NOT NULL,
            image_id TEXT NOT NULL,
            spec_json TEXT NOT NULL,
            host_config_json TEXT NOT NULL,
            phase TEXT NOT NULL,
            exit_code INTEGER,
            started_at TEXT,
            finished_at TEXT,
            created_at TEXT NOT NULL,
            labels_json TEXT NOT NULL,
            restart_policy_json TEXT NOT NULL,
            manual_stopped INTEGER NOT NULL DEFAULT 0,
            health_json TEXT
        );

        CREATE TABLE IF NOT EXISTS container_networks (
            container_id TEXT NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
            network_id TEXT NOT NULL,
            ipv4 TEXT,
            mac TEXT,
            aliases_json TEXT NOT NULL,
            endpoint_id TEXT NOT NULL,
            PRIMARY KEY (container_id, network_id)
        );

        CREATE TABLE IF NOT EXISTS container_mounts (
            container_id TEXT NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            kind TEXT NOT NULL,
            options_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS networks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            subnet TEXT NOT NULL,
            gateway TEXT NOT NULL,
            range TEXT,
            labels_json TEXT NOT NULL,
            meta_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ip_allocations (
            network_id TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
            ip TEXT NOT NULL,
            owner_container_id TEXT NOT NULL,
            PRIMARY KEY (network_id, ip)
        );

        CREATE TABLE IF NOT EXISTS volumes (
            name TEXT PRIMARY KEY,
            driver TEXT NOT NULL,
            mountpoint TEXT NOT NULL,
            labels_json TEXT NOT NULL,
            options_json TEXT NOT NULL,
            anonymous INTEGER NOT NULL DEFAULT 0,
            refcount INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS port_mappings (
            container_id TEXT NOT NULL,
            host_ip TEXT NOT NULL,
            host_port INTEGER NOT NULL,
            proto TEXT NOT NULL,
            container_port INTEGER NOT NULL,
            PRIMARY KEY (host_ip, host_port, proto)
        );

        CREATE TABLE IF NOT EXISTS subnet_allocator (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            last_assigned TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_port_mappings_container
            ON port_mappings(container_id);
        "#,
    )?;

    let version: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |r| r.get(0))
        .ok();

    match version {
        None => {
            conn.execute("INSERT INTO meta (version) VALUES (?1)", [SCHEMA_VERSION])?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            // Future migrations land here as idempotent ALTER/UPDATE steps.
            conn.execute("UPDATE meta SET version = ?1", [SCHEMA_VERSION])?;
        }
        _ => {}
    }

    conn.execute(
        "INSERT OR IGNORE INTO subnet_allocator (id, last_assigned) VALUES (0, NULL)",
        [],
    )?;

    Ok(())
}
