//! Network and IP-allocation persistence

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{StateError, StateResult, StateStore};

#[derive(Debug, Clone)]
pub struct NetworkRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub subnet: String,
    pub gateway: String,
    pub range: Option<String>,
    pub labels_json: Value,
    pub meta_json: Value,
}

#[derive(Debug, Clone)]
pub struct IpAllocationRow {
    pub network_id: String,
    pub ip: String,
    pub owner_container_id: String,
}

fn row_to_network(row: &Row<'_>) -> rusqlite::Result<NetworkRow> {
    let labels: String = row.get(6)?;
    let meta: String = row.get(7)?;
    Ok(NetworkRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        subnet: row.get(3)?,
        gateway: row.get(4)?,
        range: row.get(5)?,
        labels_json: serde_json::from_str(&labels)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?,
        meta_json: serde_json::from_str(&meta)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}

const NETWORK_COLUMNS: &str = "id, name, kind, subnet, gateway, range, labels_json, meta_json";

impl StateStore {
    pub fn insert_network(&self, row: &NetworkRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO networks ({NETWORK_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)"),
                params![
                    row.id,
                    row.name,
                    row.kind,
                    row.subnet,
                    row.gateway,
                    row.range,
                    row.labels_json.to_string(),
                    row.meta_json.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_network(&self, id: &str) -> StateResult<Option<NetworkRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE id = ?1"),
                [id],
                row_to_network,
            )
            .optional()
            .map_err(StateError::from)
        })
    }

    pub fn get_network_by_name(&self, name: &str) -> StateResult<Option<NetworkRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE name = ?1"),
                [name],
                row_to_network,
            )
            .optional()
            .map_err(StateError::from)
        })
    }

    pub fn list_networks(&self) -> StateResult<Vec<NetworkRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {NETWORK_COLUMNS} FROM networks"))?;
            let rows = stmt
                .query_map([], row_to_network)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn delete_network(&self, id: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM networks WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn insert_ip_allocation(&self, row: &IpAllocationRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ip_allocations (network_id, ip, owner_container_id) VALUES (?1,?2,?3)",
                params![row.network_id, row.ip, row.owner_container_id],
            )?;
            Ok(())
        })
    }

    pub fn release_ip_allocation(&self, network_id: &str, ip: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM ip_allocations WHERE network_id = ?1 AND ip = ?2",
                params![network_id, ip],
            )?;
            Ok(())
        })
    }

    pub fn list_ip_allocations(&self, network_id: &str) -> StateResult<Vec<IpAllocationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT network_id, ip, owner_container_id FROM ip_allocations WHERE network_id = ?1",
            )?;
            let rows = stmt
                .query_map([network_id], |row| {
                    Ok(IpAllocationRow {
                        network_id: row.get(0)?,
                        ip: row.get(1)?,
                        owner_container_id: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Sequential /16 allocator over the 172.16.0.0/12 range (spec §4.4).
    pub fn next_subnet_candidate(&self) -> StateResult<Option<String>> {
        self.with_conn(|conn| {
            let last: Option<String> = conn
                .query_row("SELECT last_assigned FROM subnet_allocator WHERE id = 0", [], |r| r.get(0))
                .optional()?
                .flatten();
            Ok(last)
        })
    }

    pub fn record_subnet_assigned(&self, subnet: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE subnet_allocator SET last_assigned = ?1 WHERE id = 0",
                [subnet],
            )?;
            Ok(())
        })
    }
}
