//! Container, network-attachment, mount, and port-mapping persistence

use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde_json::Value;

use super::{StateError, StateResult, StateStore};

#[derive(Debug, Clone)]
pub struct ContainerRow {
    pub id: String,
    pub name: String,
    pub image_ref: String,
    pub image_id: String,
    pub spec_json: Value,
    pub host_config_json: Value,
    pub phase: String,
    pub exit_code: Option<i64>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub labels_json: Value,
    pub restart_policy_json: Value,
    pub manual_stopped: bool,
    pub health_json: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NetworkAttachmentRow {
    pub container_id: String,
    pub network_id: String,
    pub ipv4: Option<String>,
    pub mac: Option<String>,
    pub aliases_json: Value,
    pub endpoint_id: String,
}

#[derive(Debug, Clone)]
pub struct MountRow {
    pub container_id: String,
    pub source: String,
    pub target: String,
    pub kind: String,
    pub options_json: Value,
}

#[derive(Debug, Clone)]
pub struct PortMappingRow {
    pub container_id: String,
    pub host_ip: String,
    pub host_port: u16,
    pub proto: String,
    pub container_port: u16,
}

fn row_to_container(row: &Row<'_>) -> rusqlite::Result<ContainerRow> {
    let json_col = |idx: usize| -> rusqlite::Result<Value> {
        let text: String = row.get(idx)?;
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
    };
    let opt_json_col = |idx: usize| -> rusqlite::Result<Option<Value>> {
        let text: Option<String> = row.get(idx)?;
        match text {
            Some(t) => Ok(Some(serde_json::from_str(&t).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            })?)),
            None => Ok(None),
        }
    };

    Ok(ContainerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        image_ref: row.get(2)?,
        image_id: row.get(3)?,
        spec_json: json_col(4)?,
        host_config_json: json_col(5)?,
        phase: row.get(6)?,
        exit_code: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
        created_at: row.get(10)?,
        labels_json: json_col(11)?,
        restart_policy_json: json_col(12)?,
        manual_stopped: row.get::<_, i64>(13)? != 0,
        health_json: opt_json_col(14)?,
    })
}

const CONTAINER_COLUMNS: &str = "id, name, image_ref, image_id, spec_json, host_config_json, \
    phase, exit_code, started_at, finished_at, created_at, labels_json, \
    restart_policy_json, manual_stopped, health_json";

impl StateStore {
    pub fn insert_container(&self, row: &ContainerRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO containers ({CONTAINER_COLUMNS}) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"
                ),
                params![
                    row.id,
                    row.name,
                    row.image_ref,
                    row.image_id,
                    row.spec_json.to_string(),
                    row.host_config_json.to_string(),
                    row.phase,
                    row.exit_code,
                    row.started_at,
                    row.finished_at,
                    row.created_at,
                    row.labels_json.to_string(),
                    row.restart_policy_json.to_string(),
                    row.manual_stopped as i64,
                    row.health_json.as_ref().map(|v| v.to_string()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_container(&self, id: &str) -> StateResult<Option<ContainerRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = ?1"),
                [id],
                row_to_container,
            )
            .optional()
            .map_err(StateError::from)
        })
    }

    pub fn get_container_by_name(&self, name: &str) -> StateResult<Option<ContainerRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONTAINER_COLUMNS} FROM containers WHERE name = ?1"),
                [name],
                row_to_container,
            )
            .optional()
            .map_err(StateError::from)
        })
    }

    pub fn list_containers(&self) -> StateResult<Vec<ContainerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {CONTAINER_COLUMNS} FROM containers"))?;
            let rows = stmt
                .query_map([], row_to_container)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn update_container_phase(
        &self,
        id: &str,
        phase: &str,
        exit_code: Option<i64>,
        started_at: Option<&str>,
        finished_at: Option<&str>,
    ) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET phase = ?2, exit_code = ?3, started_at = COALESCE(?4, started_at), finished_at = ?5 WHERE id = ?1",
                params![id, phase, exit_code, started_at, finished_at],
            )?;
            Ok(())
        })
    }

    pub fn set_manual_stopped(&self, id: &str, value: bool) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET manual_stopped = ?2 WHERE id = ?1",
                params![id, value as i64],
            )?;
            Ok(())
        })
    }

    pub fn update_container_health(&self, id: &str, health_json: &Value) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET health_json = ?2 WHERE id = ?1",
                params![id, health_json.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn update_container_host_config(&self, id: &str, host_config_json: &Value) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET host_config_json = ?2 WHERE id = ?1",
                params![id, host_config_json.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn rename_container(&self, id: &str, new_name: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET name = ?2 WHERE id = ?1",
                params![id, new_name],
            )?;
            Ok(())
        })
    }

    pub fn delete_container(&self, id: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM containers WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn put_network_attachment(&self, row: &NetworkAttachmentRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO container_networks \
                 (container_id, network_id, ipv4, mac, aliases_json, endpoint_id) \
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    row.container_id,
                    row.network_id,
                    row.ipv4,
                    row.mac,
                    row.aliases_json.to_string(),
                    row.endpoint_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove_network_attachment(&self, container_id: &str, network_id: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM container_networks WHERE container_id = ?1 AND network_id = ?2",
                params![container_id, network_id],
            )?;
            Ok(())
        })
    }

    pub fn list_network_attachments(&self, container_id: &str) -> StateResult<Vec<NetworkAttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT container_id, network_id, ipv4, mac, aliases_json, endpoint_id \
                 FROM container_networks WHERE container_id = ?1",
            )?;
            let rows = stmt
                .query_map([container_id], |row| {
                    let aliases: String = row.get(4)?;
                    Ok(NetworkAttachmentRow {
                        container_id: row.get(0)?,
                        network_id: row.get(1)?,
                        ipv4: row.get(2)?,
                        mac: row.get(3)?,
                        aliases_json: serde_json::from_str(&aliases).unwrap_or(Value::Array(vec![])),
                        endpoint_id: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn put_mount(&self, row: &MountRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO container_mounts (container_id, source, target, kind, options_json) \
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    row.container_id,
                    row.source,
                    row.target,
                    row.kind,
                    row.options_json.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_mounts(&self, container_id: &str) -> StateResult<Vec<MountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT container_id, source, target, kind, options_json FROM container_mounts WHERE container_id = ?1",
            )?;
            let rows = stmt
                .query_map([container_id], |row| {
                    let options: String = row.get(4)?;
                    Ok(MountRow {
                        container_id: row.get(0)?,
                        source: row.get(1)?,
                        target: row.get(2)?,
                        kind: row.get(3)?,
                        options_json: serde_json::from_str(&options).unwrap_or(Value::Null),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn put_port_mapping(&self, row: &PortMappingRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO port_mappings (container_id, host_ip, host_port, proto, container_port) \
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    row.container_id,
                    row.host_ip,
                    row.host_port,
                    row.proto,
                    row.container_port,
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_port_mappings(&self, container_id: &str) -> StateResult<Vec<PortMappingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT container_id, host_ip, host_port, proto, container_port FROM port_mappings WHERE container_id = ?1",
            )?;
            let rows = stmt
                .query_map([container_id], |row| {
                    Ok(PortMappingRow {
                        container_id: row.get(0)?,
                        host_ip: row.get(1)?,
                        host_port: row.get(2)?,
                        proto: row.get(3)?,
                        container_port: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn delete_port_mappings_for_container(&self, container_id: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM port_mappings WHERE container_id = ?1",
                [container_id],
            )?;
            Ok(())
        })
    }

    /// Insert a full container record (row, network attachments, mounts,
    /// port mappings) in one transaction. Used by `create`.
    pub fn insert_container_full(
        &self,
        row: &ContainerRow,
        mounts: &[MountRow],
        ports: &[PortMappingRow],
    ) -> StateResult<()> {
        self.with_tx(|tx: &Transaction<'_>| {
            tx.execute(
                &format!(
                    "INSERT INTO containers ({CONTAINER_COLUMNS}) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"
                ),
                params![
                    row.id,
                    row.name,
                    row.image_ref,
                    row.image_id,
                    row.spec_json.to_string(),
                    row.host_config_json.to_string(),
                    row.phase,
                    row.exit_code,
                    row.started_at,
                    row.finished_at,
                    row.created_at,
                    row.labels_json.to_string(),
                    row.restart_policy_json.to_string(),
                    row.manual_stopped as i64,
                    row.health_json.as_ref().map(|v| v.to_string()),
                ],
            )?;
            for m in mounts {
                tx.execute(
                    "INSERT INTO container_mounts (container_id, source, target, kind, options_json) \
                     VALUES (?1,?2,?3,?4,?5)",
                    params![m.container_id, m.source, m.target, m.kind, m.options_json.to_string()],
                )?;
            }
            for p in ports {
                tx.execute(
                    "INSERT INTO port_mappings (container_id, host_ip, host_port, proto, container_port) \
                     VALUES (?1,?2,?3,?4,?5)",
                    params![p.container_id, p.host_ip, p.host_port, p.proto, p.container_port],
                )?;
            }
            Ok(())
        })
    }
}
