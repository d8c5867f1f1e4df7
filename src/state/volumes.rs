//! Volume persistence

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{StateError, StateResult, StateStore};

#[derive(Debug, Clone)]
pub struct VolumeRow {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub labels_json: Value,
    pub options_json: Value,
    pub anonymous: bool,
    pub refcount: i64,
}

fn row_to_volume(row: &Row<'_>) -> rusqlite::Result<VolumeRow> {
    let labels: String = row.get(3)?;
    let options: String = row.get(4)?;
    Ok(VolumeRow {
        name: row.get(0)?,
        driver: row.get(1)?,
        mountpoint: row.get(2)?,
        labels_json: serde_json::from_str(&labels)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?,
        options_json: serde_json::from_str(&options)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?,
        anonymous: row.get::<_, i64>(5)? != 0,
        refcount: row.get(6)?,
    })
}

const VOLUME_COLUMNS: &str = "name, driver, mountpoint, labels_json, options_json, anonymous, refcount";

impl StateStore {
    pub fn insert_volume(&self, row: &VolumeRow) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO volumes ({VOLUME_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7)"),
                params![
                    row.name,
                    row.driver,
                    row.mountpoint,
                    row.labels_json.to_string(),
                    row.options_json.to_string(),
                    row.anonymous as i64,
                    row.refcount,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_volume(&self, name: &str) -> StateResult<Option<VolumeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {VOLUME_COLUMNS} FROM volumes WHERE name = ?1"),
                [name],
                row_to_volume,
            )
            .optional()
            .map_err(StateError::from)
        })
    }

    pub fn list_volumes(&self) -> StateResult<Vec<VolumeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {VOLUME_COLUMNS} FROM volumes"))?;
            let rows = stmt
                .query_map([], row_to_volume)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn delete_volume(&self, name: &str) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM volumes WHERE name = ?1", [name])?;
            Ok(())
        })
    }

    pub fn adjust_volume_refcount(&self, name: &str, delta: i64) -> StateResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE volumes SET refcount = refcount + ?2 WHERE name = ?1",
                params![name, delta],
            )?;
            Ok(())
        })
    }
}
