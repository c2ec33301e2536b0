//! Deployment unit lifecycle and log records.
//!
//! Units and their logs are created fresh for every pipeline run and
//! cleared together at the start of the next one.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use stratum_events::UnitStatus;

use super::{Store, StoreError};

/// One named, ordered automation step of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentUnit {
    pub id: i64,
    pub name: String,
    pub order: i64,
    pub status: UnitStatus,
    pub correlation_id: Option<String>,
    /// Unix seconds.
    pub start_time: Option<i64>,
    /// Unix seconds.
    pub end_time: Option<i64>,
}

/// Append-only log entry captured from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitLogEntry {
    pub id: i64,
    pub correlation_id: String,
    pub event: String,
    pub task: String,
    pub stdout: String,
}

const UNIT_COLUMNS: &str =
    "id, name, unit_order, status, correlation_id, start_time, end_time";

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<DeploymentUnit> {
    let status: String = row.get(3)?;
    Ok(DeploymentUnit {
        id: row.get(0)?,
        name: row.get(1)?,
        order: row.get(2)?,
        status: UnitStatus::from(status),
        correlation_id: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
    })
}

pub(crate) fn clear_tx(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("DELETE FROM unit_logs; DELETE FROM deployment_units;")?;
    Ok(())
}

pub(crate) fn insert_unit_tx(
    conn: &Connection,
    name: &str,
    order: i64,
) -> Result<DeploymentUnit, StoreError> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO deployment_units (name, unit_order, status, start_time) VALUES (?1, ?2, ?3, ?4)",
        params![name, order, UnitStatus::Init.as_str(), now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(format!("unit '{name}' or order {order} already enqueued"))
        }
        other => other.into(),
    })?;

    Ok(DeploymentUnit {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        order,
        status: UnitStatus::Init,
        correlation_id: None,
        start_time: Some(now),
        end_time: None,
    })
}

impl Store {
    /// Delete every unit and log record.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.with_conn(clear_tx)
    }

    /// Clear prior run state and enqueue `names` with orders `1..=n`.
    pub fn replace_units(&self, names: &[String]) -> Result<Vec<DeploymentUnit>, StoreError> {
        self.with_tx(|tx| {
            clear_tx(tx)?;
            names
                .iter()
                .zip(1i64..)
                .map(|(name, order)| insert_unit_tx(tx, name, order))
                .collect()
        })
    }

    /// Enqueue a single unit at status `init`.
    pub fn insert_unit(&self, name: &str, order: i64) -> Result<DeploymentUnit, StoreError> {
        self.with_conn(|conn| insert_unit_tx(conn, name, order))
    }

    /// All units of the current run, ascending by order.
    pub fn list_units(&self) -> Result<Vec<DeploymentUnit>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {UNIT_COLUMNS} FROM deployment_units ORDER BY unit_order ASC"
            ))?;
            let units = stmt
                .query_map([], unit_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(units)
        })
    }

    pub fn get_unit(&self, name: &str) -> Result<DeploymentUnit, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {UNIT_COLUMNS} FROM deployment_units WHERE name = ?1"),
                params![name],
                unit_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("unit '{name}'")))
        })
    }

    /// Latest persisted status of a unit.
    pub fn get_status(&self, name: &str) -> Result<UnitStatus, StoreError> {
        self.get_unit(name).map(|unit| unit.status)
    }

    /// Persist an engine-reported status in a single statement.
    ///
    /// `starting` stamps `start_time`; terminal statuses stamp `end_time`.
    pub fn record_status(
        &self,
        name: &str,
        correlation_id: &str,
        status: &UnitStatus,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let changed = self.with_conn(|conn| {
            conn.execute(
                r#"
                UPDATE deployment_units SET
                    status = ?1,
                    correlation_id = ?2,
                    start_time = CASE WHEN ?3 THEN ?5 ELSE start_time END,
                    end_time = CASE WHEN ?4 THEN ?5 ELSE end_time END
                WHERE name = ?6
                "#,
                params![
                    status.as_str(),
                    correlation_id,
                    *status == UnitStatus::Starting,
                    status.is_terminal(),
                    now,
                    name,
                ],
            )
            .map_err(StoreError::from)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("unit '{name}'")));
        }
        Ok(())
    }

    /// Mark a unit failed without an engine run (its inputs could not be built).
    pub fn mark_failed(&self, name: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE deployment_units SET status = ?1, end_time = ?2 WHERE name = ?3",
                params![UnitStatus::Failed.as_str(), now, name],
            )
            .map_err(StoreError::from)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("unit '{name}'")));
        }
        Ok(())
    }

    /// Append a log entry; returns its sequence number.
    pub fn append_log(
        &self,
        correlation_id: &str,
        event: &str,
        task: &str,
        stdout: &str,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_logs (correlation_id, event, task, stdout) VALUES (?1, ?2, ?3, ?4)",
                params![correlation_id, event, task, stdout],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Log entries for one correlation id, in insertion order.
    pub fn get_logs(&self, correlation_id: &str) -> Result<Vec<UnitLogEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, correlation_id, event, task, stdout FROM unit_logs
                 WHERE correlation_id = ?1 ORDER BY id ASC",
            )?;
            let entries = stmt
                .query_map(params![correlation_id], |row| {
                    Ok(UnitLogEntry {
                        id: row.get(0)?,
                        correlation_id: row.get(1)?,
                        event: row.get(2)?,
                        task: row.get(3)?,
                        stdout: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            if entries.is_empty() {
                let known: bool = conn.query_row(
                    "SELECT EXISTS (SELECT 1 FROM deployment_units WHERE correlation_id = ?1)",
                    params![correlation_id],
                    |row| row.get(0),
                )?;
                if !known {
                    return Err(StoreError::NotFound(format!(
                        "correlation id '{correlation_id}'"
                    )));
                }
            }

            Ok(entries)
        })
    }
}
