use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, FinancialRecord, NewFinancialRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Read/write access to the financial record table.
pub trait RecordStore: Send + Sync {
    /// Every row, ascending by primary key.
    fn fetch_all(&self) -> AppResult<Vec<FinancialRecord>>;
    fn insert(&self, record: &NewFinancialRecord) -> AppResult<FinancialRecord>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn fetch_all(&self) -> AppResult<Vec<FinancialRecord>> {
        (**self).fetch_all()
    }

    fn insert(&self, record: &NewFinancialRecord) -> AppResult<FinancialRecord> {
        (**self).insert(record)
    }
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_default_settings()?;
        tracing::info!(path = %path.display(), "database ready");

        Ok(db)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("Invalid settings: {}", error)))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

impl RecordStore for Database {
    fn fetch_all(&self) -> AppResult<Vec<FinancialRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, month, revenue, new_users, conversion_rate
             FROM financial_data
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, created_at, month, revenue, new_users, conversion_rate) = row?;
            records.push(FinancialRecord {
                id,
                created_at: parse_timestamp(&created_at)?,
                month,
                revenue,
                new_users,
                conversion_rate,
            });
        }

        tracing::debug!(rows = records.len(), "fetched financial records");
        Ok(records)
    }

    fn insert(&self, record: &NewFinancialRecord) -> AppResult<FinancialRecord> {
        if record.month.trim().is_empty() {
            return Err(AppError::Validation("Month cannot be empty".to_string()));
        }
        if !record.revenue.is_finite() {
            return Err(AppError::Validation("Revenue must be a finite number".to_string()));
        }

        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO financial_data (created_at, month, revenue, new_users, conversion_rate)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now.to_rfc3339(),
                record.month,
                record.revenue,
                record.new_users,
                record.conversion_rate,
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(id, month = %record.month, "inserted financial record");
        Ok(FinancialRecord {
            id,
            created_at: now,
            month: record.month.clone(),
            revenue: Some(record.revenue),
            new_users: record.new_users,
            conversion_rate: record.conversion_rate,
        })
    }
}

fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| AppError::Store(format!("invalid created_at '{}': {}", raw, error)))
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
