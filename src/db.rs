use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value as Json;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use crate::alerts::ALERT_KEYS;
use crate::extract::PageRecord;
use crate::settings::DbSettings;

pub const TABLE: &str = "seo_data";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    Json,
    Timestamp,
}

impl ColumnType {
    fn postgres(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSONB",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    fn sqlite(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Json | ColumnType::Timestamp => "TEXT",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// `(name, type, nullable)` of every non-alert column, in record order.
const FEATURE_COLUMNS: [(&str, ColumnType, bool); 27] = [
    ("url", ColumnType::Text, false),
    ("title", ColumnType::Text, true),
    ("meta_description", ColumnType::Text, true),
    ("h1", ColumnType::Text, true),
    ("h2", ColumnType::Json, false),
    ("internal_links", ColumnType::Json, false),
    ("external_links", ColumnType::Json, false),
    ("count_internal_links", ColumnType::Integer, false),
    ("count_external_links", ColumnType::Integer, false),
    ("url_length", ColumnType::Integer, false),
    ("title_length", ColumnType::Integer, true),
    ("meta_description_length", ColumnType::Integer, true),
    ("h1_length", ColumnType::Integer, true),
    ("h2_length", ColumnType::Json, false),
    ("count_paragraphs", ColumnType::Integer, false),
    ("response_time", ColumnType::Real, false),
    ("status", ColumnType::Integer, false),
    ("word_count", ColumnType::Integer, false),
    ("page_size", ColumnType::Integer, false),
    ("text_ratio", ColumnType::Real, false),
    ("canonical_url", ColumnType::Text, true),
    ("meta_robots", ColumnType::Text, true),
    ("meta_keywords", ColumnType::Text, true),
    ("image_alt_attributes", ColumnType::Json, false),
    ("structured_data", ColumnType::Json, false),
    ("language_tags", ColumnType::Text, true),
    ("timestamp", ColumnType::Timestamp, false),
];

/// Every persisted column: features, one per alert, then `has_alert`.
fn columns() -> Vec<(&'static str, ColumnType, bool)> {
    FEATURE_COLUMNS
        .into_iter()
        .chain(ALERT_KEYS.map(|key| (key, ColumnType::Boolean, false)))
        .chain([("has_alert", ColumnType::Boolean, false)])
        .collect()
}

/// A bound value, backend-neutral.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Real(f64),
    Boolean(bool),
    Json(Json),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    #[cfg(test)]
    fn column_type(&self) -> ColumnType {
        match self {
            SqlValue::Text(_) => ColumnType::Text,
            SqlValue::Integer(_) => ColumnType::Integer,
            SqlValue::Real(_) => ColumnType::Real,
            SqlValue::Boolean(_) => ColumnType::Boolean,
            SqlValue::Json(_) => ColumnType::Json,
            SqlValue::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    #[cfg(test)]
    fn is_null(&self) -> bool {
        matches!(self, SqlValue::Text(None) | SqlValue::Integer(None))
    }

    fn into_sqlite(self) -> rusqlite::types::Value {
        use rusqlite::types::Value;
        match self {
            SqlValue::Text(v) => v.map(Value::Text).unwrap_or(Value::Null),
            SqlValue::Integer(v) => v.map(Value::Integer).unwrap_or(Value::Null),
            SqlValue::Real(v) => Value::Real(v),
            SqlValue::Boolean(v) => Value::Integer(v as i64),
            SqlValue::Json(v) => Value::Text(v.to_string()),
            SqlValue::Timestamp(v) => Value::Text(v.to_rfc3339()),
        }
    }
}

fn int(v: usize) -> SqlValue {
    SqlValue::Integer(Some(v as i64))
}

fn opt_int(v: Option<usize>) -> SqlValue {
    SqlValue::Integer(v.map(|n| n as i64))
}

fn json<T: Serialize>(v: &T) -> Result<SqlValue> {
    Ok(SqlValue::Json(serde_json::to_value(v)?))
}

/// Values of one record, in [`columns`] order.
fn row_values(record: &PageRecord) -> Result<Vec<SqlValue>> {
    let f = &record.features;
    let mut values = vec![
        SqlValue::Text(Some(f.url.clone())),
        SqlValue::Text(f.title.clone()),
        SqlValue::Text(f.meta_description.clone()),
        SqlValue::Text(f.h1.clone()),
        json(&f.h2)?,
        json(&f.internal_links)?,
        json(&f.external_links)?,
        int(f.count_internal_links),
        int(f.count_external_links),
        int(f.url_length),
        opt_int(f.title_length),
        opt_int(f.meta_description_length),
        opt_int(f.h1_length),
        json(&f.h2_length)?,
        int(f.count_paragraphs),
        SqlValue::Real(f.response_time),
        SqlValue::Integer(Some(f.status.into())),
        int(f.word_count),
        int(f.page_size),
        SqlValue::Real(f.text_ratio),
        SqlValue::Text(f.canonical_url.clone()),
        SqlValue::Text(f.meta_robots.clone()),
        SqlValue::Text(f.meta_keywords.clone()),
        json(&f.image_alt_attributes)?,
        json(&f.structured_data)?,
        SqlValue::Text(f.language_tags.clone()),
        SqlValue::Timestamp(f.timestamp),
    ];
    let alerts = record.alerts();
    values.extend(alerts.flags().map(|(_, raised)| SqlValue::Boolean(raised)));
    values.push(SqlValue::Boolean(alerts.has_alert()));
    Ok(values)
}

fn create_table_sql(sql_type: fn(ColumnType) -> &'static str, id_column: &str) -> String {
    let defs: Vec<String> = columns()
        .into_iter()
        .map(|(name, ty, nullable)| {
            let not_null = if nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", name, sql_type(ty), not_null)
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, {})",
        TABLE,
        id_column,
        defs.join(", ")
    )
}

fn insert_sql(placeholder: fn(usize) -> String) -> String {
    let cols = columns();
    let names: Vec<&str> = cols.iter().map(|(name, _, _)| *name).collect();
    let params: Vec<String> = (1..=cols.len()).map(placeholder).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        TABLE,
        names.join(", "),
        params.join(", ")
    )
}

/// Where records go. Every insert is its own statement and commits on its own.
pub enum Store {
    Postgres(PgPool),
    Sqlite(Connection),
}

impl Store {
    pub async fn connect(settings: &DbSettings) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.name)
            .username(&settings.user)
            .password(&settings.password);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to PostgreSQL at {}:{}/{}",
                    settings.host, settings.port, settings.name
                )
            })?;
        info!("Connected to PostgreSQL {}:{}/{}", settings.host, settings.port, settings.name);
        Ok(Store::Postgres(pool))
    }

    pub fn open_sqlite(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Writing to SQLite database {:?}", path);
        Ok(Store::Sqlite(conn))
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Ok(Store::Sqlite(Connection::open_in_memory()?))
    }

    pub async fn init_schema(&self) -> Result<()> {
        match self {
            Store::Postgres(pool) => {
                let sql = create_table_sql(ColumnType::postgres, "id BIGSERIAL PRIMARY KEY");
                sqlx::query::<sqlx::Postgres>(&sql)
                    .execute(pool)
                    .await
                    .context("Failed to create seo_data table")?;
            }
            Store::Sqlite(conn) => {
                let sql = create_table_sql(ColumnType::sqlite, "id INTEGER PRIMARY KEY");
                conn.execute_batch(&sql)
                    .context("Failed to create seo_data table")?;
            }
        }
        Ok(())
    }

    pub async fn insert(&self, record: &PageRecord) -> Result<()> {
        let values = row_values(record)
            .with_context(|| format!("Failed to serialize record for {}", record.features.url))?;
        match self {
            Store::Postgres(pool) => {
                let sql = insert_sql(|i| format!("${}", i));
                let mut query = sqlx::query::<sqlx::Postgres>(&sql);
                for value in values {
                    query = match value {
                        SqlValue::Text(v) => query.bind(v),
                        SqlValue::Integer(v) => query.bind(v),
                        SqlValue::Real(v) => query.bind(v),
                        SqlValue::Boolean(v) => query.bind(v),
                        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
                        SqlValue::Timestamp(v) => query.bind(v),
                    };
                }
                query.execute(pool).await?;
            }
            Store::Sqlite(conn) => {
                let sql = insert_sql(|i| format!("?{}", i));
                let mut stmt = conn.prepare_cached(&sql)?;
                stmt.execute(rusqlite::params_from_iter(
                    values.into_iter().map(SqlValue::into_sqlite),
                ))?;
            }
        }
        Ok(())
    }
}
