use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{EmployeeRecord, ResultSet, Value};

pub const EMPLOYEES_TABLE: &str = "employees";

const SCHEMA_SQL: &str = "\
CREATE TABLE employees (
    employee_id     TEXT,
    name            TEXT,
    department      TEXT,
    role            TEXT,
    date            TEXT,
    tasks_completed INTEGER,
    hours_worked    REAL,
    rating          REAL,
    projects        INTEGER,
    absences        INTEGER
)";

/// Opens the store, creating the file on first use. The pool is capped at one
/// connection so TEMP objects created by the aggregation script stay visible
/// for the rest of the run.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, PipelineError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    debug!(path = %db_path.display(), "opened store");
    Ok(pool)
}

/// Drops and rebuilds the employees table from the validated batch. Runs in
/// one transaction, so a failed load leaves the previous table in place.
pub async fn replace_employees(
    pool: &SqlitePool,
    records: &[EmployeeRecord],
) -> Result<u64, PipelineError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DROP TABLE IF EXISTS employees")
        .execute(&mut *tx)
        .await?;
    sqlx::query(SCHEMA_SQL).execute(&mut *tx).await?;

    for record in records {
        sqlx::query(
            "INSERT INTO employees \
             (employee_id, name, department, role, date, tasks_completed, \
              hours_worked, rating, projects, absences) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&record.employee_id)
        .bind(&record.name)
        .bind(&record.department)
        .bind(&record.role)
        .bind(record.date)
        .bind(record.tasks_completed)
        .bind(record.hours_worked)
        .bind(record.rating)
        .bind(record.projects)
        .bind(record.absences)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(rows = records.len(), "replaced employees table");
    Ok(records.len() as u64)
}

/// Runs the user-supplied aggregation script as one batch. Result output of
/// any bare SELECTs in the script is discarded.
pub async fn run_script(pool: &SqlitePool, script: &str) -> Result<(), PipelineError> {
    sqlx::raw_sql(script)
        .execute(pool)
        .await
        .map_err(|e| PipelineError::QueryScript {
            message: e.to_string(),
        })?;
    Ok(())
}

/// True when `name` is a table or view, durable or TEMP.
pub async fn result_exists(pool: &SqlitePool, name: &str) -> Result<bool, PipelineError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name = ?1) \
              + (SELECT COUNT(*) FROM sqlite_temp_master \
                 WHERE type IN ('table', 'view') AND name = ?1)",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Fetches a result table into the generic row model. Column types follow the
/// storage class of each value, not the declared affinity, since the script
/// author controls the schema.
pub async fn fetch_result(
    pool: &SqlitePool,
    name: &str,
    sql: &str,
) -> Result<ResultSet, PipelineError> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| PipelineError::QueryScript {
            message: format!("fetching `{name}`: {e}"),
        })?;

    let mut result = ResultSet {
        name: name.to_string(),
        ..ResultSet::default()
    };
    if let Some(first) = rows.first() {
        result.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
    }
    for row in &rows {
        result.rows.push(decode_row(name, row)?);
    }

    debug!(result = name, rows = result.rows.len(), "fetched result table");
    Ok(result)
}

fn decode_row(name: &str, row: &SqliteRow) -> Result<Vec<Value>, PipelineError> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let raw = row.try_get_raw(idx).map_err(|e| decode_error(name, idx, e))?;
        if raw.is_null() {
            values.push(Value::Null);
            continue;
        }
        let value = match raw.type_info().name() {
            "INTEGER" | "BOOLEAN" => {
                Value::Integer(row.try_get(idx).map_err(|e| decode_error(name, idx, e))?)
            }
            "REAL" | "NUMERIC" => {
                Value::Real(row.try_get(idx).map_err(|e| decode_error(name, idx, e))?)
            }
            _ => Value::Text(row.try_get(idx).map_err(|e| decode_error(name, idx, e))?),
        };
        values.push(value);
    }
    Ok(values)
}

fn decode_error(name: &str, idx: usize, err: sqlx::Error) -> PipelineError {
    PipelineError::QueryScript {
        message: format!("decoding column {idx} of `{name}`: {err}"),
    }
}
