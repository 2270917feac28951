use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::models::EmployeeRecord;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

const REQUIRED_COLUMNS: &[&str] = &[
    "employee_id",
    "name",
    "department",
    "role",
    "date",
    "tasks_completed",
    "hours_worked",
    "rating",
    "projects",
    "absences",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    employee_id: String,
    name: String,
    department: String,
    role: String,
    date: String,
    tasks_completed: i64,
    hours_worked: f64,
    rating: f64,
    projects: i64,
    absences: i64,
}

/// Reads and validates the whole activity feed before anything touches the
/// store. The header must carry every required column even when the feed has
/// no data rows; a bad row anywhere rejects the batch.
pub fn read_records(csv_path: &Path) -> Result<Vec<EmployeeRecord>, PipelineError> {
    if !csv_path.exists() {
        return Err(PipelineError::InputNotFound(csv_path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(csv_path).map_err(|e| PipelineError::SchemaMismatch {
        path: csv_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let headers = reader.headers().map_err(|e| PipelineError::SchemaMismatch {
        path: csv_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch {
            path: csv_path.to_path_buf(),
            reason: format!("missing columns: {}", missing.join(", ")),
        });
    }

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| PipelineError::SchemaMismatch {
            path: csv_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let date = parse_date(&row.date).ok_or_else(|| PipelineError::SchemaMismatch {
            path: csv_path.to_path_buf(),
            reason: format!("row {}: unparseable date `{}`", idx + 1, row.date),
        })?;
        records.push(EmployeeRecord {
            employee_id: row.employee_id,
            name: row.name,
            department: row.department,
            role: row.role,
            date,
            tasks_completed: row.tasks_completed,
            hours_worked: row.hours_worked,
            rating: row.rating,
            projects: row.projects,
            absences: row.absences,
        });
    }

    debug!(rows = records.len(), "parsed activity feed");
    Ok(records)
}

/// Accepts the date layouts seen in real exports and collapses them all to a
/// calendar date. Timestamps lose their time-of-day part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    None
}
