use chrono::NaiveDate;

use crate::error::PipelineError;

/// One row of the employee activity feed after validation.
#[derive(Debug, Clone)]
pub struct EmployeeRecord {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub role: String,
    pub date: NaiveDate,
    pub tasks_completed: i64,
    pub hours_worked: f64,
    pub rating: f64,
    pub projects: i64,
    pub absences: i64,
}

/// A single cell of a query result, carrying the storage class it came back with.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(s) => s.parse().ok(),
        }
    }

    pub fn to_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

/// Rows fetched from one of the aggregation result tables. The columns are
/// whatever the script defined, so consumers look them up by name.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    fn require_column(&self, column: &str) -> Result<usize, PipelineError> {
        self.column_index(column)
            .ok_or_else(|| PipelineError::QueryScript {
                message: format!("result `{}` is missing column `{}`", self.name, column),
            })
    }

    pub fn text_column(&self, column: &str) -> Result<Vec<String>, PipelineError> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|row| row[idx].to_field()).collect())
    }

    pub fn numeric_column(&self, column: &str) -> Result<Vec<Option<f64>>, PipelineError> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_f64()).collect())
    }
}
