use std::fs;
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use crate::charts;
use crate::db;
use crate::error::PipelineError;
use crate::models::{ResultSet, Value};

pub const DEPARTMENT_KPIS: &str = "department_kpis";
pub const EMPLOYEE_SUMMARY: &str = "employee_summary";
pub const DAILY_PRODUCTIVITY: &str = "daily_productivity";

const RESULT_TABLES: [&str; 3] = [DEPARTMENT_KPIS, EMPLOYEE_SUMMARY, DAILY_PRODUCTIVITY];

/// Runs the aggregation script, checks that it produced the three contract
/// tables, and fetches them in report order.
pub async fn fetch_results(
    pool: &SqlitePool,
    script: &str,
) -> Result<(ResultSet, ResultSet, ResultSet), PipelineError> {
    db::run_script(pool, script).await?;

    for name in RESULT_TABLES {
        if !db::result_exists(pool, name).await? {
            return Err(PipelineError::MissingResultTable(name.to_string()));
        }
    }

    let dept_kpis = db::fetch_result(
        pool,
        DEPARTMENT_KPIS,
        "SELECT * FROM department_kpis ORDER BY avg_rating DESC",
    )
    .await?;
    let emp_summary = db::fetch_result(
        pool,
        EMPLOYEE_SUMMARY,
        "SELECT * FROM employee_summary ORDER BY tasks_per_hour DESC",
    )
    .await?;
    let daily_prod = db::fetch_result(pool, DAILY_PRODUCTIVITY, "SELECT * FROM daily_productivity").await?;

    Ok((dept_kpis, emp_summary, daily_prod))
}

/// The analyze stage end to end: script, exports, charts.
pub async fn run_analysis(
    pool: &SqlitePool,
    sql_path: &Path,
    outdir: &Path,
) -> Result<(), PipelineError> {
    if !sql_path.exists() {
        return Err(PipelineError::InputNotFound(sql_path.to_path_buf()));
    }
    let script = fs::read_to_string(sql_path).map_err(|e| PipelineError::QueryScript {
        message: format!("reading {}: {e}", sql_path.display()),
    })?;

    let (dept_kpis, emp_summary, daily_prod) = fetch_results(pool, &script).await?;

    let charts_dir = outdir.join("charts");
    fs::create_dir_all(&charts_dir).map_err(|e| PipelineError::Render {
        path: charts_dir.clone(),
        message: e.to_string(),
    })?;

    export_csv(&dept_kpis, &outdir.join("department_kpis.csv"))?;
    export_csv(&emp_summary, &outdir.join("performance_summary.csv"))?;

    if dept_kpis.is_empty() {
        debug!("department KPI set is empty, skipping bar chart");
    } else {
        charts::bar_chart(
            &dept_kpis,
            "department",
            "avg_rating",
            "Average Rating by Department",
            &charts_dir.join("avg_rating_by_department.png"),
        )?;
    }

    if daily_prod.is_empty() {
        debug!("daily productivity set is empty, skipping scatter chart");
    } else {
        charts::scatter_chart(
            &daily_prod,
            "hours_worked",
            "tasks_completed",
            "Performance vs Hours (Daily Tasks vs Hours)",
            &charts_dir.join("performance_vs_hours.png"),
        )?;
    }

    if emp_summary.is_empty() {
        debug!("employee summary set is empty, skipping histogram");
    } else {
        charts::histogram_chart(
            &emp_summary,
            "tasks_per_hour",
            "Task Completion Rate (Tasks per Hour)",
            &charts_dir.join("task_completion_rate.png"),
        )?;
    }

    Ok(())
}

/// Writes a result set as CSV with a header row. Empty sets produce no file
/// and report `None`.
pub fn export_csv(result: &ResultSet, path: &Path) -> Result<Option<PathBuf>, PipelineError> {
    if result.is_empty() {
        debug!(result = %result.name, "empty result set, skipping export");
        return Ok(None);
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| export_error(path, e))?;
    writer
        .write_record(&result.columns)
        .map_err(|e| export_error(path, e))?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(Value::to_field))
            .map_err(|e| export_error(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| export_error(path, csv::Error::from(e)))?;

    info!(path = %path.display(), rows = result.rows.len(), "wrote export");
    Ok(Some(path.to_path_buf()))
}

fn export_error(path: &Path, source: csv::Error) -> PipelineError {
    PipelineError::Export {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::EmployeeRecord;

    const QUERIES_SQL: &str = include_str!("queries.sql");

    fn record(id: &str, department: &str, day: u32, tasks: i64, hours: f64, rating: f64) -> EmployeeRecord {
        EmployeeRecord {
            employee_id: id.to_string(),
            name: format!("{id} Person"),
            department: department.to_string(),
            role: "Analyst".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date"),
            tasks_completed: tasks,
            hours_worked: hours,
            rating,
            projects: 1,
            absences: 0,
        }
    }

    async fn seeded_pool(records: &[EmployeeRecord]) -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = crate::db::connect(&dir.path().join("hr.db"))
            .await
            .expect("connect");
        crate::db::replace_employees(&pool, records).await.expect("load");
        (dir, pool)
    }

    fn column_f64s(result: &ResultSet, column: &str) -> Vec<f64> {
        result
            .numeric_column(column)
            .expect("column")
            .into_iter()
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn department_kpis_come_back_sorted_by_rating() {
        let records = vec![
            record("E1", "Engineering", 5, 10, 8.0, 4.5),
            record("E2", "Engineering", 5, 8, 7.0, 4.5),
            record("E3", "Sales", 5, 6, 8.0, 3.2),
            record("E4", "Support", 6, 7, 7.5, 4.0),
        ];
        let (_dir, pool) = seeded_pool(&records).await;

        let (dept_kpis, _, _) = fetch_results(&pool, QUERIES_SQL).await.expect("results");

        let departments = dept_kpis.text_column("department").expect("departments");
        assert_eq!(departments, vec!["Engineering", "Support", "Sales"]);
        let ratings = column_f64s(&dept_kpis, "avg_rating");
        assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn employee_summary_ranks_by_tasks_per_hour() {
        let records = vec![
            record("E1", "Engineering", 5, 10, 8.0, 4.5),
            record("E2", "Engineering", 6, 8, 7.0, 4.1),
            record("E3", "Sales", 5, 6, 8.0, 3.2),
        ];
        let (_dir, pool) = seeded_pool(&records).await;

        let (_, emp_summary, _) = fetch_results(&pool, QUERIES_SQL).await.expect("results");

        let rates = column_f64s(&emp_summary, "tasks_per_hour");
        assert_eq!(rates.len(), 3);
        assert!(rates.windows(2).all(|w| w[0] >= w[1]));
        let ids = emp_summary.text_column("employee_id").expect("ids");
        assert_eq!(ids[0], "E1");
    }

    #[tokio::test]
    async fn zero_hours_yields_null_rate_not_a_failure() {
        let records = vec![
            record("E1", "Engineering", 5, 10, 8.0, 4.5),
            record("E2", "Sales", 5, 4, 0.0, 3.9),
        ];
        let (_dir, pool) = seeded_pool(&records).await;

        let (_, emp_summary, _) = fetch_results(&pool, QUERIES_SQL).await.expect("results");

        let rates = emp_summary.numeric_column("tasks_per_hour").expect("rates");
        assert!(rates.contains(&None));
        // NULLs sort after real rates under DESC.
        assert_eq!(rates.last(), Some(&None));
    }

    #[tokio::test]
    async fn script_missing_a_contract_table_is_fatal() {
        let records = vec![record("E1", "Engineering", 5, 10, 8.0, 4.5)];
        let (_dir, pool) = seeded_pool(&records).await;

        let partial = "DROP VIEW IF EXISTS department_kpis; \
                       CREATE VIEW department_kpis AS \
                       SELECT department, AVG(rating) AS avg_rating \
                       FROM employees GROUP BY department;";
        match fetch_results(&pool, partial).await {
            Err(PipelineError::MissingResultTable(name)) => {
                assert_eq!(name, EMPLOYEE_SUMMARY);
            }
            other => panic!("expected missing result table, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broken_script_surfaces_as_query_error() {
        let records = vec![record("E1", "Engineering", 5, 10, 8.0, 4.5)];
        let (_dir, pool) = seeded_pool(&records).await;

        let err = fetch_results(&pool, "CREATE VIEW oops AS SELECT no_such FROM nowhere; SELECT * FROM oops;")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::QueryScript { .. }));
    }

    #[tokio::test]
    async fn exports_write_header_and_rows() {
        let records = vec![
            record("E1", "Engineering", 5, 10, 8.0, 4.5),
            record("E2", "Sales", 5, 6, 8.0, 3.2),
        ];
        let (dir, pool) = seeded_pool(&records).await;

        let (dept_kpis, _, _) = fetch_results(&pool, QUERIES_SQL).await.expect("results");
        let out_path = dir.path().join("department_kpis.csv");
        let written = export_csv(&dept_kpis, &out_path).expect("export");
        assert_eq!(written, Some(out_path.clone()));

        let contents = fs::read_to_string(&out_path).expect("read export");
        let mut lines = contents.lines();
        let header = lines.next().expect("header");
        assert!(header.contains("department"));
        assert!(header.contains("avg_rating"));
        assert_eq!(lines.count(), 2);
    }

    #[tokio::test]
    async fn full_analysis_writes_exports_and_charts() {
        let records = vec![
            record("E1", "Engineering", 5, 10, 8.0, 4.5),
            record("E2", "Engineering", 6, 8, 7.0, 4.1),
            record("E3", "Sales", 5, 6, 8.0, 3.2),
            record("E4", "Support", 6, 7, 7.5, 4.0),
        ];
        let (_dir, pool) = seeded_pool(&records).await;

        let work = tempfile::tempdir().expect("workdir");
        let sql_path = work.path().join("queries.sql");
        fs::write(&sql_path, QUERIES_SQL).expect("write script");
        let outdir = work.path().join("outputs");

        run_analysis(&pool, &sql_path, &outdir).await.expect("analysis");

        for artifact in [
            "department_kpis.csv",
            "performance_summary.csv",
            "charts/avg_rating_by_department.png",
            "charts/performance_vs_hours.png",
            "charts/task_completion_rate.png",
        ] {
            let path = outdir.join(artifact);
            let meta = fs::metadata(&path)
                .unwrap_or_else(|_| panic!("artifact {artifact} was not written"));
            assert!(meta.len() > 0, "artifact {artifact} is empty");
        }
    }

    #[tokio::test]
    async fn empty_store_skips_exports_and_charts() {
        let (_dir, pool) = seeded_pool(&[]).await;

        let work = tempfile::tempdir().expect("workdir");
        let sql_path = work.path().join("queries.sql");
        fs::write(&sql_path, QUERIES_SQL).expect("write script");
        let outdir = work.path().join("outputs");

        run_analysis(&pool, &sql_path, &outdir).await.expect("analysis");

        assert!(outdir.join("charts").is_dir());
        assert!(!outdir.join("department_kpis.csv").exists());
        assert!(!outdir.join("performance_summary.csv").exists());
        assert!(!outdir.join("charts").join("avg_rating_by_department.png").exists());
        assert!(!outdir.join("charts").join("performance_vs_hours.png").exists());
        assert!(!outdir.join("charts").join("task_completion_rate.png").exists());
    }

    #[tokio::test]
    async fn missing_script_file_is_input_not_found() {
        let (_dir, pool) = seeded_pool(&[]).await;
        let work = tempfile::tempdir().expect("workdir");

        let err = run_analysis(&pool, &work.path().join("absent.sql"), &work.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }
}
