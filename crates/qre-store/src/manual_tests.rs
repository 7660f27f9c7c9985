use qre_core::{QreError, QreResult};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// A one-off manual backtest run against a saved trial, outside the
/// optimizer/WFA flow (e.g. "test trial #42 against this other CSV").
pub struct ManualTestInput<'a> {
    pub study_id: &'a str,
    pub test_name: Option<&'a str>,
    pub data_source: &'a str,
    pub csv_path: Option<&'a str>,
    pub start_date: &'a str,
    pub end_date: &'a str,
    pub source_tab: Option<&'a str>,
    pub trials_count: i64,
    pub trials_tested_csv: Option<&'a str>,
    pub best_profit_degradation: Option<f64>,
    pub worst_profit_degradation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualTestSummary {
    pub id: i64,
    pub study_id: String,
    pub created_at: String,
    pub test_name: Option<String>,
    pub data_source: String,
    pub start_date: String,
    pub end_date: String,
    pub trials_count: i64,
    pub best_profit_degradation: Option<f64>,
    pub worst_profit_degradation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualTestResults {
    pub summary: ManualTestSummary,
    pub results_json: String,
}

pub async fn save_manual_test_to_db(pool: &SqlitePool, input: ManualTestInput<'_>, results_json: &str) -> QreResult<i64> {
    let result = sqlx::query(
        "INSERT INTO manual_tests (
            study_id, test_name, data_source, csv_path, start_date, end_date, source_tab,
            trials_count, trials_tested_csv, best_profit_degradation, worst_profit_degradation, results_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.study_id)
    .bind(input.test_name)
    .bind(input.data_source)
    .bind(input.csv_path)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(input.source_tab)
    .bind(input.trials_count)
    .bind(input.trials_tested_csv)
    .bind(input.best_profit_degradation)
    .bind(input.worst_profit_degradation)
    .bind(results_json)
    .execute(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let id = result.last_insert_rowid();
    tracing::debug!(study_id = input.study_id, manual_test_id = id, "saved manual test");
    Ok(id)
}

pub async fn list_manual_tests(pool: &SqlitePool, study_id: &str) -> QreResult<Vec<ManualTestSummary>> {
    let rows = sqlx::query(
        "SELECT id, study_id, created_at, test_name, data_source, start_date, end_date,
                trials_count, best_profit_degradation, worst_profit_degradation
         FROM manual_tests WHERE study_id = ? ORDER BY created_at DESC",
    )
    .bind(study_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|r| ManualTestSummary {
            id: r.get("id"),
            study_id: r.get("study_id"),
            created_at: r.get("created_at"),
            test_name: r.get("test_name"),
            data_source: r.get("data_source"),
            start_date: r.get("start_date"),
            end_date: r.get("end_date"),
            trials_count: r.get("trials_count"),
            best_profit_degradation: r.get("best_profit_degradation"),
            worst_profit_degradation: r.get("worst_profit_degradation"),
        })
        .collect())
}

pub async fn load_manual_test_results(pool: &SqlitePool, study_id: &str, test_id: i64) -> QreResult<Option<ManualTestResults>> {
    let row = sqlx::query(
        "SELECT id, study_id, created_at, test_name, data_source, start_date, end_date,
                trials_count, best_profit_degradation, worst_profit_degradation, results_json
         FROM manual_tests WHERE study_id = ? AND id = ?",
    )
    .bind(study_id)
    .bind(test_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(ManualTestResults {
        summary: ManualTestSummary {
            id: row.get("id"),
            study_id: row.get("study_id"),
            created_at: row.get("created_at"),
            test_name: row.get("test_name"),
            data_source: row.get("data_source"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            trials_count: row.get("trials_count"),
            best_profit_degradation: row.get("best_profit_degradation"),
            worst_profit_degradation: row.get("worst_profit_degradation"),
        },
        results_json: row.get("results_json"),
    }))
}

pub async fn delete_manual_test(pool: &SqlitePool, study_id: &str, test_id: i64) -> QreResult<bool> {
    let result = sqlx::query("DELETE FROM manual_tests WHERE study_id = ? AND id = ?")
        .bind(study_id)
        .bind(test_id)
        .execute(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let deleted = result.rows_affected() > 0;
    if !deleted {
        tracing::warn!(study_id, test_id, "delete_manual_test matched no row");
    }
    Ok(deleted)
}
