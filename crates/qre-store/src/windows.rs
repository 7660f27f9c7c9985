use qre_core::{QreError, QreResult};
use qre_wfa::WfaWindow;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Write one `wfa_windows` row per window plus a `wfa_window_trials`
/// snapshot for each module that ran in its selection chain, in one
/// transaction per study.
///
/// Only the module's *winning* trial is recorded as a snapshot: the per-window
/// pipeline narrows to a single current winner at each stage rather than
/// carrying a ranked cohort forward, so there is no broader top-N candidate
/// set to snapshot beyond the one each module selected.
pub async fn save_windows(pool: &SqlitePool, study_id: &str, windows: &[WfaWindow]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;

    for window in windows {
        let window_id = Uuid::new_v4().to_string();
        let best_params_json = serde_json::to_string(&window.best_params).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let best_params_source =
            serde_json::to_string(&window.best_params_source).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let trigger_type = window
            .adaptive
            .trigger_type
            .map(|t| serde_json::to_string(&t).map(|s| s.trim_matches('"').to_string()))
            .transpose()
            .map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let oos_equity_dense_json =
            serde_json::to_string(&window.oos_equity_dense).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let oos_equity_compact_json =
            serde_json::to_string(&window.oos_equity_compact).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let module_status_json =
            serde_json::to_string(&window.module_status).map_err(|e| QreError::StorageFailure(e.to_string()))?;

        for (module, status) in &window.module_status {
            if !status.ok {
                tracing::warn!(study_id, window = window.window_number, module, reason = status.reason.as_deref().unwrap_or(""), "persisting window with a failed post-process module");
            }
        }

        sqlx::query(
            "INSERT INTO wfa_windows (
                window_id, study_id, window_number, best_params_json, param_id, best_params_source,
                is_start_date, is_end_date, is_net_profit_pct, is_max_drawdown_pct, is_total_trades,
                oos_start_date, oos_end_nominal_date, oos_end_actual_date,
                oos_net_profit_pct, oos_max_drawdown_pct, oos_total_trades,
                oos_equity_dense_json, oos_equity_compact_json,
                trigger_type, cusum_final, dd_peak_pct, module_status_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(study_id, window_number) DO NOTHING",
        )
        .bind(&window_id)
        .bind(study_id)
        .bind(window.window_number as i64)
        .bind(&best_params_json)
        .bind(&window.param_id)
        .bind(&best_params_source)
        .bind(window.is_start.to_rfc3339())
        .bind(window.is_end.to_rfc3339())
        .bind(window.is_metrics.net_profit_pct)
        .bind(window.is_metrics.max_drawdown_pct)
        .bind(window.is_metrics.total_trades as i64)
        .bind(window.oos_start.to_rfc3339())
        .bind(window.oos_end_nominal.to_rfc3339())
        .bind(window.oos_end_actual.to_rfc3339())
        .bind(window.oos_metrics.net_profit_pct)
        .bind(window.oos_metrics.max_drawdown_pct)
        .bind(window.oos_metrics.total_trades as i64)
        .bind(&oos_equity_dense_json)
        .bind(&oos_equity_compact_json)
        .bind(&trigger_type)
        .bind(window.adaptive.cusum_final)
        .bind(window.adaptive.dd_peak_pct)
        .bind(&module_status_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;

        let chain = &window.selection_chain;
        let snapshots: [(&str, Option<usize>); 4] = [
            ("optuna", chain.optuna_winner),
            ("dsr", chain.dsr_winner),
            ("forward_test", chain.forward_test_winner),
            ("stress_test", chain.stress_test_winner),
        ];
        for (module, trial_number) in snapshots {
            let Some(trial_number) = trial_number else { continue };
            sqlx::query(
                "INSERT INTO wfa_window_trials (window_id, module, trial_number, params_json, selected)
                 VALUES (?, ?, ?, ?, 1)",
            )
            .bind(&window_id)
            .bind(module)
            .bind(trial_number as i64)
            .bind(&best_params_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| QreError::StorageFailure(e.to_string()))?;
        }
    }

    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))
}

/// Load every window for a study, ordered by `window_number`.
pub async fn load_windows(pool: &SqlitePool, study_id: &str) -> QreResult<Vec<sqlx::sqlite::SqliteRow>> {
    sqlx::query("SELECT * FROM wfa_windows WHERE study_id = ? ORDER BY window_number ASC")
        .bind(study_id)
        .fetch_all(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))
}
