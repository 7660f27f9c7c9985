use std::collections::HashSet;

use qre_core::{QreError, QreResult};
use qre_optimizer::{OptimizationConfig, OptimizationRun};
use qre_wfa::{WfaConfig, WfaResult};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::naming::generate_study_name;
use crate::types::{LoadedStudy, LoadedTrial, StudyMeta, StudySummary};

async fn existing_study_names(pool: &SqlitePool, like_prefix: &str) -> QreResult<HashSet<String>> {
    let pattern = format!("{like_prefix}%");
    let rows = sqlx::query("SELECT study_name FROM studies WHERE study_name LIKE ?")
        .bind(pattern)
        .fetch_all(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("study_name")).collect())
}

/// Write one `studies` row and N `trials` rows for a completed optimization
/// study, in a single transaction so a crash mid-write never leaves a study
/// with a partial trial set. Returns the generated `study_id`.
pub async fn save_optuna_study_to_db(
    pool: &SqlitePool,
    meta: &StudyMeta,
    config: &OptimizationConfig,
    run: &OptimizationRun,
) -> QreResult<String> {
    let study_id = Uuid::new_v4().to_string();
    let prefix_guess = meta.strategy_id.to_uppercase();
    let existing = existing_study_names(pool, &prefix_guess).await?;
    let study_name = generate_study_name(
        &meta.strategy_id,
        &meta.csv_file_name,
        meta.dataset_start_date,
        meta.dataset_end_date,
        "optuna",
        &existing,
    );

    let objectives_json =
        serde_json::to_string(&config.objectives).map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let sampler_type = serde_json::to_string(&config.sampler).map_err(|e| QreError::StorageFailure(e.to_string()))?.trim_matches('"').to_string();
    let pareto_front_size = run.pareto_indices.len() as i64;
    let best_value = run.trials.iter().filter_map(|t| t.composite_score).fold(f64::NEG_INFINITY, f64::max);
    let best_value = if best_value.is_finite() { Some(best_value) } else { None };

    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;

    sqlx::query(
        "INSERT INTO studies (
            study_id, study_name, strategy_id, strategy_version, optimization_mode,
            objectives_json, n_objectives, sampler_type,
            n_trials, total_trials, completed_trials, pruned_trials, pareto_front_size, best_value,
            csv_file_path, csv_file_name, dataset_start_date, dataset_end_date, completed_at
        ) VALUES (?, ?, ?, ?, 'optuna', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    )
    .bind(&study_id)
    .bind(&study_name)
    .bind(&meta.strategy_id)
    .bind(&meta.strategy_version)
    .bind(&objectives_json)
    .bind(config.objectives.len() as i64)
    .bind(&sampler_type)
    .bind(config.n_trials as i64)
    .bind(run.trials.len() as i64)
    .bind(run.completed_trials as i64)
    .bind(run.pruned_trials as i64)
    .bind(pareto_front_size)
    .bind(best_value)
    .bind(&meta.csv_file_path)
    .bind(&meta.csv_file_name)
    .bind(meta.dataset_start_date.to_rfc3339())
    .bind(meta.dataset_end_date.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    for trial in &run.trials {
        let params_json = serde_json::to_string(&trial.params).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let objective_values_json =
            serde_json::to_string(&trial.objective_values).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let constraint_values_json =
            serde_json::to_string(&trial.constraint_values).map_err(|e| QreError::StorageFailure(e.to_string()))?;

        sqlx::query(
            "INSERT INTO trials (
                study_id, trial_number, params_json, objective_values_json, constraint_values_json,
                composite_score, is_pareto_optimal, dominance_rank, constraints_satisfied, pruned
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(study_id, trial_number) DO NOTHING",
        )
        .bind(&study_id)
        .bind(trial.trial_number as i64)
        .bind(&params_json)
        .bind(&objective_values_json)
        .bind(&constraint_values_json)
        .bind(trial.composite_score)
        .bind(trial.is_pareto_optimal)
        .bind(trial.dominance_rank as i64)
        .bind(trial.constraints_satisfied)
        .bind(trial.pruned)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }

    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::info!(study_id, study_name, trials = run.trials.len(), pruned = run.pruned_trials, "saved optuna study");
    Ok(study_id)
}

/// Write one `studies` row plus N `wfa_windows` rows (see [`crate::windows`]
/// for the per-window insert) for a completed walk-forward study.
pub async fn save_wfa_study_to_db(pool: &SqlitePool, meta: &StudyMeta, config: &WfaConfig, result: &WfaResult) -> QreResult<String> {
    let study_id = Uuid::new_v4().to_string();
    let existing = existing_study_names(pool, &meta.strategy_id.to_uppercase()).await?;
    let study_name =
        generate_study_name(&meta.strategy_id, &meta.csv_file_name, meta.dataset_start_date, meta.dataset_end_date, "wfa", &existing);

    sqlx::query(
        "INSERT INTO studies (
            study_id, study_name, strategy_id, strategy_version, optimization_mode,
            csv_file_path, csv_file_name, dataset_start_date, dataset_end_date,
            is_period_days, oos_period_days, adaptive_mode,
            stitched_net_profit_pct, stitched_max_drawdown_pct, stitched_total_trades, oos_win_rate, wfe_pct,
            total_trials, completed_at
        ) VALUES (?, ?, ?, ?, 'wfa', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    )
    .bind(&study_id)
    .bind(&study_name)
    .bind(&meta.strategy_id)
    .bind(&meta.strategy_version)
    .bind(&meta.csv_file_path)
    .bind(&meta.csv_file_name)
    .bind(meta.dataset_start_date.to_rfc3339())
    .bind(meta.dataset_end_date.to_rfc3339())
    .bind(config.is_period_days)
    .bind(config.oos_period_days)
    .bind(config.adaptive_mode)
    .bind(result.stitched.stitched_net_profit_pct)
    .bind(result.stitched.stitched_max_drawdown_pct)
    .bind(result.stitched.stitched_total_trades as i64)
    .bind(result.stitched.oos_win_rate)
    .bind(result.stitched.wfe_pct)
    .bind(result.windows.len() as i64)
    .execute(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    crate::windows::save_windows(pool, &study_id, &result.windows).await?;
    tracing::info!(study_id, study_name, windows = result.windows.len(), "saved wfa study");
    Ok(study_id)
}

/// Load a study header plus its trials, ordered by `trial_number` (the
/// sampler's assignment order, per the engine's ordering guarantee).
pub async fn load_study_from_db(pool: &SqlitePool, study_id: &str) -> QreResult<LoadedStudy> {
    let summary = sqlx::query_as::<_, StudySummary>(
        "SELECT study_id, study_name, strategy_id, optimization_mode, total_trials, completed_trials, pruned_trials, created_at, completed_at
         FROM studies WHERE study_id = ?",
    )
    .bind(study_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?
    .ok_or_else(|| {
        tracing::warn!(study_id, "study lookup missed");
        QreError::ResourceMissing(format!("study {study_id} not found"))
    })?;

    let rows = sqlx::query(
        "SELECT trial_number, params_json, composite_score, is_pareto_optimal, constraints_satisfied
         FROM trials WHERE study_id = ? ORDER BY trial_number ASC",
    )
    .bind(study_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    let trials = rows
        .into_iter()
        .map(|r| LoadedTrial {
            trial_number: r.get("trial_number"),
            params_json: r.get("params_json"),
            composite_score: r.get("composite_score"),
            is_pareto_optimal: r.get::<i64, _>("is_pareto_optimal") != 0,
            constraints_satisfied: r.get::<i64, _>("constraints_satisfied") != 0,
            net_profit_pct: None,
            max_drawdown_pct: None,
            sharpe_ratio: None,
        })
        .collect();

    Ok(LoadedStudy { summary, trials })
}

/// List every study header, newest first.
pub async fn list_studies(pool: &SqlitePool) -> QreResult<Vec<StudySummary>> {
    sqlx::query_as::<_, StudySummary>(
        "SELECT study_id, study_name, strategy_id, optimization_mode, total_trials, completed_trials, pruned_trials, created_at, completed_at
         FROM studies ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| QreError::StorageFailure(e.to_string()))
}
