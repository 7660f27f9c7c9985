use qre_core::{QreError, QreResult};
use qre_postprocess::{DeflatedSharpeOutcome, ForwardTestOutcome, OosTestOutcome, StressTestOutcome};
use sqlx::SqlitePool;

/// Update the `ft_*` columns on each trial's existing row. Trials are
/// matched by `(study_id, trial_number)`; a trial_number with no matching
/// row (e.g. a stale post-process run against a different study) updates
/// zero rows rather than erroring.
pub async fn save_forward_test_results(pool: &SqlitePool, study_id: &str, outcomes: &[ForwardTestOutcome]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    for outcome in outcomes {
        sqlx::query(
            "UPDATE trials SET ft_is_profit_pct = ?, ft_forward_profit_pct = ?, ft_profit_degradation = ?, ft_rank_value = ?
             WHERE study_id = ? AND trial_number = ?",
        )
        .bind(outcome.is_profit_pct)
        .bind(outcome.forward_profit_pct)
        .bind(outcome.profit_degradation)
        .bind(outcome.rank_value)
        .bind(study_id)
        .bind(outcome.trial_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(study_id, outcomes = outcomes.len(), "saved forward test results");
    Ok(())
}

pub async fn save_dsr_results(pool: &SqlitePool, study_id: &str, outcomes: &[DeflatedSharpeOutcome]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    for outcome in outcomes {
        sqlx::query(
            "UPDATE trials SET dsr_probability = ?, dsr_skewness = ?, dsr_kurtosis = ?
             WHERE study_id = ? AND trial_number = ?",
        )
        .bind(outcome.dsr_probability)
        .bind(outcome.skewness)
        .bind(outcome.kurtosis)
        .bind(study_id)
        .bind(outcome.trial_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(study_id, outcomes = outcomes.len(), "saved deflated Sharpe results");
    Ok(())
}

pub async fn save_stress_test_results(pool: &SqlitePool, study_id: &str, outcomes: &[StressTestOutcome]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    for outcome in outcomes {
        let status = serde_json::to_string(&outcome.status).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        sqlx::query(
            "UPDATE trials SET st_retention_p50 = ?, st_combined_failure_rate = ?, st_status = ?
             WHERE study_id = ? AND trial_number = ?",
        )
        .bind(outcome.retention_p50)
        .bind(outcome.combined_failure_rate)
        .bind(status.trim_matches('"'))
        .bind(study_id)
        .bind(outcome.trial_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(study_id, outcomes = outcomes.len(), "saved stress test results");
    Ok(())
}

pub async fn save_oos_test_results(pool: &SqlitePool, study_id: &str, outcomes: &[OosTestOutcome]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    for outcome in outcomes {
        sqlx::query(
            "UPDATE trials SET oos_profit_pct = ?, oos_max_drawdown_pct = ?, oos_passed = ?
             WHERE study_id = ? AND trial_number = ?",
        )
        .bind(outcome.oos_profit_pct)
        .bind(outcome.oos_max_drawdown_pct)
        .bind(outcome.passed)
        .bind(study_id)
        .bind(outcome.trial_number as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(study_id, outcomes = outcomes.len(), "saved OOS test results");
    Ok(())
}
