use sqlx::{Row, SqlitePool};

use qre_core::{QreError, QreResult};

/// Configure the connection for a single-writer, many-reader workload:
/// WAL so readers never block the writer, a 64MB page cache, and foreign
/// keys on (SQLite defaults them off per-connection).
pub async fn configure_connection(pool: &SqlitePool) -> QreResult<()> {
    for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-64000", "PRAGMA foreign_keys=ON"] {
        sqlx::query(pragma).execute(pool).await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    Ok(())
}

const CREATE_STUDIES: &str = r#"
CREATE TABLE IF NOT EXISTS studies (
    study_id            TEXT PRIMARY KEY,
    study_name          TEXT UNIQUE NOT NULL,
    strategy_id         TEXT NOT NULL,
    strategy_version    TEXT,
    optimization_mode   TEXT NOT NULL,

    objectives_json     TEXT,
    n_objectives        INTEGER DEFAULT 1,
    directions_json     TEXT,
    sampler_type        TEXT,

    n_trials            INTEGER,
    total_trials        INTEGER DEFAULT 0,
    completed_trials    INTEGER DEFAULT 0,
    pruned_trials       INTEGER DEFAULT 0,
    pareto_front_size   INTEGER,
    best_value          REAL,

    score_config_json   TEXT,
    config_json         TEXT,

    csv_file_path       TEXT,
    csv_file_name       TEXT,
    dataset_start_date  TEXT,
    dataset_end_date    TEXT,

    ft_enabled          INTEGER DEFAULT 0,
    dsr_enabled         INTEGER DEFAULT 0,
    st_enabled          INTEGER DEFAULT 0,
    oos_enabled         INTEGER DEFAULT 0,

    is_period_days      INTEGER,
    oos_period_days     INTEGER,
    adaptive_mode       INTEGER DEFAULT 0,

    stitched_net_profit_pct    REAL,
    stitched_max_drawdown_pct  REAL,
    stitched_total_trades      INTEGER,
    oos_win_rate               REAL,
    wfe_pct                    REAL,

    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at        TEXT
);
CREATE INDEX IF NOT EXISTS idx_studies_strategy ON studies(strategy_id);
CREATE INDEX IF NOT EXISTS idx_studies_created ON studies(created_at DESC);
"#;

const CREATE_TRIALS: &str = r#"
CREATE TABLE IF NOT EXISTS trials (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    study_id                TEXT NOT NULL,
    trial_number            INTEGER NOT NULL,

    params_json             TEXT NOT NULL,
    objective_values_json   TEXT,
    constraint_values_json  TEXT,
    composite_score         REAL,
    is_pareto_optimal       INTEGER DEFAULT 0,
    dominance_rank          INTEGER,
    constraints_satisfied   INTEGER DEFAULT 1,
    pruned                  INTEGER DEFAULT 0,

    ft_is_profit_pct        REAL,
    ft_forward_profit_pct   REAL,
    ft_profit_degradation   REAL,
    ft_rank_value           REAL,

    dsr_probability         REAL,
    dsr_skewness            REAL,
    dsr_kurtosis            REAL,

    st_retention_p50        REAL,
    st_combined_failure_rate REAL,
    st_status               TEXT,

    oos_profit_pct          REAL,
    oos_max_drawdown_pct    REAL,
    oos_passed              INTEGER,

    created_at              TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE(study_id, trial_number),
    FOREIGN KEY (study_id) REFERENCES studies(study_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_trials_study ON trials(study_id, trial_number);
CREATE INDEX IF NOT EXISTS idx_trials_pareto ON trials(study_id, is_pareto_optimal);
"#;

const CREATE_WFA_WINDOWS: &str = r#"
CREATE TABLE IF NOT EXISTS wfa_windows (
    window_id           TEXT PRIMARY KEY,
    study_id             TEXT NOT NULL,
    window_number        INTEGER NOT NULL,

    best_params_json     TEXT NOT NULL,
    param_id             TEXT,
    best_params_source   TEXT,

    is_start_date        TEXT,
    is_end_date          TEXT,
    is_net_profit_pct    REAL,
    is_max_drawdown_pct  REAL,
    is_total_trades      INTEGER,

    oos_start_date       TEXT,
    oos_end_nominal_date TEXT,
    oos_end_actual_date  TEXT,
    oos_net_profit_pct   REAL,
    oos_max_drawdown_pct REAL,
    oos_total_trades     INTEGER,
    oos_equity_dense_json   TEXT,
    oos_equity_compact_json TEXT,

    trigger_type         TEXT,
    cusum_final          REAL,
    dd_peak_pct          REAL,

    module_status_json   TEXT,

    FOREIGN KEY (study_id) REFERENCES studies(study_id) ON DELETE CASCADE,
    UNIQUE(study_id, window_number)
);
CREATE INDEX IF NOT EXISTS idx_wfa_windows_study ON wfa_windows(study_id, window_number);
"#;

const CREATE_WFA_WINDOW_TRIALS: &str = r#"
CREATE TABLE IF NOT EXISTS wfa_window_trials (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    window_id     TEXT NOT NULL,
    module        TEXT NOT NULL,
    trial_number  INTEGER NOT NULL,
    params_json   TEXT NOT NULL,
    metrics_json  TEXT,
    rank          INTEGER,
    selected      INTEGER DEFAULT 0,

    FOREIGN KEY (window_id) REFERENCES wfa_windows(window_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_wfa_window_trials_window ON wfa_window_trials(window_id, module);
"#;

const CREATE_MANUAL_TESTS: &str = r#"
CREATE TABLE IF NOT EXISTS manual_tests (
    id                         INTEGER PRIMARY KEY AUTOINCREMENT,
    study_id                   TEXT NOT NULL,
    created_at                 TEXT NOT NULL DEFAULT (datetime('now')),

    test_name                  TEXT,
    data_source                TEXT NOT NULL,
    csv_path                   TEXT,
    start_date                 TEXT NOT NULL,
    end_date                   TEXT NOT NULL,
    source_tab                 TEXT,

    trials_count               INTEGER NOT NULL,
    trials_tested_csv          TEXT,
    best_profit_degradation    REAL,
    worst_profit_degradation   REAL,
    results_json               TEXT NOT NULL,

    FOREIGN KEY (study_id) REFERENCES studies(study_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_manual_tests_study ON manual_tests(study_id);
CREATE INDEX IF NOT EXISTS idx_manual_tests_created ON manual_tests(created_at DESC);
"#;

const CREATE_STUDY_SETS: &str = r#"
CREATE TABLE IF NOT EXISTS study_sets (
    study_set_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT UNIQUE NOT NULL,
    study_ids_json TEXT NOT NULL,
    sort_order     INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_study_sets_order ON study_sets(sort_order);
"#;

/// Create every table (idempotent: `CREATE TABLE IF NOT EXISTS`), then apply
/// additive column migrations. Never drops or alters existing columns, so
/// databases created by older binaries keep opening.
pub async fn create_schema(pool: &SqlitePool) -> QreResult<()> {
    configure_connection(pool).await?;
    for stmt in [CREATE_STUDIES, CREATE_TRIALS, CREATE_WFA_WINDOWS, CREATE_WFA_WINDOW_TRIALS, CREATE_MANUAL_TESTS, CREATE_STUDY_SETS] {
        sqlx::query(stmt).execute(pool).await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    ensure_additive_columns(pool).await
}

async fn ensure_column(pool: &SqlitePool, table: &str, column: &str, definition: &str) -> QreResult<()> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let exists = rows.iter().any(|r| r.get::<String, _>("name") == column);
    if !exists {
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .execute(pool)
            .await
            .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    Ok(())
}

/// Columns added after the initial schema landed. New columns go here, never
/// into the `CREATE TABLE` statements above, so existing rows stay intact.
async fn ensure_additive_columns(pool: &SqlitePool) -> QreResult<()> {
    ensure_column(pool, "trials", "dsr_track_length", "INTEGER").await?;
    ensure_column(pool, "trials", "dsr_luck_share_pct", "REAL").await?;
    Ok(())
}
