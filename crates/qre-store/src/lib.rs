pub mod manager;
pub mod manual_tests;
pub mod naming;
pub mod schema;
pub mod studies;
pub mod study_sets;
pub mod trials;
pub mod types;
pub mod windows;

use qre_core::QreResult;
use qre_optimizer::{OptimizationConfig, OptimizationRun};
use qre_postprocess::{DeflatedSharpeOutcome, ForwardTestOutcome, OosTestOutcome, StressTestOutcome};
use qre_wfa::{WfaConfig, WfaResult};
use sqlx::SqlitePool;

pub use manager::{DbEntry, RunLockGuard, StudyDbManager};
pub use manual_tests::{ManualTestInput, ManualTestResults, ManualTestSummary};
pub use study_sets::StudySet;
pub use types::{LoadedStudy, LoadedTrial, StudyMeta, StudySummary};

/// Facade over the study database: every C7 persistence contract as a
/// single async call against one open pool.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_schema(&self) -> QreResult<()> {
        schema::create_schema(&self.pool).await
    }

    pub async fn save_optuna_study(&self, meta: &StudyMeta, config: &OptimizationConfig, run: &OptimizationRun) -> QreResult<String> {
        studies::save_optuna_study_to_db(&self.pool, meta, config, run).await
    }

    pub async fn save_wfa_study(&self, meta: &StudyMeta, config: &WfaConfig, result: &WfaResult) -> QreResult<String> {
        studies::save_wfa_study_to_db(&self.pool, meta, config, result).await
    }

    pub async fn save_forward_test_results(&self, study_id: &str, outcomes: &[ForwardTestOutcome]) -> QreResult<()> {
        trials::save_forward_test_results(&self.pool, study_id, outcomes).await
    }

    pub async fn save_dsr_results(&self, study_id: &str, outcomes: &[DeflatedSharpeOutcome]) -> QreResult<()> {
        trials::save_dsr_results(&self.pool, study_id, outcomes).await
    }

    pub async fn save_stress_test_results(&self, study_id: &str, outcomes: &[StressTestOutcome]) -> QreResult<()> {
        trials::save_stress_test_results(&self.pool, study_id, outcomes).await
    }

    pub async fn save_oos_test_results(&self, study_id: &str, outcomes: &[OosTestOutcome]) -> QreResult<()> {
        trials::save_oos_test_results(&self.pool, study_id, outcomes).await
    }

    pub async fn load_study(&self, study_id: &str) -> QreResult<LoadedStudy> {
        studies::load_study_from_db(&self.pool, study_id).await
    }

    pub async fn list_studies(&self) -> QreResult<Vec<StudySummary>> {
        studies::list_studies(&self.pool).await
    }

    pub async fn save_manual_test(&self, input: ManualTestInput<'_>, results_json: &str) -> QreResult<i64> {
        manual_tests::save_manual_test_to_db(&self.pool, input, results_json).await
    }

    pub async fn list_manual_tests(&self, study_id: &str) -> QreResult<Vec<ManualTestSummary>> {
        manual_tests::list_manual_tests(&self.pool, study_id).await
    }

    pub async fn load_manual_test_results(&self, study_id: &str, test_id: i64) -> QreResult<Option<ManualTestResults>> {
        manual_tests::load_manual_test_results(&self.pool, study_id, test_id).await
    }

    pub async fn delete_manual_test(&self, study_id: &str, test_id: i64) -> QreResult<bool> {
        manual_tests::delete_manual_test(&self.pool, study_id, test_id).await
    }

    pub async fn create_study_set(&self, name: &str, study_ids: &[String]) -> QreResult<StudySet> {
        study_sets::create_study_set(&self.pool, name, study_ids).await
    }

    pub async fn list_study_sets(&self) -> QreResult<Vec<StudySet>> {
        study_sets::list_study_sets(&self.pool).await
    }

    pub async fn update_study_set(&self, study_set_id: i64, name: Option<&str>, study_ids: Option<&[String]>) -> QreResult<()> {
        study_sets::update_study_set(&self.pool, study_set_id, name, study_ids).await
    }

    pub async fn delete_study_set(&self, study_set_id: i64) -> QreResult<bool> {
        study_sets::delete_study_set(&self.pool, study_set_id).await
    }

    pub async fn reorder_study_sets(&self, ordered_ids: &[i64]) -> QreResult<()> {
        study_sets::reorder_study_sets(&self.pool, ordered_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use qre_optimizer::{Direction, Objective, SamplerType};
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    async fn memory_store() -> Store {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(options).await.unwrap();
        let store = Store::new(pool);
        store.create_schema().await.unwrap();
        store
    }

    fn sample_meta() -> StudyMeta {
        StudyMeta {
            strategy_id: "s01_ema_cross".into(),
            strategy_version: Some("1.0.0".into()),
            csv_file_path: "/data/BINANCE_BTCUSDT.csv".into(),
            csv_file_name: "BINANCE_BTCUSDT, 1D_2020.01.01-2024.01.01.csv".into(),
            dataset_start_date: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            dataset_end_date: DateTime::<Utc>::from_timestamp(86400 * 365, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn round_trips_an_optuna_study_and_its_trials() {
        let store = memory_store().await;
        let config = OptimizationConfig {
            objectives: vec![Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize }],
            sampler: SamplerType::Random,
            n_trials: 2,
            ..OptimizationConfig::default()
        };
        let run = OptimizationRun {
            trials: vec![
                qre_optimizer::TrialRecord {
                    trial_number: 0,
                    params: Default::default(),
                    objective_values: vec![1.2],
                    constraints_satisfied: true,
                    constraint_values: vec![],
                    composite_score: Some(0.9),
                    is_pareto_optimal: true,
                    dominance_rank: 0,
                    pruned: false,
                },
                qre_optimizer::TrialRecord {
                    trial_number: 1,
                    params: Default::default(),
                    objective_values: vec![0.5],
                    constraints_satisfied: false,
                    constraint_values: vec![1.0],
                    composite_score: Some(0.2),
                    is_pareto_optimal: false,
                    dominance_rank: 1,
                    pruned: false,
                },
            ],
            pareto_indices: vec![0],
            completed_trials: 2,
            pruned_trials: 0,
        };

        let study_id = store.save_optuna_study(&sample_meta(), &config, &run).await.unwrap();
        let loaded = store.load_study(&study_id).await.unwrap();

        assert_eq!(loaded.trials.len(), 2);
        assert_eq!(loaded.summary.strategy_id, "s01_ema_cross");
        assert!(loaded.summary.study_name.starts_with("S01_"));
    }

    #[tokio::test]
    async fn listing_studies_returns_newest_first_without_error() {
        let store = memory_store().await;
        let config = OptimizationConfig::default();
        let run = OptimizationRun::default();
        store.save_optuna_study(&sample_meta(), &config, &run).await.unwrap();
        let studies = store.list_studies().await.unwrap();
        assert_eq!(studies.len(), 1);
    }

    #[tokio::test]
    async fn manual_test_round_trips_and_deletes() {
        let store = memory_store().await;
        let config = OptimizationConfig::default();
        let run = OptimizationRun::default();
        let study_id = store.save_optuna_study(&sample_meta(), &config, &run).await.unwrap();

        let input = ManualTestInput {
            study_id: &study_id,
            test_name: Some("sanity check"),
            data_source: "csv",
            csv_path: Some("/data/other.csv"),
            start_date: "2023-01-01",
            end_date: "2023-06-01",
            source_tab: Some("manual"),
            trials_count: 3,
            trials_tested_csv: Some("1,2,3"),
            best_profit_degradation: Some(0.1),
            worst_profit_degradation: Some(0.4),
        };
        let test_id = store.save_manual_test(input, r#"{"ok":true}"#).await.unwrap();

        let listed = store.list_manual_tests(&study_id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let loaded = store.load_manual_test_results(&study_id, test_id).await.unwrap().unwrap();
        assert_eq!(loaded.results_json, r#"{"ok":true}"#);

        assert!(store.delete_manual_test(&study_id, test_id).await.unwrap());
        assert!(store.list_manual_tests(&study_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn study_sets_support_create_reorder_and_delete() {
        let store = memory_store().await;
        let a = store.create_study_set("momentum", &["s1".into(), "s2".into()]).await.unwrap();
        let b = store.create_study_set("mean-reversion", &["s3".into()]).await.unwrap();
        assert_eq!(a.sort_order, 0);
        assert_eq!(b.sort_order, 1);

        store.reorder_study_sets(&[b.study_set_id, a.study_set_id]).await.unwrap();
        let sets = store.list_study_sets().await.unwrap();
        assert_eq!(sets[0].study_set_id, b.study_set_id);

        store.update_study_set(a.study_set_id, Some("momentum-v2"), None).await.unwrap();
        let sets = store.list_study_sets().await.unwrap();
        assert!(sets.iter().any(|s| s.name == "momentum-v2"));

        assert!(store.delete_study_set(a.study_set_id).await.unwrap());
        assert_eq!(store.list_study_sets().await.unwrap().len(), 1);
    }
}
