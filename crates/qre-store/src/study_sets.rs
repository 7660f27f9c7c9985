use qre_core::{QreError, QreResult};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// A saved, named collection of study IDs for portfolio-style aggregation.
/// `sort_order` drives manual drag-reorder in a set listing.
#[derive(Debug, Clone, Serialize)]
pub struct StudySet {
    pub study_set_id: i64,
    pub name: String,
    pub study_ids: Vec<String>,
    pub sort_order: i64,
}

fn row_to_set(row: sqlx::sqlite::SqliteRow) -> QreResult<StudySet> {
    let study_ids_json: String = row.get("study_ids_json");
    let study_ids: Vec<String> = serde_json::from_str(&study_ids_json).map_err(|e| QreError::StorageFailure(e.to_string()))?;
    Ok(StudySet { study_set_id: row.get("study_set_id"), name: row.get("name"), study_ids, sort_order: row.get("sort_order") })
}

pub async fn create_study_set(pool: &SqlitePool, name: &str, study_ids: &[String]) -> QreResult<StudySet> {
    if name.trim().is_empty() {
        return Err(QreError::InputValidation("study set name must not be empty".into()));
    }
    let study_ids_json = serde_json::to_string(study_ids).map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let next_order: i64 = sqlx::query("SELECT COALESCE(MAX(sort_order), -1) + 1 AS next FROM study_sets")
        .fetch_one(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?
        .get("next");

    let result = sqlx::query("INSERT INTO study_sets (name, study_ids_json, sort_order) VALUES (?, ?, ?)")
        .bind(name)
        .bind(&study_ids_json)
        .bind(next_order)
        .execute(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;

    let study_set_id = result.last_insert_rowid();
    tracing::debug!(study_set_id, name, members = study_ids.len(), "created study set");
    Ok(StudySet { study_set_id, name: name.to_string(), study_ids: study_ids.to_vec(), sort_order: next_order })
}

pub async fn list_study_sets(pool: &SqlitePool) -> QreResult<Vec<StudySet>> {
    let rows = sqlx::query("SELECT study_set_id, name, study_ids_json, sort_order FROM study_sets ORDER BY sort_order ASC")
        .fetch_all(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    rows.into_iter().map(row_to_set).collect()
}

/// Rename a set and/or replace its member study IDs. At least one of `name`
/// or `study_ids` must be `Some`; errors if `study_set_id` doesn't exist.
pub async fn update_study_set(pool: &SqlitePool, study_set_id: i64, name: Option<&str>, study_ids: Option<&[String]>) -> QreResult<()> {
    if name.is_none() && study_ids.is_none() {
        return Ok(());
    }
    let existing = sqlx::query("SELECT name, study_ids_json FROM study_sets WHERE study_set_id = ?")
        .bind(study_set_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?
        .ok_or_else(|| {
            tracing::warn!(study_set_id, "study set lookup missed");
            QreError::ResourceMissing(format!("study set {study_set_id} not found"))
        })?;

    let new_name = name.unwrap_or(existing.get("name"));
    let new_ids_json = match study_ids {
        Some(ids) => serde_json::to_string(ids).map_err(|e| QreError::StorageFailure(e.to_string()))?,
        None => existing.get("study_ids_json"),
    };

    sqlx::query("UPDATE study_sets SET name = ?, study_ids_json = ? WHERE study_set_id = ?")
        .bind(new_name)
        .bind(new_ids_json)
        .bind(study_set_id)
        .execute(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(study_set_id, "updated study set");
    Ok(())
}

pub async fn delete_study_set(pool: &SqlitePool, study_set_id: i64) -> QreResult<bool> {
    let result = sqlx::query("DELETE FROM study_sets WHERE study_set_id = ?")
        .bind(study_set_id)
        .execute(pool)
        .await
        .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    let deleted = result.rows_affected() > 0;
    if !deleted {
        tracing::warn!(study_set_id, "delete_study_set matched no row");
    }
    Ok(deleted)
}

/// Reassign `sort_order` to match `ordered_ids`' position. IDs absent from
/// the current table are skipped rather than erroring, so a stale client
/// payload can't resurrect a deleted set.
pub async fn reorder_study_sets(pool: &SqlitePool, ordered_ids: &[i64]) -> QreResult<()> {
    let mut tx = pool.begin().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    for (position, study_set_id) in ordered_ids.iter().enumerate() {
        sqlx::query("UPDATE study_sets SET sort_order = ? WHERE study_set_id = ?")
            .bind(position as i64)
            .bind(study_set_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QreError::StorageFailure(e.to_string()))?;
    }
    tx.commit().await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
    tracing::debug!(sets = ordered_ids.len(), "reordered study sets");
    Ok(())
}
