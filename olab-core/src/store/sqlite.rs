//! Local backend on the olab SQLite database
//!
//! Counter procedures are single `UPDATE ... SET label_count = label_count + 1`
//! statements, so they are atomic under SQLite's write lock.

use async_trait::async_trait;
use chrono::Utc;
use olab_common::models::{
    Contributor, ExportRow, Label, LabelHistoryEntry, LabelRow, NewLabel, Profile, Property,
    PropertyId, Sentence, SentenceId,
};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::{
    CatalogStore, CounterDelta, PropertyUpdate, SentenceFilter, SentenceOrder, SentenceStore,
};
use crate::error::{StoreError, StoreResult};

const LABEL_COLUMNS: &str = "id, sentence_id, user_id, property_id, label, subject_start, \
     subject_end, object_start, object_end, created_at";

const PROPERTY_COLUMNS: &str = r#"id, name, domain, "range", iri, sentence_count, is_active, description, domain_link, range_link"#;

/// SQLite implementation of both store traits
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a query future under the configured timeout
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn filter_clause(filter: SentenceFilter) -> &'static str {
    match filter {
        SentenceFilter::Any => "",
        SentenceFilter::Unlabeled => " AND label_count = 0",
    }
}

fn order_clause(order: SentenceOrder) -> &'static str {
    match order {
        // SQLite sorts NULLs first on ASC; push them last explicitly
        SentenceOrder::LeastLabeledFirst => " ORDER BY label_count IS NULL, label_count ASC, id ASC",
        SentenceOrder::IdAsc => " ORDER BY id ASC",
    }
}

#[async_trait]
impl SentenceStore for SqliteStore {
    async fn count_sentences(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
    ) -> StoreResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM sentences WHERE property_id = ?{}",
            filter_clause(filter)
        );
        self.timed(sqlx::query_scalar(&sql).bind(property_id).fetch_one(&self.pool))
            .await
    }

    async fn list_sentence_ids(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
    ) -> StoreResult<Vec<SentenceId>> {
        let sql = format!(
            "SELECT id FROM sentences WHERE property_id = ?{}{}",
            filter_clause(filter),
            order_clause(order)
        );
        self.timed(sqlx::query_scalar(&sql).bind(property_id).fetch_all(&self.pool))
            .await
    }

    async fn fetch_sentence_batch(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Sentence>> {
        let sql = format!(
            "SELECT id, property_id, text, label_count FROM sentences WHERE property_id = ?{}{} LIMIT ? OFFSET ?",
            filter_clause(filter),
            order_clause(order)
        );
        debug!(property_id, offset, limit, "Fetching sentence batch");
        self.timed(
            sqlx::query_as::<_, Sentence>(&sql)
                .bind(property_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn fetch_user_labeled_ids(
        &self,
        property_id: PropertyId,
        user_id: &str,
    ) -> StoreResult<HashSet<SentenceId>> {
        let ids: Vec<SentenceId> = self
            .timed(
                sqlx::query_scalar(
                    "SELECT sentence_id FROM labels WHERE property_id = ? AND user_id = ?",
                )
                .bind(property_id)
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn fetch_label(
        &self,
        sentence_id: SentenceId,
        user_id: &str,
    ) -> StoreResult<Option<Label>> {
        let sql = format!(
            "SELECT {} FROM labels WHERE sentence_id = ? AND user_id = ?",
            LABEL_COLUMNS
        );
        let row: Option<LabelRow> = self
            .timed(
                sqlx::query_as(&sql)
                    .bind(sentence_id)
                    .bind(user_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(Label::try_from).transpose().map_err(StoreError::from)
    }

    async fn upsert_label(&self, label: &NewLabel) -> StoreResult<Label> {
        let p = label.payload();
        let sql = format!(
            "INSERT INTO labels (sentence_id, user_id, property_id, label, subject_start, \
             subject_end, object_start, object_end, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(sentence_id, user_id) DO UPDATE SET \
             property_id = excluded.property_id, label = excluded.label, \
             subject_start = excluded.subject_start, subject_end = excluded.subject_end, \
             object_start = excluded.object_start, object_end = excluded.object_end, \
             created_at = excluded.created_at \
             RETURNING {}",
            LABEL_COLUMNS
        );
        let row: LabelRow = self
            .timed(
                sqlx::query_as(&sql)
                    .bind(p.sentence_id)
                    .bind(p.user_id)
                    .bind(p.property_id)
                    .bind(p.label)
                    .bind(p.subject_start)
                    .bind(p.subject_end)
                    .bind(p.object_start)
                    .bind(p.object_end)
                    .bind(Utc::now())
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(Label::try_from(row)?)
    }

    async fn adjust_label_count(
        &self,
        sentence_id: SentenceId,
        delta: CounterDelta,
    ) -> StoreResult<()> {
        let sql = match delta {
            CounterDelta::Increment => {
                "UPDATE sentences SET label_count = label_count + 1 WHERE id = ?"
            }
            CounterDelta::Decrement => {
                "UPDATE sentences SET label_count = MAX(label_count - 1, 0) WHERE id = ?"
            }
        };
        let result = self
            .timed(sqlx::query(sql).bind(sentence_id).execute(&self.pool))
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sentence {}", sentence_id)));
        }
        Ok(())
    }

    async fn read_label_count(&self, sentence_id: SentenceId) -> StoreResult<i64> {
        let count: Option<i64> = self
            .timed(
                sqlx::query_scalar("SELECT label_count FROM sentences WHERE id = ?")
                    .bind(sentence_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        count.ok_or_else(|| StoreError::NotFound(format!("sentence {}", sentence_id)))
    }

    async fn write_label_count(&self, sentence_id: SentenceId, value: i64) -> StoreResult<()> {
        self.timed(
            sqlx::query("UPDATE sentences SET label_count = ? WHERE id = ?")
                .bind(value)
                .bind(sentence_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn list_properties(&self, include_hidden: bool) -> StoreResult<Vec<Property>> {
        let sql = if include_hidden {
            format!("SELECT {} FROM properties ORDER BY name ASC", PROPERTY_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM properties WHERE is_active = 1 ORDER BY name ASC",
                PROPERTY_COLUMNS
            )
        };
        self.timed(sqlx::query_as::<_, Property>(&sql).fetch_all(&self.pool))
            .await
    }

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>> {
        let sql = format!("SELECT {} FROM properties WHERE id = ?", PROPERTY_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Property>(&sql)
                .bind(property_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_property(
        &self,
        property_id: PropertyId,
        update: &PropertyUpdate,
    ) -> StoreResult<Property> {
        let sql = format!(
            "UPDATE properties SET is_active = COALESCE(?, is_active), \
             description = COALESCE(?, description) WHERE id = ? RETURNING {}",
            PROPERTY_COLUMNS
        );
        let row: Option<Property> = self
            .timed(
                sqlx::query_as(&sql)
                    .bind(update.is_active)
                    .bind(update.description.as_deref())
                    .bind(property_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("property {}", property_id)))
    }

    async fn sentence_totals(&self) -> StoreResult<HashMap<PropertyId, i64>> {
        let rows: Vec<(PropertyId, i64)> = self
            .timed(
                sqlx::query_as("SELECT property_id, COUNT(*) FROM sentences GROUP BY property_id")
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn user_label_counts(&self, user_id: &str) -> StoreResult<HashMap<PropertyId, i64>> {
        let rows: Vec<(PropertyId, i64)> = self
            .timed(
                sqlx::query_as(
                    "SELECT property_id, COUNT(*) FROM labels WHERE user_id = ? GROUP BY property_id",
                )
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn list_user_labels(&self, user_id: &str) -> StoreResult<Vec<LabelHistoryEntry>> {
        let rows: Vec<HistoryRow> = self
            .timed(
                sqlx::query_as(
                    "SELECT l.id, l.sentence_id, l.user_id, l.property_id, l.label, \
                     l.subject_start, l.subject_end, l.object_start, l.object_end, l.created_at, \
                     s.text AS sentence_text, s.label_count AS sentence_label_count \
                     FROM labels l JOIN sentences s ON s.id = l.sentence_id \
                     WHERE l.user_id = ? ORDER BY l.created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.into_iter()
            .map(HistoryRow::split)
            .map(|(row, sentence_text, label_count)| -> StoreResult<LabelHistoryEntry> {
                Ok(LabelHistoryEntry {
                    label: Label::try_from(row)?,
                    sentence_text,
                    label_count,
                })
            })
            .collect()
    }

    async fn count_all_sentences(&self) -> StoreResult<i64> {
        self.timed(sqlx::query_scalar("SELECT COUNT(*) FROM sentences").fetch_one(&self.pool))
            .await
    }

    async fn labeled_sentence_counts(&self) -> StoreResult<Vec<i64>> {
        self.timed(
            sqlx::query_scalar("SELECT label_count FROM sentences WHERE label_count > 0")
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn label_counts_by_user(&self) -> StoreResult<Vec<Contributor>> {
        let rows: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as("SELECT user_id, COUNT(*) FROM labels GROUP BY user_id")
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, count)| Contributor { user_id, count })
            .collect())
    }

    async fn export_labels(
        &self,
        property_id: PropertyId,
        min_labels: i64,
    ) -> StoreResult<Vec<ExportRow>> {
        let rows: Vec<HistoryRow> = self
            .timed(
                sqlx::query_as(
                    "SELECT l.id, l.sentence_id, l.user_id, l.property_id, l.label, \
                     l.subject_start, l.subject_end, l.object_start, l.object_end, l.created_at, \
                     s.text AS sentence_text, s.label_count AS sentence_label_count \
                     FROM labels l JOIN sentences s ON s.id = l.sentence_id \
                     WHERE s.property_id = ? AND s.label_count >= ? \
                     ORDER BY l.sentence_id ASC, l.id ASC",
                )
                .bind(property_id)
                .bind(min_labels)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let (row, text, _) = r.split();
                ExportRow::from_row(row, text)
            })
            .collect())
    }

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        self.timed(
            sqlx::query_as::<_, Profile>(
                "SELECT user_id, display_name, email, total_labels FROM profiles WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        self.timed(
            sqlx::query_as::<_, Profile>(
                "INSERT INTO profiles (user_id, display_name, email, total_labels) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name, \
                 email = excluded.email, total_labels = excluded.total_labels \
                 RETURNING user_id, display_name, email, total_labels",
            )
            .bind(&profile.user_id)
            .bind(profile.display_name.as_deref())
            .bind(&profile.email)
            .bind(profile.total_labels)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn count_user_labels(&self, user_id: &str) -> StoreResult<i64> {
        self.timed(
            sqlx::query_scalar("SELECT COUNT(*) FROM labels WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn top_profiles(&self, limit: usize) -> StoreResult<Vec<Profile>> {
        self.timed(
            sqlx::query_as::<_, Profile>(
                "SELECT user_id, display_name, email, total_labels FROM profiles \
                 ORDER BY total_labels DESC, user_id ASC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool),
        )
        .await
    }
}

/// Label row joined with its sentence
#[derive(sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    label: LabelRow,
    sentence_text: String,
    sentence_label_count: i64,
}

impl HistoryRow {
    fn split(self) -> (LabelRow, String, i64) {
        (self.label, self.sentence_text, self.sentence_label_count)
    }
}
