//! Shared fixtures for olab-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use olab_common::db::init_memory_database;
use olab_common::models::{Label, NewLabel, PropertyId, Sentence, SentenceId};
use olab_core::error::{StoreError, StoreResult};
use olab_core::store::{CounterDelta, SentenceFilter, SentenceOrder, SentenceStore, SqliteStore};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// SQLite store seeded with one property and the given sentence texts
pub async fn sqlite_store(texts: &[&str]) -> SqliteStore {
    let pool = init_memory_database().await.unwrap();
    sqlx::query(
        r#"INSERT INTO properties (name, domain, "range", iri) VALUES ('birthPlace', 'Person', 'Place', 'http://dbpedia.org/ontology/birthPlace')"#,
    )
    .execute(&pool)
    .await
    .unwrap();
    for text in texts {
        sqlx::query("INSERT INTO sentences (property_id, text) VALUES (1, ?)")
            .bind(*text)
            .execute(&pool)
            .await
            .unwrap();
    }
    SqliteStore::new(pool, Duration::from_secs(5))
}

pub async fn label_count(store: &SqliteStore, sentence_id: SentenceId) -> i64 {
    store.read_label_count(sentence_id).await.unwrap()
}

/// Which calls of [`ScriptedStore`] fail
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub count: bool,
    pub batch: bool,
    pub labeled_ids: bool,
    pub label: bool,
    pub upsert: bool,
    pub atomic: bool,
    pub read_count: bool,
    pub write_count: bool,
}

/// In-memory store with switchable failures and a call log
#[derive(Default)]
pub struct ScriptedStore {
    pub sentences: Mutex<Vec<Sentence>>,
    pub labels: Mutex<HashMap<(SentenceId, String), Label>>,
    pub failures: Mutex<Failures>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedStore {
    /// `n` sentences with ids 1..=n in property 1
    pub fn with_sentences(n: i64) -> Self {
        let store = Self::default();
        *store.sentences.lock().unwrap() = (1..=n)
            .map(|id| Sentence {
                id,
                property_id: 1,
                text: format!("Sentence number {} has five tokens", id),
                label_count: 0,
            })
            .collect();
        store
    }

    pub fn fail(&self, f: impl FnOnce(&mut Failures)) {
        f(&mut self.failures.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_of(&self, sentence_id: SentenceId) -> i64 {
        self.sentences
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == sentence_id)
            .map(|s| s.label_count)
            .unwrap_or(-1)
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn failing(&self, pick: impl FnOnce(&Failures) -> bool) -> bool {
        pick(&self.failures.lock().unwrap())
    }

    fn selected(&self, property_id: PropertyId, filter: SentenceFilter, order: SentenceOrder) -> Vec<Sentence> {
        let mut rows: Vec<Sentence> = self
            .sentences
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.property_id == property_id)
            .filter(|s| filter == SentenceFilter::Any || s.label_count == 0)
            .cloned()
            .collect();
        match order {
            SentenceOrder::IdAsc => rows.sort_by_key(|s| s.id),
            SentenceOrder::LeastLabeledFirst => rows.sort_by_key(|s| (s.label_count, s.id)),
        }
        rows
    }
}

fn injected() -> StoreError {
    StoreError::Network("injected failure".to_string())
}

#[async_trait]
impl SentenceStore for ScriptedStore {
    async fn count_sentences(&self, property_id: PropertyId, filter: SentenceFilter) -> StoreResult<i64> {
        self.log("count");
        if self.failing(|f| f.count) {
            return Err(injected());
        }
        Ok(self.selected(property_id, filter, SentenceOrder::IdAsc).len() as i64)
    }

    async fn list_sentence_ids(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
    ) -> StoreResult<Vec<SentenceId>> {
        self.log("ids");
        Ok(self.selected(property_id, filter, order).iter().map(|s| s.id).collect())
    }

    async fn fetch_sentence_batch(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Sentence>> {
        self.log(format!("batch {}+{}", offset, limit));
        if self.failing(|f| f.batch) {
            return Err(injected());
        }
        Ok(self
            .selected(property_id, filter, order)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn fetch_user_labeled_ids(&self, property_id: PropertyId, user_id: &str) -> StoreResult<HashSet<SentenceId>> {
        self.log("labeled_ids");
        if self.failing(|f| f.labeled_ids) {
            return Err(injected());
        }
        Ok(self
            .labels
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.property_id == property_id && l.user_id == user_id)
            .map(|l| l.sentence_id)
            .collect())
    }

    async fn fetch_label(&self, sentence_id: SentenceId, user_id: &str) -> StoreResult<Option<Label>> {
        self.log(format!("label {}", sentence_id));
        if self.failing(|f| f.label) {
            return Err(injected());
        }
        Ok(self
            .labels
            .lock()
            .unwrap()
            .get(&(sentence_id, user_id.to_string()))
            .cloned())
    }

    async fn upsert_label(&self, label: &NewLabel) -> StoreResult<Label> {
        self.log(format!("upsert {}", label.sentence_id));
        if self.failing(|f| f.upsert) {
            return Err(injected());
        }
        let mut labels = self.labels.lock().unwrap();
        let id = labels
            .get(&(label.sentence_id, label.user_id.clone()))
            .map(|l| l.id)
            .unwrap_or(labels.len() as i64 + 1);
        let saved = Label {
            id,
            sentence_id: label.sentence_id,
            user_id: label.user_id.clone(),
            property_id: label.property_id,
            kind: label.kind,
            subject: label.subject,
            object: label.object,
            created_at: Utc::now(),
        };
        labels.insert((label.sentence_id, label.user_id.clone()), saved.clone());
        Ok(saved)
    }

    async fn adjust_label_count(&self, sentence_id: SentenceId, delta: CounterDelta) -> StoreResult<()> {
        self.log(format!("rpc {} {:?}", sentence_id, delta));
        if self.failing(|f| f.atomic) {
            return Err(injected());
        }
        let mut sentences = self.sentences.lock().unwrap();
        let sentence = sentences
            .iter_mut()
            .find(|s| s.id == sentence_id)
            .ok_or_else(|| StoreError::NotFound(format!("sentence {}", sentence_id)))?;
        sentence.label_count = delta.apply_to(sentence.label_count);
        Ok(())
    }

    async fn read_label_count(&self, sentence_id: SentenceId) -> StoreResult<i64> {
        self.log(format!("read {}", sentence_id));
        if self.failing(|f| f.read_count) {
            return Err(injected());
        }
        Ok(self.count_of(sentence_id))
    }

    async fn write_label_count(&self, sentence_id: SentenceId, value: i64) -> StoreResult<()> {
        self.log(format!("write {} {}", sentence_id, value));
        if self.failing(|f| f.write_count) {
            return Err(injected());
        }
        let mut sentences = self.sentences.lock().unwrap();
        if let Some(s) = sentences.iter_mut().find(|s| s.id == sentence_id) {
            s.label_count = value;
        }
        Ok(())
    }
}
