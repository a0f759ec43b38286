//! Hosted backend over a PostgREST-style HTTP API
//!
//! Tables live under `{url}/rest/v1/{table}` and the counter procedures under
//! `{url}/rest/v1/rpc/{name}`. Every request carries the project API key as
//! `apikey` plus a bearer token (the API key itself unless a user access
//! token is attached with [`RestStore::with_access_token`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use olab_common::models::{
    Contributor, ExportRow, Label, LabelHistoryEntry, LabelPayload, LabelRow, NewLabel, Profile,
    Property, PropertyId, Sentence, SentenceId,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use super::{
    CatalogStore, CounterDelta, PropertyUpdate, SentenceFilter, SentenceOrder, SentenceStore,
};
use crate::error::{StoreError, StoreResult};

/// Rows requested per page when a full table scan is needed
const PAGE_SIZE: usize = 1000;

/// Ids per `in.(...)` filter, keeps URLs short
const IN_FILTER_CHUNK: usize = 200;

type Query = Vec<(&'static str, String)>;

/// PostgREST client implementing both store traits
#[derive(Debug, Clone)]
pub struct RestStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> StoreResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("olab/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        })
    }

    /// Copy of this store that authenticates as a signed-in user
    pub fn with_access_token(&self, token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            ..self.clone()
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn get_rows<T: DeserializeOwned>(&self, table: &str, query: &Query) -> StoreResult<Vec<T>> {
        let url = self.table_url(table);
        debug!(url = %url, "GET");
        let response = self.request(Method::GET, &url).query(query).send().await?;
        decode(response).await
    }

    /// Fetch every matching row, one page at a time
    async fn get_all_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> StoreResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let mut page_query = query.clone();
            page_query.push(("offset", offset.to_string()));
            page_query.push(("limit", PAGE_SIZE.to_string()));
            let page: Vec<T> = self.get_rows(table, &page_query).await?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(rows)
    }

    /// Exact row count via `Prefer: count=exact` on a HEAD request
    async fn count_rows(&self, table: &str, query: &Query) -> StoreResult<i64> {
        let url = self.table_url(table);
        let response = self
            .request(Method::HEAD, &url)
            .header("Prefer", "count=exact")
            .query(query)
            .send()
            .await?;
        let response = check_status(response).await?;
        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Parse("missing Content-Range header".to_string()))?;
        parse_content_range_total(header)
    }

    async fn call_rpc(&self, name: &str, sentence_id: SentenceId) -> StoreResult<()> {
        let url = self.rpc_url(name);
        debug!(url = %url, sentence_id, "RPC");
        let response = self
            .request(Method::POST, &url)
            .json(&serde_json::json!({ "sentence_id_input": sentence_id }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Map non-success statuses to [`StoreError::Api`]
async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| StoreError::Parse(e.to_string()))
}

/// Total from `Content-Range: 0-9/25` or `*/0`
pub(crate) fn parse_content_range_total(header: &str) -> StoreResult<i64> {
    header
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<i64>().ok())
        .ok_or_else(|| StoreError::Parse(format!("bad Content-Range: {}", header)))
}

fn sentence_query(property_id: PropertyId, filter: SentenceFilter) -> Query {
    let mut query: Query = vec![("property_id", format!("eq.{}", property_id))];
    if filter == SentenceFilter::Unlabeled {
        query.push(("label_count", "eq.0".to_string()));
    }
    query
}

fn order_param(order: SentenceOrder) -> String {
    match order {
        SentenceOrder::IdAsc => "id.asc".to_string(),
        SentenceOrder::LeastLabeledFirst => "label_count.asc.nullslast,id.asc".to_string(),
    }
}

fn in_filter(ids: &[SentenceId]) -> String {
    let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("in.({})", joined.join(","))
}

#[derive(Deserialize)]
struct IdRow {
    id: SentenceId,
}

#[derive(Deserialize)]
struct SentenceIdRow {
    sentence_id: SentenceId,
}

#[derive(Deserialize)]
struct LabelCountRow {
    label_count: Option<i64>,
}

#[derive(Deserialize)]
struct PropertyIdRow {
    property_id: PropertyId,
}

#[derive(Deserialize)]
struct UserIdRow {
    user_id: String,
}

#[derive(Deserialize)]
struct TextRow {
    id: SentenceId,
    text: String,
}

/// `properties?select=id,sentences(count)`
#[derive(Deserialize)]
struct PropertyTotalRow {
    id: PropertyId,
    #[serde(default)]
    sentences: Vec<CountOnly>,
}

#[derive(Deserialize)]
struct CountOnly {
    count: i64,
}

/// `labels?select=*,sentences(text,label_count)`
#[derive(Deserialize)]
struct HistoryRow {
    #[serde(flatten)]
    label: LabelRow,
    sentences: Option<EmbeddedSentence>,
}

#[derive(Deserialize)]
struct EmbeddedSentence {
    text: String,
    #[serde(default)]
    label_count: Option<i64>,
}

/// Upsert body: flat label payload plus the write timestamp
#[derive(Serialize)]
struct LabelUpsert<'a> {
    #[serde(flatten)]
    payload: LabelPayload<'a>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl SentenceStore for RestStore {
    async fn count_sentences(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
    ) -> StoreResult<i64> {
        let mut query = sentence_query(property_id, filter);
        query.push(("select", "id".to_string()));
        self.count_rows("sentences", &query).await
    }

    async fn list_sentence_ids(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
    ) -> StoreResult<Vec<SentenceId>> {
        let mut query = sentence_query(property_id, filter);
        query.push(("select", "id".to_string()));
        query.push(("order", order_param(order)));
        let rows: Vec<IdRow> = self.get_all_rows("sentences", &query).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn fetch_sentence_batch(
        &self,
        property_id: PropertyId,
        filter: SentenceFilter,
        order: SentenceOrder,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Sentence>> {
        let mut query = sentence_query(property_id, filter);
        query.push(("select", "id,property_id,text,label_count".to_string()));
        query.push(("order", order_param(order)));
        query.push(("offset", offset.to_string()));
        query.push(("limit", limit.to_string()));
        self.get_rows("sentences", &query).await
    }

    async fn fetch_user_labeled_ids(
        &self,
        property_id: PropertyId,
        user_id: &str,
    ) -> StoreResult<HashSet<SentenceId>> {
        let query: Query = vec![
            ("select", "sentence_id".to_string()),
            ("property_id", format!("eq.{}", property_id)),
            ("user_id", format!("eq.{}", user_id)),
        ];
        let rows: Vec<SentenceIdRow> = self.get_all_rows("labels", &query).await?;
        Ok(rows.into_iter().map(|r| r.sentence_id).collect())
    }

    async fn fetch_label(
        &self,
        sentence_id: SentenceId,
        user_id: &str,
    ) -> StoreResult<Option<Label>> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("sentence_id", format!("eq.{}", sentence_id)),
            ("user_id", format!("eq.{}", user_id)),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<LabelRow> = self.get_rows("labels", &query).await?;
        rows.into_iter()
            .next()
            .map(Label::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn upsert_label(&self, label: &NewLabel) -> StoreResult<Label> {
        let body = [LabelUpsert {
            payload: label.payload(),
            created_at: Utc::now(),
        }];
        let url = self.table_url("labels");
        let response = self
            .request(Method::POST, &url)
            .query(&[("on_conflict", "sentence_id,user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<LabelRow> = decode(response).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Parse("upsert returned no row".to_string()))?;
        Ok(Label::try_from(row)?)
    }

    async fn adjust_label_count(
        &self,
        sentence_id: SentenceId,
        delta: CounterDelta,
    ) -> StoreResult<()> {
        let name = match delta {
            CounterDelta::Increment => "increment_label_count",
            CounterDelta::Decrement => "decrement_label_count",
        };
        self.call_rpc(name, sentence_id).await
    }

    async fn read_label_count(&self, sentence_id: SentenceId) -> StoreResult<i64> {
        let query: Query = vec![
            ("select", "label_count".to_string()),
            ("id", format!("eq.{}", sentence_id)),
        ];
        let rows: Vec<LabelCountRow> = self.get_rows("sentences", &query).await?;
        rows.into_iter()
            .next()
            .map(|r| r.label_count.unwrap_or(0))
            .ok_or_else(|| StoreError::NotFound(format!("sentence {}", sentence_id)))
    }

    async fn write_label_count(&self, sentence_id: SentenceId, value: i64) -> StoreResult<()> {
        let url = self.table_url("sentences");
        let response = self
            .request(Method::PATCH, &url)
            .query(&[("id", format!("eq.{}", sentence_id))])
            .json(&serde_json::json!({ "label_count": value }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for RestStore {
    async fn list_properties(&self, include_hidden: bool) -> StoreResult<Vec<Property>> {
        let mut query: Query = vec![
            ("select", "*".to_string()),
            ("order", "name.asc".to_string()),
        ];
        if !include_hidden {
            query.push(("is_active", "eq.true".to_string()));
        }
        self.get_rows("properties", &query).await
    }

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("id", format!("eq.{}", property_id)),
        ];
        let rows: Vec<Property> = self.get_rows("properties", &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_property(
        &self,
        property_id: PropertyId,
        update: &PropertyUpdate,
    ) -> StoreResult<Property> {
        let mut body = serde_json::Map::new();
        if let Some(active) = update.is_active {
            body.insert("is_active".to_string(), active.into());
        }
        if let Some(description) = &update.description {
            body.insert("description".to_string(), description.clone().into());
        }
        let url = self.table_url("properties");
        let response = self
            .request(Method::PATCH, &url)
            .query(&[("id", format!("eq.{}", property_id))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<Property> = decode(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("property {}", property_id)))
    }

    async fn sentence_totals(&self) -> StoreResult<HashMap<PropertyId, i64>> {
        let query: Query = vec![("select", "id,sentences(count)".to_string())];
        let rows: Vec<PropertyTotalRow> = self.get_rows("properties", &query).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.id, r.sentences.first().map(|c| c.count).unwrap_or(0)))
            .collect())
    }

    async fn user_label_counts(&self, user_id: &str) -> StoreResult<HashMap<PropertyId, i64>> {
        let query: Query = vec![
            ("select", "property_id".to_string()),
            ("user_id", format!("eq.{}", user_id)),
        ];
        let rows: Vec<PropertyIdRow> = self.get_all_rows("labels", &query).await?;
        let mut counts = HashMap::new();
        for row in rows {
            *counts.entry(row.property_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_user_labels(&self, user_id: &str) -> StoreResult<Vec<LabelHistoryEntry>> {
        let query: Query = vec![
            ("select", "*,sentences(text,label_count)".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ];
        let rows: Vec<HistoryRow> = self.get_all_rows("labels", &query).await?;
        rows.into_iter()
            .map(|row| -> StoreResult<LabelHistoryEntry> {
                let (sentence_text, label_count) = row
                    .sentences
                    .map(|s| (s.text, s.label_count.unwrap_or(0)))
                    .unwrap_or_default();
                Ok(LabelHistoryEntry {
                    label: Label::try_from(row.label)?,
                    sentence_text,
                    label_count,
                })
            })
            .collect()
    }

    async fn count_all_sentences(&self) -> StoreResult<i64> {
        let query: Query = vec![("select", "id".to_string())];
        self.count_rows("sentences", &query).await
    }

    async fn labeled_sentence_counts(&self) -> StoreResult<Vec<i64>> {
        let query: Query = vec![
            ("select", "label_count".to_string()),
            ("label_count", "gt.0".to_string()),
        ];
        let rows: Vec<LabelCountRow> = self.get_all_rows("sentences", &query).await?;
        Ok(rows.into_iter().filter_map(|r| r.label_count).collect())
    }

    async fn label_counts_by_user(&self) -> StoreResult<Vec<Contributor>> {
        let query: Query = vec![("select", "user_id".to_string())];
        let rows: Vec<UserIdRow> = self.get_all_rows("labels", &query).await?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in rows {
            *counts.entry(row.user_id).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(user_id, count)| Contributor { user_id, count })
            .collect())
    }

    async fn export_labels(
        &self,
        property_id: PropertyId,
        min_labels: i64,
    ) -> StoreResult<Vec<ExportRow>> {
        let query: Query = vec![
            ("select", "id,text".to_string()),
            ("property_id", format!("eq.{}", property_id)),
            ("label_count", format!("gte.{}", min_labels)),
            ("order", "id.asc".to_string()),
        ];
        let sentences: Vec<TextRow> = self.get_all_rows("sentences", &query).await?;
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<SentenceId> = sentences.iter().map(|s| s.id).collect();
        let text_by_id: HashMap<SentenceId, String> =
            sentences.into_iter().map(|s| (s.id, s.text)).collect();

        let mut rows = Vec::new();
        for chunk in ids.chunks(IN_FILTER_CHUNK) {
            let query: Query = vec![
                ("select", "*".to_string()),
                ("sentence_id", in_filter(chunk)),
                ("order", "sentence_id.asc,id.asc".to_string()),
            ];
            let labels: Vec<LabelRow> = self.get_all_rows("labels", &query).await?;
            for label in labels {
                let text = text_by_id
                    .get(&label.sentence_id)
                    .cloned()
                    .unwrap_or_default();
                rows.push(ExportRow::from_row(label, text));
            }
        }
        Ok(rows)
    }

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
        ];
        let rows: Vec<Profile> = self.get_rows("profiles", &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let url = self.table_url("profiles");
        let response = self
            .request(Method::POST, &url)
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[profile])
            .send()
            .await?;
        let rows: Vec<Profile> = decode(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Parse("upsert returned no row".to_string()))
    }

    async fn count_user_labels(&self, user_id: &str) -> StoreResult<i64> {
        let query: Query = vec![
            ("select", "id".to_string()),
            ("user_id", format!("eq.{}", user_id)),
        ];
        self.count_rows("labels", &query).await
    }

    async fn top_profiles(&self, limit: usize) -> StoreResult<Vec<Profile>> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("order", "total_labels.desc,user_id.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        self.get_rows("profiles", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query as QueryParams;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range_total("0-9/25").unwrap(), 25);
        assert_eq!(parse_content_range_total("*/0").unwrap(), 0);
        assert!(parse_content_range_total("0-9/*").is_err());
        assert!(parse_content_range_total("garbage").is_err());
    }

    #[test]
    fn test_query_building() {
        let q = sentence_query(7, SentenceFilter::Unlabeled);
        assert_eq!(q, vec![("property_id", "eq.7".to_string()), ("label_count", "eq.0".to_string())]);
        assert_eq!(order_param(SentenceOrder::LeastLabeledFirst), "label_count.asc.nullslast,id.asc");
        assert_eq!(in_filter(&[1, 2, 3]), "in.(1,2,3)");
    }

    #[test]
    fn test_access_token_replaces_bearer() {
        let store = RestStore::new("https://x.example.co/", "anon", Duration::from_secs(5)).unwrap();
        assert_eq!(store.table_url("labels"), "https://x.example.co/rest/v1/labels");
        let user_store = store.with_access_token("user-jwt");
        assert_eq!(user_store.access_token.as_deref(), Some("user-jwt"));
        assert_eq!(user_store.api_key, "anon");
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_count_and_rpc_against_local_server() {
        let rpc_calls: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        let calls = rpc_calls.clone();

        let router = Router::new()
            .route(
                "/rest/v1/sentences",
                get(|QueryParams(params): QueryParams<HashMap<String, String>>| async move {
                    let mut headers = HeaderMap::new();
                    let total = if params.get("label_count").map(String::as_str) == Some("eq.0") { 2 } else { 3 };
                    headers.insert("content-range", format!("*/{}", total).parse().unwrap());
                    (headers, Json(serde_json::json!([]))).into_response()
                }),
            )
            .route(
                "/rest/v1/rpc/increment_label_count",
                post(move |Json(body): Json<serde_json::Value>| {
                    let calls = calls.clone();
                    async move {
                        calls.lock().unwrap().push(body);
                        StatusCode::NO_CONTENT
                    }
                }),
            )
            .route(
                "/rest/v1/rpc/decrement_label_count",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );

        let url = spawn(router).await;
        let store = RestStore::new(&url, "anon", Duration::from_secs(5)).unwrap();

        assert_eq!(store.count_sentences(1, SentenceFilter::Unlabeled).await.unwrap(), 2);
        assert_eq!(store.count_sentences(1, SentenceFilter::Any).await.unwrap(), 3);

        store.adjust_label_count(42, CounterDelta::Increment).await.unwrap();
        assert_eq!(
            rpc_calls.lock().unwrap().as_slice(),
            &[serde_json::json!({ "sentence_id_input": 42 })]
        );

        let err = store.adjust_label_count(42, CounterDelta::Decrement).await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
    }
}
