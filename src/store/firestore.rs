//! Firestore REST backend
//!
//! Talks to the Firestore v1 REST API directly: document reads, collection
//! listing with paging, `:runQuery` equality filters and `PATCH` with an
//! `updateMask` for merge writes. Firestore's typed values are converted to and
//! from plain JSON at this boundary.

use super::{ConfigStore, Document};
use crate::{PaymentError, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default Firestore REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Connection settings
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

impl FirestoreConfig {
    /// Settings for a project's default database
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: "(default)".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the API key sent as the `key` query parameter
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set an OAuth bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Override the REST endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(PaymentError::config("Firestore project id cannot be empty"));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            PaymentError::config(format!("Invalid Firestore URL '{}': {}", self.base_url, e))
        })?;
        Ok(())
    }
}

/// Firestore REST client
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    config: FirestoreConfig,
    client: Client,
}

impl FirestoreStore {
    /// Create a new client
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.config.base_url,
            utf8_percent_encode(&self.config.project_id, SEGMENT),
            self.config.database
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.documents_root(),
            utf8_percent_encode(collection, SEGMENT),
            utf8_percent_encode(id, SEGMENT)
        )
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| PaymentError::store(format!("{} failed: {}", what, e)))?;
        Ok(response)
    }

    async fn read_json(response: Response, what: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            tracing::error!(%status, %body, "Firestore {} failed", what);
            return Err(PaymentError::store(format!(
                "{} failed with status {}: {}",
                what, status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::store(format!("{} returned invalid JSON: {}", what, e)))
    }
}

#[async_trait]
impl ConfigStore for FirestoreStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.document_url(collection, id);
        tracing::debug!(%url, "Firestore get");
        let response = self.send(self.client.get(&url), "get").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::read_json(response, "get").await?;
        Ok(Some(decode_document(&body)))
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_root());
        let body = json!({
            "structuredQuery": {
                "from": [{"collectionId": collection}],
                "where": {
                    "fieldFilter": {
                        "field": {"fieldPath": field},
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });
        let response = self.send(self.client.post(&url).json(&body), "runQuery").await?;
        let rows = Self::read_json(response, "runQuery").await?;

        Ok(rows
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("document"))
                    .map(decode_document)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let url = format!(
            "{}/{}",
            self.documents_root(),
            utf8_percent_encode(collection, SEGMENT)
        );
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("pageSize", "300")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = self.send(request, "list").await?;
            let page = Self::read_json(response, "list").await?;

            if let Some(docs) = page.get("documents").and_then(Value::as_array) {
                documents.extend(docs.iter().map(decode_document));
            }
            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(documents)
    }

    async fn set_merge(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let mut url = self.document_url(collection, id);
        let paths = update_mask(&data);
        for (i, path) in paths.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str("updateMask.fieldPaths=");
            url.extend(utf8_percent_encode(path, SEGMENT));
        }

        let fields = match encode_value(&data) {
            Value::Object(mut map) => map
                .remove("mapValue")
                .and_then(|m| m.get("fields").cloned())
                .unwrap_or_else(|| json!({})),
            _ => json!({}),
        };

        tracing::debug!(collection, id, mask = ?paths, "Firestore merge");
        let response = self
            .send(self.client.patch(&url).json(&json!({ "fields": fields })), "patch")
            .await?;
        Self::read_json(response, "patch").await?;
        Ok(())
    }
}

/// Leaf field paths of a patch, used as the merge mask
pub fn update_mask(data: &Value) -> Vec<String> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    let segment = quote_segment(key);
                    let path = if prefix.is_empty() {
                        segment
                    } else {
                        format!("{}.{}", prefix, segment)
                    };
                    walk(&path, child, out);
                }
            }
            _ if !prefix.is_empty() => out.push(prefix.to_string()),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk("", data, &mut out);
    out
}

fn quote_segment(key: &str) -> String {
    let simple = key
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        key.to_string()
    } else {
        format!("`{}`", key.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn decode_document(doc: &Value) -> Document {
    let id = doc
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .unwrap_or_default()
        .to_string();
    let mut data = doc
        .get("fields")
        .map(decode_fields)
        .unwrap_or_else(|| Value::Object(Map::new()));
    if let (Some(updated), Value::Object(map)) = (doc.get("updateTime"), &mut data) {
        map.entry("updateTime".to_string())
            .or_insert_with(|| updated.clone());
    }
    Document::new(id, data)
}

fn decode_fields(fields: &Value) -> Value {
    match fields.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect(),
        ),
        None => Value::Object(Map::new()),
    }
}

/// Convert a Firestore typed value to plain JSON
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "mapValue" => inner
            .get("fields")
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new())),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        _ => inner.clone(),
    }
}

/// Convert plain JSON to a Firestore typed value
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => json!({"integerValue": i.to_string()}),
            (None, Some(u)) => json!({"integerValue": u.to_string()}),
            _ => json!({"doubleValue": n.as_f64()}),
        },
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => json!({
            "arrayValue": {"values": items.iter().map(encode_value).collect::<Vec<_>>()}
        }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({"mapValue": {"fields": fields}})
        }
    }
}
