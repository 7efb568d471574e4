//! Firestore REST API client.
//!
//! Speaks the `firestore.googleapis.com/v1` document API directly over
//! reqwest: service-account tokens cached with a refresh margin, one
//! mid-flight refresh when Firestore reports the token expired, and a
//! tracing span plus request metrics around every call. Retries are opt-in
//! per call site via [`FirestoreClient::with_retry`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_documents_returned, record_request};
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::types::{
    BatchGetDocumentsRequest, BatchGetDocumentsResponse, BatchWriteRequest, BatchWriteResponse,
    Document, DocumentMask, ListDocumentsResponse, RunQueryRequest, RunQueryResponse,
    StructuredQuery, Value, Write,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Firestore caps batchGet at 100 documents per call.
const BATCH_GET_LIMIT: usize = 100;
/// Firestore caps batchWrite at 500 writes per call.
const BATCH_WRITE_LIMIT: usize = 500;

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually "(default)".
    pub database_id: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = ["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: env_secs("FIRESTORE_CONNECT_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            retry: RetryConfig::from_env(),
        })
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    let secs: u64 = std::env::var(name).ok()?.parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Load the service account named by GOOGLE_APPLICATION_CREDENTIALS.
fn service_account_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
    let loaded = CustomServiceAccount::from_env()
        .map_err(|e| FirestoreError::auth_error(format!("Failed to load service account: {e}")))?;

    loaded
        .map(|sa| Arc::new(sa) as Arc<dyn TokenProvider>)
        .ok_or_else(|| {
            FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )
        })
}

fn with_params(mut url: String, params: &[String]) -> String {
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// Firestore streams runQuery and batchGet as one JSON array of response
/// elements. Surface a body prefix on parse failure; the serde error alone
/// rarely says what came back.
fn parse_response_array<T>(endpoint: &str, text: &str) -> FirestoreResult<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(text).map_err(|e| {
        let prefix: String = text.chars().take(200).collect();
        FirestoreError::request_failed(format!(
            "Failed to parse {endpoint} response: {e} (body prefix: {prefix})"
        ))
    })
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .user_agent(concat!("adreel-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let token_cache = Arc::new(TokenCache::new(service_account_provider()?));

        Ok(Self {
            http,
            config,
            base_url,
            token_cache,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{collection}/{doc_id}", self.base_url)
    }

    /// Full resource name, as batch operations require.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{collection}/{doc_id}",
            self.config.project_id, self.config.database_id
        )
    }

    /// Send an authorized request, refreshing the token once if Firestore
    /// reports it expired mid-flight.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> FirestoreResult<reqwest::Response> {
        let mut token = self.token_cache.get_token().await?;
        let mut refreshed = false;

        loop {
            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(b) = body {
                request = request.json(b);
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && !refreshed {
                let text = response.text().await.unwrap_or_default();
                if Self::is_access_token_expired(&text) {
                    self.token_cache.invalidate().await;
                    token = self.token_cache.get_token().await?;
                    refreshed = true;
                    continue;
                }
                return Err(FirestoreError::from_http_status(
                    StatusCode::UNAUTHORIZED.as_u16(),
                    format!("{url} failed: {text}"),
                ));
            }

            return Ok(response);
        }
    }

    /// Fetch one document, `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        self.instrumented("get_document", collection, Some(doc_id), async {
            let response = self.send(Method::GET, &url, None).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Create `collection/doc_id`, erroring if the ID is already taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!("{}/{collection}?documentId={doc_id}", self.base_url);
        let body = serde_json::to_value(Document::new(fields))?;

        self.instrumented("create_document", collection, Some(doc_id), async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => {
                    Err(FirestoreError::AlreadyExists(format!("{collection}/{doc_id}")))
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Merge fields into a document; `update_mask` limits which field paths
    /// are touched.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> FirestoreResult<Document> {
        let params: Vec<String> = update_mask
            .unwrap_or_default()
            .iter()
            .map(|f| format!("updateMask.fieldPaths={f}"))
            .collect();
        let url = with_params(self.document_path(collection, doc_id), &params);
        let body = serde_json::to_value(Document::new(fields))?;

        self.instrumented("update_document", collection, Some(doc_id), async {
            let response = self.send(Method::PATCH, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{collection}/{doc_id}")))
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Update guarded by the document's current update time. Lost races
    /// come back as [`FirestoreError::PreconditionFailed`].
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .unwrap_or_default()
            .iter()
            .map(|f| format!("updateMask.fieldPaths={f}"))
            .collect();
        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }
        let url = with_params(self.document_path(collection, doc_id), &params);
        let body = serde_json::to_value(Document::new(fields))?;

        self.instrumented("update_document_precondition", collection, Some(doc_id), async {
            let response = self.send(Method::PATCH, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(format!(
                        "Precondition failed: {text}"
                    )))
                }
                StatusCode::NOT_FOUND => {
                    Err(FirestoreError::not_found(format!("{collection}/{doc_id}")))
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Missing documents count as already deleted.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_path(collection, doc_id);

        self.instrumented("delete_document", collection, Some(doc_id), async {
            let response = self.send(Method::DELETE, &url, None).await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {collection}/{doc_id} already deleted (idempotent)");
                    Ok(())
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Page through a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> FirestoreResult<ListDocumentsResponse> {
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={size}"));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        let url = with_params(format!("{}/{collection}", self.base_url), &params);

        self.instrumented("list_documents", collection, None, async {
            let response = self.send(Method::GET, &url, None).await?;
            match response.status() {
                StatusCode::OK => {
                    let list: ListDocumentsResponse = response.json().await?;
                    let returned = list.documents.as_ref().map(|d| d.len()).unwrap_or(0) as u64;
                    record_documents_returned(collection, returned);
                    Ok(list)
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query.
    ///
    /// `parent_path` is the path holding the queried collection, e.g.
    /// "teams/TEAM_ID" when querying "teams/TEAM_ID/videos". Pass "" to
    /// query from the database root; collection group queries need that.
    pub async fn run_query(
        &self,
        parent_path: &str,
        query: StructuredQuery,
    ) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{parent_path}:runQuery", self.base_url)
        };

        let collection_label = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();

        let body = serde_json::to_value(RunQueryRequest {
            structured_query: query,
        })?;

        let span_label = if parent_path.is_empty() { "(root)" } else { parent_path };

        self.instrumented("run_query", span_label, None, async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let text = response.text().await.unwrap_or_default();
                    let elements: Vec<RunQueryResponse> =
                        parse_response_array("runQuery", &text)?;

                    let docs: Vec<Document> =
                        elements.into_iter().filter_map(|r| r.document).collect();
                    record_documents_returned(&collection_label, docs.len() as u64);
                    Ok(docs)
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Fetch documents by full resource name. Missing documents are
    /// omitted; response order is whatever Firestore returns.
    pub async fn batch_get_documents(
        &self,
        full_document_names: Vec<String>,
        mask: Option<DocumentMask>,
    ) -> FirestoreResult<Vec<Document>> {
        if full_document_names.is_empty() {
            return Ok(vec![]);
        }
        if full_document_names.len() > BATCH_GET_LIMIT {
            return Err(FirestoreError::request_failed(format!(
                "Batch get exceeds {BATCH_GET_LIMIT} document limit"
            )));
        }

        let url = format!("{}:batchGet", self.base_url);
        let body = serde_json::to_value(BatchGetDocumentsRequest {
            documents: full_document_names,
            mask,
        })?;

        self.instrumented("batch_get_documents", "batch", None, async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let text = response.text().await.unwrap_or_default();
                    let elements: Vec<BatchGetDocumentsResponse> =
                        parse_response_array("batchGet", &text)?;
                    Ok(elements.into_iter().filter_map(|r| r.found).collect())
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Multi-document write. Writes apply independently; per-write failures
    /// surface through [`BatchWriteResponse::check_for_errors`].
    pub async fn batch_write(&self, writes: Vec<Write>) -> FirestoreResult<BatchWriteResponse> {
        if writes.is_empty() {
            return Ok(BatchWriteResponse::empty());
        }
        if writes.len() > BATCH_WRITE_LIMIT {
            return Err(FirestoreError::request_failed(format!(
                "Batch write exceeds {BATCH_WRITE_LIMIT} document limit"
            )));
        }

        let url = format!("{}:batchWrite", self.base_url);
        let body = serde_json::to_value(BatchWriteRequest { writes })?;

        self.instrumented("batch_write", "batch", None, async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let batch_response: BatchWriteResponse = response.json().await?;
                    batch_response.check_for_errors()?;
                    Ok(batch_response)
                }
                StatusCode::CONFLICT => {
                    Err(FirestoreError::AlreadyExists("Batch write conflict".to_string()))
                }
                StatusCode::PRECONDITION_FAILED => Err(FirestoreError::PreconditionFailed(
                    "Batch precondition failed".to_string(),
                )),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run `op` under the configured retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    /// Run a request future inside a tracing span, recording metrics.
    async fn instrumented<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation,
            collection,
            doc_id = tracing::field::Empty,
        );
        if let Some(id) = doc_id {
            span.record("doc_id", id);
        }

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from(status: StatusCode, url: &str, response: reqwest::Response) -> FirestoreError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            if let Some(ms) = retry_after_ms {
                return FirestoreError::RateLimited(ms);
            }
        }

        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{url} failed: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        let result = FirestoreConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_config_default_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("FIRESTORE_DATABASE_ID");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.database_id, "(default)");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    fn test_access_token_expiry_detection() {
        assert!(FirestoreClient::is_access_token_expired(
            r#"{"error":{"status":"UNAUTHENTICATED","message":"ACCESS_TOKEN_EXPIRED"}}"#
        ));
        assert!(!FirestoreClient::is_access_token_expired("permission denied"));
    }

    #[test]
    fn test_with_params_builds_query_string() {
        assert_eq!(with_params("base".to_string(), &[]), "base");
        assert_eq!(
            with_params("base".to_string(), &["a=1".to_string(), "b=2".to_string()]),
            "base?a=1&b=2"
        );
    }
}
