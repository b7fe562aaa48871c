use crate::backend::{BackendBuildError, DsnError};
use crate::batch::{Batch, WriteResponse};
use crate::codec::RecordCodec;
use crate::error::WriteError;
use crate::http::{status_error, transport_error};
use crate::sink::BatchSink;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9200;

/// Configuration for [`OpenSearchSink`].
#[derive(Clone, Debug)]
pub struct OpenSearchConfig {
    /// Base URLs of cluster nodes, e.g. "http://localhost:9200". Requests
    /// rotate over them.
    pub hosts: Vec<String>,
    /// Target index name.
    pub index: String,
    /// Legacy mapping type, only for clusters that still require one.
    pub doc_type: Option<String>,
    pub request_timeout: Duration,
}

impl OpenSearchConfig {
    /// Config for `index` on the default local node.
    pub fn new(index: impl Into<String>) -> Self {
        OpenSearchConfig {
            hosts: vec![format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}")],
            index: index.into(),
            doc_type: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Turn `host` / `host:port` entries into base URLs.
///
/// An empty list yields the default node. Entries that already carry an
/// `http://` or `https://` scheme are taken as they are.
pub fn parse_hosts<S: AsRef<str>>(hosts: &[S]) -> Result<Vec<String>, DsnError> {
    if hosts.is_empty() {
        return Ok(vec![format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}")]);
    }

    hosts
        .iter()
        .map(|entry| {
            let entry = entry.as_ref().trim();
            if entry.starts_with("http://") || entry.starts_with("https://") {
                return Ok(entry.trim_end_matches('/').to_string());
            }

            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [host] if !host.is_empty() => Ok(format!("http://{host}:{DEFAULT_PORT}")),
                [host, port] if !host.is_empty() => {
                    let port: u16 = port
                        .parse()
                        .map_err(|_| DsnError::MalformedHost(entry.to_string()))?;
                    Ok(format!("http://{host}:{port}"))
                }
                _ => Err(DsnError::MalformedHost(entry.to_string())),
            }
        })
        .collect()
}

/// OpenSearch / Elasticsearch sink that sends each batch as one request to
/// the bulk API.
///
/// A batch only counts as written when every item of the bulk request was
/// indexed; any item failure fails the whole batch.
pub struct OpenSearchSink<T> {
    client: Client,
    config: OpenSearchConfig,
    codec: Arc<dyn RecordCodec<T>>,
    action: Vec<u8>,
    next_host: AtomicUsize,
}

impl<T> OpenSearchSink<T> {
    pub fn new(
        config: OpenSearchConfig,
        codec: Arc<dyn RecordCodec<T>>,
    ) -> Result<Self, BackendBuildError> {
        if config.hosts.is_empty() {
            return Err(BackendBuildError::Dsn(DsnError::MissingHost));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;

        let mut target = json!({ "_index": config.index });
        if let Some(doc_type) = &config.doc_type {
            target["_type"] = json!(doc_type);
        }
        let mut action = serde_json::to_vec(&json!({ "index": target }))
            .map_err(|e| BackendBuildError::Invalid(e.to_string()))?;
        action.push(b'\n');

        for host in &config.hosts {
            info!(host = %host, index = %config.index, "adding host to opensearch sink");
        }

        Ok(OpenSearchSink {
            client,
            config,
            codec,
            action,
            next_host: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &OpenSearchConfig {
        &self.config
    }

    /// NDJSON bulk body: one action line followed by one document per record.
    pub(crate) fn bulk_body(&self, batch: &Batch<T>) -> Result<Vec<u8>, WriteError> {
        let mut body = Vec::with_capacity(batch.len() * (self.action.len() + 128));
        for record in batch {
            body.extend_from_slice(&self.action);
            self.codec.encode(record, &mut body)?;
            body.push(b'\n');
        }
        Ok(body)
    }

    fn next_host(&self) -> &str {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed) % self.config.hosts.len();
        &self.config.hosts[i]
    }
}

/// Inspect a bulk response for item-level failures.
///
/// Returns `None` when every item succeeded. When all failed items were
/// throttled (status 429) the failure is transient, otherwise it is a
/// rejection.
pub fn bulk_failure(response: &Value) -> Option<WriteError> {
    if response.get("errors").and_then(Value::as_bool) != Some(true) {
        return None;
    }

    let mut lines = Vec::new();
    let mut all_throttled = true;
    let items = response.get("items").and_then(Value::as_array);
    for (i, item) in items.into_iter().flatten().enumerate() {
        let Some(result) = item.as_object().and_then(|op| op.values().next()) else {
            continue;
        };
        let Some(error) = result.get("error") else {
            continue;
        };
        if result.get("status").and_then(Value::as_u64) != Some(429) {
            all_throttled = false;
        }
        let reason = match (error.get("type"), error.get("reason")) {
            (Some(Value::String(kind)), Some(Value::String(reason))) => format!("{kind}: {reason}"),
            _ => error.to_string(),
        };
        lines.push(format!(
            "[{i}]: index [{}], id [{}], message [{reason}]",
            result.get("_index").and_then(Value::as_str).unwrap_or("?"),
            result.get("_id").and_then(Value::as_str).unwrap_or("?"),
        ));
    }

    let message = format!("failure in bulk execution:\n{}", lines.join("\n"));
    if all_throttled && !lines.is_empty() {
        Some(WriteError::Transient(message))
    } else {
        Some(WriteError::Rejected(message))
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> BatchSink<T> for OpenSearchSink<T> {
    async fn send(&self, batch: &Batch<T>) -> Result<WriteResponse, WriteError> {
        let body = self.bulk_body(batch)?;
        let bytes = body.len() as u64;
        let url = format!("{}/_bulk", self.next_host().trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error("opensearch", status, &text));
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| WriteError::Transient(format!("unreadable bulk response: {e}")))?;
        if let Some(err) = bulk_failure(&raw) {
            return Err(err);
        }
        Ok(WriteResponse::new(raw, text).with_bytes_written(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    fn sink(doc_type: Option<&str>) -> OpenSearchSink<Value> {
        let mut config = OpenSearchConfig::new("events");
        config.doc_type = doc_type.map(str::to_string);
        OpenSearchSink::new(config, Arc::new(JsonCodec)).unwrap()
    }

    #[test]
    fn parse_hosts_applies_default_port() {
        let hosts = parse_hosts(&["es1", "es2:9201", " https://es3:443/ "]).unwrap();
        assert_eq!(hosts, vec!["http://es1:9200", "http://es2:9201", "https://es3:443"]);
    }

    #[test]
    fn parse_hosts_defaults_to_local_node() {
        let empty: [&str; 0] = [];
        assert_eq!(parse_hosts(&empty).unwrap(), vec!["http://localhost:9200"]);
    }

    #[test]
    fn parse_hosts_rejects_malformed_entries() {
        for bad in ["es1:9200:1", "es1:port", ":9200", ""] {
            assert!(
                matches!(parse_hosts(&[bad]), Err(DsnError::MalformedHost(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn bulk_body_pairs_action_and_document() {
        let batch = Batch::new(0, vec![json!({"n": 1}), json!({"n": 2})]);
        let body = String::from_utf8(sink(None).bulk_body(&batch).unwrap()).unwrap();
        let action = r#"{"index":{"_index":"events"}}"#;
        assert_eq!(body, format!("{action}\n{{\"n\":1}}\n{action}\n{{\"n\":2}}\n"));
    }

    #[test]
    fn bulk_body_includes_doc_type_when_configured() {
        let batch = Batch::new(0, vec![json!({})]);
        let body = String::from_utf8(sink(Some("doc")).bulk_body(&batch).unwrap()).unwrap();
        assert!(body.starts_with(r#"{"index":{"_index":"events","_type":"doc"}}"#), "{body}");
    }

    #[test]
    fn successful_bulk_response_has_no_failure() {
        let resp = json!({"took": 3, "errors": false, "items": [{"index": {"status": 201}}]});
        assert!(bulk_failure(&resp).is_none());
    }

    #[test]
    fn item_failure_is_a_rejection_with_details() {
        let resp = json!({
            "errors": true,
            "items": [
                {"index": {"_index": "events", "_id": "a", "status": 201}},
                {"index": {"_index": "events", "_id": "b", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}}
            ]
        });
        match bulk_failure(&resp) {
            Some(WriteError::Rejected(msg)) => {
                assert!(msg.contains("[1]: index [events], id [b]"), "{msg}");
                assert!(msg.contains("mapper_parsing_exception: failed to parse"), "{msg}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn throttled_items_are_transient() {
        let resp = json!({
            "errors": true,
            "items": [{"index": {"_index": "events", "_id": "a", "status": 429,
                "error": {"type": "es_rejected_execution_exception", "reason": "queue full"}}}]
        });
        assert!(bulk_failure(&resp).unwrap().is_transient());
    }
}
