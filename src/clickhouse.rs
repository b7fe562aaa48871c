use crate::batch::{Batch, WriteResponse};
use crate::codec::RecordCodec;
use crate::error::WriteError;
use crate::http::{status_error, transport_error};
use crate::sink::BatchSink;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

/// Configuration for [`ClickHouseSink`].
///
/// The sink talks to ClickHouse over HTTP using the `JSONEachRow` format,
/// so the codec must emit one JSON object per record whose keys match the
/// table columns.
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Base URL without query, e.g. "http://127.0.0.1:8123"
    pub url: String,
    pub database: String,
    pub table: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// ClickHouse implementation of [`BatchSink`] using the HTTP interface.
/// Each batch becomes one `INSERT`.
pub struct ClickHouseSink<T> {
    client: Client,
    config: ClickHouseConfig,
    codec: Arc<dyn RecordCodec<T>>,
}

impl<T> ClickHouseSink<T> {
    /// Construct a new sink instance using the provided configuration.
    ///
    /// **Parameters**
    /// - `config`: [`ClickHouseConfig`] describing target URL, database,
    ///   table and optional authentication settings.
    /// - `codec`: encoder producing one JSON row per record.
    pub fn new(config: ClickHouseConfig, codec: Arc<dyn RecordCodec<T>>) -> Self {
        ClickHouseSink {
            client: Client::new(),
            config,
            codec,
        }
    }

    pub(crate) fn endpoint(&self) -> String {
        let mut query = format!(
            "database={}&query={}",
            urlencoding::encode(&self.config.database),
            urlencoding::encode(&format!("INSERT INTO {} FORMAT JSONEachRow", self.config.table)),
        );

        if let Some(user) = &self.config.user {
            query.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            query.push_str(&format!("&password={}", urlencoding::encode(password)));
        }

        format!("{}/?{}", self.config.url.trim_end_matches('/'), query)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> BatchSink<T> for ClickHouseSink<T> {
    async fn send(&self, batch: &Batch<T>) -> Result<WriteResponse, WriteError> {
        let mut body = Vec::new();
        self.codec.encode_batch(batch, &mut body)?;
        let bytes = body.len() as u64;

        let resp = self
            .client
            .post(self.endpoint())
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        if status.is_success() {
            Ok(WriteResponse::new(serde_json::Value::Null, text).with_bytes_written(bytes))
        } else {
            Err(status_error("clickhouse", status, &text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn endpoint_encodes_query_and_credentials() {
        let sink: ClickHouseSink<serde_json::Value> = ClickHouseSink::new(
            ClickHouseConfig {
                url: "http://127.0.0.1:8123/".into(),
                database: "default".into(),
                table: "events".into(),
                user: Some("writer".into()),
                password: Some("p@ss word".into()),
            },
            Arc::new(JsonCodec),
        );
        assert_eq!(
            sink.endpoint(),
            "http://127.0.0.1:8123/?database=default\
             &query=INSERT%20INTO%20events%20FORMAT%20JSONEachRow\
             &user=writer&password=p%40ss%20word"
        );
    }
}
