//! Supabase adapter: PostgREST for tables, Storage API for buckets

use async_trait::async_trait;
use creel_core::config::StoreConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Response, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{join_path, ObjectDescriptor};
use crate::traits::{ObjectStore, Row, TableStore};

/// Entries requested per Storage list call
const LIST_PAGE_SIZE: usize = 100;

/// Table and object store backed by a Supabase project
pub struct SupabaseStore {
    client: reqwest::Client,
    base: Url,
    page_size: usize,
    insert_batch_size: usize,
    key_column: String,
}

impl SupabaseStore {
    /// Create a store for `url` authenticated with the service role key,
    /// using default paging settings
    pub fn new(url: &str, service_key: &str) -> StoreResult<Self> {
        let config = StoreConfig {
            url: Some(url.to_string()),
            service_key: Some(service_key.to_string()),
            ..StoreConfig::default()
        };
        Self::from_config(&config)
    }

    /// Create a store from resolved configuration
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Config("store URL is not set".to_string()))?;
        let key = config
            .service_key
            .as_deref()
            .ok_or_else(|| StoreError::Config("service key is not set".to_string()))?;

        let base = Url::parse(url)
            .map_err(|e| StoreError::Config(format!("invalid store URL '{}': {}", url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!("invalid store URL '{}'", url)));
        }

        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(key)
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|_| StoreError::Config("service key is not a valid header value".into()))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base,
            page_size: config.page_size.max(1),
            insert_batch_size: config.insert_batch_size.max(1),
            key_column: config.key_column.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn table_url(&self, table: &str) -> Url {
        self.endpoint(&["rest", "v1", table])
    }

    async fn list_page(
        &self,
        bucket: &str,
        dir: &str,
        offset: usize,
    ) -> StoreResult<Vec<Map<String, Value>>> {
        let url = self.endpoint(&["storage", "v1", "object", "list", bucket]);
        let body = json!({
            "prefix": dir,
            "limit": LIST_PAGE_SIZE,
            "offset": offset,
            "sortBy": {"column": "name", "order": "asc"},
        });
        let response = check_status(self.client.post(url).json(&body).send().await?).await?;
        decode_json(response).await
    }
}

#[async_trait]
impl TableStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn ping(&self) -> StoreResult<()> {
        let url = self.endpoint(&["rest", "v1", ""]);
        debug!("Pinging {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StoreError::Unavailable(format!(
                "store answered {}",
                status
            )));
        }
        check_status(response).await.map(|_| ())
    }

    async fn fetch_rows(&self, table: &str) -> StoreResult<Vec<Row>> {
        let mut rows = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut url = self.table_url(table);
            url.query_pairs_mut()
                .append_pair("select", "*")
                .append_pair("order", &format!("{}.asc", self.key_column))
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("offset", &offset.to_string());

            let response = check_status(self.client.get(url).send().await?).await?;
            let page: Vec<Row> = decode_json(response).await?;
            // The server may cap pages below page_size, so only an empty
            // page ends the table.
            if page.is_empty() {
                break;
            }
            offset += page.len();
            rows.extend(page);
        }

        debug!("Fetched {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    async fn delete_all(&self, table: &str) -> StoreResult<u64> {
        let mut url = self.table_url(table);
        url.query_pairs_mut()
            .append_pair(&self.key_column, "not.is.null");

        let response = self
            .client
            .delete(url)
            .header("Prefer", "return=minimal, count=exact")
            .send()
            .await?;
        let response = check_status(response).await?;

        let deleted = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(parse_content_range_total)
            .unwrap_or(0);

        debug!("Deleted {} rows from {}", deleted, table);
        Ok(deleted)
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> StoreResult<u64> {
        let mut inserted = 0u64;

        for batch in rows.chunks(self.insert_batch_size) {
            let response = self
                .client
                .post(self.table_url(table))
                .header("Prefer", "return=minimal")
                .json(batch)
                .send()
                .await?;
            check_status(response).await?;
            inserted += batch.len() as u64;
        }

        debug!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<ObjectDescriptor>> {
        let mut objects = Vec::new();
        let mut pending = vec![prefix.unwrap_or("").trim_matches('/').to_string()];

        while let Some(dir) = pending.pop() {
            let mut offset = 0usize;
            loop {
                let entries = self.list_page(bucket, &dir, offset).await?;
                let count = entries.len();

                for entry in entries {
                    // Folders are returned without an id
                    let is_folder = entry.get("id").is_none_or(Value::is_null);
                    if is_folder {
                        if let Some(name) = entry.get("name").and_then(Value::as_str) {
                            pending.push(join_path(&dir, name));
                        }
                    } else if let Some(object) = ObjectDescriptor::from_storage_entry(&dir, entry)
                    {
                        objects.push(object);
                    }
                }

                if count < LIST_PAGE_SIZE {
                    break;
                }
                offset += count;
            }
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Listed {} objects in bucket {}", objects.len(), bucket);
        Ok(objects)
    }
}

async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::request(status.as_u16(), error_message(&body)))
}

/// PostgREST and Storage errors carry a JSON body with `message`
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Total from a `Content-Range` header such as `0-9/10` or `*/3`
fn parse_content_range_total(value: &str) -> u64 {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
        .unwrap_or(0)
}
