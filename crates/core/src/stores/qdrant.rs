use crate::traits::VectorIndex;
use crate::{EntryMetadata, IndexEntry, SearchError, SimilarityHit};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// `{endpoint}/collections/{collection}/{tail..}` with every segment
    /// percent-encoded.
    fn collection_url(&self, collection: &str, tail: &[&str]) -> Result<Url, SearchError> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("endpoint cannot be a base url: {}", self.endpoint),
            })?
            .pop_if_empty()
            .push("collections")
            .push(collection)
            .extend(tail);
        Ok(url)
    }

    async fn fail(response: reqwest::Response) -> SearchError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        }
    }
}

/// Qdrant only accepts integers or UUIDs as point ids.
pub fn point_id(entry_id: &str) -> Uuid {
    let digest = Sha256::digest(entry_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn to_point(entry: &IndexEntry) -> Value {
    json!({
        "id": point_id(&entry.id).to_string(),
        "vector": entry.vector,
        "payload": {
            "entry_id": entry.id,
            "text": entry.text,
            "collection": entry.metadata.collection,
            "source": entry.metadata.source,
            "page": entry.metadata.page,
            "chunk_index": entry.metadata.chunk_index,
        },
    })
}

fn hit_from_value(hit: &Value) -> SimilarityHit {
    let text_field = |field: &str| {
        hit.pointer(&format!("/payload/{field}"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let number_field = |field: &str| {
        hit.pointer(&format!("/payload/{field}"))
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    };

    let metadata = match (text_field("collection"), text_field("source"), number_field("page")) {
        (Some(collection), Some(source), Some(page)) => Some(EntryMetadata {
            collection,
            source,
            page,
            chunk_index: number_field("chunk_index").unwrap_or_default(),
        }),
        _ => None,
    };

    // Cosine collections report similarity; convert to distance.
    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

    SimilarityHit {
        entry_id: text_field("entry_id").unwrap_or_default(),
        text: text_field("text").unwrap_or_default(),
        metadata,
        distance: 1.0 - score,
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url(collection, &[])?).send().await?;

        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let stored = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64)
                .and_then(|size| usize::try_from(size).ok());
            return match stored {
                Some(stored) if stored != dimensions => Err(SearchError::DimensionMismatch {
                    expected: stored,
                    found: dimensions,
                }),
                _ => Ok(()),
            };
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(Self::fail(response).await);
        }

        let response = self
            .client
            .put(self.collection_url(collection, &[])?)
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        info!(collection, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, SearchError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let point_ids = ids
            .iter()
            .map(|id| point_id(id).to_string())
            .collect::<Vec<_>>();

        let response = self
            .client
            .post(self.collection_url(collection, &["points"])?)
            .json(&json!({
                "ids": point_ids,
                "with_payload": ["entry_id"],
                "with_vector": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|point| point.pointer("/payload/entry_id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<(), SearchError> {
        if entries.is_empty() {
            return Ok(());
        }

        let points = entries.iter().map(to_point).collect::<Vec<_>>();
        debug!(collection, points = points.len(), "upserting points");

        let mut url = self.collection_url(collection, &["points"])?;
        url.set_query(Some("wait=true"));
        let response = self
            .client
            .put(url)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SearchError> {
        let response = self
            .client
            .post(self.collection_url(collection, &["points", "search"])?)
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::UnknownCollection(collection.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(hit_from_value).collect())
            .unwrap_or_default();

        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize, SearchError> {
        let response = self
            .client
            .post(self.collection_url(collection, &["points", "count"])?)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::UnknownCollection(collection.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let parsed: Value = response.json().await?;
        let count = parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        usize::try_from(count).map_err(|_| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("point count out of range: {count}"),
        })
    }
}
