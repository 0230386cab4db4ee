//! Dataset retrieval.
//!
//! Datasets are opaque byte payloads keyed by the `dataset_ref` of a start
//! command. The coordinator serves them at `GET /api/dataset/{ref}`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Url;

pub const DATASET_PATH: &str = "/api/dataset/";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset `{0}` not found")]
    NotFound(String),

    #[error("invalid dataset url: {0}")]
    Url(String),

    #[error("dataset request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn fetch(&self, dataset_ref: &str) -> Result<Vec<u8>, DatasetError>;
}

/// Fetches datasets from the coordinator over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpDatasetStore {
    base: Url,
    client: reqwest::Client,
}

impl HttpDatasetStore {
    /// `base` is the coordinator origin, e.g. `https://reef.example.com`.
    pub fn new(base: Url) -> Self {
        Self::with_client(base, reqwest::Client::new())
    }

    pub fn with_client(base: Url, client: reqwest::Client) -> Self {
        Self { base, client }
    }

    pub fn dataset_url(&self, dataset_ref: &str) -> Result<Url, DatasetError> {
        let mut url = self
            .base
            .join(DATASET_PATH)
            .map_err(|e| DatasetError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| DatasetError::Url(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .push(dataset_ref);
        Ok(url)
    }
}

#[async_trait]
impl DatasetStore for HttpDatasetStore {
    async fn fetch(&self, dataset_ref: &str) -> Result<Vec<u8>, DatasetError> {
        let url = self.dataset_url(dataset_ref)?;
        tracing::debug!(%url, dataset_ref, "Fetching dataset");

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DatasetError::NotFound(dataset_ref.to_string()));
        }
        let bytes = response.error_for_status()?.bytes().await?;

        tracing::debug!(dataset_ref, size_bytes = bytes.len(), "Dataset fetched");
        Ok(bytes.to_vec())
    }
}

/// Datasets held in memory, for hosts that ship them alongside the node.
#[derive(Debug, Clone, Default)]
pub struct StaticDatasetStore {
    datasets: HashMap<String, Vec<u8>>,
}

impl StaticDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset_ref: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.datasets.insert(dataset_ref.into(), bytes);
        self
    }
}

#[async_trait]
impl DatasetStore for StaticDatasetStore {
    async fn fetch(&self, dataset_ref: &str) -> Result<Vec<u8>, DatasetError> {
        self.datasets
            .get(dataset_ref)
            .cloned()
            .ok_or_else(|| DatasetError::NotFound(dataset_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn dataset_url_appends_ref() {
        let store = HttpDatasetStore::new(Url::parse("https://reef.example.com").unwrap());
        assert_eq!(
            store.dataset_url("abc123").unwrap().as_str(),
            "https://reef.example.com/api/dataset/abc123"
        );
    }

    #[test]
    fn dataset_url_escapes_ref() {
        let store = HttpDatasetStore::new(Url::parse("http://localhost:3000/").unwrap());
        assert_eq!(
            store.dataset_url("a/b").unwrap().as_str(),
            "http://localhost:3000/api/dataset/a%2Fb"
        );
    }

    #[tokio::test]
    async fn http_store_fetches_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dataset/d1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9, 8, 7]))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpDatasetStore::new(Url::parse(&server.uri()).unwrap());
        assert_eq!(store.fetch("d1").await.unwrap(), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn http_store_maps_missing_dataset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpDatasetStore::new(Url::parse(&server.uri()).unwrap());
        assert!(matches!(
            store.fetch("missing").await,
            Err(DatasetError::NotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn http_store_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = HttpDatasetStore::new(Url::parse(&server.uri()).unwrap());
        assert!(matches!(
            store.fetch("d1").await,
            Err(DatasetError::Http(_))
        ));
    }

    #[tokio::test]
    async fn static_store_lookup() {
        let store = StaticDatasetStore::new().with_dataset("d1", vec![1]);
        assert_eq!(store.fetch("d1").await.unwrap(), vec![1]);
        assert!(matches!(
            store.fetch("d2").await,
            Err(DatasetError::NotFound(_))
        ));
    }
}
