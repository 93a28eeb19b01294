//! HTTP remote store.
//!
//! Routes, relative to the configured base URL:
//!
//! | operation | method | path |
//! |---|---|---|
//! | graph | GET / PUT | `/ontologies/{id}/graph` |
//! | layout | GET / PUT | `/ontologies/{id}/layout` |
//! | named views | GET / PUT | `/ontologies/{id}/views` |
//! | exchange document | POST (`text/turtle`) | `/ontologies/{id}/exchange` |
//!
//! `409 Conflict` on a write maps to [`StorageError::StaleWrite`].

use crate::remote::{RemoteGraphDocument, RemoteStore};
use crate::StorageError;
use async_trait::async_trait;
use ontograph_model::{LayoutSnapshot, NamedView};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            StorageError::FetchFailure {
                ontology: String::new(),
                resource: "client",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, ontology_id: &str, resource: &str) -> String {
        format!("{}/ontologies/{}/{}", self.base_url, ontology_id, resource)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ontology_id: &str,
        resource: &'static str,
    ) -> Result<T, StorageError> {
        let fetch_failure = |reason: String| StorageError::FetchFailure {
            ontology: ontology_id.to_string(),
            resource,
            reason,
        };

        let response = self
            .client
            .get(self.url(ontology_id, resource))
            .send()
            .await
            .map_err(|e| fetch_failure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_failure(format!("HTTP {}", response.status())));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| fetch_failure(e.to_string()))
    }

    async fn put_json<T: Serialize + ?Sized + Sync>(
        &self,
        ontology_id: &str,
        resource: &'static str,
        body: &T,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .put(self.url(ontology_id, resource))
            .json(body)
            .send()
            .await
            .map_err(|e| StorageError::CommitFailure {
                ontology: ontology_id.to_string(),
                resource,
                reason: e.to_string(),
            })?;
        check_write(response.status(), ontology_id, resource)
    }
}

fn check_write(status: StatusCode, ontology_id: &str, resource: &'static str) -> Result<(), StorageError> {
    if status == StatusCode::CONFLICT {
        return Err(StorageError::StaleWrite {
            ontology: ontology_id.to_string(),
            resource,
        });
    }
    if !status.is_success() {
        return Err(StorageError::CommitFailure {
            ontology: ontology_id.to_string(),
            resource,
            reason: format!("HTTP {status}"),
        });
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_graph(&self, ontology_id: &str) -> Result<RemoteGraphDocument, StorageError> {
        self.get_json(ontology_id, "graph").await
    }

    async fn commit_graph(
        &self,
        ontology_id: &str,
        document: &RemoteGraphDocument,
    ) -> Result<(), StorageError> {
        self.put_json(ontology_id, "graph", document).await
    }

    async fn fetch_layout(&self, ontology_id: &str) -> Result<LayoutSnapshot, StorageError> {
        self.get_json(ontology_id, "layout").await
    }

    async fn commit_layout(
        &self,
        ontology_id: &str,
        layout: &LayoutSnapshot,
    ) -> Result<(), StorageError> {
        self.put_json(ontology_id, "layout", layout).await
    }

    async fn fetch_named_views(&self, ontology_id: &str) -> Result<Vec<NamedView>, StorageError> {
        self.get_json(ontology_id, "views").await
    }

    async fn commit_named_views(
        &self,
        ontology_id: &str,
        views: &[NamedView],
    ) -> Result<(), StorageError> {
        self.put_json(ontology_id, "views", views).await
    }

    async fn post_exchange_document(
        &self,
        ontology_id: &str,
        turtle: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.url(ontology_id, "exchange"))
            .header("Content-Type", "text/turtle")
            .body(turtle.to_string())
            .send()
            .await
            .map_err(|e| StorageError::CommitFailure {
                ontology: ontology_id.to_string(),
                resource: "exchange",
                reason: e.to_string(),
            })?;
        check_write(response.status(), ontology_id, "exchange")
    }
}
