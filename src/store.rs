#![doc = "HTTP implementation of the remote content store contract."]
//
//! # HttpStore
//!
//! Bridges the [`RemoteStore`] trait to the store's JSON API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | hash lookup | `GET {base}/arthash/{hash}` |
//! | upload | `POST {base}/art` with base64 content |
//! | read pointer | `GET {base}/{pointer_id}` (404 means unset) |
//! | write pointer | `POST {base}/pointers` |
//!
//! The token, when configured, is sent as a bearer token on every request.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::contract::{
    ContentQuery, NewContent, NewPointer, PointerRecord, RemoteStore, StoreError, StoredContent,
};

pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Wire form of [`NewContent`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContentBody<'a> {
    content: String,
    content_type: &'a str,
    description: &'a str,
    name: &'a str,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder().build()?;
        tracing::info!(
            base_url = %config.base_url,
            token_set = config.token.is_some(),
            "Initialized HttpStore"
        );
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, rel: &str) -> String {
        format!("{}/{}", self.base_url, rel.trim_start_matches('/'))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn lookup_by_hash(&self, hash: &str) -> Result<ContentQuery, StoreError> {
        let url = self.url(&format!("arthash/{hash}"));
        tracing::debug!(url = %url, "Looking up content by hash");
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<ContentQuery>().await?)
    }

    async fn create_content(&self, req: NewContent) -> Result<StoredContent, StoreError> {
        let body = CreateContentBody {
            content: base64::engine::general_purpose::STANDARD.encode(&req.content),
            content_type: &req.content_type,
            description: &req.description,
            name: &req.name,
        };
        let url = self.url("art");
        tracing::debug!(url = %url, name = %req.name, size = req.content.len(), "Uploading content");
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<StoredContent>().await?)
    }

    async fn get_pointer(&self, pointer_id: &str) -> Result<Option<PointerRecord>, StoreError> {
        let url = self.url(pointer_id);
        let resp = self.authed(self.client.get(&url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(pointer_id, "Pointer not found");
            return Ok(None);
        }
        let record = resp.error_for_status()?.json::<PointerRecord>().await?;
        Ok(Some(record))
    }

    async fn set_pointer(&self, req: NewPointer) -> Result<(), StoreError> {
        let url = self.url("pointers");
        self.authed(self.client.post(&url))
            .json(&req)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
