// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-process HTTP client against the child embedding server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mnemo_util::url::join;

use crate::documents::Document;
use crate::error::{Result, VectorError};
use crate::index::{collection_name, dedup_by_sqlite_id, QueryMatch, VectorIndex};

const UPSERT_BATCH_SIZE: usize = 100;

pub struct HttpVectorBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorBackend {
    pub fn new(base_url: &str) -> Self {
        Self { client: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().expect("reqwest client"), base_url: base_url.to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(VectorError::Server(format!("{status}: {body}")))
        }
    }
}

#[derive(Serialize)]
struct UpsertDoc<'a> {
    id: &'a str,
    text: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Serialize)]
struct BatchAddRequest<'a> {
    collection: String,
    documents: Vec<UpsertDoc<'a>>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    collection: String,
    text: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Deserialize)]
struct RawMatch {
    id: String,
    text: String,
    score: f32,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct ListIdsResponse {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    #[serde(default)]
    collections: Vec<String>,
}

#[async_trait]
impl VectorIndex for HttpVectorBackend {
    async fn upsert(&self, project: &str, doc: Document) -> Result<()> {
        self.batch_add(project, vec![doc]).await
    }

    async fn batch_add(&self, project: &str, docs: Vec<Document>) -> Result<()> {
        let collection = collection_name(project);
        for chunk in docs.chunks(UPSERT_BATCH_SIZE) {
            let body = BatchAddRequest {
                collection: collection.clone(),
                documents: chunk.iter().map(|d| UpsertDoc { id: &d.id, text: &d.text, metadata: &d.metadata }).collect(),
            };
            let resp = self.client.post(join(&self.base_url, "v1/documents/batch")).json(&body).send().await?;
            Self::check(resp).await?;
        }
        Ok(())
    }

    async fn query(&self, project: &str, text: &str, top_k: usize) -> Result<Vec<QueryMatch>> {
        let body = QueryRequest { collection: collection_name(project), text, top_k };
        let resp = self.client.post(join(&self.base_url, "v1/query")).json(&body).send().await?;
        let resp = Self::check(resp).await?;
        let parsed: QueryResponse = resp.json().await?;
        let matches =
            parsed.matches.into_iter().map(|m| QueryMatch { id: m.id, text: m.text, score: m.score, metadata: m.metadata }).collect();
        Ok(dedup_by_sqlite_id(matches))
    }

    async fn list_ids(&self, project: &str) -> Result<Vec<String>> {
        let url = join(&self.base_url, &format!("v1/collections/{}/ids", collection_name(project)));
        let resp = self.client.get(url).send().await?;
        let resp = Self::check(resp).await?;
        let parsed: ListIdsResponse = resp.json().await?;
        Ok(parsed.ids)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let resp = self.client.get(join(&self.base_url, "v1/collections")).send().await?;
        let resp = Self::check(resp).await?;
        let parsed: ListCollectionsResponse = resp.json().await?;
        Ok(parsed.collections)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let resp = self.client.delete(join(&self.base_url, &format!("v1/collections/{name}"))).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_documents(&self, project: &str, ids: &[String]) -> Result<()> {
        let body = serde_json::json!({ "collection": collection_name(project), "ids": ids });
        let resp = self.client.post(join(&self.base_url, "v1/documents/delete")).json(&body).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
