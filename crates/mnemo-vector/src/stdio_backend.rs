// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Legacy fallback backend: talks to a child process over newline-delimited
//! JSON on stdin/stdout instead of HTTP. Used when the configured embedding
//! server does not expose an HTTP port.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::documents::Document;
use crate::error::{Result, VectorError};
use crate::index::{collection_name, dedup_by_sqlite_id, QueryMatch, VectorIndex};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    BatchAdd { collection: String, documents: Vec<RequestDoc<'a>> },
    Query { collection: String, text: &'a str, top_k: usize },
    ListIds { collection: String },
    ListCollections,
    DeleteCollection { name: &'a str },
    DeleteDocuments { collection: String, ids: &'a [String] },
}

#[derive(Serialize)]
struct RequestDoc<'a> {
    id: &'a str,
    text: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Deserialize, Default)]
struct Response {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    collections: Vec<String>,
    #[serde(default)]
    matches: Vec<StdioMatch>,
}

#[derive(Deserialize)]
struct StdioMatch {
    id: String,
    text: String,
    score: f32,
    #[serde(default)]
    metadata: serde_json::Value,
}

struct ChildHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct StdioVectorBackend {
    handle: Arc<Mutex<Option<ChildHandle>>>,
    command: String,
}

impl StdioVectorBackend {
    pub fn new(command: &str) -> Self {
        Self { handle: Arc::new(Mutex::new(None)), command: command.to_string() }
    }

    async fn ensure_spawned(&self, guard: &mut Option<ChildHandle>) -> Result<()> {
        if guard.is_some() {
            return Ok(());
        }
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(VectorError::Spawn)?;
        let stdin = child.stdin.take().ok_or_else(|| VectorError::Server("child has no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| VectorError::Server("child has no stdout".into()))?;
        *guard = Some(ChildHandle { child, stdin, stdout: BufReader::new(stdout) });
        Ok(())
    }

    async fn call(&self, req: Request<'_>) -> Result<Response> {
        let mut guard = self.handle.lock().await;
        self.ensure_spawned(&mut guard).await?;
        let handle = guard.as_mut().expect("just ensured");

        let mut line = serde_json::to_string(&req)?;
        line.push('\n');
        handle.stdin.write_all(line.as_bytes()).await.map_err(|e| VectorError::Server(e.to_string()))?;

        let mut reply = String::new();
        handle.stdout.read_line(&mut reply).await.map_err(|e| VectorError::Server(e.to_string()))?;
        if reply.is_empty() {
            *guard = None;
            return Err(VectorError::Server("child closed stdout".into()));
        }
        let resp: Response = serde_json::from_str(reply.trim_end())?;
        if !resp.ok {
            return Err(VectorError::Server(resp.error.unwrap_or_else(|| "unknown error".into())));
        }
        Ok(resp)
    }
}

#[async_trait]
impl VectorIndex for StdioVectorBackend {
    async fn upsert(&self, project: &str, doc: Document) -> Result<()> {
        self.batch_add(project, vec![doc]).await
    }

    async fn batch_add(&self, project: &str, docs: Vec<Document>) -> Result<()> {
        let documents = docs.iter().map(|d| RequestDoc { id: &d.id, text: &d.text, metadata: &d.metadata }).collect();
        self.call(Request::BatchAdd { collection: collection_name(project), documents }).await?;
        Ok(())
    }

    async fn query(&self, project: &str, text: &str, top_k: usize) -> Result<Vec<QueryMatch>> {
        let resp = self.call(Request::Query { collection: collection_name(project), text, top_k }).await?;
        let matches = resp.matches.into_iter().map(|m| QueryMatch { id: m.id, text: m.text, score: m.score, metadata: m.metadata }).collect();
        Ok(dedup_by_sqlite_id(matches))
    }

    async fn list_ids(&self, project: &str) -> Result<Vec<String>> {
        Ok(self.call(Request::ListIds { collection: collection_name(project) }).await?.ids)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.call(Request::ListCollections).await?.collections)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.call(Request::DeleteCollection { name }).await?;
        Ok(())
    }

    async fn delete_documents(&self, project: &str, ids: &[String]) -> Result<()> {
        self.call(Request::DeleteDocuments { collection: collection_name(project), ids }).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if let Some(mut handle) = guard.take() {
            let _ = handle.child.start_kill();
        }
        Ok(())
    }
}
