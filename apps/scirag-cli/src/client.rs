use anyhow::{bail, Context, Result};
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use scirag_answer::FrameDecoder;
use scirag_core::types::{ScoredChunk, SourceRef, StreamEvent};

/// HTTP client for a running `scirag serve`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self { Self { client: Client::new(), base_url: base_url.trim_end_matches('/').to_string() } }

    pub async fn health(&self) -> Result<bool> {
        let body: Value = checked(self.client.get(format!("{}/health", self.base_url)).send().await?).await?.json().await?;
        Ok(body["ok"].as_bool().unwrap_or(false))
    }

    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&json!({ "query": query, "top_k": top_k }))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    /// Stream an answer, handing each delta to `on_delta`; returns the cited
    /// sources. A stream that ends without a final event is an error, and an
    /// error from `on_delta` stops reading.
    pub async fn ask(
        &self,
        question: &str,
        top_k: Option<usize>,
        mut on_delta: impl FnMut(&str) -> Result<()>,
    ) -> Result<Vec<SourceRef>> {
        let response = self
            .client
            .post(format!("{}/query/stream", self.base_url))
            .json(&json!({ "question": question, "top_k": top_k }))
            .send()
            .await?;
        let mut body = checked(response).await?.bytes_stream();
        let mut decoder = FrameDecoder::new();
        let mut handle = |event: StreamEvent| -> Result<Option<Vec<SourceRef>>> {
            match event {
                StreamEvent::Delta(text) => {
                    on_delta(&text)?;
                    Ok(None)
                }
                StreamEvent::Final { sources } => Ok(Some(sources)),
            }
        };
        while let Some(bytes) = body.next().await {
            let bytes = bytes.context("reading answer stream")?;
            for event in decoder.push(&bytes) {
                if let Some(sources) = handle(event)? { return Ok(sources); }
            }
        }
        if let Some(event) = decoder.finish() {
            if let Some(sources) = handle(event)? { return Ok(sources); }
        }
        bail!("answer stream ended without a final event")
    }
}

/// Turn non-2xx responses into errors carrying the server's `detail`.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() { return Ok(response); }
    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v["detail"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    bail!("server returned {status}: {detail}")
}
