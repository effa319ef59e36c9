use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use scirag_core::config::GenerationSettings;
use scirag_core::error::{Error, Result};
use scirag_core::traits::{GenerationEvent, GenerationStream, Generator};

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_ctx: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

/// One NDJSON line of `/api/generate`.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Completions from an Ollama-compatible `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
}

impl OllamaGenerator {
    /// The client has only a connect timeout; total time is bounded per
    /// request by the answer session.
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("generation client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            options: GenerateOptions { temperature: settings.temperature, top_p: settings.top_p, num_ctx: settings.num_ctx },
        })
    }

    pub fn model(&self) -> &str { &self.model }

    async fn post(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = GenerateRequest { model: &self.model, prompt, stream, options: &self.options };
        self.client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Error::generation)
    }

    /// Single non-streaming completion. Used to load the model at startup.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let chunk: GenerateChunk = self.post(prompt, false).await?.json().await.map_err(Error::generation)?;
        match chunk.error {
            Some(e) => Err(Error::GenerationFailure(e)),
            None => Ok(chunk.response),
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate_stream(&self, prompt: &str) -> Result<GenerationStream> {
        let response = self.post(prompt, true).await?;
        let lines = NdjsonEvents::new(response.bytes_stream().map_ok(|b| b.to_vec()).boxed());
        Ok(stream::unfold(lines, |mut lines| async move { lines.next().await.map(|ev| (ev, lines)) }).boxed())
    }
}

/// Splits the response body into lines and turns each into generation events.
struct NdjsonEvents {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: Vec<u8>,
    pending: VecDeque<Result<GenerationEvent>>,
    eof: bool,
    finished: bool,
}

impl NdjsonEvents {
    fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self { body, buf: Vec::new(), pending: VecDeque::new(), eof: false, finished: false }
    }

    async fn next(&mut self) -> Option<Result<GenerationEvent>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                if matches!(item, Ok(GenerationEvent::Done) | Err(_)) {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(item);
            }
            if self.finished { return None; }
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                self.parse_line(&line);
                continue;
            }
            if self.eof {
                if self.buf.is_empty() { return None; }
                let rest = std::mem::take(&mut self.buf);
                self.parse_line(&rest);
                continue;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => self.buf.extend_from_slice(&bytes),
                Some(Err(e)) => self.pending.push_back(Err(Error::generation(e))),
                None => self.eof = true,
            }
        }
    }

    fn parse_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() { return; }
        let chunk: GenerateChunk = match serde_json::from_slice(line) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable generation line");
                return;
            }
        };
        if let Some(err) = chunk.error {
            self.pending.push_back(Err(Error::GenerationFailure(err)));
            return;
        }
        if !chunk.response.is_empty() { self.pending.push_back(Ok(GenerationEvent::Token(chunk.response))); }
        if chunk.done { self.pending.push_back(Ok(GenerationEvent::Done)); }
    }
}
