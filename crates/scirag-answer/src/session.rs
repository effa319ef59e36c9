use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::time::{timeout_at, Instant};

use scirag_core::error::{Error, Result};
use scirag_core::traits::{GenerationEvent, GenerationStream, Generator};
use scirag_core::types::{SourceRef, StreamEvent};
use scirag_retrieval::RankedContext;

use crate::citations::CitationScanner;
use crate::prompt::{build_prompt, NO_CONTEXT_ANSWER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerState {
    Idle,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

/// One streamed answer: relays generator fragments as deltas and closes with
/// a single `Final` listing the context chunks the text actually cited.
///
/// `next_event` yields `None` once the session is `Done` or `Failed`. A failed
/// session yields exactly one `Err` and never a `Final`.
pub struct AnswerSession {
    state: AnswerState,
    generator: Arc<dyn Generator>,
    prompt: String,
    context: RankedContext,
    upstream: Option<GenerationStream>,
    scanner: CitationScanner,
    deadline: Instant,
    timeout: Duration,
}

impl AnswerSession {
    /// The deadline covers the whole session and starts now.
    pub fn new(generator: Arc<dyn Generator>, question: &str, context: RankedContext, timeout: Duration) -> Self {
        Self {
            state: AnswerState::Idle,
            generator,
            prompt: build_prompt(question, &context),
            context,
            upstream: None,
            scanner: CitationScanner::new(),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn state(&self) -> AnswerState { self.state }

    pub fn context(&self) -> &RankedContext { &self.context }

    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            match self.state {
                AnswerState::Done | AnswerState::Failed => return None,
                AnswerState::Idle if self.context.is_empty() => {
                    tracing::info!("no context retrieved; answering without generation");
                    self.state = AnswerState::Finalizing;
                    return Some(Ok(StreamEvent::Delta(NO_CONTEXT_ANSWER.to_string())));
                }
                AnswerState::Idle => {
                    let started = timeout_at(self.deadline, self.generator.generate_stream(&self.prompt)).await;
                    match started {
                        Ok(Ok(upstream)) => {
                            tracing::debug!(chunks = self.context.len(), "generation stream opened");
                            self.upstream = Some(upstream);
                            self.state = AnswerState::Streaming;
                        }
                        Ok(Err(e)) => return Some(self.fail(e)),
                        Err(_) => return Some(self.fail(self.timed_out())),
                    }
                }
                AnswerState::Streaming => {
                    let Some(upstream) = self.upstream.as_mut() else {
                        return Some(self.fail(Error::GenerationFailure("generation stream missing".into())));
                    };
                    match timeout_at(self.deadline, upstream.next()).await {
                        Err(_) => return Some(self.fail(self.timed_out())),
                        Ok(None) => {
                            return Some(self.fail(Error::GenerationFailure("generation stream ended before completion".into())))
                        }
                        Ok(Some(Err(e))) => return Some(self.fail(e)),
                        Ok(Some(Ok(GenerationEvent::Token(text)))) => {
                            if text.is_empty() { continue; }
                            self.scanner.feed(&text);
                            return Some(Ok(StreamEvent::Delta(text)));
                        }
                        Ok(Some(Ok(GenerationEvent::Done))) => {
                            self.upstream = None;
                            self.state = AnswerState::Finalizing;
                        }
                    }
                }
                AnswerState::Finalizing => {
                    let sources = self.sources();
                    tracing::info!(cited = sources.len(), context = self.context.len(), "answer complete");
                    self.state = AnswerState::Done;
                    return Some(Ok(StreamEvent::Final { sources }));
                }
            }
        }
    }

    /// Stop the session: the generation stream is dropped and no further
    /// events, including `Final`, are produced.
    pub fn cancel(&mut self) {
        self.upstream = None;
        if self.state != AnswerState::Done {
            tracing::info!(state = ?self.state, "answer cancelled");
            self.state = AnswerState::Failed;
        }
    }

    /// Drive the session as a stream. Dropping the stream drops the
    /// in-flight generation request.
    pub fn into_stream(self) -> BoxStream<'static, Result<StreamEvent>> {
        stream::unfold(self, |mut session| async move { session.next_event().await.map(|ev| (ev, session)) }).boxed()
    }

    /// Cited indices that exist in the context, in order of first citation.
    fn sources(&self) -> Vec<SourceRef> {
        self.scanner
            .cited()
            .iter()
            .filter_map(|n| self.context.by_citation(*n))
            .map(|entry| entry.source_ref())
            .collect()
    }

    fn timed_out(&self) -> Error {
        Error::GenerationFailure(format!("generation exceeded {}s", self.timeout.as_secs_f32()))
    }

    fn fail(&mut self, err: Error) -> Result<StreamEvent> {
        tracing::warn!(error = %err, state = ?self.state, "answer failed");
        self.upstream = None;
        self.state = AnswerState::Failed;
        Err(err)
    }
}
