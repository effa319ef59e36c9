use std::sync::Arc;
use std::time::Duration;

use scirag_core::error::Result;
use scirag_core::traits::Generator;
use scirag_retrieval::{ContextAssembler, Retriever};

use crate::session::AnswerSession;

/// Retrieval, context assembly and generation wired together for `ask`.
pub struct Answerer {
    retriever: Arc<Retriever>,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl Answerer {
    pub fn new(retriever: Arc<Retriever>, assembler: ContextAssembler, generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { retriever, assembler, generator, timeout }
    }

    /// Retrieve and assemble context, then return a session ready to stream.
    ///
    /// Retrieval errors surface here, before any event is produced.
    pub async fn ask(&self, question: &str, top_k: usize) -> Result<AnswerSession> {
        let candidates = self.retriever.retrieve(question, top_k).await?;
        let context = self.assembler.assemble(candidates);
        tracing::debug!(chunks = context.len(), chars = context.total_chars(), "context assembled");
        Ok(AnswerSession::new(self.generator.clone(), question, context, self.timeout))
    }
}
