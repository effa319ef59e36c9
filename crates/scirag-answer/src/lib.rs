//! scirag-answer
//!
//! Streamed, cited answers: prompt construction, the per-request answer
//! state machine, citation scanning over fragmented output, the Ollama
//! generation client, and the event-stream frame codec.

pub mod citations;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod protocol;
pub mod session;

pub use citations::CitationScanner;
pub use ollama::OllamaGenerator;
pub use pipeline::Answerer;
pub use prompt::{build_prompt, NO_CONTEXT_ANSWER};
pub use protocol::{encode, encode_comment, FrameDecoder, CONTENT_TYPE};
pub use session::{AnswerSession, AnswerState};
