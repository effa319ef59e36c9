use scirag_retrieval::RankedContext;

/// Answer sent when retrieval found nothing to ground on.
pub const NO_CONTEXT_ANSWER: &str = "I could not find any supporting context for this question in the indexed texts.";

const INSTRUCTION: &str = "You are a precise scientific assistant. Use ONLY the context to answer.\n\
Cite sources with [1], [2], etc., matching the bracketed chunks.\n\
If the answer is not contained in the context, say you don't know.";

/// Render one numbered block per context chunk, then the question.
pub fn build_prompt(question: &str, context: &RankedContext) -> String {
    let blocks: Vec<String> = context
        .entries()
        .iter()
        .map(|e| {
            format!(
                "[{}] (book={}, section={}, idx={})\n{}",
                e.citation,
                e.chunk.title,
                e.chunk.section_label(),
                e.chunk.position,
                e.chunk.body
            )
        })
        .collect();
    format!("{INSTRUCTION}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:", blocks.join("\n\n"), question.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scirag_core::types::{Chunk, RetrievedCandidate, SourceKind};
    use scirag_retrieval::ContextAssembler;

    #[test]
    fn numbered_blocks_carry_provenance() {
        let candidates = [(3, Some("Signalling"), "RTKs regulate growth."), (9, None, "Kinases are enzymes.")]
            .into_iter()
            .map(|(id, section, body)| RetrievedCandidate {
                chunk: Chunk {
                    id,
                    title: "Cell Biology".into(),
                    section: section.map(str::to_string),
                    position: 4,
                    body: body.into(),
                    embedding: None,
                    created_at: Utc::now(),
                },
                score: 0.5,
                source: SourceKind::Vector,
            })
            .collect();
        let context = ContextAssembler::new(1000).assemble(candidates);
        let prompt = build_prompt(" What are RTKs? ", &context);

        assert!(prompt.contains("[1] (book=Cell Biology, section=Signalling, idx=4)\nRTKs regulate growth."));
        assert!(prompt.contains("[2] (book=Cell Biology, section=Full Text, idx=4)\nKinases are enzymes."));
        assert!(prompt.ends_with("Question: What are RTKs?\n\nAnswer:"));
        assert!(prompt.starts_with("You are a precise scientific assistant. Use ONLY the context to answer.\n"));
        assert!(prompt.contains("say you don't know.\n\nContext:\n[1]"));
    }
}
