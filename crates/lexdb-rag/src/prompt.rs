//! Context and prompt assembly for grounded answers.

use lexdb_core::types::QueryHit;

pub const NO_RELEVANT_CONTENT: &str = "No relevant legal content found for this query.";
pub const GENERATION_UNAVAILABLE: &str =
    "The answer service is unavailable right now. Please try again later; the matching excerpts follow.";

const PROMPT_PREAMBLE: &str = "Use the following Indian legal documents to answer the question clearly:";

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub fn format_excerpt(hit: &QueryHit, max_chars: usize) -> String {
    let m = &hit.metadata;
    format!(
        "From [{} - Section {}: {}]:\n{}",
        m.act_title,
        m.section_number,
        m.section_name,
        truncate_chars(&hit.document, max_chars)
    )
}

/// Excerpts in rank order separated by blank lines.
pub fn build_context(hits: &[QueryHit], max_chars: usize) -> String {
    hits.iter().map(|h| format_excerpt(h, max_chars)).collect::<Vec<_>>().join("\n\n")
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!("{PROMPT_PREAMBLE}\n\n{context}\n\nQuestion: {query}\n\nAnswer:")
}

/// Answer text when no generator is configured.
pub fn excerpts_answer(context: &str) -> String {
    format!("Most relevant excerpts:\n\n{context}")
}

/// Answer text when the generator failed: the sentinel, then the excerpts.
pub fn unavailable_answer(context: &str) -> String {
    format!("{GENERATION_UNAVAILABLE}\n\n{}", excerpts_answer(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexdb_core::types::ChunkMetadata;

    fn hit(text: &str) -> QueryHit {
        QueryHit {
            id: "ipc.csv_0_0".into(),
            document: text.into(),
            metadata: ChunkMetadata {
                source: "ipc.csv".into(),
                act_title: "Indian Penal Code".into(),
                section_name: "Theft".into(),
                section_number: "378".into(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("चोरीचोरी", 4), "चोरी...");
    }

    #[test]
    fn excerpt_carries_citation() {
        assert_eq!(
            format_excerpt(&hit("Whoever commits theft"), 1000),
            "From [Indian Penal Code - Section 378: Theft]:\nWhoever commits theft"
        );
    }

    #[test]
    fn prompt_ends_with_question() {
        let ctx = build_context(&[hit("a"), hit("b")], 10);
        assert_eq!(ctx.matches("From [").count(), 2);
        let prompt = build_prompt(&ctx, "What is theft?");
        assert!(prompt.contains(&ctx));
        assert!(prompt.ends_with("Question: What is theft?\n\nAnswer:"));
    }
}
