//! Answer prompt template
//!
//! Retrieved chunk texts, in ranked order and separated by blank lines,
//! go between a fixed instruction and the question.

pub const INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const QUESTION_MARKER: &str = "\n\nQuestion: ";
const ANSWER_MARKER: &str = "\nHelpful Answer:";

pub fn compose<S: AsRef<str>>(contexts: &[S], question: &str) -> String {
    let context = contexts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{INSTRUCTIONS}\n\n{context}{QUESTION_MARKER}{question}{ANSWER_MARKER}")
}

/// The context section of a prompt produced by `compose`.
pub fn extract_context(prompt: &str) -> Option<&str> {
    let rest = prompt.strip_prefix(INSTRUCTIONS)?.strip_prefix("\n\n")?;
    let end = rest.rfind(QUESTION_MARKER)?;
    Some(&rest[..end])
}
