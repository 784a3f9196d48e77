//! Splits a raw command string into pipeline stages and tokenizes each stage.
//!
//! Splitting happens at `|` characters **outside** quoted regions, so
//! `echo "a | b"` stays a single stage.  Tokenization is shell-style quote
//! handling only: no variable expansion, no globs, no redirection.

use crate::pipeline::error::PipelineError;

/// One program invocation within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// The trimmed original segment text, used for whole-text policy matching.
    pub text: String,
    /// Tokenized arguments; the first element is the program name.
    /// Invariant: never empty.
    pub argv: Vec<String>,
    /// 0-based position within the pipeline; stage `i` reads stage `i-1`'s output.
    pub index: usize,
}

impl Stage {
    /// The program name (first token).
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}

/// Split `raw` at unquoted `|` characters.
///
/// Tracks single-quote, double-quote, and backslash state with the same rules
/// the tokenizer applies, so a pipe that the tokenizer would treat as literal
/// text never becomes a stage boundary.  An unterminated quote is left for
/// the tokenizer to reject.
fn split_pipes(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for ch in raw.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_single => {
                current.push(ch);
                escaped = true;
            }
            '\'' if !in_double => {
                current.push(ch);
                in_single = !in_single;
            }
            '"' if !in_single => {
                current.push(ch);
                in_double = !in_double;
            }
            '|' if !in_single && !in_double => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}

/// Split a raw command string into an ordered list of tokenized stages.
///
/// Blank segments between pipes are dropped; each surviving stage carries its
/// trimmed original text and its position index.
///
/// # Errors
///
/// Returns [`PipelineError::Malformed`] when quoting is unbalanced or when no
/// segment tokenizes to at least one argument (empty or whitespace-only
/// input, or only blank segments between pipes).
pub fn split_and_tokenize(raw: &str) -> Result<Vec<Stage>, PipelineError> {
    let mut stages = Vec::new();

    for segment in split_pipes(raw) {
        let text = segment.trim();
        if text.is_empty() {
            continue;
        }
        let argv = shlex::split(text)
            .ok_or_else(|| PipelineError::Malformed(format!("unbalanced quoting in \"{text}\"")))?;
        if argv.is_empty() {
            continue;
        }
        stages.push(Stage {
            text: text.to_string(),
            argv,
            index: stages.len(),
        });
    }

    if stages.is_empty() {
        return Err(PipelineError::Malformed("empty command".to_string()));
    }
    Ok(stages)
}
