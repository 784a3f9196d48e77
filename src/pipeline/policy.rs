//! The whitelist that gates every pipeline stage.
//!
//! Matching is deliberately done against the *whole* stage text, not just the
//! program token.  That lets `"git status"` be allowed while bare `git` is
//! not, and keeps `ls` matching `ls -la /tmp`.

use crate::pipeline::error::PipelineError;
use crate::pipeline::split::Stage;

/// Command prefixes allowed when no config file overrides them.
/// Inspection, listing, and search only — nothing that writes.
pub const DEFAULT_ALLOW: &[&str] = &[
    "ls", "dir", "tree", "find", "grep", "rg", "cat", "head", "tail", "wc",
    "git status", "git diff", "git log", "git branch", "git remote",
    "echo", "pwd", "date",
];

/// Immutable set of allowed command prefixes, built once at startup and
/// passed explicitly to the executor.
#[derive(Debug, Clone)]
pub struct Policy {
    prefixes: Vec<String>,
}

impl Policy {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// The built-in read-only whitelist.
    pub fn default_allow() -> Self {
        Self::new(DEFAULT_ALLOW.iter().map(ToString::to_string).collect())
    }

    /// The allowed prefixes, in configuration order.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Case-sensitive prefix match against the full stage text.
    pub fn allows(&self, stage_text: &str) -> bool {
        self.prefixes.iter().any(|p| stage_text.starts_with(p.as_str()))
    }

    /// Check every stage before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PolicyViolation`] naming the first stage whose
    /// text does not begin with an allowed prefix.
    pub fn validate(&self, stages: &[Stage]) -> Result<(), PipelineError> {
        for stage in stages {
            if !self.allows(&stage.text) {
                return Err(PipelineError::PolicyViolation {
                    index: stage.index,
                    program: stage.program().to_string(),
                    text: stage.text.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::pipeline::split::split_and_tokenize;

    #[test]
    fn bare_program_prefix_matches_with_args() {
        let policy = Policy::default_allow();
        assert!(policy.allows("ls -la /tmp"));
    }

    #[test]
    fn multi_word_prefix_matches_subcommand() {
        let policy = Policy::default_allow();
        assert!(policy.allows("git status --short"));
    }

    #[test]
    fn bare_git_is_not_allowed() {
        let policy = Policy::default_allow();
        assert!(!policy.allows("git push origin main"));
        assert!(!policy.allows("git"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let policy = Policy::default_allow();
        assert!(!policy.allows("LS -la"));
        assert!(!policy.allows("Git status"));
    }

    #[test]
    fn destructive_commands_are_rejected() {
        let policy = Policy::default_allow();
        assert!(!policy.allows("rm -rf /"));
        assert!(!policy.allows("curl http://example.com"));
    }

    #[test]
    fn empty_policy_denies_everything() {
        let policy = Policy::new(vec![]);
        assert!(!policy.allows("ls"));
    }

    #[test]
    fn validate_accepts_all_allowed_stages() {
        let policy = Policy::default_allow();
        let stages = split_and_tokenize("echo hi | wc -l").unwrap();
        assert!(policy.validate(&stages).is_ok());
    }

    #[test]
    fn validate_names_the_offending_stage() {
        let policy = Policy::default_allow();
        let stages = split_and_tokenize("echo hi | rm -rf / | wc").unwrap();
        let err = policy.validate(&stages).unwrap_err();
        match err {
            PipelineError::PolicyViolation {
                index,
                program,
                text,
            } => {
                assert_eq!(index, 1);
                assert_eq!(program, "rm");
                assert_eq!(text, "rm -rf /");
            }
            other => panic!("expected PolicyViolation, got {other:?}"),
        }
    }

    #[test]
    fn prefix_matches_whole_text_not_just_program() {
        // "git status" passes even though "git" alone would not, because the
        // match is against the full stage text.
        let policy = Policy::default_allow();
        let stages = split_and_tokenize("git status").unwrap();
        assert!(policy.validate(&stages).is_ok());
        let stages = split_and_tokenize("git stash").unwrap();
        assert!(policy.validate(&stages).is_err());
    }
}
