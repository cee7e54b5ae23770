//! Credential redaction for logged commands and captured output
//!
//! Every command line passes through here before it reaches a log line or an
//! error message. Values that follow a credential flag are replaced outright;
//! free text is scanned with a small set of regex rules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Flags whose following argument is a secret
pub const SECRET_FLAGS: &[&str] = &["--os-password", "--password", "--os-token"];

/// Replacement for a masked flag value
pub const REDACTED: &str = "[REDACTED]";

// ============================================================================
// Redaction rules
// ============================================================================

/// A redaction rule with a regex pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionRule {
    /// Rule identifier
    pub name: String,
    /// Regex pattern to match
    pub pattern: String,
    /// Replacement text
    pub replacement: String,
}

/// Built-in redaction rules for secrets that show up in CLI output
#[must_use]
pub fn default_rules() -> Vec<RedactionRule> {
    // Order matters: specific patterns before generic ones
    vec![
        RedactionRule {
            name: "bearer_token".to_string(),
            pattern: r"(?i)Bearer\s+[A-Za-z0-9\-_\.]{20,}".to_string(),
            replacement: "[REDACTED:bearer]".to_string(),
        },
        RedactionRule {
            name: "auth_token_header".to_string(),
            pattern: r"(?i)X-(?:Auth|Subject)-Token:\s*\S+".to_string(),
            replacement: "[REDACTED:token]".to_string(),
        },
        RedactionRule {
            name: "generic_secret".to_string(),
            pattern: r#"(?i)(?:password|passwd|secret)\s*[=:]\s*["']?([^\s"',}{]+)"#.to_string(),
            replacement: "[REDACTED:secret]".to_string(),
        },
    ]
}

struct CompiledRule {
    regex: Regex,
    replacement: String,
}

// ============================================================================
// Redaction engine
// ============================================================================

/// Applies flag masking and text rules
pub struct RedactionEngine {
    rules: Vec<CompiledRule>,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_ENGINE: LazyLock<RedactionEngine> = LazyLock::new(RedactionEngine::new);

impl RedactionEngine {
    /// Create with default rules
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Create with custom rules; patterns that fail to compile are skipped
    #[must_use]
    pub fn with_rules(rules: Vec<RedactionRule>) -> Self {
        let compiled = rules
            .into_iter()
            .filter_map(|r| {
                Regex::new(&r.pattern).ok().map(|regex| CompiledRule {
                    regex,
                    replacement: r.replacement,
                })
            })
            .collect();

        Self { rules: compiled }
    }

    /// Redact a string, returning the redacted text and the number of matches
    #[must_use]
    pub fn redact_text(&self, input: &str) -> (String, usize) {
        let mut output = input.to_string();
        let mut matches = 0;

        for rule in &self.rules {
            let count = rule.regex.find_iter(&output).count();
            if count > 0 {
                output = rule
                    .regex
                    .replace_all(&output, &*rule.replacement)
                    .to_string();
                matches += count;
            }
        }

        (output, matches)
    }

    /// Redact an argument vector: values after [`SECRET_FLAGS`] are masked,
    /// `--flag=value` forms too, and every other argument goes through the text rules.
    #[must_use]
    pub fn redact_args(&self, args: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(args.len());
        let mut mask_next = false;

        for arg in args {
            if mask_next {
                out.push(REDACTED.to_string());
                mask_next = false;
                continue;
            }
            if SECRET_FLAGS.contains(&arg.as_str()) {
                mask_next = true;
                out.push(arg.clone());
                continue;
            }
            if let Some((flag, _)) = arg.split_once('=')
                && SECRET_FLAGS.contains(&flag)
            {
                out.push(format!("{flag}={REDACTED}"));
                continue;
            }
            out.push(self.redact_text(arg).0);
        }

        out
    }

    /// Get the number of compiled rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Redact an argument vector with the default engine
#[must_use]
pub fn redact_args(args: &[String]) -> Vec<String> {
    DEFAULT_ENGINE.redact_args(args)
}

/// Redact free text with the default engine
#[must_use]
pub fn redact_text(input: &str) -> String {
    DEFAULT_ENGINE.redact_text(input).0
}
