//! Screening of free-text model output for injection-like content.

use std::fmt;

/// Phrases that mark a response as untrustworthy. Matched case-insensitively.
pub const DEFAULT_SUSPICIOUS_PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous",
    "ignore the above",
    "disregard previous",
    "disregard all prior",
    "forget your instructions",
    "system prompt",
    "reveal your prompt",
    "developer mode",
    "jailbreak",
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "document.cookie",
    "eval(",
    "exec(",
    "rm -rf",
    "http://",
    "https://",
];

/// Decides whether a piece of model text may be shown to the user.
pub trait ContentPolicy: Send + Sync + fmt::Debug {
    /// The first rule the text violates, or `None` when it is acceptable.
    fn violation(&self, text: &str) -> Option<String>;
}

/// Lowercased substring screen.
#[derive(Clone, Debug)]
pub struct SubstringScreen {
    patterns: Vec<String>,
}

impl SubstringScreen {
    /// Screen with [`DEFAULT_SUSPICIOUS_PATTERNS`].
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_SUSPICIOUS_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Screen with no patterns; accepts everything until patterns are added.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Add a pattern (normalized to lowercase). Blank patterns are ignored.
    pub fn deny(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into().trim().to_lowercase();
        if !pattern.is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    /// Remove a pattern, e.g. to allow links in a deployment that wants them.
    pub fn allow(mut self, pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        self.patterns.retain(|p| *p != pattern);
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SubstringScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentPolicy for SubstringScreen {
    fn violation(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.patterns
            .iter()
            .find(|p| lowered.contains(p.as_str()))
            .cloned()
    }
}
