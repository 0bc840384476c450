// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Question-start patterns. A pattern recognises the first line of a question
// and extracts its visual number.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ExamcutError, Result};

/// Serialized form of a [`QuestionPattern`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub regex: String,
    pub capture_group: usize,
    pub priority: u32,
}

/// A named, prioritised rule recognising the start line of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternSpec", into = "PatternSpec")]
pub struct QuestionPattern {
    pub name: String,
    matcher: Regex,
    pub capture_group: usize,
    pub priority: u32,
}

impl QuestionPattern {
    pub fn new(
        name: impl Into<String>,
        regex: &str,
        capture_group: usize,
        priority: u32,
    ) -> Result<Self> {
        let name = name.into();
        let matcher = Regex::new(regex)
            .map_err(|e| ExamcutError::Config(format!("pattern {name}: {e}")))?;
        if capture_group == 0 || capture_group >= matcher.captures_len() {
            return Err(ExamcutError::Config(format!(
                "pattern {name}: capture group {capture_group} does not exist"
            )));
        }
        Ok(Self {
            name,
            matcher,
            capture_group,
            priority,
        })
    }

    pub fn regex(&self) -> &str {
        self.matcher.as_str()
    }

    /// Extract the question number if `line` starts a question.
    pub fn match_line(&self, line: &str) -> Option<u32> {
        let caps = self.matcher.captures(line)?;
        caps.get(self.capture_group)?.as_str().parse().ok()
    }
}

impl TryFrom<PatternSpec> for QuestionPattern {
    type Error = ExamcutError;

    fn try_from(spec: PatternSpec) -> Result<Self> {
        Self::new(spec.name, &spec.regex, spec.capture_group, spec.priority)
    }
}

impl From<QuestionPattern> for PatternSpec {
    fn from(p: QuestionPattern) -> Self {
        Self {
            regex: p.matcher.as_str().to_owned(),
            name: p.name,
            capture_group: p.capture_group,
            priority: p.priority,
        }
    }
}

/// Built-in patterns, highest priority first.
pub fn default_patterns() -> Vec<QuestionPattern> {
    const DEFAULTS: &[(&str, &str, u32)] = &[
        ("soru_label", r"^\s*(?i:soru)\s*(\d{1,3})\b", 100),
        ("number_dot", r"^\s*(\d{1,3})\s*\.(?:\s+\S|[^\d\s])", 90),
        ("number_paren", r"^\s*(\d{1,3})\s*\)\s*\S", 80),
        ("number_dash", r"^\s*(\d{1,3})\s*-\s+\S", 70),
    ];
    DEFAULTS
        .iter()
        .filter_map(|(name, regex, priority)| QuestionPattern::new(*name, regex, 1, *priority).ok())
        .collect()
}

/// Patterns ordered for evaluation: descending priority, ties by name.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<QuestionPattern>,
    max_priority: u32,
}

impl PatternSet {
    pub fn new(mut patterns: Vec<QuestionPattern>) -> Self {
        patterns.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        let max_priority = patterns.first().map(|p| p.priority).unwrap_or(0);
        Self {
            patterns,
            max_priority,
        }
    }

    /// Same set with `preferred` lifted above every other pattern.
    pub fn with_preferred(&self, preferred: Option<&str>) -> Self {
        let Some(name) = preferred else {
            return self.clone();
        };
        let boosted = self.max_priority + 1;
        let patterns = self
            .patterns
            .iter()
            .cloned()
            .map(|mut p| {
                if p.name == name {
                    p.priority = boosted;
                }
                p
            })
            .collect();
        Self::new(patterns)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionPattern> {
        self.patterns.iter()
    }

    /// First matching pattern in priority order and the extracted number.
    pub fn first_match(&self, line: &str) -> Option<(&QuestionPattern, u32)> {
        self.patterns
            .iter()
            .find_map(|p| p.match_line(line).map(|n| (p, n)))
    }

    /// Priority normalised into `(0, 1]` relative to the strongest pattern.
    pub fn weight(&self, pattern: &QuestionPattern) -> f32 {
        if self.max_priority == 0 {
            return 1.0;
        }
        (pattern.priority as f32 / self.max_priority as f32).clamp(0.0, 1.0)
    }
}
