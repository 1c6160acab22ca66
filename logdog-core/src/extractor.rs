//! Line extraction
//!
//! Pulls a node id out of a raw log line. Three patterns are tried in a fixed
//! order (enter, complete, general) and the first one that matches decides
//! the result, even when its capture turns out to be blank.

use crate::config::PatternConfig;
use crate::types::Result;
use regex::{Regex, RegexBuilder};

/// Node extractor - stateless apart from its compiled patterns
#[derive(Debug, Clone)]
pub struct Extractor {
    enter: Regex,
    complete: Regex,
    general: Regex,
    exclude: Regex,
    markers: Vec<String>,
}

impl Extractor {
    /// Create an extractor with the default `pipeline_data.name` / `node_name` grammar
    pub fn new() -> Result<Self> {
        Self::from_patterns(&PatternConfig::default())
    }

    /// Compile a custom pattern set
    pub fn from_patterns(patterns: &PatternConfig) -> Result<Self> {
        Ok(Self {
            enter: compile(&patterns.enter)?,
            complete: compile(&patterns.complete)?,
            general: compile(&patterns.general)?,
            exclude: compile(&patterns.exclude)?,
            markers: patterns.markers.clone(),
        })
    }

    /// Extract the node id named by `line`, if any
    pub fn extract(&self, line: &str) -> Option<String> {
        // Most lines in a busy log name no node at all
        if !self.markers.iter().any(|marker| line.contains(marker.as_str())) {
            return None;
        }

        let captured = first_capture(&self.enter, line)
            .or_else(|| first_capture(&self.complete, line))
            .or_else(|| self.general_capture(line))?;

        let node = captured.trim();
        if node.is_empty() {
            None
        } else {
            Some(node.to_string())
        }
    }

    /// General pattern with the exclusion applied to the rest of the line.
    ///
    /// Stands in for a `(?!.*(?:list=|result\.name=))` lookahead: a candidate
    /// is skipped when the exclusion appears anywhere after it.
    fn general_capture<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.general.captures_iter(line).find_map(|caps| {
            let whole = caps.get(0)?;
            if self.exclude.is_match(&line[whole.end()..]) {
                log::trace!("Skipping excluded node token at byte {}", whole.start());
                return None;
            }
            caps.get(1).map(|m| m.as_str())
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

fn first_capture<'a>(regex: &Regex, line: &'a str) -> Option<&'a str> {
    regex.captures(line)?.get(1).map(|m| m.as_str())
}
