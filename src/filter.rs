//! Keyword highlight rules used by the keyword renderer.
//!
//! A rule table is built once and shared read-only between sessions; renderers
//! receive it at construction and never mutate it.

use std::sync::Arc;

use anyhow::{Context, bail};
use regex::{Regex, RegexBuilder};

use crate::render::escape;

/// One keyword and the colour of the lines that contain it.
#[derive(Debug, Clone)]
pub struct HighlightRule {
    pub word: String,
    pub color: String,
    // Matches the escaped form of `word`, since rendering runs on escaped text
    matcher: Regex,
}

impl HighlightRule {
    pub fn new(word: &str, color: &str) -> anyhow::Result<Self> {
        if word.is_empty() {
            bail!("highlight word must not be empty");
        }
        let matcher = RegexBuilder::new(&regex::escape(&escape(word)))
            .build()
            .with_context(|| format!("invalid highlight word `{word}`"))?;
        Ok(Self {
            word: word.to_string(),
            color: color.to_string(),
            matcher,
        })
    }

    /// Whether an already escaped line contains the keyword.
    pub fn matches(&self, escaped_line: &str) -> bool {
        self.matcher.is_match(escaped_line)
    }

    /// Colour the whole line and bold every occurrence of the keyword.
    pub fn apply(&self, escaped_line: &str) -> String {
        let bolded = self
            .matcher
            .replace_all(escaped_line, |caps: &regex::Captures| {
                format!(r#"<span style="font-weight: bold">{}</span>"#, &caps[0])
            });
        format!(
            r#"<span style="color: {}">{}</span>"#,
            escape(&self.color),
            bolded
        )
    }
}

/// ERROR, WARNING and INFO, in that order.
pub fn default_rules() -> Arc<[HighlightRule]> {
    [("ERROR", "red"), ("WARNING", "#ff7700"), ("INFO", "blue")]
        .into_iter()
        .filter_map(|(word, color)| HighlightRule::new(word, color).ok())
        .collect()
}

/// Parse `WORD=COLOR` specs. An empty list yields the default rules.
pub fn build_rules(specs: &[String]) -> anyhow::Result<Arc<[HighlightRule]>> {
    if specs.is_empty() {
        return Ok(default_rules());
    }
    let mut rules = Vec::with_capacity(specs.len());
    for spec in specs {
        let Some((word, color)) = spec.split_once('=') else {
            bail!("highlight `{spec}` is not of the form WORD=COLOR");
        };
        rules.push(HighlightRule::new(word.trim(), color.trim())?);
    }
    Ok(rules.into())
}

/// First rule (in table order) whose keyword occurs in the line.
pub fn first_match<'a>(
    rules: &'a [HighlightRule],
    escaped_line: &str,
) -> Option<&'a HighlightRule> {
    rules.iter().find(|rule| rule.matches(escaped_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ordered() {
        let rules = default_rules();
        let words: Vec<&str> = rules.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, ["ERROR", "WARNING", "INFO"]);
    }

    #[test]
    fn first_match_follows_table_order() {
        let rules = default_rules();
        let rule = first_match(&rules, "WARNING then ERROR").unwrap();
        assert_eq!(rule.word, "ERROR");
        assert!(first_match(&rules, "debug output").is_none());
    }

    #[test]
    fn parses_specs() {
        let rules = build_rules(&["FATAL=purple".into(), " DEBUG = gray ".into()]).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].word, "DEBUG");
        assert_eq!(rules[1].color, "gray");
        assert!(build_rules(&["nocolor".into()]).is_err());
        assert!(build_rules(&["=red".into()]).is_err());
    }

    #[test]
    fn apply_bolds_each_occurrence() {
        let rule = HighlightRule::new("INFO", "blue").unwrap();
        assert_eq!(
            rule.apply("INFO x INFO"),
            concat!(
                r#"<span style="color: blue">"#,
                r#"<span style="font-weight: bold">INFO</span> x "#,
                r#"<span style="font-weight: bold">INFO</span></span>"#
            )
        );
    }

    #[test]
    fn words_with_markup_characters_match_escaped_text() {
        let rule = HighlightRule::new("<E>", "red").unwrap();
        assert!(rule.matches("a &lt;E&gt; b"));
    }
}
