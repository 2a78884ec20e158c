//! Text to markup renderers.
//!
//! A renderer is fed successive chunks read from a growing origin and returns
//! the markup for every line completed so far. The trailing partial line is
//! withheld until a later chunk completes it, or until the caller asks for it
//! with [`Renderer::flush`]. Rendered output never contains a raw newline.

use std::path::Path;
use std::sync::Arc;

use crate::filter::{HighlightRule, first_match};

/// Which markup a renderer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStyle {
    /// ANSI colour codes converted to inline-styled spans.
    Ansi,
    /// Escaped lines with keyword highlighting.
    Keyword,
    /// Escaped lines wrapped in `<pre>` blocks.
    Preformatted,
}

/// Stateful chunk renderer. One caller sequence per instance.
pub trait Renderer: Send + Sync {
    /// Render the complete lines available after appending `text`.
    fn render(&mut self, text: &str) -> String;

    /// Render the withheld partial line, if any, as a complete line.
    fn flush(&mut self) -> String;

    /// Drop all state carried between calls.
    fn reset(&mut self);

    fn style(&self) -> RenderStyle;
}

/// Holds the partial line between calls. Never contains `\n`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Append `text` and return the lines it completes, without terminators.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last_newline]
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Take the partial line, leaving the buffer empty.
    pub fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for use in markup text and attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

pub const NOTICE_NOT_YET: &str = "File does not exist yet";
pub const NOTICE_CREATED: &str = "File has been created";
pub const NOTICE_RECREATED: &str = "File recreated";
pub const NOTICE_DISAPPEARED: &str = "File disappeared";
pub const NOTICE_TRUNCATED: &str = "File truncated";
pub const NOTICE_EXIT: &str = "exit";
pub const NOTICE_EOF: &str = "EOF";

/// Lifecycle marker, visually distinct from log content.
pub fn notice(msg: &str) -> String {
    format!(
        r#"<span style="display:block; background-color: khaki; text-align: center">{}</span>"#,
        escape(msg).replace(['\r', '\n'], " ")
    )
}

/// Escapes lines and highlights the first matching keyword rule of each.
pub struct KeywordRenderer {
    rules: Arc<[HighlightRule]>,
    lines: LineBuffer,
}

impl KeywordRenderer {
    pub fn new(rules: Arc<[HighlightRule]>) -> Self {
        Self {
            rules,
            lines: LineBuffer::default(),
        }
    }

    fn render_line(&self, line: &str) -> String {
        let escaped = escape(line);
        match first_match(&self.rules, &escaped) {
            Some(rule) => format!("{}<br>", rule.apply(&escaped)),
            None => format!("{escaped}<br>"),
        }
    }
}

impl Renderer for KeywordRenderer {
    fn render(&mut self, text: &str) -> String {
        self.lines
            .push(text)
            .iter()
            .map(|line| self.render_line(line))
            .collect()
    }

    fn flush(&mut self) -> String {
        match self.lines.take() {
            Some(line) => self.render_line(line.strip_suffix('\r').unwrap_or(&line)),
            None => String::new(),
        }
    }

    fn reset(&mut self) {
        self.lines.clear();
    }

    fn style(&self) -> RenderStyle {
        RenderStyle::Keyword
    }
}

/// Wraps every non-empty line in a `<pre>` block.
#[derive(Default)]
pub struct PreRenderer {
    lines: LineBuffer,
}

impl PreRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn pre_line(line: &str) -> String {
    if line.is_empty() {
        String::new()
    } else {
        format!("<pre>{}</pre>", escape(line))
    }
}

impl Renderer for PreRenderer {
    fn render(&mut self, text: &str) -> String {
        self.lines.push(text).iter().map(|line| pre_line(line)).collect()
    }

    fn flush(&mut self) -> String {
        self.lines
            .take()
            .map(|line| pre_line(line.strip_suffix('\r').unwrap_or(&line)))
            .unwrap_or_default()
    }

    fn reset(&mut self) {
        self.lines.clear();
    }

    fn style(&self) -> RenderStyle {
        RenderStyle::Preformatted
    }
}

/// Whether ANSI conversion was compiled in.
pub fn ansi_available() -> bool {
    cfg!(feature = "ansi")
}

/// Downgrade `Ansi` to `Keyword` when conversion is unavailable.
pub fn effective_style(requested: RenderStyle, ansi_available: bool) -> RenderStyle {
    match requested {
        RenderStyle::Ansi if !ansi_available => RenderStyle::Keyword,
        other => other,
    }
}

pub const ANSI_EXTENSION: &str = "ansi";

/// `Ansi` for `*.ansi` files when conversion is available, `Keyword` otherwise.
pub fn style_for_file(path: &Path, ansi_available: bool) -> RenderStyle {
    let is_ansi = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ANSI_EXTENSION));
    if is_ansi {
        effective_style(RenderStyle::Ansi, ansi_available)
    } else {
        RenderStyle::Keyword
    }
}

pub fn build_renderer(style: RenderStyle, rules: Arc<[HighlightRule]>) -> Box<dyn Renderer> {
    match style {
        #[cfg(feature = "ansi")]
        RenderStyle::Ansi => Box::new(crate::ansi::AnsiRenderer::new()),
        #[cfg(not(feature = "ansi"))]
        RenderStyle::Ansi => Box::new(KeywordRenderer::new(rules)),
        RenderStyle::Keyword => Box::new(KeywordRenderer::new(rules)),
        RenderStyle::Preformatted => Box::new(PreRenderer::new()),
    }
}
