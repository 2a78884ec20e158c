//! ANSI escape sequences to inline-styled markup.
//!
//! Conversion of SGR (`ESC [ … m`) sequences is done by `ansi-to-html`. Every
//! other CSI or OSC sequence is dropped before conversion. Text is converted
//! line by line, so a line's markup is always closed on that line; the SGR
//! sequences still in effect are replayed in front of the next one.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::render::{LineBuffer, RenderStyle, Renderer, escape};

static ESCAPE_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    // CSI with parameters, OSC terminated by BEL or ST, or a bare two-byte escape
    Regex::new(r"\x1b(?:\[([0-9;:?<=>]*)[ -/]*([@-~])|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[@-Z\\-_])")
        .expect("escape sequence pattern is valid")
});

/// Replayed SGR state beyond this is cut back to the latest sequence.
const CARRY_LIMIT: usize = 1024;

/// Renders ANSI-coloured output, one `<br>`-terminated line at a time.
#[derive(Default)]
pub struct AnsiRenderer {
    lines: LineBuffer,
    /// SGR sequences seen since the last full reset.
    carry: String,
}

impl AnsiRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&mut self, params: &str, sequence: &str) {
        let mut codes = params.split([';', ':']).map(|p| p.parse::<u16>().unwrap_or(0));
        let resets = codes.next() == Some(0);
        if resets || self.carry.len() + sequence.len() > CARRY_LIMIT {
            self.carry.clear();
        }
        // A bare reset leaves nothing to replay
        if codes.next().is_some() || !resets {
            self.carry.push_str(sequence);
        }
    }

    fn render_line(&mut self, line: &str) -> String {
        let mut input = self.carry.clone();
        let mut visible = String::new();
        let mut last = 0;
        for caps in ESCAPE_SEQUENCE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            let text = &line[last..whole.start()];
            input.push_str(text);
            visible.push_str(text);
            last = whole.end();
            if caps.get(2).is_some_and(|m| m.as_str() == "m") {
                let params = caps.get(1).map_or("", |m| m.as_str());
                input.push_str(whole.as_str());
                self.remember(params, whole.as_str());
            }
        }
        input.push_str(&line[last..]);
        visible.push_str(&line[last..]);
        input.retain(|c| c != '\r' && c != '\x07');

        let mut out = match ansi_to_html::convert(&input) {
            Ok(html) => html,
            Err(e) => {
                debug!(error = %e, "ANSI conversion failed, emitting plain text");
                visible.retain(|c| c != '\r' && c != '\x07');
                escape(&visible)
            }
        };
        out.push_str("<br>");
        out
    }
}

impl Renderer for AnsiRenderer {
    fn render(&mut self, text: &str) -> String {
        let lines = self.lines.push(text);
        lines.iter().map(|line| self.render_line(line)).collect()
    }

    fn flush(&mut self) -> String {
        match self.lines.take() {
            Some(line) => self.render_line(&line),
            None => String::new(),
        }
    }

    fn reset(&mut self) {
        self.lines.clear();
        self.carry.clear();
    }

    fn style(&self) -> RenderStyle {
        RenderStyle::Ansi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_escaped() {
        let mut r = AnsiRenderer::new();
        assert_eq!(r.render("a < b\n"), "a &lt; b<br>");
    }

    #[test]
    fn colors_become_spans() {
        let mut r = AnsiRenderer::new();
        let out = r.render("\x1b[31mred\x1b[0m plain\n");
        assert!(out.starts_with("<span"), "{out}");
        assert!(out.contains("red</span>"), "{out}");
        assert!(out.ends_with(" plain<br>"), "{out}");
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn style_carries_across_lines() {
        let mut r = AnsiRenderer::new();
        let out = r.render("\x1b[1;32mok\nstill\x1b[m\nafter\n");
        let lines: Vec<&str> = out.split_inclusive("<br>").collect();
        assert_eq!(lines.len(), 3, "{out}");
        assert!(lines[0].starts_with("<") && lines[0].contains("ok"));
        // Each line closes its own markup
        assert_eq!(lines[0].matches("<span").count(), lines[0].matches("</span>").count());
        assert!(lines[1].starts_with("<") && lines[1].contains("still"));
        assert_eq!(lines[2], "after<br>");
    }

    #[test]
    fn non_sgr_sequences_and_carriage_returns_are_dropped() {
        let mut r = AnsiRenderer::new();
        assert_eq!(r.render("\x1b[2Kab\rc\x1b]0;title\x07d\n"), "abcd<br>");
    }

    #[test]
    fn markup_in_colored_text_is_escaped() {
        let mut r = AnsiRenderer::new();
        let out = r.render("\x1b[31m<b>&\x1b[0m\n");
        assert!(out.contains("&lt;b&gt;&amp;"), "{out}");
        assert!(!out.contains("<b>"));
    }

    #[test]
    fn rechunking_does_not_change_output() {
        let input = "\x1b[33mPASSED\x1b[0m test_a\n\x1b[1;31mFAILED\x1b[0m <b>\npartial";
        let whole = AnsiRenderer::new().render(input);
        for step in 1..input.len() {
            let mut r = AnsiRenderer::new();
            let out: String = input
                .as_bytes()
                .chunks(step)
                .map(|piece| r.render(std::str::from_utf8(piece).unwrap()))
                .collect();
            assert_eq!(out, whole, "chunk size {step}");
        }
    }

    #[test]
    fn reset_clears_style() {
        let mut r = AnsiRenderer::new();
        r.render("\x1b[31mred\n");
        r.reset();
        assert_eq!(r.render("plain\n"), "plain<br>");
    }

    #[test]
    fn carried_state_stays_bounded() {
        let mut r = AnsiRenderer::new();
        for _ in 0..1000 {
            r.render("\x1b[31mx\x1b[1m\n");
        }
        assert!(r.carry.len() <= CARRY_LIMIT);
    }
}
