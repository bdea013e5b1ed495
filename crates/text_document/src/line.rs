use crate::marker::MarkedSpan;
use serde::{Deserialize, Serialize};

/// Opaque cache key a renderer attaches to a line. Cleared whenever the line's
/// text changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderToken(pub u64);

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub(crate) text: String,
    pub(crate) spans: Vec<MarkedSpan>,
    pub(crate) render_token: Option<RenderToken>,
}

impl Line {
    pub(crate) fn new(text: String) -> Self {
        Line {
            text,
            spans: Vec::new(),
            render_token: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[MarkedSpan] {
        &self.spans
    }

    pub fn render_token(&self) -> Option<RenderToken> {
        self.render_token
    }
}

/// Snapshot of one line handed to consumers by the query interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct LineView {
    pub index: usize,
    pub text: String,
    pub spans: Vec<MarkedSpan>,
    pub render_token: Option<RenderToken>,
    pub height: f64,
}

/// Splits text on `\r\n`, `\r` or `\n`. Always yields at least one line.
pub fn split_lines(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(text[start..i].to_string());
                if bytes.get(i + 1) == Some(&b'\n') {
                    // \r\n case
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(text[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    lines.push(text[start..].to_string());
    lines
}
