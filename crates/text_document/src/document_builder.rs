use crate::config::DocumentOptions;
use crate::document::Document;
use crate::line::split_lines;

/// Builds a [`Document`] from text that arrives in pieces.
///
/// Line breaks may be split across chunks, including the two bytes of a
/// `\r\n`.
#[derive(Default, Debug)]
pub struct DocumentBuilder {
    lines: Vec<String>,
    current: String,
    pending_cr: bool,
    options: DocumentOptions,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DocumentOptions) -> Self {
        DocumentBuilder {
            options,
            ..Self::default()
        }
    }

    /// Accept a chunk of text (may include multiple lines).
    pub fn accept_chunk(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut chunk = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            chunk = chunk.strip_prefix('\n').unwrap_or(chunk);
            if chunk.is_empty() {
                return;
            }
        }
        self.pending_cr = chunk.ends_with('\r');

        let mut parts = split_lines(chunk).into_iter();
        let last = parts.next_back().unwrap_or_default();
        match parts.next() {
            Some(first) => {
                self.current.push_str(&first);
                self.lines.push(std::mem::take(&mut self.current));
                self.lines.extend(parts);
                self.current = last;
            }
            None => self.current.push_str(&last),
        }
    }

    /// Number of complete lines seen so far.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Finish building and return the `Document`.
    pub fn finish(mut self) -> Document {
        self.lines.push(self.current);
        Document::from_lines(self.lines, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(chunks: &[&str]) -> Vec<String> {
        let mut builder = DocumentBuilder::new();
        for chunk in chunks {
            builder.accept_chunk(chunk);
        }
        let doc = builder.finish();
        (0..doc.line_count())
            .map(|i| doc.line_text(i).unwrap().to_string())
            .collect()
    }

    #[test]
    fn lines_continue_across_chunks() {
        assert_eq!(build(&["ab", "c\nd", "ef\n", "g"]), vec!["abc", "def", "g"]);
    }

    #[test]
    fn crlf_split_between_chunks_is_one_break() {
        assert_eq!(build(&["ab\r", "\ncd"]), vec!["ab", "cd"]);
        assert_eq!(build(&["ab\r", "", "\ncd"]), vec!["ab", "cd"]);
        assert_eq!(build(&["ab\r", "cd"]), vec!["ab", "cd"]);
        assert_eq!(build(&["ab\r", "\r\n"]), vec!["ab", "", ""]);
    }

    #[test]
    fn no_input_gives_one_empty_line() {
        assert_eq!(build(&[]), vec![""]);
        assert_eq!(build(&["x\n"]), vec!["x", ""]);
    }

    #[test]
    fn options_are_passed_through() {
        let options = DocumentOptions {
            undo_depth: 3,
            ..DocumentOptions::default()
        };
        let mut builder = DocumentBuilder::with_options(options.clone());
        builder.accept_chunk("a\nb");
        assert_eq!(builder.line_count(), 1);
        assert_eq!(builder.finish().options(), &options);
    }
}
