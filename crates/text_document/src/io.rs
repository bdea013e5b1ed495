use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use tracing::debug;

use crate::config::DocumentOptions;
use crate::document::Document;
use crate::document_builder::DocumentBuilder;

pub fn load_from_path<P: AsRef<Path>>(path: P) -> io::Result<Document> {
    load_from_path_with_options(path, DocumentOptions::default())
}

/// Reads a UTF-8 file into a document. A trailing broken sequence is decoded
/// lossily.
pub fn load_from_path_with_options<P: AsRef<Path>>(path: P, options: DocumentOptions) -> io::Result<Document> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut builder = DocumentBuilder::with_options(options);
    let mut buf = vec![0u8; 64 * 1024];
    let mut carry: Vec<u8> = Vec::new();
    let mut total = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n;

        let mut combined = Vec::with_capacity(carry.len() + n);
        combined.extend_from_slice(&carry);
        combined.extend_from_slice(&buf[..n]);

        let valid_len = match std::str::from_utf8(&combined) {
            Ok(_) => combined.len(),
            Err(e) => e.valid_up_to(),
        };

        if valid_len > 0 {
            let s = std::str::from_utf8(&combined[..valid_len]).expect("valid UTF-8 prefix");
            builder.accept_chunk(s);
        }

        // keep a partial codepoint for the next read
        carry.clear();
        if valid_len < combined.len() {
            carry.extend_from_slice(&combined[valid_len..]);
        }
    }

    if !carry.is_empty() {
        let s = String::from_utf8_lossy(&carry);
        builder.accept_chunk(&s);
    }

    let doc = builder.finish();
    debug!(path = %path.display(), bytes = total, lines = doc.line_count(), "loaded document");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_multibyte_text_larger_than_one_read() {
        let line = "héllo wörld ✓";
        let text = vec![line; 10_000].join("\r\n");
        let path = std::env::temp_dir().join(format!("text_document_io_{}.txt", std::process::id()));
        fs::write(&path, &text).unwrap();

        let doc = load_from_path(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(doc.line_count(), 10_000);
        assert_eq!(doc.line_text(9_999), Ok(line));
        assert_eq!(doc.text(), text.replace("\r\n", "\n"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("text_document_io_missing/none.txt");
        assert!(load_from_path(path).is_err());
    }
}
