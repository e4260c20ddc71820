use serde::{Deserialize, Serialize};

/// Default window size in lines.
pub const DEFAULT_WINDOW: usize = 100;

/// A contiguous, fixed-size line window of one source file.
///
/// Line numbers are 1-based and inclusive. Chunks are never mutated after
/// creation; ranking results carry their own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

impl CodeChunk {
    /// File name component of `file_path` (handles both separators).
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }

    /// Number of lines covered by this chunk.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// Split `text` into non-overlapping windows of `window` lines.
///
/// Lines are split on `'\n'` only, so a trailing newline yields one final
/// empty line, and `'\r'` stays part of the line. Windows whose content is
/// blank after trimming are dropped, but the line numbering of the windows
/// that remain is unaffected. A `window` of zero is treated as one.
pub fn chunk_lines(file_path: &str, text: &str, window: usize) -> Vec<CodeChunk> {
    let window = window.max(1);
    let lines: Vec<&str> = text.split('\n').collect();

    lines
        .chunks(window)
        .enumerate()
        .filter_map(|(i, slice)| {
            let content = slice.join("\n");
            if content.trim().is_empty() {
                return None;
            }
            let start_line = i * window + 1;
            Some(CodeChunk {
                file_path: file_path.to_string(),
                start_line,
                end_line: start_line + slice.len() - 1,
                content,
            })
        })
        .collect()
}
