use rustpython_ast::TextSize;

/// Converts byte offsets from the parser into line/column positions.
///
/// The AST carries byte offsets; reports need 1-based lines and 0-based
/// columns.
pub struct LineIndex {
    /// Byte index of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Builds the index by scanning the source for newlines.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Converts a byte offset to a 1-based line number.
    pub fn line(&self, offset: TextSize) -> usize {
        let offset = offset.to_usize();
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Converts a byte offset to (1-based line, 0-based byte column).
    pub fn line_col(&self, offset: TextSize) -> (usize, usize) {
        let line = self.line(offset);
        let col = offset.to_usize() - self.line_starts[line - 1];
        (line, col)
    }
}

/// Normalizes a path to the repository-relative POSIX form used
/// throughout the engine: forward slashes, no leading `./`.
pub fn posix_path(rel: &std::path::Path) -> String {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    joined.trim_start_matches("./").to_string()
}
