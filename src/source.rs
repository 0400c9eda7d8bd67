//! Source management: files, byte spans and their resolution to
//! human-readable line/column locations.
//!
//! Every token, AST node and IR item carries a [`Span`]. Spans are plain
//! byte ranges tagged with a [`FileId`], so they stay `Copy` no matter how
//! many files a compilation touches; the [`SourceMap`] owned by the
//! `Session` turns them back into file names, lines and columns on demand.

use serde::{Deserialize, Serialize};

/// Index of a file inside the [`SourceMap`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// A half-open byte range `[start, end)` inside a single source file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Span { file, start, end }
    }

    /// Span covering both `self` and `other`. Both must live in the same
    /// file; merging spans across files is a caller bug.
    pub fn merge(&self, other: &Span) -> Span {
        debug_assert_eq!(self.file, other.file);
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 1-based line/column pair. Columns count characters, not bytes, so a
/// span after a multi-byte code point still points where an editor would.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub src: String,
    /// Byte offset of the first character of every line.
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(name: String, src: String) -> Self {
        let mut line_starts = vec![0u32];
        for (idx, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(idx as u32 + 1);
            }
        }
        SourceFile {
            name,
            src,
            line_starts,
        }
    }

    /// Line index (0-based) containing the given byte offset.
    fn line_index(&self, offset: u32) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next_line) => next_line - 1,
        }
    }

    /// Resolve a byte offset to a 1-based line/column location.
    pub fn loc(&self, offset: u32) -> Loc {
        let line = self.line_index(offset);
        let line_start = self.line_starts[line] as usize;
        let column = self.src[line_start..(offset as usize).min(self.src.len())]
            .chars()
            .count();
        Loc {
            line: line + 1,
            column: column + 1,
        }
    }

    /// The full text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: usize) -> &str {
        let start = self.line_starts[line - 1] as usize;
        let end = self
            .line_starts
            .get(line)
            .map(|s| *s as usize)
            .unwrap_or(self.src.len());
        self.src[start..end].trim_end_matches('\n')
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Owns all loaded source files and resolves spans against them.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, src: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(name.into(), src.into()));
        id
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn file_name(&self, id: FileId) -> &str {
        &self.file(id).name
    }

    /// Source text a span covers.
    pub fn snippet(&self, span: Span) -> &str {
        let file = self.file(span.file);
        &file.src[span.start as usize..span.end as usize]
    }

    pub fn loc(&self, span: Span) -> Loc {
        self.file(span.file).loc(span.start)
    }

    pub fn end_loc(&self, span: Span) -> Loc {
        self.file(span.file).loc(span.end)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(src: &str) -> (SourceMap, FileId) {
        let mut map = SourceMap::new();
        let id = map.add_file("test.tml", src);
        (map, id)
    }

    #[test]
    fn test_loc_of_first_byte() {
        let (map, file) = map_with("let x = 1\nlet y = 2\n");
        assert_eq!(map.loc(Span::new(file, 0, 3)), Loc { line: 1, column: 1 });
    }

    #[test]
    fn test_loc_on_second_line() {
        let (map, file) = map_with("let x = 1\nlet y = 2\n");
        assert_eq!(map.loc(Span::new(file, 14, 15)), Loc { line: 2, column: 5 });
    }

    #[test]
    fn test_snippet() {
        let (map, file) = map_with("func add() {}");
        assert_eq!(map.snippet(Span::new(file, 5, 8)), "add");
    }

    #[test]
    fn test_multibyte_column_counts_chars() {
        let (map, file) = map_with("let π = 1");
        // 'π' is two bytes; '=' starts at byte 7 but is the 7th character.
        assert_eq!(map.loc(Span::new(file, 7, 8)).column, 7);
    }

    #[test]
    fn test_merge_spans() {
        let a = Span::new(FileId(0), 4, 8);
        let b = Span::new(FileId(0), 10, 14);
        assert_eq!(a.merge(&b), Span::new(FileId(0), 4, 14));
    }

    #[test]
    fn test_line_text_strips_newline() {
        let (map, file) = map_with("first\nsecond\n");
        assert_eq!(map.file(file).line_text(2), "second");
    }
}
