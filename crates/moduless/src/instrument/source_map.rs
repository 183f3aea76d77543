//! Source positions and source maps.
//!
//! Instrumentation shifts code around, so the emitted bundle gets a map of its
//! own: rewritten output → compiled bundle. When the bundle carries a map from
//! the compiler (bundle → original sources), the two are composed so that the
//! served map points straight at the original sources.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use sourcemap::{SourceMap, SourceMapBuilder};

use crate::config::normalize_path;
use crate::result::{ModulessError, ModulessResult};

/// A position in a source file, 1-based
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Absolute path of the source file
    pub source: String,
    /// Line, starting at 1
    pub line: u32,
    /// Column in UTF-16 code units, starting at 1
    pub column: u32,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// Byte offset → (line, UTF-16 column) lookup, both 0-based
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of a text
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    /// Line and column of a byte offset
    #[must_use]
    pub fn position(&self, text: &str, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let start = self.line_starts[line];
        let column = text
            .get(start..offset)
            .map_or(0, |prefix| prefix.encode_utf16().count());
        (line as u32, column as u32)
    }
}

/// One stretch of output text and where it came from in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset in the output
    pub output: usize,
    /// Byte offset in the input
    pub input: usize,
    /// Whether the stretch is a verbatim copy (mapped line by line)
    pub copied: bool,
    /// Byte length in the output
    pub len: usize,
}

/// Build the output → input map of an instrumentation pass
pub fn instrumentation_map(
    input: &str,
    output: &str,
    segments: &[Segment],
    input_source: &str,
    file: Option<&str>,
) -> SourceMap {
    let input_index = LineIndex::new(input);
    let output_index = LineIndex::new(output);
    let mut builder = SourceMapBuilder::new(file);

    let mut add = |out_offset: usize, in_offset: usize| {
        let (dst_line, dst_col) = output_index.position(output, out_offset);
        let (src_line, src_col) = input_index.position(input, in_offset);
        builder.add(dst_line, dst_col, src_line, src_col, Some(input_source), None);
    };

    for segment in segments {
        add(segment.output, segment.input);
        if !segment.copied {
            continue;
        }
        let text = &output[segment.output..segment.output + segment.len];
        for (i, _) in text.match_indices('\n') {
            if i + 1 < text.len() {
                add(segment.output + i + 1, segment.input + i + 1);
            }
        }
    }

    builder.into_sourcemap()
}

/// Compose `outer` (output → bundle) with `inner` (bundle → sources).
/// Tokens whose bundle position the inner map does not cover are dropped.
pub fn compose(outer: &SourceMap, inner: &SourceMap, inner_dir: &Path, file: Option<&str>) -> SourceMap {
    let mut builder = SourceMapBuilder::new(file);
    for token in outer.tokens() {
        let Some(original) = inner.lookup_token(token.get_src_line(), token.get_src_col()) else {
            continue;
        };
        if original.get_src_line() == u32::MAX {
            continue;
        }
        let source = original
            .get_source()
            .map(|source| resolve_source(inner, inner_dir, source));
        builder.add(
            token.get_dst_line(),
            token.get_dst_col(),
            original.get_src_line(),
            original.get_src_col(),
            source.as_deref(),
            original.get_name(),
        );
    }
    builder.into_sourcemap()
}

/// Absolute path of a map's source, honoring `sourceRoot`
pub(crate) fn resolve_source(map: &SourceMap, map_dir: &Path, source: &str) -> String {
    let root = map.get_source_root().unwrap_or("");
    let joined: PathBuf = map_dir.join(root).join(source);
    normalize_path(&joined).to_string_lossy().into_owned()
}

/// Look up the source position of a 0-based output position
#[must_use]
pub fn lookup(map: &SourceMap, line: u32, column: u32) -> Option<SourcePosition> {
    let token = map.lookup_token(line, column)?;
    Some(SourcePosition {
        source: token.get_source()?.to_string(),
        line: token.get_src_line() + 1,
        column: token.get_src_col() + 1,
    })
}

/// The `//# sourceMappingURL=` comment of a bundle: its byte range and value
#[must_use]
pub fn find_mapping_comment(code: &str) -> Option<(usize, usize, &str)> {
    const MARKERS: [&str; 2] = ["//# sourceMappingURL=", "//@ sourceMappingURL="];
    let start = MARKERS.iter().filter_map(|m| code.rfind(m)).max()?;
    let value_start = start + MARKERS[0].len();
    let end = code[start..]
        .find(['\n', '\r'])
        .map_or(code.len(), |i| start + i);
    Some((start, end, code[value_start..end].trim()))
}

/// Load the compiler's map for a bundle, if it names one.
/// Returns the map and the directory its relative sources resolve against.
pub fn load_bundle_map(code: &str, out_file: &Path) -> ModulessResult<Option<(SourceMap, PathBuf)>> {
    let Some((_, _, url)) = find_mapping_comment(code) else {
        return Ok(None);
    };
    let out_dir = out_file.parent().map_or_else(PathBuf::new, Path::to_path_buf);

    if let Some(data) = url.strip_prefix("data:") {
        let (header, payload) = data
            .split_once(',')
            .ok_or_else(|| ModulessError::source_map("malformed data URL"))?;
        let bytes = if header.ends_with(";base64") {
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|err| ModulessError::source_map(err.to_string()))?
        } else {
            percent_encoding::percent_decode_str(payload).collect()
        };
        return Ok(Some((SourceMap::from_slice(&bytes)?, out_dir)));
    }

    let decoded = percent_encoding::percent_decode_str(url).decode_utf8_lossy();
    let map_path = normalize_path(&out_dir.join(decoded.as_ref()));
    let bytes = std::fs::read(&map_path)?;
    let map_dir = map_path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    Ok(Some((SourceMap::from_slice(&bytes)?, map_dir)))
}

/// Serialize a map as JSON text
pub fn to_json(map: &SourceMap) -> ModulessResult<String> {
    let mut bytes = Vec::new();
    map.to_writer(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| ModulessError::source_map(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_utf16() {
        let text = "ab\nμx😀y\n";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 0), (0, 0));
        assert_eq!(index.position(text, 3), (1, 0));
        let y = text.find('y').unwrap();
        // μ and x are one unit each, the emoji is a surrogate pair
        assert_eq!(index.position(text, y), (1, 4));
    }

    #[test]
    fn test_identity_segments_map_every_line() {
        let text = "a;\nb;\nc;";
        let segments = [Segment {
            output: 0,
            input: 0,
            copied: true,
            len: text.len(),
        }];
        let map = instrumentation_map(text, text, &segments, "/in.js", None);
        let third = lookup(&map, 2, 0).unwrap();
        assert_eq!(third.line, 3);
        assert_eq!(third.source, "/in.js");
    }

    #[test]
    fn test_find_mapping_comment() {
        let code = "x();\n//# sourceMappingURL=out.js.map\n";
        let (start, end, url) = find_mapping_comment(code).unwrap();
        assert_eq!(url, "out.js.map");
        assert_eq!(&code[start..end], "//# sourceMappingURL=out.js.map");
        assert!(find_mapping_comment("x();").is_none());
    }

    #[test]
    fn test_compose_through_bundle_map() {
        // bundle line 0 col 0 comes from src/a.ts line 4 col 2
        let mut inner = SourceMapBuilder::new(Some("out.js"));
        inner.add(0, 0, 4, 2, Some("src/a.ts"), Some("coverA"));
        let inner = inner.into_sourcemap();

        // output line 1 col 0 comes from bundle line 0 col 0
        let mut outer = SourceMapBuilder::new(Some("out.js"));
        outer.add(1, 0, 0, 0, Some("/p/out.js"), None);
        let outer = outer.into_sourcemap();

        let composed = compose(&outer, &inner, Path::new("/p"), Some("out.js"));
        let position = lookup(&composed, 1, 0).unwrap();
        assert_eq!(position.source, "/p/src/a.ts");
        assert_eq!((position.line, position.column), (5, 3));
    }

    #[test]
    fn test_inline_data_url() {
        let mut builder = SourceMapBuilder::new(None);
        builder.add(0, 0, 0, 0, Some("a.ts"), None);
        let json = to_json(&builder.into_sourcemap()).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        let code = format!("x();\n//# sourceMappingURL=data:application/json;base64,{encoded}");

        let (map, dir) = load_bundle_map(&code, Path::new("/p/out.js")).unwrap().unwrap();
        assert_eq!(dir, PathBuf::from("/p"));
        assert_eq!(map.get_source(0), Some("a.ts"));
    }

    #[test]
    fn test_map_file_next_to_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = SourceMapBuilder::new(None);
        builder.add(0, 0, 0, 0, Some("a.ts"), None);
        let json = to_json(&builder.into_sourcemap()).unwrap();
        std::fs::write(dir.path().join("out.js.map"), json).unwrap();

        let code = "x();\n//# sourceMappingURL=out.js.map";
        let (_, map_dir) = load_bundle_map(code, &dir.path().join("out.js")).unwrap().unwrap();
        assert_eq!(map_dir, dir.path());
    }

    #[test]
    fn test_missing_map_file_is_an_error() {
        let code = "x();\n//# sourceMappingURL=missing.js.map";
        assert!(load_bundle_map(code, Path::new("/nonexistent/out.js")).is_err());
    }
}
