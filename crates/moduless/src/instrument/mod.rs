//! Instrumentation of compiled bundles.
//!
//! Each pass over a bundle:
//!
//! 1. skips bundles with no `function coverXxx` text at all,
//! 2. finds `function coverXxx` declarations that are not nested in another
//!    function declaration,
//! 3. rewrites `void "command(args)"` expressions into
//!    `Moduless.remote("command", [args])` calls, awaiting them where they
//!    stand as statements inside a function,
//! 4. appends `;Moduless.addCover(coverXxx);` after each declaration that is
//!    not already registered,
//! 5. emits a source map for the result, composed with the bundle's own map.

pub mod arena;
pub mod commands;
pub mod source_map;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use sourcemap::SourceMap;

pub use arena::{NodeId, SyntaxArena};
pub use commands::VoidCommand;
pub use source_map::{LineIndex, SourcePosition};

use crate::config::to_url_path;
use crate::result::{ModulessError, ModulessResult};
use source_map::Segment;

/// Prefix every cover function name starts with
pub const COVER_PREFIX: &str = "cover";

/// Cheap pre-check for a cover declaration, tolerant of generator stars and
/// extra whitespace. The syntax tree decides what is really a cover.
pub const COVER_MARKER: &str = r"\bfunction\b\s*\*?\s*cover[A-Z]";

/// A discovered cover function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverFunctionRecord {
    /// Function name
    pub name: String,
    /// Declaration start, resolved to the original source when possible
    pub position: SourcePosition,
}

/// Result of one instrumentation pass
#[derive(Debug)]
pub struct Instrumented {
    /// Rewritten bundle text
    pub code: String,
    /// Cover functions in declaration order
    pub covers: Vec<CoverFunctionRecord>,
    /// Map from `code` back to the original sources
    pub source_map: Option<SourceMap>,
}

impl Instrumented {
    /// A bundle served as-is
    #[must_use]
    pub fn passthrough(code: &str) -> Self {
        Self {
            code: code.to_string(),
            covers: Vec::new(),
            source_map: None,
        }
    }

    /// Cover names in declaration order
    #[must_use]
    pub fn cover_names(&self) -> Vec<String> {
        self.covers.iter().map(|c| c.name.clone()).collect()
    }
}

/// Whether a function name follows the cover naming convention
#[must_use]
pub fn is_cover_name(name: &str) -> bool {
    name.strip_prefix(COVER_PREFIX)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(COVER_MARKER).ok()).as_ref()
}

/// Whether the text may declare a cover function
#[must_use]
pub fn has_cover_marker(code: &str) -> bool {
    marker_pattern().map_or(true, |pattern| pattern.is_match(code))
}

fn registration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Moduless\.addCover\(\s*([A-Za-z_$][\w$]*)\s*\)").ok())
        .as_ref()
}

/// Functions the text already registers
#[must_use]
pub fn registered_names(code: &str) -> HashSet<String> {
    registration_pattern()
        .map(|pattern| {
            pattern
                .captures_iter(code)
                .map(|caps| caps[1].to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Text that registers a cover function with the page runner
#[must_use]
pub fn registration(name: &str) -> String {
    format!(";Moduless.addCover({name});")
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Instrument a bundle that lives at `out_file`
pub fn instrument(code: &str, out_file: &Path) -> ModulessResult<Instrumented> {
    if !has_cover_marker(code) {
        return Ok(Instrumented::passthrough(code));
    }

    let arena = SyntaxArena::parse(code)?;
    if arena.has_error() {
        return Err(ModulessError::instrumentation(format!(
            "{} does not parse as JavaScript",
            out_file.display()
        )));
    }

    let bundle_map = match source_map::load_bundle_map(code, out_file) {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(bundle = %out_file.display(), "Ignoring bundle source map: {err}");
            None
        }
    };

    let declarations = find_covers(&arena, code);
    let already = registered_names(code);
    let mut edits = Vec::new();

    for &(decl, ref name) in &declarations {
        if !already.contains(name) {
            edits.push(Edit {
                start: arena.node(decl).end,
                end: arena.node(decl).end,
                text: registration(name),
            });
        }
    }
    rewrite_voids(&arena, code, &mut edits);

    let file_name = out_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let map_comment = format!(
        "//# sourceMappingURL={}.map",
        file_name.as_deref().unwrap_or("bundle.js")
    );
    match source_map::find_mapping_comment(code) {
        Some((start, end, _)) => edits.push(Edit {
            start,
            end,
            text: map_comment,
        }),
        None => edits.push(Edit {
            start: code.len(),
            end: code.len(),
            text: format!("\n{map_comment}"),
        }),
    }

    let (output, segments) = apply_edits(code, edits);

    let bundle_source = out_file.to_string_lossy();
    let own_map = source_map::instrumentation_map(
        code,
        &output,
        &segments,
        &bundle_source,
        file_name.as_deref(),
    );
    let source_map = match &bundle_map {
        Some((inner, inner_dir)) => {
            source_map::compose(&own_map, inner, inner_dir, file_name.as_deref())
        }
        None => own_map,
    };

    let input_index = LineIndex::new(code);
    let covers = declarations
        .into_iter()
        .map(|(decl, name)| {
            let (line, column) = input_index.position(code, arena.node(decl).start);
            let position = bundle_map
                .as_ref()
                .and_then(|(inner, inner_dir)| {
                    let mut position = source_map::lookup(inner, line, column)?;
                    position.source = source_map::resolve_source(inner, inner_dir, &position.source);
                    Some(position)
                })
                .unwrap_or_else(|| SourcePosition {
                    source: bundle_source.to_string(),
                    line: line + 1,
                    column: column + 1,
                });
            CoverFunctionRecord { name, position }
        })
        .collect();

    tracing::debug!(
        bundle = %to_url_path(out_file),
        segments = segments.len(),
        "instrumented"
    );

    Ok(Instrumented {
        code: output,
        covers,
        source_map: Some(source_map),
    })
}

/// Cover declarations in source order that are not inside another function
/// declaration. Function expressions (such as namespace wrappers) do not count
/// as nesting.
fn find_covers(arena: &SyntaxArena, code: &str) -> Vec<(NodeId, String)> {
    arena
        .ids()
        .filter(|id| is_function_declaration(arena.node(*id).kind))
        .filter(|id| {
            !arena
                .ancestors(*id)
                .any(|a| is_function_declaration(arena.node(a).kind))
        })
        .filter_map(|id| {
            let name = arena.child_by_field(id, "name")?;
            let name = arena.text(name, code);
            is_cover_name(name).then(|| (id, name.to_string()))
        })
        .collect()
}

fn is_function_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration" | "generator_function_declaration"
    )
}

fn is_function(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "arrow_function"
            | "method_definition"
    )
}

/// Where a `void "..."` expression stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoidContext {
    /// Statement directly inside a function body
    Statement { function: NodeId },
    /// Statement outside any function
    TopLevel,
    /// Anything else: an argument, an arrow body, an operand
    Expression,
}

fn void_context(arena: &SyntaxArena, expr: NodeId) -> VoidContext {
    let Some(parent) = arena.node(expr).parent else {
        return VoidContext::Expression;
    };
    if arena.node(parent).kind != "expression_statement" {
        return VoidContext::Expression;
    }
    arena
        .ancestors(parent)
        .find(|a| is_function(arena.node(*a).kind))
        .map_or(VoidContext::TopLevel, |function| VoidContext::Statement { function })
}

fn rewrite_voids(arena: &SyntaxArena, code: &str, edits: &mut Vec<Edit>) {
    let mut made_async: BTreeSet<NodeId> = BTreeSet::new();

    for id in arena.ids() {
        if arena.node(id).kind != "unary_expression" {
            continue;
        }
        let Some(operator) = arena.child_by_field(id, "operator") else {
            continue;
        };
        if arena.text(operator, code) != "void" {
            continue;
        }
        let Some(argument) = arena
            .child_by_field(id, "argument")
            .filter(|arg| arena.node(*arg).kind == "string")
        else {
            continue;
        };
        let Some(payload) = commands::unquote(arena.text(argument, code)) else {
            continue;
        };

        let command = match VoidCommand::parse(&payload) {
            Ok(command) => command,
            Err(err) => {
                let (line, _) = LineIndex::new(code).position(code, arena.node(id).start);
                tracing::warn!(line = line + 1, "Skipping void expression: {err}");
                continue;
            }
        };

        let call = command.remote_call();
        let text = match void_context(arena, id) {
            VoidContext::Statement { function } => match promotion(arena, code, function) {
                Promotion::AlreadyAsync => format!("await {call}"),
                Promotion::Insert(at) => {
                    if made_async.insert(function) {
                        edits.push(Edit {
                            start: at,
                            end: at,
                            text: "async ".to_string(),
                        });
                    }
                    format!("await {call}")
                }
                Promotion::Unavailable => call,
            },
            VoidContext::TopLevel | VoidContext::Expression => call,
        };

        edits.push(Edit {
            start: arena.node(id).start,
            end: arena.node(id).end,
            text,
        });
    }
}

/// How a function holding an awaited remote call becomes asynchronous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Promotion {
    /// Already `async`
    AlreadyAsync,
    /// Insert `async ` at this byte offset
    Insert(usize),
    /// Getters, setters, constructors and generators cannot be made async;
    /// the call is left un-awaited
    Unavailable,
}

fn promotion(arena: &SyntaxArena, code: &str, function: NodeId) -> Promotion {
    if arena.has_token(function, "async") {
        return Promotion::AlreadyAsync;
    }
    let node = arena.node(function);
    match node.kind {
        "generator_function_declaration" | "generator_function" => Promotion::Unavailable,
        "method_definition" => {
            if ["get", "set", "*"]
                .iter()
                .any(|token| arena.has_token(function, token))
            {
                return Promotion::Unavailable;
            }
            match arena.child_by_field(function, "name") {
                Some(name) if arena.text(name, code) == "constructor" => Promotion::Unavailable,
                // `async` goes after `static` and right before the name
                Some(name) => Promotion::Insert(arena.node(name).start),
                None => Promotion::Unavailable,
            }
        }
        _ => Promotion::Insert(node.start),
    }
}

/// Apply non-overlapping edits; returns the output and its segment table
fn apply_edits(code: &str, mut edits: Vec<Edit>) -> (String, Vec<Segment>) {
    // Stable: inserts at one offset keep their discovery order
    edits.sort_by_key(|edit| (edit.start, edit.end));

    let mut output = String::with_capacity(code.len() + edits.len() * 48);
    let mut segments = Vec::with_capacity(edits.len() * 2 + 1);
    let mut cursor = 0;

    let copy = |output: &mut String, segments: &mut Vec<Segment>, from: usize, to: usize| {
        if from < to {
            segments.push(Segment {
                output: output.len(),
                input: from,
                copied: true,
                len: to - from,
            });
            output.push_str(&code[from..to]);
        }
    };

    for edit in edits {
        if edit.start < cursor {
            tracing::warn!(at = edit.start, "Dropping overlapping edit");
            continue;
        }
        copy(&mut output, &mut segments, cursor, edit.start);
        segments.push(Segment {
            output: output.len(),
            input: edit.start,
            copied: false,
            len: edit.text.len(),
        });
        output.push_str(&edit.text);
        cursor = edit.end;
    }
    copy(&mut output, &mut segments, cursor, code.len());

    (output, segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> Instrumented {
        instrument(code, Path::new("/p/build/out.js")).unwrap()
    }

    mod discovery_tests {
        use super::*;

        #[test]
        fn test_three_of_five() {
            let code = "\
function coverAlpha() { return () => true; }
function helper() {}
function coverBeta() { return () => true; }
function coverage() {}
function coverGamma() { return () => true; }
";
            let out = run(code);
            assert_eq!(out.cover_names(), vec!["coverAlpha", "coverBeta", "coverGamma"]);
            assert_eq!(out.covers[1].position.line, 3);
            assert_eq!(out.covers[1].position.column, 1);
        }

        #[test]
        fn test_no_marker_passthrough() {
            let code = "function helper() { return 1; }";
            let out = run(code);
            assert_eq!(out.code, code);
            assert!(out.covers.is_empty());
            assert!(out.source_map.is_none());
        }

        #[test]
        fn test_marker_spacing_and_generators() {
            assert!(has_cover_marker("function  coverA() {}"));
            assert!(has_cover_marker("function* coverA() {}"));
            assert!(has_cover_marker("function *coverA() {}"));
            assert!(!has_cover_marker("function coverage() {}"));
            assert!(!has_cover_marker("var cover = 1;"));

            let out = run("function  coverSpaced() {}\nfunction* coverSteps() { yield 1; }\n");
            assert_eq!(out.cover_names(), vec!["coverSpaced", "coverSteps"]);
        }

        #[test]
        fn test_nested_in_namespace_wrapper() {
            let code = "var App;\n(function (App) {\n    function coverInside() { return () => 1; }\n})(App || (App = {}));\n";
            let out = run(code);
            assert_eq!(out.cover_names(), vec!["coverInside"]);
            assert!(out.code.contains("function coverInside() { return () => 1; };Moduless.addCover(coverInside);"));
        }

        #[test]
        fn test_nested_declaration_is_not_a_cover() {
            let code = "function coverOuter() { function coverInner() {} return () => true; }";
            assert_eq!(run(code).cover_names(), vec!["coverOuter"]);
        }

        #[test]
        fn test_is_cover_name() {
            assert!(is_cover_name("coverX"));
            assert!(!is_cover_name("cover"));
            assert!(!is_cover_name("coverage"));
            assert!(!is_cover_name("Cover"));
        }

        #[test]
        fn test_parse_error() {
            let err = instrument("function coverA( {", Path::new("/p/out.js")).unwrap_err();
            assert!(matches!(err, ModulessError::Instrumentation { .. }));
        }
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn test_injected_after_declaration() {
            let out = run("function coverA() { return () => true; }\nfoo();\n");
            assert!(out
                .code
                .starts_with("function coverA() { return () => true; };Moduless.addCover(coverA);\nfoo();"));
        }

        #[test]
        fn test_idempotent() {
            let once = run("function coverA() { return () => true; }\n");
            let twice = run(&once.code);
            assert_eq!(twice.code.matches("Moduless.addCover(coverA)").count(), 1);
            assert_eq!(twice.cover_names(), vec!["coverA"]);
        }

        #[test]
        fn test_map_comment_appended_once() {
            let once = run("function coverA() {}\n");
            assert!(once.code.ends_with("//# sourceMappingURL=out.js.map"));
            let twice = run(&once.code);
            assert_eq!(twice.code.matches("sourceMappingURL").count(), 1);
        }
    }

    mod void_tests {
        use super::*;

        #[test]
        fn test_statement_in_function_is_awaited() {
            let out = run("function coverA() {\n    void \"click(1, 2)\";\n    return () => true;\n}\n");
            assert!(out.code.contains("async function coverA()"));
            assert!(out.code.contains("await Moduless.remote(\"click\", [1, 2]);"));
        }

        #[test]
        fn test_async_inserted_once() {
            let out = run("function coverA() { void \"a()\"; void \"b()\"; }\n");
            assert_eq!(out.code.matches("async").count(), 1);
            assert_eq!(out.code.matches("await").count(), 2);
        }

        #[test]
        fn test_already_async() {
            let out = run("async function coverA() { void \"a()\"; }\n");
            assert!(out.code.starts_with("async function coverA()"));
            assert_eq!(out.code.matches("async").count(), 1);
        }

        #[test]
        fn test_arrow_body() {
            let out = run("function coverA() { return () => void \"snapshot()\"; }\n");
            assert!(out.code.contains("() => Moduless.remote(\"snapshot\", [])"));
            assert!(!out.code.contains("async"));
        }

        #[test]
        fn test_argument() {
            let out = run("function coverA() { return [check(void \"goto('/x')\")]; }\n");
            assert!(out.code.contains("check(Moduless.remote(\"goto\", [\"/x\"]))"));
        }

        #[test]
        fn test_top_level_statement() {
            let out = run("void \"keyboard('hi')\";\nfunction coverA() {}\n");
            assert!(out.code.starts_with("Moduless.remote(\"keyboard\", [\"hi\"]);"));
        }

        #[test]
        fn test_method_gets_async_before_name() {
            let out = run("class T { run() { void \"a()\"; } }\nfunction coverA() {}\n");
            assert!(out.code.contains("class T { async run() { await Moduless.remote(\"a\", []); } }"));
        }

        #[test]
        fn test_static_method_gets_async_after_static() {
            let out = run("class T { static run() { void \"a()\"; } }\nfunction coverA() {}\n");
            assert!(out.code.contains("static async run()"));
            assert!(!SyntaxArena::parse(&out.code).unwrap().has_error());
        }

        #[test]
        fn test_accessors_are_not_promoted() {
            let code = "class T {\n    get x() { void \"click(1, 2)\"; return 1; }\n    set x(v) { void \"a()\"; }\n}\nfunction coverA() {}\n";
            let out = run(code);
            assert!(out.code.contains("get x() { Moduless.remote(\"click\", [1, 2]); return 1; }"));
            assert!(out.code.contains("set x(v) { Moduless.remote(\"a\", []); }"));
            assert!(!out.code.contains("async"));
            assert!(!SyntaxArena::parse(&out.code).unwrap().has_error());
        }

        #[test]
        fn test_generators_and_constructors_are_not_promoted() {
            let code = "\
function* steps() { void \"a()\"; yield 1; }
class T {
    constructor() { void \"b()\"; }
    *each() { void \"c()\"; }
}
function coverA() {}
";
            let out = run(code);
            assert!(!out.code.contains("async"));
            assert!(!out.code.contains("await"));
            assert_eq!(out.code.matches("Moduless.remote(").count(), 3);
            assert!(!SyntaxArena::parse(&out.code).unwrap().has_error());
        }

        #[test]
        fn test_malformed_payload_is_skipped() {
            let out = run("function coverA() { void \"not a call\"; void \"ok()\"; }\n");
            assert!(out.code.contains("void \"not a call\";"));
            assert!(out.code.contains("await Moduless.remote(\"ok\", [])"));
            assert_eq!(out.cover_names(), vec!["coverA"]);
        }

        #[test]
        fn test_plain_void_untouched() {
            let out = run("function coverA() { return void 0; }\n");
            assert!(out.code.contains("return void 0;"));
        }
    }

    mod map_tests {
        use super::*;

        #[test]
        fn test_lines_after_edits_still_map() {
            let code = "function coverA() { void \"click(1, 2)\"; }\nfunction after() {}\n";
            let out = run(code);
            let map = out.source_map.unwrap();
            let position = source_map::lookup(&map, 1, 0).unwrap();
            assert_eq!(position.source, "/p/build/out.js");
            assert_eq!(position.line, 2);
        }
    }
}
