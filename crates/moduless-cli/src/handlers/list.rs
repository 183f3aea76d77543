//! List command handler

use std::fmt::Write as _;

use console::style;
use moduless::{Project, ProjectGraph};

use super::load_graph;
use crate::commands::ListArgs;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Print every project of the workspace and the covers it declares
pub fn execute_list(config: &CliConfig, args: &ListArgs) -> CliResult<()> {
    let graph = load_graph(&args.path)?;
    if graph.is_empty() {
        if !config.verbosity.is_quiet() {
            eprintln!("No tsconfig files found under {}", args.path.display());
        }
        return Ok(());
    }
    print!("{}", render_listing(&graph, args.positions));
    Ok(())
}

/// Listing text: one heading per project, one indented line per cover
#[must_use]
pub fn render_listing(graph: &ProjectGraph, positions: bool) -> String {
    let mut out = String::new();
    for project in graph.iter() {
        render_project(&mut out, project, positions);
    }
    out
}

fn render_project(out: &mut String, project: &Project, positions: bool) {
    let _ = write!(out, "{}", style(project.name()).bold());
    match project.out_file() {
        Some(path) => {
            let _ = writeln!(out, " ({})", path.display());
        }
        None => {
            let _ = writeln!(out, " {}", style("(no outFile)").dim());
        }
    }

    let covers = project.cover_names();
    if covers.is_empty() {
        let _ = writeln!(out, "  {}", style("no covers").dim());
        return;
    }
    for name in covers {
        match project.cover_position(&name).filter(|_| positions) {
            Some(position) => {
                let _ = writeln!(out, "  {name}  {}", style(position).dim());
            }
            None => {
                let _ = writeln!(out, "  {name}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(bundle: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "compilerOptions": { "outFile": "out.js" } }"#,
        )
        .unwrap();
        fs::write(dir.path().join("out.js"), bundle).unwrap();
        dir
    }

    #[test]
    fn test_listing_names_covers_in_order() {
        console::set_colors_enabled(false);
        let dir = workspace(
            "function coverB() { return () => true; }\n\
             function helper() {}\n\
             function coverA() { return () => true; }\n",
        );
        let graph = load_graph(dir.path()).unwrap();
        let text = render_listing(&graph, false);
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].ends_with("out.js)"));
        assert_eq!(lines[1], "  coverB");
        assert_eq!(lines[2], "  coverA");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_listing_with_positions() {
        console::set_colors_enabled(false);
        let dir = workspace("function coverA() { return () => true; }\n");
        let graph = load_graph(dir.path()).unwrap();
        let text = render_listing(&graph, true);
        assert!(text.contains("coverA  "));
        assert!(text.contains("out.js:1:"));
    }

    #[test]
    fn test_project_without_covers() {
        console::set_colors_enabled(false);
        let dir = workspace("var x = 1;\n");
        let graph = load_graph(dir.path()).unwrap();
        assert!(render_listing(&graph, false).contains("no covers"));
    }
}
