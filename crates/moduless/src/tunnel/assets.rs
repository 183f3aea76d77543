//! Page-side scripts and the synthesized test document.

use std::path::Path;

use crate::config::ScriptReference;

/// Request name of the protocol script
pub const COMMON_ASSET: &str = "moduless.common.js";

/// Request name of the runner script
pub const TUNNEL_ASSET: &str = "moduless.tunnel.js";

const COMMON_SCRIPT: &str = include_str!("../../assets/moduless.common.js");
const TUNNEL_SCRIPT: &str = include_str!("../../assets/moduless.tunnel.js");

/// Port assignment in the runner script, replaced when served
const PORT_PLACEHOLDER: &str = "__wsPort__ = 10002;";

/// The protocol script
#[must_use]
pub const fn common_script() -> &'static str {
    COMMON_SCRIPT
}

/// The runner script, pointed at the live channel port
#[must_use]
pub fn tunnel_script(ws_port: u16) -> String {
    TUNNEL_SCRIPT.replacen(PORT_PLACEHOLDER, &format!("__wsPort__ = {ws_port};"), 1)
}

/// A fixed asset by request name
#[must_use]
pub fn fixed_asset(name: &str, ws_port: u16) -> Option<String> {
    match name {
        TUNNEL_ASSET => Some(tunnel_script(ws_port)),
        COMMON_ASSET => Some(COMMON_SCRIPT.to_string()),
        _ => None,
    }
}

/// HTML page that loads the two fixed assets, then `scripts` in order
#[must_use]
pub fn document_html(scripts: &[ScriptReference]) -> String {
    let mut lines = vec!["<!doctype html>".to_string()];
    for asset in [COMMON_ASSET, TUNNEL_ASSET] {
        lines.push(format!("<script src=\"/??{asset}\"></script>"));
    }
    for script in scripts {
        lines.push(format!("<script src=\"{}\"></script>", escape_attribute(&script.src())));
    }
    lines.join("\n")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Content type of a served path. Extension-less paths are documents.
#[must_use]
pub fn mime_type(path: &str) -> String {
    let path = Path::new(path);
    match path.extension().and_then(|e| e.to_str()) {
        None => "text/html; charset=utf-8".to_string(),
        Some("js" | "mjs" | "cjs") => "text/javascript; charset=utf-8".to_string(),
        Some("map" | "json") => "application/json".to_string(),
        Some("html" | "htm") => "text/html; charset=utf-8".to_string(),
        Some("wasm") => "application/wasm".to_string(),
        Some(_) => mime_guess::from_path(path)
            .first_or_text_plain()
            .to_string(),
    }
}
