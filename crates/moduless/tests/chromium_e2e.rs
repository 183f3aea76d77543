//! End-to-end runs in a real Chromium. Needs a local browser:
//!
//! ```text
//! cargo test -p moduless --features browser -- --ignored
//! ```

#![cfg(feature = "browser")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use moduless::{
    ChromiumLauncher, EndCoverMessage, MessageBus, Preferences, ProjectGraph, StartCoverMessage,
    Tunnel, TunnelConfig,
};
use tokio::sync::mpsc::unbounded_channel;

const BUNDLE: &str = r#"
function coverTrue() {
    return () => 1 + 1 === 2;
}

function coverThrows() {
    throw new Error("boom");
}
"#;

async fn run(cover: &str) -> EndCoverMessage {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("tsconfig.json"),
        r#"{ "compilerOptions": { "outFile": "out.js" } }"#,
    )
    .unwrap();
    fs::write(dir.path().join("out.js"), BUNDLE).unwrap();

    let graph = Arc::new(ProjectGraph::discover(dir.path()).unwrap());
    let bus = MessageBus::new();
    let prefs = Arc::new(Mutex::new(Preferences::new(dir.path().join("prefs"))));
    let config = TunnelConfig::builder()
        .sandbox(false)
        .connect_timeout(Duration::from_secs(30))
        .build();
    let mut handle = Tunnel::start(graph, bus.clone(), prefs, Some(Arc::new(ChromiumLauncher)), config)
        .await
        .unwrap();

    let (tx, mut rx) = unbounded_channel();
    bus.listen::<EndCoverMessage, _>(move |m| {
        let _ = tx.send(m.clone());
    });
    bus.emit(StartCoverMessage::new(
        dir.path().join("out.js").to_string_lossy(),
        cover,
    ));

    let end = tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .unwrap()
        .unwrap();
    handle.stop().await;
    end
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires chromium"]
async fn test_true_verifier_passes() {
    let end = run("coverTrue").await;
    assert_eq!(end.cover_name, "coverTrue");
    assert!(end.exception_description.is_empty());
    assert_eq!(end.verifications.len(), 1);
    assert!(end.verifications[0].pass);
    assert_eq!(end.verifications[0].expression, "1 + 1 === 2");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires chromium"]
async fn test_throwing_cover_fails_with_frames() {
    let end = run("coverThrows").await;
    assert_eq!(end.exception_description, "boom");
    assert!(!end.exception_stack.is_empty());
    assert_eq!(end.verifications.len(), 1);
    assert!(!end.verifications[0].pass);
}
