//! Drives a real child process standing in for the assistant CLI.
#![cfg(unix)]

use marginalia::config::{self, Settings};
use marginalia::{CliClient, Workspace};
use std::fs;
use std::os::unix::fs::PermissionsExt;

const FAKE_ASSISTANT: &str = r#"#!/bin/sh
prompt=$(cat)
if [ "$1" = "--session-id" ]; then
  echo "Error: Session ID $2 is already in use." >&2
  exit 1
fi
printf 'resumed %s in %s: %s\n\n' "$2" "$(pwd)" "$prompt"
"#;

#[tokio::test]
async fn stale_session_is_adopted_through_resume() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-assistant");
    fs::write(&script, FAKE_ASSISTANT).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let workspace_root = dir.path().canonicalize().unwrap();
    let settings = Settings {
        command: script.display().to_string(),
        ..Settings::default()
    };
    let client = CliClient::new(Workspace::new(&workspace_root), config::shared(settings));

    assert!(client.is_new_session());
    let feedback = client.get_feedback("hello").await.unwrap();

    assert_eq!(
        feedback,
        format!(
            "resumed {} in {}: hello",
            client.session_id(),
            workspace_root.display()
        )
    );
    assert!(!client.is_new_session());
}
