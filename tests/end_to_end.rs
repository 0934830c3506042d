use marginalia::client::CommandOutput;
use marginalia::config::{self, Settings};
use marginalia::cursor::CURSOR_MARKER;
use marginalia::prompt::PromptTemplate;
use marginalia::testing::ScriptedRunner;
use marginalia::{CliClient, QueryDispatcher, QueryState, Workspace};
use std::sync::Arc;
use std::time::Duration;

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn vault_bootstrap_then_follow_up() {
    let runner = ScriptedRunner::new();
    runner.push_output(CommandOutput::ok("Strong opener."));
    runner.push_output(CommandOutput::ok("Nice continuation."));

    let settings = config::shared(Settings::default());
    let client = Arc::new(CliClient::with_runner(
        Workspace::new("/vault"),
        settings.clone(),
        runner.clone(),
    ));
    let dispatcher = QueryDispatcher::new(Arc::clone(&client), settings, PromptTemplate::default());

    assert!(client.is_new_session());
    dispatcher.on_editor_content_changed("hello", 5, "daily.md");
    advance(2100).await;

    assert_eq!(
        dispatcher.state(),
        QueryState::Success {
            feedback: "Strong opener.".to_string()
        }
    );
    assert!(!client.is_new_session());

    dispatcher.on_editor_content_changed("hello world", 11, "daily.md");
    advance(2100).await;
    assert_eq!(
        dispatcher.state(),
        QueryState::Success {
            feedback: "Nice continuation.".to_string()
        }
    );
    assert!(!client.is_new_session());

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);

    let bootstrap = &calls[0];
    assert!(bootstrap.stdin.contains(&format!("hello{}", CURSOR_MARKER)));
    assert_eq!(bootstrap.args[0], "--session-id");

    let follow_up = &calls[1];
    assert_eq!(follow_up.args[0], "--resume");
    assert_eq!(follow_up.args[1], bootstrap.args[1]);
    assert!(follow_up.stdin.contains("daily.md"));
    assert!(follow_up.stdin.contains("line 1"));
    // Cursor is on the first line, so the window clamps to that single line.
    assert!(follow_up.stdin.contains("```\n1: hello world\n```"));
    assert!(!follow_up.stdin.contains(CURSOR_MARKER));
}

#[tokio::test]
async fn separate_workspaces_keep_separate_sessions() {
    let runner = ScriptedRunner::new();
    let settings = config::shared(Settings::default());
    let notes = CliClient::with_runner(Workspace::new("/notes"), settings.clone(), runner.clone());
    let vault = CliClient::with_runner(Workspace::new("/vault"), settings, runner.clone());

    assert_ne!(notes.session_id(), vault.session_id());

    notes.get_feedback("one").await.unwrap();
    assert!(!notes.is_new_session());
    assert!(vault.is_new_session());

    vault.get_feedback("two").await.unwrap();
    let calls = runner.calls();
    assert_eq!(calls[0].args[1], notes.session_id().to_string());
    assert_eq!(calls[1].args[1], vault.session_id().to_string());
    assert_eq!(calls[1].args[0], "--session-id");
}
