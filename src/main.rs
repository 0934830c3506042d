//! marginalia - live writing feedback from a local assistant CLI
//!
//! Watches a document, waits for a pause in typing, and asks the assistant
//! about the text around the cursor. One conversation per workspace: the first
//! query sends the whole document, later ones only what changed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marginalia::cursor::changed_region_end;
use marginalia::prompt::{build_prompt, PromptRequest, PromptTemplate, TemplateStore};
use marginalia::{config, logging, CliClient, QueryDispatcher, QueryState, Settings, SettingsUpdate, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How often `watch` looks at the file.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(
    name = "marginalia",
    about = "Live writing feedback from a local assistant CLI",
    version
)]
struct Args {
    /// Workspace root (defaults to current directory)
    #[arg(long, short = 'w', default_value = ".", global = true)]
    workspace: PathBuf,

    /// Quiet period in milliseconds before an edit becomes a query
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Comma-separated capabilities the assistant may use
    #[arg(long, value_delimiter = ',', global = true)]
    allowed_tools: Option<Vec<String>>,

    /// Assistant executable
    #[arg(long, global = true)]
    command: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Watch a file and ask for feedback whenever typing pauses
    Watch {
        /// File to watch, relative to the workspace
        file: PathBuf,
    },
    /// Ask once about a file
    Ask {
        file: PathBuf,
        /// Cursor as a character offset (defaults to end of file)
        #[arg(long)]
        cursor: Option<usize>,
    },
    /// Print the conversation id used for this workspace
    Session,
    /// Manage the prompt template
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// Print the active template
    Show,
    /// Overwrite the template file with the built-in default
    Reset,
    /// Print where the template file lives
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let mut settings = Settings::load();
    settings.apply(SettingsUpdate {
        debounce_delay_ms: args.debounce_ms,
        allowed_tools: args.allowed_tools.clone(),
        command: args.command.clone(),
        prompt_template_path: None,
    });
    let store = template_store(&settings)?;

    let root = args
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", args.workspace.display()))?;
    let workspace = Workspace::new(root);

    match args.action {
        Action::Watch { file } => {
            let template = store.load()?;
            watch(workspace, &file, settings, template).await
        }
        Action::Ask { file, cursor } => {
            let template = store.load()?;
            ask(workspace, &file, cursor, settings, template).await
        }
        Action::Session => {
            println!("{}", workspace.session_id());
            eprintln!("  workspace: {}", workspace.root().display());
            Ok(())
        }
        Action::Template { action } => match action {
            TemplateAction::Show => {
                print!("{}", store.load()?.as_str());
                Ok(())
            }
            TemplateAction::Reset => {
                store.restore_default()?;
                eprintln!("  + Template restored at {}", store.path().display());
                Ok(())
            }
            TemplateAction::Path => {
                println!("{}", store.path().display());
                Ok(())
            }
        },
    }
}

fn template_store(settings: &Settings) -> Result<TemplateStore> {
    let path = settings
        .prompt_template_path
        .clone()
        .or_else(TemplateStore::default_path)
        .context("Could not determine config directory for the prompt template")?;
    Ok(TemplateStore::new(path))
}

/// Absolute path to read plus the workspace-relative name shown to the assistant.
fn resolve_file(workspace: &Workspace, file: &Path) -> (PathBuf, String) {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        workspace.root().join(file)
    };
    let display = absolute
        .strip_prefix(workspace.root())
        .unwrap_or(&absolute)
        .display()
        .to_string();
    (absolute, display)
}

async fn ask(
    workspace: Workspace,
    file: &Path,
    cursor: Option<usize>,
    settings: Settings,
    template: PromptTemplate,
) -> Result<()> {
    let (path, display) = resolve_file(&workspace, file);
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let request = PromptRequest {
        cursor: cursor.unwrap_or_else(|| content.chars().count()),
        content,
        file_path: display,
    };

    let client = CliClient::new(workspace, config::shared(settings));
    eprintln!("  Asking {}...", client.session_id());
    let feedback = client
        .get_feedback_with(|is_new_session| build_prompt(is_new_session, &template, &request))
        .await?;
    println!("{}", feedback);
    Ok(())
}

async fn watch(workspace: Workspace, file: &Path, settings: Settings, template: PromptTemplate) -> Result<()> {
    let (path, display) = resolve_file(&workspace, file);
    let mut previous = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let shared_settings = config::shared(settings);
    let client = Arc::new(CliClient::new(workspace, shared_settings.clone()));
    let dispatcher = QueryDispatcher::new(client, shared_settings, template);

    let mut states = dispatcher.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            report(&state);
        }
    });

    eprintln!("  Watching {} (r + Enter to retry, Ctrl-C to stop)", display);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                dispatcher.cancel_pending_queries();
                eprintln!();
                eprintln!("  Stopped.");
                return Ok(());
            }
            line = input.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) if line.trim() == "r" => {
                        dispatcher.acknowledge_error();
                        if !dispatcher.retry_last_query() {
                            eprintln!("  Nothing to retry yet.");
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => input_open = false,
                }
            }
            _ = ticker.tick() => {
                let current = match tokio::fs::read_to_string(&path).await {
                    Ok(current) => current,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "could not read watched file");
                        continue;
                    }
                };
                if current != previous {
                    let cursor = changed_region_end(&previous, &current);
                    dispatcher.on_editor_content_changed(current.clone(), cursor, display.clone());
                    previous = current;
                }
            }
        }
    }
}

fn report(state: &QueryState) {
    match state {
        QueryState::Idle => {}
        QueryState::Querying => eprintln!("  ... asking the assistant"),
        QueryState::Success { feedback } => {
            println!();
            println!("{}", feedback);
            println!();
        }
        QueryState::Error {
            message,
            occurred_at,
        } => {
            eprintln!(
                "  ! {} ({})",
                message,
                occurred_at.with_timezone(&chrono::Local).format("%H:%M:%S")
            );
            if state.offers_retry() {
                eprintln!("  Press r + Enter to retry, or keep editing.");
            } else {
                eprintln!("  Fix the problem above, then keep editing.");
            }
        }
    }
}
