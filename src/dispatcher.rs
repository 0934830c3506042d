//! Debounced query dispatch
//!
//! Edits are coalesced on the trailing edge: each edit replaces the pending
//! query and restarts the quiet-period timer, so only the last edit of a burst
//! reaches the assistant.
//!
//! Every scheduled query gets a sequence number. A completion is applied only
//! if its number is still the one in flight and the state is still
//! `Querying`; anything else (a cancelled or superseded query) is dropped.
//! Cancellation never kills the child process, it only forgets the result.

use crate::client::CliClient;
use crate::config::{self, SettingsUpdate, SharedSettings};
use crate::error::is_user_correctable;
use crate::prompt::{build_prompt, PromptRequest, PromptTemplate};
use crate::util::{lock_unpoisoned, read_unpoisoned, write_unpoisoned};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Querying,
    Success {
        feedback: String,
    },
    Error {
        message: String,
        occurred_at: DateTime<Utc>,
    },
}

impl QueryState {
    pub fn is_querying(&self) -> bool {
        matches!(self, QueryState::Querying)
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryState::Idle => "idle",
            QueryState::Querying => "querying",
            QueryState::Success { .. } => "success",
            QueryState::Error { .. } => "error",
        }
    }

    /// Whether the presentation layer should offer a "Retry" action.
    ///
    /// Errors the user has to fix first (missing executable, login) get a hint
    /// instead. Retrying is never blocked either way.
    pub fn offers_retry(&self) -> bool {
        match self {
            QueryState::Error { message, .. } => !is_user_correctable(message),
            _ => false,
        }
    }
}

/// The edit waiting for its quiet period.
pub type PendingQuery = PromptRequest;

type Seq = u64;

#[derive(Default)]
struct Schedule {
    next_seq: Seq,
    pending: Option<(Seq, PendingQuery)>,
    timer: Option<JoinHandle<()>>,
    in_flight: Option<Seq>,
    last_request: Option<PendingQuery>,
}

impl Schedule {
    fn take_seq(&mut self) -> Seq {
        self.next_seq += 1;
        self.next_seq
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    client: Arc<CliClient>,
    settings: SharedSettings,
    template: RwLock<PromptTemplate>,
    schedule: Mutex<Schedule>,
    state: watch::Sender<QueryState>,
}

/// Turns editor changes into assistant queries. Cheap to clone.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct QueryDispatcher {
    shared: Arc<Shared>,
}

impl QueryDispatcher {
    pub fn new(client: Arc<CliClient>, settings: SharedSettings, template: PromptTemplate) -> Self {
        let (state, _) = watch::channel(QueryState::Idle);
        Self {
            shared: Arc::new(Shared {
                client,
                settings,
                template: RwLock::new(template),
                schedule: Mutex::new(Schedule::default()),
                state,
            }),
        }
    }

    pub fn state(&self) -> QueryState {
        self.shared.state.borrow().clone()
    }

    /// Watch state transitions (presentation layer).
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.shared.state.subscribe()
    }

    pub fn client(&self) -> &Arc<CliClient> {
        &self.shared.client
    }

    pub fn has_pending(&self) -> bool {
        lock_unpoisoned(&self.shared.schedule).pending.is_some()
    }

    /// Schedule a query for this snapshot, replacing any pending one.
    pub fn on_editor_content_changed(
        &self,
        content: impl Into<String>,
        cursor_position: usize,
        file_path: impl Into<String>,
    ) {
        let request = PromptRequest {
            content: content.into(),
            cursor: cursor_position,
            file_path: file_path.into(),
        };
        let delay = read_unpoisoned(&self.shared.settings).debounce_delay();
        self.schedule(request, delay);
    }

    /// Drop the pending query and forget the one in flight, if any.
    pub fn cancel_pending_queries(&self) {
        let mut schedule = lock_unpoisoned(&self.shared.schedule);
        schedule.cancel_timer();
        schedule.pending = None;

        if self.shared.state.borrow().is_querying() {
            schedule.in_flight = None;
            self.shared.state.send_replace(QueryState::Idle);
            tracing::debug!("query cancelled; its result will be discarded");
        }
    }

    /// Applies to queries scheduled after this call; a running timer keeps its delay.
    pub fn update_settings(&self, update: SettingsUpdate) {
        config::apply_update(&self.shared.settings, update);
    }

    pub fn set_template(&self, template: PromptTemplate) {
        *write_unpoisoned(&self.shared.template) = template;
    }

    /// Clear an error without resubmitting. Returns false if not in `Error`.
    pub fn acknowledge_error(&self) -> bool {
        let _schedule = lock_unpoisoned(&self.shared.schedule);
        let is_error = matches!(*self.shared.state.borrow(), QueryState::Error { .. });
        if is_error {
            self.shared.state.send_replace(QueryState::Idle);
        }
        is_error
    }

    /// Query right away instead of waiting for the quiet period.
    ///
    /// An edit still waiting for its timer is sent in place of the last
    /// fired request, so a retry never resurrects older text. Returns false
    /// when there is nothing to send or a query is running.
    pub fn retry_last_query(&self) -> bool {
        let mut schedule = lock_unpoisoned(&self.shared.schedule);
        if self.shared.state.borrow().is_querying() {
            return false;
        }
        let request = match schedule.pending.take() {
            Some((_, request)) => request,
            None => match schedule.last_request.clone() {
                Some(request) => request,
                None => return false,
            },
        };
        self.arm(&mut schedule, request, Duration::ZERO);
        true
    }

    fn schedule(&self, request: PendingQuery, delay: Duration) {
        let mut schedule = lock_unpoisoned(&self.shared.schedule);
        self.arm(&mut schedule, request, delay);
    }

    /// Replace whatever is pending with `request` and restart the timer.
    fn arm(&self, schedule: &mut Schedule, request: PendingQuery, delay: Duration) {
        let seq = schedule.take_seq();
        schedule.cancel_timer();
        schedule.pending = Some((seq, request));

        let shared = Arc::clone(&self.shared);
        schedule.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(seq).await;
        }));
        tracing::debug!(seq, delay_ms = delay.as_millis() as u64, "query scheduled");
    }
}

impl Shared {
    async fn fire(self: Arc<Self>, seq: Seq) {
        let request = {
            let mut schedule = lock_unpoisoned(&self.schedule);
            match schedule.pending.take() {
                Some((pending_seq, request)) if pending_seq == seq => {
                    // From here on the task runs the query; nothing may abort it.
                    schedule.timer = None;
                    schedule.in_flight = Some(seq);
                    schedule.last_request = Some(request.clone());
                    self.state.send_replace(QueryState::Querying);
                    request
                }
                other => {
                    schedule.pending = other;
                    return;
                }
            }
        };

        let template = read_unpoisoned(&self.template).clone();
        let client = Arc::clone(&self.client);
        let query = async move {
            client
                .get_feedback_with(|is_new_session| build_prompt(is_new_session, &template, &request))
                .await
                .map_err(|err| err.to_string())
        };

        let result = match AssertUnwindSafe(query).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(format!("Query crashed unexpectedly: {}", panic_detail(&*panic))),
        };
        self.finish(seq, result);
    }

    fn finish(&self, seq: Seq, result: Result<String, String>) {
        let mut schedule = lock_unpoisoned(&self.schedule);
        if schedule.in_flight != Some(seq) || !self.state.borrow().is_querying() {
            tracing::debug!(seq, "dropping stale query result");
            return;
        }
        schedule.in_flight = None;

        let next = match result {
            Ok(feedback) => QueryState::Success { feedback },
            Err(message) => {
                tracing::warn!(seq, error = %message, "query failed");
                QueryState::Error {
                    message,
                    occurred_at: Utc::now(),
                }
            }
        };
        self.state.send_replace(next);
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
