//! Scripted assistant for tests and dry runs
//!
//! Replays queued outcomes instead of launching a process, and records every
//! invocation it receives.

use crate::client::{CommandOutput, CommandRunner, Invocation};
use crate::util::lock_unpoisoned;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// What the runner does for one invocation.
pub enum Scripted {
    Output(CommandOutput),
    SpawnError(io::ErrorKind),
    /// Finish after a (tokio) delay
    Delayed(Duration, CommandOutput),
    /// Block until the test sends the output
    Gated(oneshot::Receiver<CommandOutput>),
}

#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: Scripted) {
        lock_unpoisoned(&self.script).push_back(step);
    }

    pub fn push_output(&self, output: CommandOutput) {
        self.push(Scripted::Output(output));
    }

    pub fn push_spawn_error(&self, kind: io::ErrorKind) {
        self.push(Scripted::SpawnError(kind));
    }

    pub fn push_delayed(&self, delay: Duration, output: CommandOutput) {
        self.push(Scripted::Delayed(delay, output));
    }

    /// Queue an invocation that completes only when the returned sender fires.
    pub fn push_gate(&self) -> oneshot::Sender<CommandOutput> {
        let (tx, rx) = oneshot::channel();
        self.push(Scripted::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock_unpoisoned(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.calls).len()
    }

    /// Prompts sent so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock_unpoisoned(&self.calls)
            .iter()
            .map(|call| call.stdin.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        lock_unpoisoned(&self.calls).push(invocation.clone());
        let step = lock_unpoisoned(&self.script).pop_front();

        match step {
            None => Ok(CommandOutput::ok("ok")),
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::SpawnError(kind)) => Err(io::Error::new(kind, "scripted spawn failure")),
            Some(Scripted::Delayed(delay, output)) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Some(Scripted::Gated(rx)) => rx
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::Interrupted, "gate dropped")),
        }
    }
}
