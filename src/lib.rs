//! marginalia library crate
//!
//! Turns a stream of editor changes into queries for a local assistant CLI,
//! keeping one conversation per workspace alive across queries.
//!
//! - [`dispatcher`]: debounce, cancellation, and the query state machine
//! - [`client`]: launching the assistant and managing its session
//! - [`prompt`]: bootstrap vs follow-up prompts and the template file
//! - [`cursor`]: cursor marking and line-context windows

pub mod client;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod testing;
pub mod util;

pub use client::CliClient;
pub use config::{Settings, SettingsUpdate};
pub use dispatcher::{QueryDispatcher, QueryState};
pub use error::ClientError;
pub use session::{SessionId, Workspace};
