//! # modekit worker
//!
//! Background analysis for an attached document.
//!
//! The host side is a [`WorkerClient`]: it spawns the worker through a
//! [`Spawner`], mirrors every document change to it as a `change` event and
//! turns what comes back into log lines, subscriber callbacks and call
//! responses. The worker side is a [`WorkerRuntime`] driving a
//! [`WorkerHandler`] such as the [`BracketLinter`].
//!
//! ```text
//!   host thread                        worker (process or thread)
//!  ┌──────────────┐  HostMessage   ┌───────────────────────────────┐
//!  │ WorkerClient │ ─────────────► │ WorkerRuntime                 │
//!  │   pump()     │ ◄───────────── │   mirror TextDocument         │
//!  └──────────────┘ WorkerMessage  │   WorkerHandler::on_update    │
//!                                  └───────────────────────────────┘
//! ```
//!
//! Child processes speak JSON framed with `Content-Length` headers over
//! stdin/stdout; see [`codec`].

use std::path::PathBuf;
use thiserror::Error;

pub mod analysis;
pub mod client;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod transport;

pub use analysis::BracketLinter;
pub use client::{ClientState, SubscriptionId, WorkerClient};
pub use codec::CodecError;
pub use config::{ConfigError, WorkerConfig};
pub use protocol::{EventData, HostMessage, WorkerMessage};
pub use runtime::{Outbox, WorkerHandler, WorkerRuntime, serve_stdio};
pub use transport::{ProcessSpawner, RemoteEnd, Spawner, ThreadSpawner, WorkerLink, WorkerOutput};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to start worker {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The worker failed; the client is now [`ClientState::Faulted`].
    #[error("worker fault: {0}")]
    Fault(String),
    /// An earlier fault left the client unusable.
    #[error("worker client is faulted")]
    Faulted,
    #[error("operation not valid while the worker client is {0:?}")]
    InvalidState(ClientState),
}
