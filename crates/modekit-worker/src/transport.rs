//! Channels between the client and a running worker.

use crate::codec::{self, CodecError};
use crate::config::WorkerConfig;
use crate::protocol::{HostMessage, WorkerMessage};
use crate::runtime::{WorkerHandler, WorkerRuntime};
use crate::WorkerError;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

/// What arrives on the client's inbound channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    Message(WorkerMessage),
    /// The transport broke or the worker sent something unreadable.
    Fault(String),
    /// The worker's output stream ended.
    Exited,
}

enum WorkerHandle {
    Process(Child),
    Thread(thread::JoinHandle<()>),
    Detached,
}

/// Both channel ends a client needs, plus whatever keeps the worker alive.
pub struct WorkerLink {
    pub(crate) tx: Sender<HostMessage>,
    pub(crate) rx: Receiver<WorkerOutput>,
    handle: WorkerHandle,
}

/// The worker's side of an in-memory link.
pub struct RemoteEnd {
    pub rx: Receiver<HostMessage>,
    pub tx: Sender<WorkerOutput>,
}

impl RemoteEnd {
    /// Sends `message` to the client. Returns false once the client is gone.
    pub fn reply(&self, message: WorkerMessage) -> bool {
        self.tx.send(WorkerOutput::Message(message)).is_ok()
    }
}

impl WorkerLink {
    /// A link with no worker behind it; the caller plays the worker.
    pub fn in_memory() -> (WorkerLink, RemoteEnd) {
        let (host_tx, host_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let link = WorkerLink {
            tx: host_tx,
            rx: out_rx,
            handle: WorkerHandle::Detached,
        };
        (
            link,
            RemoteEnd {
                rx: host_rx,
                tx: out_tx,
            },
        )
    }

    /// Closes the outbound channel and stops the worker.
    ///
    /// A child process is killed and reaped. A worker thread exits on its own
    /// once it sees the closed channel and is not joined.
    pub fn shutdown(self) {
        let WorkerLink { tx, rx, handle } = self;
        drop(tx);
        drop(rx);
        match handle {
            WorkerHandle::Process(mut child) => reap(&mut child),
            WorkerHandle::Thread(handle) => drop(handle),
            WorkerHandle::Detached => {}
        }
    }
}

/// Starts workers.
pub trait Spawner {
    fn spawn(&self, config: &WorkerConfig) -> Result<WorkerLink, WorkerError>;
}

/// Runs `config.program` as a child process speaking the framed protocol on
/// its stdin and stdout. Its stderr is forwarded to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, config: &WorkerConfig) -> Result<WorkerLink, WorkerError> {
        let spawn_err = |source| WorkerError::Spawn {
            program: config.program.clone(),
            source,
        };
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;
        log::info!("started worker {:?} (pid {})", config.program, child.id());

        match bridge(&mut child, &config.program) {
            Ok((tx, rx)) => Ok(WorkerLink {
                tx,
                rx,
                handle: WorkerHandle::Process(child),
            }),
            Err(e) => {
                reap(&mut child);
                Err(e)
            }
        }
    }
}

/// Starts the threads that carry messages over the child's stdio.
fn bridge(
    child: &mut Child,
    program: &Path,
) -> Result<(Sender<HostMessage>, Receiver<WorkerOutput>), WorkerError> {
    let missing = |what: &str| WorkerError::Spawn {
        program: program.to_path_buf(),
        source: std::io::Error::other(format!("child {what} was not captured")),
    };
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let (host_tx, host_rx) = unbounded::<HostMessage>();
    let (out_tx, out_rx) = unbounded::<WorkerOutput>();

    let fault_tx = out_tx.clone();
    spawn_named("modekit-worker-writer", program, move || {
        let mut writer = BufWriter::new(stdin);
        for message in host_rx.iter() {
            if let Err(e) = codec::write_message(&mut writer, &message) {
                let _ = fault_tx.send(WorkerOutput::Fault(format!("write failed: {e}")));
                break;
            }
        }
    })?;

    spawn_named("modekit-worker-reader", program, move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let output = match codec::read_message::<_, WorkerMessage>(&mut reader) {
                Ok(Some(message)) => WorkerOutput::Message(message),
                Ok(None) => WorkerOutput::Exited,
                Err(CodecError::Json(e)) => {
                    WorkerOutput::Fault(format!("unparseable worker output: {e}"))
                }
                Err(e) => WorkerOutput::Fault(e.to_string()),
            };
            let last = !matches!(output, WorkerOutput::Message(_));
            if out_tx.send(output).is_err() || last {
                break;
            }
        }
    })?;

    spawn_named("modekit-worker-stderr", program, move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) => log::debug!(target: "modekit_worker::stderr", "{line}"),
                Err(_) => break,
            }
        }
    })?;

    Ok((host_tx, out_rx))
}

/// Kills the child and waits for it so no zombie is left behind.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("worker process already gone: {e}");
    }
    match child.wait() {
        Ok(status) => log::debug!("worker process exited with {status}"),
        Err(e) => log::warn!("failed to reap worker process: {e}"),
    }
}

/// Runs a [`WorkerRuntime`] on a thread of this process. Messages travel as
/// values, without serialization.
pub struct ThreadSpawner<F> {
    factory: F,
}

impl<F> ThreadSpawner<F> {
    /// `factory` builds a fresh handler for every spawned worker.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, H> Spawner for ThreadSpawner<F>
where
    F: Fn() -> H,
    H: WorkerHandler + Send + 'static,
{
    fn spawn(&self, _config: &WorkerConfig) -> Result<WorkerLink, WorkerError> {
        let handler = (self.factory)();
        let (host_tx, host_rx) = unbounded::<HostMessage>();
        let (out_tx, out_rx) = unbounded::<WorkerOutput>();

        let handle = thread::Builder::new()
            .name("modekit-worker".to_string())
            .spawn(move || {
                WorkerRuntime::new(handler)
                    .serve(&host_rx, |message| out_tx.send(WorkerOutput::Message(message)).is_ok());
                let _ = out_tx.send(WorkerOutput::Exited);
            })
            .map_err(|source| WorkerError::Spawn {
                program: PathBuf::from("<thread>"),
                source,
            })?;

        Ok(WorkerLink {
            tx: host_tx,
            rx: out_rx,
            handle: WorkerHandle::Thread(handle),
        })
    }
}

fn spawn_named<F>(name: &str, program: &Path, body: F) -> Result<(), WorkerError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(drop)
        .map_err(|source| WorkerError::Spawn {
            program: program.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_failed_bridge_leaves_no_running_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        // stdout was never piped, so the bridge cannot be built.
        let err = bridge(&mut child, Path::new("sleep")).unwrap_err();
        assert!(matches!(err, WorkerError::Spawn { .. }));
        reap(&mut child);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_in_memory_link_carries_both_directions() {
        let (link, remote) = WorkerLink::in_memory();
        link.tx.send(HostMessage::command("ping", vec![])).unwrap();
        assert_eq!(remote.rx.recv().unwrap(), HostMessage::command("ping", vec![]));
        assert!(remote.reply(WorkerMessage::Log { data: "hi".into() }));
        assert!(matches!(link.rx.recv().unwrap(), WorkerOutput::Message(_)));
        link.shutdown();
        assert!(!remote.reply(WorkerMessage::Log { data: "late".into() }));
    }
}
