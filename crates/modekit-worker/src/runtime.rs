//! Worker-side message loop.

use crate::codec::{self, CodecError};
use crate::protocol::{HostMessage, WorkerMessage};
use crossbeam_channel::{Receiver, unbounded};
use modekit_editor::{Delta, TextDocument};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::thread;

/// Messages a handler wants sent back to the host.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<WorkerMessage>,
}

impl Outbox {
    pub fn log(&mut self, text: impl Into<String>) {
        self.messages.push(WorkerMessage::Log {
            data: Value::String(text.into()),
        });
    }

    pub fn emit(&mut self, name: impl Into<String>, data: Value) {
        self.messages.push(WorkerMessage::Event {
            name: name.into(),
            data,
        });
    }

    pub(crate) fn respond(&mut self, id: u64, data: Value) {
        self.messages.push(WorkerMessage::Call { id, data });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn take(&mut self) -> Vec<WorkerMessage> {
        std::mem::take(&mut self.messages)
    }
}

/// Analysis logic hosted by a [`WorkerRuntime`].
pub trait WorkerHandler {
    fn init(
        &mut self,
        _module: &str,
        _classname: &str,
        _tlns: &BTreeMap<String, String>,
        _out: &mut Outbox,
    ) {
    }

    /// Whether `command` is sent as a call, with its callback id appended to
    /// the arguments.
    fn is_call(&self, _command: &str) -> bool {
        false
    }

    /// Handles a command other than `setValue`. For calls, the return value
    /// is the response and `args` no longer holds the callback id.
    fn command(
        &mut self,
        _doc: &TextDocument,
        name: &str,
        _args: &[Value],
        out: &mut Outbox,
    ) -> Value {
        out.log(format!("unknown command {name:?}"));
        Value::Null
    }

    /// Runs once after every burst of messages that changed the document.
    fn on_update(&mut self, doc: &TextDocument, out: &mut Outbox);
}

/// Keeps a mirror of the host document and drives a [`WorkerHandler`].
#[derive(Debug)]
pub struct WorkerRuntime<H> {
    handler: H,
    doc: TextDocument,
    dirty: bool,
}

impl<H: WorkerHandler> WorkerRuntime<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            doc: TextDocument::default(),
            dirty: false,
        }
    }

    pub fn document(&self) -> &TextDocument {
        &self.doc
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handle(&mut self, message: HostMessage, out: &mut Outbox) {
        match message {
            HostMessage::Init {
                module,
                classname,
                tlns,
                ..
            } => {
                log::info!("worker init: module {module:?}, class {classname:?}");
                self.handler.init(&module, &classname, &tlns, out);
            }
            HostMessage::Command { command, args } if command == "setValue" => {
                let text = args.first().and_then(Value::as_str).unwrap_or_default();
                self.doc.set_value(text);
                self.dirty = true;
                // The host may also send it as a call.
                if let [_, id] = args.as_slice()
                    && let Some(id) = id.as_u64()
                {
                    out.respond(id, Value::Null);
                }
            }
            HostMessage::Command { command, mut args } => {
                if !self.handler.is_call(&command) {
                    self.handler.command(&self.doc, &command, &args, out);
                    return;
                }
                let Some(id) = args.pop().as_ref().and_then(Value::as_u64) else {
                    log::warn!("call {command:?} arrived without a callback id");
                    return;
                };
                let result = self.handler.command(&self.doc, &command, &args, out);
                out.respond(id, result);
            }
            HostMessage::Event { event, data } if event == "change" => {
                match serde_json::from_value::<Delta>(data.data) {
                    Ok(delta) => {
                        self.doc.apply_delta(&delta);
                        self.dirty = true;
                    }
                    Err(e) => out.log(format!("ignoring malformed change: {e}")),
                }
            }
            HostMessage::Event { event, .. } => {
                log::debug!("ignoring host event {event:?}");
            }
        }
    }

    /// Lets the handler react to the changes of the burst just handled.
    pub fn finish_burst(&mut self, out: &mut Outbox) {
        if std::mem::take(&mut self.dirty) {
            self.handler.on_update(&self.doc, out);
        }
    }

    /// Handles messages until `rx` disconnects or `deliver` returns false.
    ///
    /// Whatever is queued when a message arrives is drained before the handler
    /// runs, so a fast typist costs one analysis pass per burst.
    pub fn serve<F>(mut self, rx: &Receiver<HostMessage>, mut deliver: F)
    where
        F: FnMut(WorkerMessage) -> bool,
    {
        let mut out = Outbox::default();
        for first in rx.iter() {
            self.handle(first, &mut out);
            while let Ok(next) = rx.try_recv() {
                self.handle(next, &mut out);
            }
            self.finish_burst(&mut out);
            for message in out.take() {
                if !deliver(message) {
                    log::debug!("host went away, stopping worker");
                    return;
                }
            }
        }
    }
}

/// Serves `runtime` over framed stdio until the host closes `input`.
pub fn serve_stdio<H, R, W>(
    runtime: WorkerRuntime<H>,
    input: R,
    mut output: W,
) -> Result<(), CodecError>
where
    H: WorkerHandler,
    R: BufRead + Send + 'static,
    W: Write,
{
    let (tx, rx) = unbounded();
    let reader = thread::Builder::new()
        .name("modekit-worker-stdin".to_string())
        .spawn(move || -> Result<(), CodecError> {
            let mut input = input;
            loop {
                match codec::read_message::<_, HostMessage>(&mut input) {
                    Ok(Some(message)) => {
                        if tx.send(message).is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => return Ok(()),
                    Err(CodecError::Json(e)) => log::warn!("skipping malformed host message: {e}"),
                    Err(e) => return Err(e),
                }
            }
        })?;

    let mut write_error = None;
    runtime.serve(&rx, |message| match codec::write_message(&mut output, &message) {
        Ok(()) => true,
        Err(e) => {
            write_error = Some(e);
            false
        }
    });
    if let Some(e) = write_error {
        return Err(e);
    }

    reader
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("stdin reader panicked").into()))
}
