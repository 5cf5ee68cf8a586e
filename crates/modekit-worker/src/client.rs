//! Host-side handle on a background worker.

use crate::WorkerError;
use crate::config::WorkerConfig;
use crate::protocol::{HostMessage, WorkerMessage};
use crate::transport::{Spawner, WorkerLink, WorkerOutput};
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use modekit_editor::{Annotation, AnnotationSink, ObservableDocument};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, no worker yet.
    Uninitialized,
    /// Worker running and initialized, no document attached.
    Initializing,
    /// Worker running and mirroring a document.
    Attached,
    Terminated,
    /// The worker failed. Nothing works until the client is recreated.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnOnce(Value)>;
type EventHandler = Box<dyn FnMut(&Value)>;

/// Owns one worker and the document it mirrors.
///
/// All state lives on the host thread: call [`WorkerClient::pump`] (or
/// [`WorkerClient::pump_timeout`]) from the event loop to deliver what the
/// worker has sent. Callbacks and event handlers run inside `pump`.
///
/// ```no_run
/// use modekit_editor::TextDocument;
/// use modekit_worker::{ProcessSpawner, WorkerClient, WorkerConfig};
/// use std::cell::{Cell, RefCell};
/// use std::rc::Rc;
///
/// let doc = Rc::new(RefCell::new(TextDocument::new("f = (x) ->")));
/// let mut client = WorkerClient::new(WorkerConfig::load_or_default());
/// client.start(&ProcessSpawner)?;
/// client.attach_to_document(&doc)?;
/// client.on("error", |data| eprintln!("lint: {data}"));
/// client.pump_timeout(std::time::Duration::from_millis(200))?;
/// # Ok::<(), modekit_worker::WorkerError>(())
/// ```
pub struct WorkerClient {
    config: WorkerConfig,
    state: ClientState,
    link: Option<WorkerLink>,
    next_call_id: u64,
    callbacks: HashMap<u64, Callback>,
    subscribers: Vec<(SubscriptionId, String, EventHandler)>,
    next_subscription: u64,
    detach: Option<Box<dyn FnOnce()>>,
}

impl WorkerClient {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: ClientState::Uninitialized,
            link: None,
            next_call_id: 1,
            callbacks: HashMap::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            detach: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.callbacks.len()
    }

    /// Spawns the worker and sends `init`.
    pub fn start(&mut self, spawner: &dyn Spawner) -> Result<(), WorkerError> {
        self.expect_state(ClientState::Uninitialized)?;
        let link = match spawner.spawn(&self.config) {
            Ok(link) => link,
            Err(e) => {
                log::error!("{e}");
                self.state = ClientState::Faulted;
                return Err(e);
            }
        };
        self.connect(link)
    }

    /// Adopts an already running worker and sends `init`.
    pub fn connect(&mut self, link: WorkerLink) -> Result<(), WorkerError> {
        self.expect_state(ClientState::Uninitialized)?;
        self.link = Some(link);
        self.state = ClientState::Initializing;
        self.post(HostMessage::init(&self.config))
    }

    /// Mirrors `doc` to the worker, replacing any previously attached document.
    ///
    /// The full text is sent first as a `setValue` command; every later edit
    /// is forwarded as a `change` event.
    pub fn attach_to_document<D>(&mut self, doc: &Rc<RefCell<D>>) -> Result<(), WorkerError>
    where
        D: ObservableDocument + 'static,
    {
        let tx = self.live_link()?.tx.clone();
        self.detach();

        let text = doc.borrow().value();
        self.send("setValue", vec![Value::String(text)])?;

        let attached = Rc::new(Cell::new(true));
        let live = Rc::clone(&attached);
        let id = doc.borrow_mut().on_change(Box::new(move |delta| {
            if !live.get() {
                return;
            }
            match HostMessage::change(delta) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        log::debug!("worker channel closed, dropping change");
                    }
                }
                Err(e) => log::warn!("failed to encode change: {e}"),
            }
        }));

        let weak = Rc::downgrade(doc);
        self.detach = Some(Box::new(move || {
            attached.set(false);
            let Some(doc) = weak.upgrade() else { return };
            match doc.try_borrow_mut() {
                Ok(mut doc) => {
                    doc.remove_listener(id);
                }
                Err(_) => log::debug!("document busy, change listener left disabled"),
            }
        }));
        self.state = ClientState::Attached;
        Ok(())
    }

    /// Stops mirroring the attached document, if any. The worker keeps running.
    pub fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            if self.state == ClientState::Attached {
                self.state = ClientState::Initializing;
            }
        }
    }

    /// Fire-and-forget command.
    pub fn send(&mut self, command: &str, args: Vec<Value>) -> Result<(), WorkerError> {
        self.post(HostMessage::command(command, args))
    }

    /// Sends a command and runs `callback` with the worker's answer, once.
    ///
    /// Returns the correlation id. Callbacks for calls that are never answered
    /// are dropped on terminate.
    pub fn call<F>(&mut self, command: &str, args: Vec<Value>, callback: F) -> Result<u64, WorkerError>
    where
        F: FnOnce(Value) + 'static,
    {
        self.live_link()?;
        let id = self.next_call_id;
        self.next_call_id += 1;
        self.callbacks.insert(id, Box::new(callback));
        if let Err(e) = self.post(HostMessage::call(command, args, id)) {
            self.callbacks.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Sends an event to the worker.
    ///
    /// A payload that fails to serialize is logged and dropped; transport
    /// problems are still reported.
    pub fn emit<T: Serialize + ?Sized>(&mut self, event: &str, data: &T) -> Result<(), WorkerError> {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("dropping {event:?} event: {e}");
                return Ok(());
            }
        };
        self.post(HostMessage::event(event, data))
    }

    /// Runs `handler` for every worker event called `name`.
    pub fn on<F>(&mut self, name: &str, handler: F) -> SubscriptionId
    where
        F: FnMut(&Value) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, name.to_string(), Box::new(handler)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(known, ..)| *known != id);
        self.subscribers.len() != before
    }

    /// Routes `error` events to `sink.set_annotations` and `ok` events to
    /// `sink.clear_annotations`.
    pub fn bind_annotations<S>(&mut self, sink: &Rc<RefCell<S>>) -> [SubscriptionId; 2]
    where
        S: AnnotationSink + 'static,
    {
        let errors = Rc::clone(sink);
        let on_error = self.on("error", move |data| {
            match serde_json::from_value::<Annotation>(data.clone()) {
                Ok(annotation) => errors.borrow_mut().set_annotations(vec![annotation]),
                Err(e) => log::warn!("malformed annotation from worker: {e}"),
            }
        });
        let clears = Rc::clone(sink);
        let on_ok = self.on("ok", move |_| clears.borrow_mut().clear_annotations());
        [on_error, on_ok]
    }

    /// Handles everything the worker has sent so far without blocking.
    ///
    /// Returns the number of messages handled.
    pub fn pump(&mut self) -> Result<usize, WorkerError> {
        let mut handled = 0;
        loop {
            let next = match self.inbound()? {
                Some(link) => link.rx.try_recv(),
                None => return Ok(handled),
            };
            match next {
                Ok(output) => {
                    self.dispatch(output)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) => return Err(self.fault("worker disconnected")),
            }
        }
    }

    /// Like [`WorkerClient::pump`], but waits up to `timeout` for the first message.
    pub fn pump_timeout(&mut self, timeout: Duration) -> Result<usize, WorkerError> {
        let first = match self.inbound()? {
            Some(link) => link.rx.recv_timeout(timeout),
            None => return Ok(0),
        };
        match first {
            Ok(output) => {
                self.dispatch(output)?;
                Ok(1 + self.pump()?)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(self.fault("worker disconnected")),
        }
    }

    /// Tells local `terminate` subscribers, then detaches the document, stops
    /// the worker and drops pending callbacks. Calling it again does nothing.
    pub fn terminate(&mut self) {
        if self.state == ClientState::Terminated {
            return;
        }
        self.notify("terminate", &Value::Object(Default::default()));
        self.shutdown();
        self.state = ClientState::Terminated;
        log::debug!("worker client terminated");
    }

    fn dispatch(&mut self, output: WorkerOutput) -> Result<(), WorkerError> {
        match output {
            WorkerOutput::Message(WorkerMessage::Log { data }) => match data {
                Value::String(text) => log::info!(target: "modekit_worker::remote", "{text}"),
                other => log::info!(target: "modekit_worker::remote", "{other}"),
            },
            WorkerOutput::Message(WorkerMessage::Event { name, data }) => self.notify(&name, &data),
            WorkerOutput::Message(WorkerMessage::Call { id, data }) => {
                match self.callbacks.remove(&id) {
                    Some(callback) => callback(data),
                    None => log::debug!("ignoring response for unknown call {id}"),
                }
            }
            WorkerOutput::Fault(reason) => return Err(self.fault(reason)),
            WorkerOutput::Exited => return Err(self.fault("worker exited")),
        }
        Ok(())
    }

    fn notify(&mut self, name: &str, data: &Value) {
        for (_, subscribed, handler) in &mut self.subscribers {
            if *subscribed == name {
                handler(data);
            }
        }
    }

    fn post(&mut self, message: HostMessage) -> Result<(), WorkerError> {
        if self.live_link()?.tx.send(message).is_err() {
            return Err(self.fault("worker channel closed"));
        }
        Ok(())
    }

    fn live_link(&self) -> Result<&WorkerLink, WorkerError> {
        match self.state {
            ClientState::Initializing | ClientState::Attached => self
                .link
                .as_ref()
                .ok_or(WorkerError::InvalidState(self.state)),
            ClientState::Faulted => Err(WorkerError::Faulted),
            state => Err(WorkerError::InvalidState(state)),
        }
    }

    /// The link to read from, `None` when there is nothing to read.
    fn inbound(&self) -> Result<Option<&WorkerLink>, WorkerError> {
        match self.state {
            ClientState::Faulted => Err(WorkerError::Faulted),
            _ => Ok(self.link.as_ref()),
        }
    }

    fn expect_state(&self, expected: ClientState) -> Result<(), WorkerError> {
        match self.state {
            state if state == expected => Ok(()),
            ClientState::Faulted => Err(WorkerError::Faulted),
            state => Err(WorkerError::InvalidState(state)),
        }
    }

    fn fault(&mut self, reason: impl Into<String>) -> WorkerError {
        let reason = reason.into();
        log::error!("worker fault: {reason}");
        self.shutdown();
        self.state = ClientState::Faulted;
        WorkerError::Fault(reason)
    }

    fn shutdown(&mut self) {
        self.detach();
        self.callbacks.clear();
        if let Some(link) = self.link.take() {
            link.shutdown();
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RemoteEnd;
    use modekit_editor::{DocumentMut, Position, TextDocument};
    use serde_json::json;

    fn connected() -> (WorkerClient, RemoteEnd) {
        let (link, remote) = WorkerLink::in_memory();
        let mut client = WorkerClient::new(WorkerConfig::default());
        client.connect(link).unwrap();
        (client, remote)
    }

    #[test]
    fn test_connect_sends_init() {
        let (client, remote) = connected();
        assert_eq!(client.state(), ClientState::Initializing);
        assert_eq!(remote.rx.try_recv().unwrap(), HostMessage::init(&WorkerConfig::default()));
    }

    #[test]
    fn test_call_ids_start_at_one_and_increase() {
        let (mut client, remote) = connected();
        assert_eq!(client.call("a", vec![], |_| {}).unwrap(), 1);
        assert_eq!(client.call("b", vec![], |_| {}).unwrap(), 2);
        let sent: Vec<_> = remote.rx.try_iter().skip(1).collect();
        assert_eq!(sent, [HostMessage::call("a", vec![], 1), HostMessage::call("b", vec![], 2)]);
    }

    #[test]
    fn test_callback_runs_once_per_response() {
        let (mut client, remote) = connected();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        client
            .call("foo", vec![], move |data| sink.borrow_mut().push(data))
            .unwrap();

        remote.reply(WorkerMessage::Call { id: 1, data: json!("x") });
        remote.reply(WorkerMessage::Call { id: 1, data: json!("x") });
        assert_eq!(client.pump().unwrap(), 2);
        assert_eq!(*seen.borrow(), [json!("x")]);
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn test_events_reach_matching_subscribers_only() {
        let (mut client, remote) = connected();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&hits);
        let b = Rc::clone(&hits);
        let first = client.on("ping", move |data| a.borrow_mut().push(format!("first {data}")));
        client.on("ping", move |data| b.borrow_mut().push(format!("second {data}")));
        client.on("other", |_| panic!("wrong event"));

        remote.reply(WorkerMessage::Event { name: "ping".into(), data: json!(1) });
        client.pump().unwrap();
        assert!(client.off(first));
        assert!(!client.off(first));
        remote.reply(WorkerMessage::Event { name: "ping".into(), data: json!(2) });
        client.pump().unwrap();

        assert_eq!(*hits.borrow(), ["first 1", "second 1", "second 2"]);
    }

    #[test]
    fn test_attach_sends_text_then_changes() {
        let (mut client, remote) = connected();
        let doc = Rc::new(RefCell::new(TextDocument::new("a = 1")));
        client.attach_to_document(&doc).unwrap();
        assert_eq!(client.state(), ClientState::Attached);

        doc.borrow_mut().insert(Position::new(0, 5), "0");
        let sent: Vec<_> = remote.rx.try_iter().skip(1).collect();
        assert_eq!(sent[0], HostMessage::command("setValue", vec![json!("a = 1")]));
        match &sent[1] {
            HostMessage::Event { event, data } => {
                assert_eq!(event, "change");
                assert_eq!(data.data["action"], json!("insert"));
                assert_eq!(data.data["lines"], json!(["0"]));
            }
            other => panic!("expected change event, got {other:?}"),
        }
    }

    #[test]
    fn test_attaching_again_detaches_the_previous_document() {
        let (mut client, remote) = connected();
        let first = Rc::new(RefCell::new(TextDocument::new("one")));
        let second = Rc::new(RefCell::new(TextDocument::new("two")));
        client.attach_to_document(&first).unwrap();
        client.attach_to_document(&second).unwrap();
        let _ = remote.rx.try_iter().count();

        first.borrow_mut().insert(Position::new(0, 0), "x");
        assert!(remote.rx.try_recv().is_err());
        second.borrow_mut().insert(Position::new(0, 0), "y");
        assert!(remote.rx.try_recv().is_ok());
    }

    #[test]
    fn test_terminate_removes_listener_and_is_idempotent() {
        let (mut client, remote) = connected();
        let doc = Rc::new(RefCell::new(TextDocument::new("")));
        client.attach_to_document(&doc).unwrap();
        client.call("slow", vec![], |_| panic!("dropped callbacks never run")).unwrap();

        client.terminate();
        client.terminate();
        assert_eq!(client.state(), ClientState::Terminated);
        assert_eq!(client.pending_calls(), 0);

        let before = remote.rx.try_iter().count();
        assert_eq!(before, 3);
        doc.borrow_mut().insert(Position::new(0, 0), "late");
        assert!(remote.rx.try_recv().is_err());
        assert!(matches!(
            client.send("x", vec![]),
            Err(WorkerError::InvalidState(ClientState::Terminated))
        ));
    }

    #[test]
    fn test_terminate_tells_local_subscribers_once() {
        let (mut client, _remote) = connected();
        let seen = Rc::new(Cell::new(0));
        let count = Rc::clone(&seen);
        client.on("terminate", move |data| {
            assert_eq!(*data, json!({}));
            count.set(count.get() + 1);
        });
        client.terminate();
        client.terminate();
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_terminate_while_document_is_borrowed_still_stops_changes() {
        let (mut client, remote) = connected();
        let doc = Rc::new(RefCell::new(TextDocument::new("")));
        client.attach_to_document(&doc).unwrap();
        {
            let _reader = doc.borrow();
            client.terminate();
        }
        let _ = remote.rx.try_iter().count();

        doc.borrow_mut().insert(Position::new(0, 0), "late");
        assert!(remote.rx.try_recv().is_err());
    }

    #[test]
    fn test_worker_exit_faults_the_client() {
        let (mut client, remote) = connected();
        let doc = Rc::new(RefCell::new(TextDocument::new("")));
        client.attach_to_document(&doc).unwrap();
        remote.tx.send(WorkerOutput::Exited).unwrap();

        assert!(matches!(client.pump(), Err(WorkerError::Fault(_))));
        assert_eq!(client.state(), ClientState::Faulted);
        assert!(matches!(client.pump(), Err(WorkerError::Faulted)));
        assert!(matches!(client.send("x", vec![]), Err(WorkerError::Faulted)));
        assert!(matches!(client.call("x", vec![], |_| {}), Err(WorkerError::Faulted)));

        let _ = remote.rx.try_iter().count();
        doc.borrow_mut().insert(Position::new(0, 0), "z");
        assert!(remote.rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_worker_end_is_a_fault() {
        let (mut client, remote) = connected();
        drop(remote);
        assert!(matches!(client.send("x", vec![]), Err(WorkerError::Fault(_))));
        assert_eq!(client.state(), ClientState::Faulted);
    }

    #[test]
    fn test_emit_swallows_serialization_failures() {
        struct Unserializable;
        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("nope"))
            }
        }

        let (mut client, remote) = connected();
        let _ = remote.rx.try_recv();
        assert!(client.emit("custom", &Unserializable).is_ok());
        assert!(remote.rx.try_recv().is_err());
        client.emit("custom", &json!({"k": 1})).unwrap();
        assert_eq!(remote.rx.try_recv().unwrap(), HostMessage::event("custom", json!({"k": 1})));
        assert_eq!(client.state(), ClientState::Initializing);
    }

    #[test]
    fn test_annotations_follow_error_and_ok_events() {
        let (mut client, remote) = connected();
        let sink: Rc<RefCell<Vec<Annotation>>> = Rc::new(RefCell::new(Vec::new()));
        client.bind_annotations(&sink);

        remote.reply(WorkerMessage::Event {
            name: "error".into(),
            data: json!({"row": 2, "column": 4, "text": "unmatched ')'", "type": "error"}),
        });
        client.pump().unwrap();
        assert_eq!(sink.borrow().len(), 1);
        assert_eq!(sink.borrow()[0].row, 2);

        remote.reply(WorkerMessage::Event { name: "ok".into(), data: Value::Null });
        client.pump().unwrap();
        assert!(sink.borrow().is_empty());
    }

    #[test]
    fn test_operations_before_start_are_rejected() {
        let mut client = WorkerClient::new(WorkerConfig::default());
        assert!(matches!(
            client.send("x", vec![]),
            Err(WorkerError::InvalidState(ClientState::Uninitialized))
        ));
        assert_eq!(client.pump().unwrap(), 0);
    }
}
