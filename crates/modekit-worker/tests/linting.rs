use modekit_editor::{Annotation, DocumentMut, Position, Range, TextDocument};
use modekit_worker::{
    BracketLinter, ClientState, ProcessSpawner, Spawner, ThreadSpawner, WorkerClient, WorkerConfig,
};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn pump_until(client: &mut WorkerClient, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "worker did not answer in time");
        client.pump_timeout(Duration::from_millis(50)).unwrap();
    }
}

fn lint_session(spawner: &dyn Spawner, config: WorkerConfig) {
    let doc = Rc::new(RefCell::new(TextDocument::new("square = (x) ->\n  x * x")));
    let annotations: Rc<RefCell<Vec<Annotation>>> = Rc::new(RefCell::new(Vec::new()));
    let oks = Rc::new(RefCell::new(0));

    let mut client = WorkerClient::new(config);
    client.start(spawner).unwrap();
    client.attach_to_document(&doc).unwrap();
    client.bind_annotations(&annotations);
    let seen = Rc::clone(&oks);
    client.on("ok", move |_| *seen.borrow_mut() += 1);

    pump_until(&mut client, || *oks.borrow() > 0);
    assert!(annotations.borrow().is_empty());

    doc.borrow_mut().insert(Position::new(1, 7), ")");
    pump_until(&mut client, || !annotations.borrow().is_empty());
    let annotation = annotations.borrow()[0].clone();
    assert_eq!((annotation.row, annotation.column), (1, 7));
    assert_eq!(annotation.text, "unmatched ')'");

    let ok_before = *oks.borrow();
    doc.borrow_mut().remove(Range::new(1, 7, 1, 8));
    pump_until(&mut client, || *oks.borrow() > ok_before);
    assert!(annotations.borrow().is_empty());

    let answer: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&answer);
    client
        .call("lint", vec![], move |data| *slot.borrow_mut() = Some(data))
        .unwrap();
    pump_until(&mut client, || answer.borrow().is_some());
    assert_eq!(*answer.borrow(), Some(Value::Null));

    client.terminate();
    assert_eq!(client.state(), ClientState::Terminated);
    doc.borrow_mut().insert(Position::new(0, 0), "(");
}

#[test]
fn test_thread_worker_tracks_edits() {
    let spawner = ThreadSpawner::new(|| BracketLinter::new().unwrap());
    lint_session(&spawner, WorkerConfig::default());
}

#[test]
fn test_process_worker_tracks_edits() {
    let config = WorkerConfig {
        program: env!("CARGO_BIN_EXE_modekit-worker").into(),
        ..WorkerConfig::default()
    };
    lint_session(&ProcessSpawner, config);
}

#[test]
fn test_missing_program_faults_the_client() {
    let config = WorkerConfig {
        program: "/nonexistent/modekit-worker".into(),
        ..WorkerConfig::default()
    };
    let mut client = WorkerClient::new(config);
    assert!(client.start(&ProcessSpawner).is_err());
    assert_eq!(client.state(), ClientState::Faulted);
    assert!(client.emit("anything", &json!(null)).is_err());
}
