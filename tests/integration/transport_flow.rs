//! Integration tests for the out-of-process path
//!
//! A traced program publishes over TCP and a collector records what it
//! receives into its own store.

use std::sync::Arc;
use std::time::Duration;

use stepwise::tracer::{ScriptedFrame, ScriptedProgram, ScriptedRuntime, ScriptedThread};
use stepwise::{
    Db, EventKind, ExecutionTracer, FilterConfig, Listener, Publisher, Recorder, RunState,
    SortOrder, Value, WireMessage,
};

use super::common::fixtures::{run_end, run_start, runtime_layout, trace_payload, SourceTree};

const TICK: Duration = Duration::from_millis(50);

/// Poll until an end-of-run message has been recorded or time runs out.
async fn record_until_end(listener: &mut Listener, recorder: &mut Recorder) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    for _ in 0..200 {
        for message in listener.poll_once(TICK).await {
            kinds.push(message.kind);
            recorder.handle(message).expect("Failed to record message");
        }
        if kinds.last() == Some(&EventKind::EndRun) {
            break;
        }
    }
    kinds
}

#[tokio::test]
async fn test_traced_program_reaches_collector() {
    let tree = SourceTree::new();
    let app = tree.write("app.py", "def main():\n    total = 0\n    total += 1\n");

    let mut listener = Listener::bind("tcp://127.0.0.1:0", 64).await.unwrap();
    let endpoint = listener.endpoint();
    let mut recorder = Recorder::new(Db::open(tree.db_path()).unwrap());

    let traced_app = app.clone();
    let tracing_side = tokio::task::spawn_blocking(move || {
        let main = ScriptedThread::new("MainThread")
            .call(ScriptedFrame::new(&traced_app, 1, "main"))
            .line(ScriptedFrame::new(&traced_app, 2, "main"))
            .line(ScriptedFrame::new(&traced_app, 3, "main").with_local("total", Value::Int(0)))
            .ret(
                ScriptedFrame::new(&traced_app, 3, "main").with_local("total", Value::Int(1)),
                Value::None,
            );
        let runtime = ScriptedRuntime::new(runtime_layout())
            .with_program("app.py", ScriptedProgram::new(vec![main]));
        let publisher = Arc::new(Publisher::connect(&endpoint, 16).unwrap());
        let tracer =
            ExecutionTracer::for_runtime(publisher.clone(), &FilterConfig::default(), &runtime);
        let outcome = tracer.run(&runtime, &["app.py".to_string()]).unwrap();
        publisher.close();
        outcome
    });

    let kinds = record_until_end(&mut listener, &mut recorder).await;
    let outcome = tracing_side.await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(
        kinds,
        vec![
            EventKind::StartRun,
            EventKind::Call,
            EventKind::Line,
            EventKind::Line,
            EventKind::Return,
            EventKind::EndRun,
        ]
    );

    let db = recorder.db();
    let run = db.get_run(&outcome.run_id).unwrap();
    assert!(run.is_finished());
    assert!(run.profile_stats().unwrap().is_some());

    let events = db.get_trace(&outcome.run_id, None).unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[3].local_vars["total"], serde_json::json!(1));
    assert_eq!(
        db.get_cached_file(&outcome.run_id, &app).unwrap(),
        "def main():\n    total = 0\n    total += 1\n"
    );
}

#[tokio::test]
async fn test_two_publishers_record_separate_runs() {
    let mut listener = Listener::bind("tcp://127.0.0.1:0", 64).await.unwrap();
    let endpoint = listener.endpoint();
    let mut recorder = Recorder::new(Db::open_in_memory().unwrap());

    let senders: Vec<_> = [("r1", 0), ("r2", 5)]
        .into_iter()
        .map(|(run_id, offset)| {
            let endpoint = endpoint.clone();
            tokio::task::spawn_blocking(move || {
                let publisher = Publisher::connect(&endpoint, 4).unwrap();
                publisher
                    .send(EventKind::StartRun, &run_start(run_id, offset))
                    .unwrap();
                for line_no in 1..=10 {
                    publisher
                        .send(
                            EventKind::Line,
                            &trace_payload(run_id, "MainThread", EventKind::Line, "", line_no),
                        )
                        .unwrap();
                }
                publisher
                    .send(EventKind::EndRun, &run_end(run_id, None))
                    .unwrap();
                publisher.close();
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }

    let mut received: Vec<WireMessage> = Vec::new();
    for _ in 0..200 {
        received.extend(listener.poll_once(TICK).await);
        if received.len() >= 24 {
            break;
        }
    }
    assert_eq!(received.len(), 24);
    for message in received {
        recorder.handle(message).unwrap();
    }

    let db = recorder.db();
    let runs = db.get_runs(false, SortOrder::Ascending).unwrap();
    let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
    for run_id in ["r1", "r2"] {
        let lines: Vec<u32> = db
            .get_trace(run_id, None)
            .unwrap()
            .iter()
            .map(|e| e.line_no)
            .collect();
        assert_eq!(lines, (1..=10).collect::<Vec<_>>());
        assert!(db.get_files_for_run(run_id).unwrap().is_empty());
    }
}
