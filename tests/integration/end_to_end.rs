//! Integration tests for the in-process pipeline
//!
//! Runs a scripted program under the tracer, stores it through the
//! write-offload publisher and reads it back the way a viewer would.

use std::sync::Arc;

use serde_json::json;
use stepwise::tracer::{
    ProfileStats, ProgramFailure, ScriptedFrame, ScriptedProgram, ScriptedRuntime,
    ScriptedThread,
};
use stepwise::value::TracebackFrame;
use stepwise::{
    collapse_trace, copy_run, Db, DbLineCache, EventKind, ExecutionTracer, FilterConfig,
    LocalPublisher, RunState, SortOrder, StorageError, Value,
};

use super::common::fixtures::{run_end, run_start, runtime_layout, trace_payload, SourceTree};

/// Three unchanged line events fold into one range and the run reads back
/// without an error.
#[test]
fn test_stable_lines_round_trip_through_store() {
    let tree = SourceTree::new();
    let db = Db::open(tree.db_path()).expect("Failed to open database");

    db.start_run(&run_start("r1", 0)).unwrap();
    for line_no in [10, 11, 12] {
        let mut event = trace_payload("r1", "MainThread", EventKind::Line, "app.py", line_no);
        event.local_vars = json!({"total": 3}).as_object().cloned().unwrap();
        db.trace(&event).unwrap();
    }
    db.end_run(&run_end("r1", None)).unwrap();

    let events = db.get_trace("r1", None).unwrap();
    assert_eq!(events.len(), 3);

    let collapsed: Vec<_> = collapse_trace(events).collect();
    assert_eq!(collapsed.len(), 1);
    assert_eq!(collapsed[0].line_range, (10, 12));

    let run = db.get_run("r1").unwrap();
    assert!(run.error_message.is_none());
    assert!(run.is_finished());
}

/// Deleting a run leaves file rows another run still references.
#[test]
fn test_delete_run_keeps_shared_sources() {
    let db = Db::open_in_memory().unwrap();
    for (run_id, offset) in [("r1", 0), ("r2", 10)] {
        db.start_run(&run_start(run_id, offset)).unwrap();
        db.trace(&trace_payload(run_id, "MainThread", EventKind::Line, "app.py", 1))
            .unwrap();
        db.cache_file_for_run(run_id, "app.py", "print(1)\n").unwrap();
        db.end_run(&run_end(run_id, None)).unwrap();
    }
    db.cache_file_for_run("r1", "only_r1.py", "pass\n").unwrap();

    db.delete_run("r1").unwrap();

    assert!(matches!(db.get_run("r1"), Err(StorageError::NoSuchRun(_))));
    assert!(db.get_trace("r1", None).unwrap().is_empty());
    assert_eq!(db.get_cached_file("r2", "app.py").unwrap(), "print(1)\n");
    assert_eq!(db.get_files_for_run("r2").unwrap().len(), 1);
    let runs = db.get_runs(false, SortOrder::Ascending).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, "r2");
}

/// A scripted program is traced, stored off-thread and read back with its
/// source, profile and per-thread summary.
#[test]
fn test_traced_program_lands_in_store() {
    let tree = SourceTree::new();
    let app = tree.write(
        "app.py",
        "# entry point\ndef main():\n    x = 1\n    x = 2\n    return x\n",
    );
    let worker_src = tree.write("worker.py", "def work():\n    pass\n");

    let main = ScriptedThread::new("MainThread")
        .call(ScriptedFrame::new(&app, 2, "main"))
        .line(ScriptedFrame::new(&app, 3, "main"))
        .line(ScriptedFrame::new(&app, 4, "main").with_local("x", Value::Int(1)))
        .line(ScriptedFrame::new(&app, 5, "main").with_local("x", Value::Int(2)))
        .call(ScriptedFrame::new("/opt/runtime/lib/json/encoder.py", 1, "dumps"))
        .ret(ScriptedFrame::new("/opt/runtime/lib/json/encoder.py", 2, "dumps"), Value::None)
        .ret(ScriptedFrame::new(&app, 5, "main").with_local("x", Value::Int(2)), Value::Int(2));
    let worker = ScriptedThread::new("worker-1")
        .call(ScriptedFrame::new(&worker_src, 1, "work"))
        .line(ScriptedFrame::new(&worker_src, 2, "work"))
        .ret(ScriptedFrame::new(&worker_src, 2, "work"), Value::None);

    let runtime = ScriptedRuntime::new(runtime_layout())
        .with_program("app.py", ScriptedProgram::new(vec![main, worker]));
    let publisher = Arc::new(LocalPublisher::open(tree.db_path(), 5).unwrap());
    let tracer = ExecutionTracer::for_runtime(publisher.clone(), &FilterConfig::default(), &runtime);

    let outcome = tracer.run(&runtime, &["app.py".to_string()]).unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert!(publisher.is_stopped());

    let db = Db::open(tree.db_path()).unwrap();
    let run = db.get_run(&outcome.run_id).unwrap();
    assert!(run.is_finished());
    assert!(!run.failed());
    assert_eq!(run.description, vec!["app.py".to_string()]);

    let main_events = db.get_trace(&outcome.run_id, Some("MainThread")).unwrap();
    assert_eq!(main_events.len(), 5);
    assert!(main_events.iter().all(|e| e.filename == app));
    assert_eq!(main_events[0].call_id, main_events[4].call_id);
    assert_eq!(main_events[4].event, EventKind::Return);
    assert_eq!(main_events[4].trace_arg, json!(2));

    let kinds: Vec<_> = collapse_trace(main_events)
        .map(|c| (c.event, c.line_range))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Call, (2, 2)),
            (EventKind::Line, (3, 4)),
            (EventKind::Line, (5, 5)),
            (EventKind::Return, (5, 5)),
        ]
    );

    let threads = db.get_thread_details(&outcome.run_id).unwrap();
    assert_eq!(threads.len(), 2);
    let worker_summary = threads
        .iter()
        .find(|t| t.thread_id == "worker-1")
        .expect("worker thread summary");
    assert_eq!(worker_summary.num_events, 3);
    assert_eq!(worker_summary.num_locations, 2);

    let stats = ProfileStats::from_blob(run.stats.as_deref().unwrap()).unwrap();
    assert!(stats.get("dumps").is_some());
    assert_eq!(stats.get("main").unwrap().call_count, 1);

    let mut lines = DbLineCache::new(&db, outcome.run_id.clone());
    assert_eq!(lines.getline(&app, 3).unwrap(), "    x = 1");
    assert_eq!(
        lines.getlines(&app, 2, 2, true).unwrap(),
        "# entry point\ndef main():"
    );
    assert_eq!(db.get_files_for_run(&outcome.run_id).unwrap().len(), 2);
}

/// An uncaught failure is stored with its message and flattened traceback.
#[test]
fn test_failed_program_records_error() {
    let tree = SourceTree::new();
    let app = tree.write("app.py", "raise ValueError('boom')\n");

    let main = ScriptedThread::new("MainThread")
        .call(ScriptedFrame::new(&app, 1, "<module>"))
        .exception(ScriptedFrame::new(&app, 1, "<module>"), Value::str("boom"));
    let failure = ProgramFailure {
        message: "ValueError: boom".to_string(),
        traceback: vec![TracebackFrame::new(&app, 1, "<module>", "raise ValueError('boom')")],
    };
    let runtime = ScriptedRuntime::new(runtime_layout()).with_program(
        "app.py",
        ScriptedProgram::new(vec![main]).failing_with(failure),
    );
    let publisher = Arc::new(LocalPublisher::open(tree.db_path(), 20).unwrap());
    let tracer = ExecutionTracer::for_runtime(publisher.clone(), &FilterConfig::default(), &runtime);

    let outcome = tracer.run(&runtime, &["app.py".to_string()]).unwrap();
    assert_eq!(outcome.state, RunState::Failed);

    let db = Db::open(tree.db_path()).unwrap();
    let run = db.get_run(&outcome.run_id).unwrap();
    assert!(run.failed());
    assert_eq!(run.error_message.as_deref(), Some("ValueError: boom"));
    let traceback = run.traceback.expect("traceback stored");
    assert_eq!(traceback.len(), 1);
    assert_eq!(traceback[0].line_no, 1);

    let errors = db.get_runs(true, SortOrder::Descending).unwrap();
    assert_eq!(errors.len(), 1);
}

/// A list that contains itself is stored with the back-reference replaced
/// by its representation.
#[test]
fn test_self_referential_local_is_stored() {
    let tree = SourceTree::new();
    let app = tree.write("app.py", "xs = []\nxs.append(xs)\n");

    let xs = Value::list(vec![Value::Int(1)]);
    xs.push(xs.clone());
    let main = ScriptedThread::new("MainThread")
        .call(ScriptedFrame::new(&app, 1, "<module>"))
        .line(ScriptedFrame::new(&app, 2, "<module>").with_local("xs", xs))
        .ret(ScriptedFrame::new(&app, 2, "<module>"), Value::None);
    let runtime = ScriptedRuntime::new(runtime_layout())
        .with_program("app.py", ScriptedProgram::new(vec![main]));
    let publisher = Arc::new(LocalPublisher::open(tree.db_path(), 20).unwrap());
    let tracer = ExecutionTracer::for_runtime(publisher, &FilterConfig::default(), &runtime);

    let outcome = tracer.run(&runtime, &["app.py".to_string()]).unwrap();
    assert_eq!(outcome.state, RunState::Completed);

    let db = Db::open(tree.db_path()).unwrap();
    let events = db.get_trace(&outcome.run_id, None).unwrap();
    let stored = &events[1].local_vars["xs"];
    let items = stored.as_array().expect("list encoded as array");
    assert_eq!(items[0], json!(1));
    assert!(items[1].is_string());
}

/// Copying a run reproduces its events and sources in another store.
#[test]
fn test_copy_run_between_stores() {
    let src = Db::open_in_memory().unwrap();
    src.start_run(&run_start("r1", 0)).unwrap();
    for line_no in 1..=4 {
        src.trace(&trace_payload("r1", "MainThread", EventKind::Line, "app.py", line_no))
            .unwrap();
    }
    src.cache_file_for_run("r1", "app.py", "a\nb\nc\nd\n").unwrap();
    src.end_run(&run_end("r1", Some("boom"))).unwrap();

    let dst = Db::open_in_memory().unwrap();
    copy_run(&src, &dst, "r1").unwrap();

    assert_eq!(dst.get_run("r1").unwrap().error_message.as_deref(), Some("boom"));
    let copied: Vec<u32> = dst
        .get_trace("r1", None)
        .unwrap()
        .iter()
        .map(|e| e.line_no)
        .collect();
    assert_eq!(copied, vec![1, 2, 3, 4]);
    assert_eq!(dst.get_cached_file("r1", "app.py").unwrap(), "a\nb\nc\nd\n");
}
