//! Folding runs of line events into line ranges

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::data::TraceEvent;
use crate::event::EventKind;

/// A trace event, or several consecutive line events merged into one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollapsedEvent {
    /// Id of the first event merged in
    pub id: i64,
    pub run_id: String,
    pub thread_id: String,
    pub call_id: Option<String>,
    pub event: EventKind,
    pub filename: String,
    /// First and last line covered, inclusive
    pub line_range: (u32, u32),
    pub func_name: String,
    pub trace_arg: JsonValue,
    /// Locals as of the last merged event
    pub local_vars: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl From<TraceEvent> for CollapsedEvent {
    fn from(event: TraceEvent) -> Self {
        Self {
            id: event.id,
            run_id: event.run_id,
            thread_id: event.thread_id,
            call_id: event.call_id,
            event: event.event,
            filename: event.filename,
            line_range: (event.line_no, event.line_no),
            func_name: event.func_name,
            trace_arg: event.trace_arg,
            local_vars: event.local_vars,
            timestamp: event.timestamp,
        }
    }
}

/// Names in `newer` that are new or hold a different value than in `older`,
/// sorted by name.
pub fn variable_changes<'a>(
    older: &Map<String, JsonValue>,
    newer: &'a Map<String, JsonValue>,
) -> Vec<(&'a str, &'a JsonValue)> {
    let mut changes: Vec<_> = newer
        .iter()
        .filter(|(name, value)| older.get(name.as_str()) != Some(value))
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    changes.sort_by(|a, b| a.0.cmp(b.0));
    changes
}

fn existing_variable_changed(older: &Map<String, JsonValue>, newer: &Map<String, JsonValue>) -> bool {
    variable_changes(older, newer)
        .iter()
        .any(|(name, _)| older.contains_key(*name))
}

fn can_merge(pending: &CollapsedEvent, next: &TraceEvent) -> bool {
    pending.event == EventKind::Line
        && next.event == EventKind::Line
        && !existing_variable_changed(&pending.local_vars, &next.local_vars)
}

/// Lazily collapse `events`. Consecutive line events merge while no
/// previously seen variable changes value; any other kind stands alone.
pub fn collapse_trace<I>(events: I) -> CollapseTrace<I::IntoIter>
where
    I: IntoIterator<Item = TraceEvent>,
{
    CollapseTrace {
        events: events.into_iter(),
        pending: None,
    }
}

pub struct CollapseTrace<I> {
    events: I,
    pending: Option<CollapsedEvent>,
}

impl<I: Iterator<Item = TraceEvent>> Iterator for CollapseTrace<I> {
    type Item = CollapsedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        for event in self.events.by_ref() {
            match self.pending.take() {
                None => self.pending = Some(event.into()),
                Some(mut pending) if can_merge(&pending, &event) => {
                    pending.line_range.1 = event.line_no;
                    pending.local_vars = event.local_vars;
                    self.pending = Some(pending);
                }
                Some(pending) => {
                    self.pending = Some(event.into());
                    return Some(pending);
                }
            }
        }
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn event(id: i64, kind: EventKind, line_no: u32, locals: JsonValue) -> TraceEvent {
        TraceEvent {
            id,
            run_id: "r1".into(),
            thread_id: "MainThread".into(),
            call_id: Some("c1".into()),
            event: kind,
            func_name: "main".into(),
            line_no,
            filename: "app.py".into(),
            trace_arg: JsonValue::Null,
            local_vars: locals.as_object().cloned().unwrap_or_default(),
            timestamp: DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap(),
        }
    }

    fn line(id: i64, line_no: u32, locals: JsonValue) -> TraceEvent {
        event(id, EventKind::Line, line_no, locals)
    }

    fn ranges(events: Vec<TraceEvent>) -> Vec<(EventKind, (u32, u32))> {
        collapse_trace(events)
            .map(|c| (c.event, c.line_range))
            .collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(collapse_trace(Vec::new()).count(), 0);
    }

    #[test]
    fn test_stable_lines_merge() {
        let events = vec![
            line(1, 10, json!({"a": 1})),
            line(2, 11, json!({"a": 1})),
            line(3, 12, json!({"a": 1})),
        ];
        let collapsed: Vec<_> = collapse_trace(events).collect();
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].line_range, (10, 12));
        assert_eq!(collapsed[0].id, 1);
        assert_eq!(collapsed[0].timestamp, DateTime::from_timestamp(1_700_000_001, 0).unwrap());
    }

    #[test]
    fn test_kind_boundaries_flush() {
        let events = vec![
            event(1, EventKind::Call, 1, json!({})),
            line(2, 2, json!({})),
            line(3, 3, json!({})),
            event(4, EventKind::Return, 3, json!({})),
            event(5, EventKind::Exception, 3, json!({})),
            event(6, EventKind::Exception, 3, json!({})),
        ];
        assert_eq!(
            ranges(events),
            vec![
                (EventKind::Call, (1, 1)),
                (EventKind::Line, (2, 3)),
                (EventKind::Return, (3, 3)),
                (EventKind::Exception, (3, 3)),
                (EventKind::Exception, (3, 3)),
            ]
        );
    }

    #[test]
    fn test_new_variable_does_not_flush() {
        let events = vec![
            line(1, 1, json!({"a": 1})),
            line(2, 2, json!({"a": 1, "b": 2})),
        ];
        let collapsed: Vec<_> = collapse_trace(events).collect();
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].local_vars, *json!({"a": 1, "b": 2}).as_object().unwrap());
    }

    #[test]
    fn test_changed_variable_flushes() {
        let events = vec![
            line(1, 1, json!({"a": 1})),
            line(2, 2, json!({"a": 2})),
            line(3, 3, json!({"a": 2})),
        ];
        assert_eq!(
            ranges(events),
            vec![(EventKind::Line, (1, 1)), (EventKind::Line, (2, 3))]
        );
    }

    #[test]
    fn test_removed_variable_does_not_flush() {
        let events = vec![line(1, 1, json!({"a": 1, "tmp": 0})), line(2, 2, json!({"a": 1}))];
        assert_eq!(ranges(events), vec![(EventKind::Line, (1, 2))]);
    }

    #[test]
    fn test_is_lazy() {
        let mut pulled = 0;
        let source = (1..).map(|i| {
            pulled += 1;
            line(i, i as u32, json!({ "i": i }))
        });
        let first: Vec<_> = collapse_trace(source).take(2).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(pulled, 3);
    }

    #[test]
    fn test_variable_changes_sorted() {
        let older = json!({"b": 1, "a": 1}).as_object().cloned().unwrap();
        let newer = json!({"c": 3, "b": 2, "a": 1}).as_object().cloned().unwrap();
        let changes = variable_changes(&older, &newer);
        assert_eq!(changes, vec![("b", &json!(2)), ("c", &json!(3))]);
    }

    fn arb_kind() -> impl Strategy<Value = EventKind> {
        prop_oneof![
            4 => Just(EventKind::Line),
            1 => Just(EventKind::Call),
            1 => Just(EventKind::Return),
            1 => Just(EventKind::Exception),
        ]
    }

    proptest! {
        #[test]
        fn prop_collapse_covers_every_event_once(
            steps in prop::collection::vec((arb_kind(), 1u32..200, 0i64..3), 0..60)
        ) {
            let events: Vec<TraceEvent> = steps
                .iter()
                .enumerate()
                .map(|(i, (kind, line_no, x))| event(i as i64, *kind, *line_no, json!({ "x": x })))
                .collect();
            let total = events.len();
            let non_line = events.iter().filter(|e| e.event != EventKind::Line).count();

            let collapsed: Vec<_> = collapse_trace(events.clone()).collect();

            prop_assert!(collapsed.len() <= total);
            prop_assert_eq!(
                collapsed.iter().filter(|c| c.event != EventKind::Line).count(),
                non_line
            );
            prop_assert!(collapsed.windows(2).all(|w| w[0].id < w[1].id));
            if let (Some(first), Some(last)) = (collapsed.first(), collapsed.last()) {
                prop_assert_eq!(first.id, 0);
                prop_assert_eq!(last.line_range.1, events[total - 1].line_no);
            }
        }
    }
}
