//! Recording macros against the process-wide recorder.
//!
//! Tests in this file share one recorder, so each looks up only the
//! entries it recorded itself.

use autopsy::report::{DashboardPayload, NamedValue};
use autopsy::stack::scope_depth;
use autopsy::{recorder, QueryResult, Value};
use pretty_assertions::assert_eq;

fn checkout(total: f64, method: &str) -> Option<u64> {
    autopsy::scope!();
    autopsy::bind!(total);
    autopsy::count!(method)
}

#[test]
fn test_count_records_site_function_and_locals() {
    let idx = checkout(12.5, "card").unwrap();
    let store = recorder().snapshot();
    let (site, group) = store.value_group(idx).unwrap();

    assert_eq!(site.filename, file!());
    assert_eq!(group.function_name, "checkout");
    assert_eq!(
        group.dashboard,
        Some(DashboardPayload::Count {
            value: Value::from("card")
        })
    );

    let trace = store.stack_trace(group.stack_trace_id.unwrap()).unwrap();
    assert_eq!(trace.frames[0].function_name, "checkout");
    assert_eq!(trace.frames[0].variable("total"), Some(&Value::Float(12.5)));
    assert!(trace.frames[0].code_context.contains("count!"));

    assert_eq!(scope_depth(), 0);
}

#[test]
fn test_log_names_values_after_expressions() {
    let qty = 3;
    let idx = autopsy::log!("order", qty, 7).unwrap();
    let unnamed = autopsy::log!(42, qty).unwrap();
    let explicit = autopsy::log!(name = "explicit", qty * 2).unwrap();

    let store = recorder().snapshot();

    let (_, group) = store.value_group(idx).unwrap();
    assert_eq!(group.name.as_deref(), Some("order"));
    assert_eq!(
        group.values,
        vec![
            NamedValue::new(Some("qty"), 3),
            NamedValue::new(None, 7),
        ]
    );

    let (_, group) = store.value_group(unnamed).unwrap();
    assert_eq!(group.name, None);
    assert_eq!(group.values[0], NamedValue::new(None, 42));
    assert_eq!(group.values[1].name.as_deref(), Some("qty"));

    let (_, group) = store.value_group(explicit).unwrap();
    assert_eq!(group.name.as_deref(), Some("explicit"));
    assert_eq!(group.values, vec![NamedValue::new(Some("qty * 2"), 6)]);
}

#[test]
fn test_dashboard_macros() {
    assert!(autopsy::hist!("high").is_none());
    let sample = autopsy::hist!(0.25).unwrap();
    let event = autopsy::timeline!("start").unwrap();
    let bare = autopsy::happened!().unwrap();
    let with_message = autopsy::happened!(format!("attempt {}", 2)).unwrap();

    let store = recorder().snapshot();
    let dashboard = store.dashboard();

    let (site, _) = store.value_group(sample).unwrap();
    assert_eq!(dashboard.histograms[site].values(), vec![0.25]);

    assert!(dashboard
        .timeline
        .iter()
        .any(|e| e.reference.log_index == event && e.event_name == "start"));

    let (site, _) = store.value_group(bare).unwrap();
    assert_eq!(dashboard.happened[site].message, None);
    let (site, _) = store.value_group(with_message).unwrap();
    assert_eq!(dashboard.happened[site].message.as_deref(), Some("attempt 2"));
}

struct Cart {
    items: Vec<u32>,
}

impl Cart {
    fn total(&self) -> Option<u64> {
        let count = self.items.len();
        autopsy::log!(count)
    }
}

#[test]
fn test_method_records_enclosing_type() {
    let cart = Cart { items: vec![1, 2] };
    let idx = cart.total().unwrap();
    let store = recorder().snapshot();
    let (_, group) = store.value_group(idx).unwrap();

    assert_eq!(group.function_name, "total");
    assert_eq!(group.enclosing_type_name.as_deref(), Some("Cart"));
    assert_eq!(group.values, vec![NamedValue::new(Some("count"), 2usize)]);
}

fn lookup_user() -> (QueryResult<String>, QueryResult<Value>, QueryResult<Value>) {
    autopsy::scope!();
    let stack = autopsy::call_stack!();
    (
        stack.caller().function_name(),
        stack.caller().variable("user"),
        stack.caller().caller().caller().variable("user"),
    )
}

fn handle_request() -> (QueryResult<String>, QueryResult<Value>, QueryResult<Value>) {
    autopsy::scope!();
    let user = "ada";
    autopsy::bind!(user);
    lookup_user()
}

#[test]
fn test_call_stack_macro_reads_callers() {
    let (caller, user, too_far) = handle_request();

    assert_eq!(caller, QueryResult::Ok("handle_request".to_string()));
    assert_eq!(user, QueryResult::Ok(Value::from("ada")));

    let error = too_far.error();
    assert_eq!(error.message, "Frame index out of range");
    assert_eq!(error.context_value("available_frames"), Some(&Value::Int(2)));
    assert_eq!(error.context_value("required_index"), Some(&Value::Int(2)));
}
