use autopsy::query::{CallStack, QueryResult};
use autopsy::stack::{StackFrame, StackTrace};
use autopsy::Value;
use pretty_assertions::assert_eq;

fn checkout_stack() -> CallStack<StackTrace> {
    CallStack::new(StackTrace::new(vec![
        StackFrame::new("src/payment.rs", "charge", 40)
            .with_type("Gateway")
            .with_code_context("let receipt = self.client.charge(amount)?;")
            .with_variable("amount", 19.99)
            .with_variable("currency", "EUR"),
        StackFrame::new("src/cart.rs", "checkout", 88)
            .with_type("Cart")
            .with_variable("items", Value::List(vec![Value::Int(1), Value::Int(2)])),
        StackFrame::new("src/main.rs", "main", 12).with_variable("user", "ada"),
    ]))
}

#[test]
fn test_walk_the_stack() {
    let stack = checkout_stack();

    assert_eq!(stack.depth(), 3);
    assert_eq!(
        stack.current().qualified_name(),
        QueryResult::Ok("Gateway::charge".to_string())
    );
    assert_eq!(stack.caller().line_number(), QueryResult::Ok(88));
    assert_eq!(
        stack.caller().caller().variable("user"),
        QueryResult::Ok(Value::from("ada"))
    );
    assert_eq!(
        stack.frame(0).code_context(),
        QueryResult::Ok("let receipt = self.client.charge(amount)?;".to_string())
    );
    assert_eq!(
        stack.current().variables().into_value(),
        vec![
            ("amount".to_string(), Value::Float(19.99)),
            ("currency".to_string(), Value::from("EUR")),
        ]
    );
}

#[test]
fn test_find_caller_skips_current_frame() {
    let stack = checkout_stack();

    let found = stack.find_caller(|f| f.enclosing_type_name.is_some());
    assert_eq!(found.function_name(), QueryResult::Ok("checkout".to_string()));
    assert_eq!(found.value().index(), 1);

    let missing = stack.find_caller(|f| f.function_name == "charge");
    assert!(missing.is_err());
    assert_eq!(
        missing.error().context_value("available_frames"),
        Some(&Value::Int(3))
    );
}

#[test]
fn test_variable_miss_lists_available_names() {
    let stack = checkout_stack();
    let result = stack.current().variable("total");

    let error = result.error();
    assert_eq!(error.message, "Variable 'total' not found in frame");
    assert_eq!(error.context_value("variable_name"), Some(&Value::from("total")));
    assert_eq!(
        error.context_value("available_variable_names"),
        Some(&Value::List(vec![Value::from("amount"), Value::from("currency")]))
    );
    assert_eq!(error.origin.file, "src/payment.rs");
    assert_eq!(error.origin.line, 40);
}

#[test]
fn test_empty_stack_chains_never_panic() {
    let stack = CallStack::new(StackTrace::new(Vec::new()));

    let current = stack.current();
    assert_eq!(current.error().message, "No current frame");

    let deep = current.caller().caller().variable("x");
    assert_eq!(deep.error(), current.error());

    let frame = stack.frame(5).function_name();
    assert_eq!(frame.error().context_value("required_index"), Some(&Value::Int(5)));
    assert_eq!(frame.error().context_value("available_frames"), Some(&Value::Int(0)));
}

#[test]
fn test_failure_origin_is_the_query_site() {
    let stack = checkout_stack();
    let result = stack.frame(9);

    assert_eq!(result.error().origin.file, file!());
}

#[test]
fn test_into_result_works_with_question_mark() {
    fn amount(stack: &CallStack<StackTrace>) -> Result<f64, autopsy::ErrorInfo> {
        let value = stack.current().variable("amount").into_result()?;
        Ok(value.as_f64().unwrap_or_default())
    }

    assert_eq!(amount(&checkout_stack()), Ok(19.99));
    assert!(amount(&CallStack::new(StackTrace::new(Vec::new()))).is_err());
}

#[test]
fn test_capture_materializes_frames() {
    let stack = checkout_stack();
    let trace = stack.capture();
    assert_eq!(trace.frames.len(), 3);
    assert_eq!(
        trace.shape(),
        vec![
            ("src/payment.rs", 40, "charge"),
            ("src/cart.rs", 88, "checkout"),
            ("src/main.rs", 12, "main"),
        ]
    );
}
