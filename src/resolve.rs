// Request field resolution for Sigil
// Folds ad-hoc values into the target bindings, then rewrites every templated
// field of the request through the alternate-delimiter pass

use std::collections::HashMap;

use crate::models::{Bindings, Request};
use crate::template::{
    alt_resolve_variable, resolve_template, resolve_variable, DelimiterPair, FacadeLog,
};

/// Runs call-expression values (e.g. `RandomString(8)`) outside this crate.
/// Only the first output line is consumed.
pub trait VariableExecutor {
    fn run(&self, expression: &str) -> Vec<String>;
}

/// Resolve every templated field of `request` in place.
///
/// Ad-hoc values are applied to `request.target` first: primary-style
/// references are resolved against the current target, call expressions are
/// handed to `executor` and their first output line wins, anything else is
/// assigned as-is. The url, body, headers and expression lists are then
/// rewritten with the alternate delimiter pair against the updated target.
pub fn resolve_request(request: &mut Request, executor: &dyn VariableExecutor) {
    for value_map in &request.values {
        for (key, value) in value_map {
            let mut value = value.clone();
            if value.contains("{{.") && value.contains("}}") {
                value = resolve_variable(&value, &request.target);
            }
            // variable as a script
            if value.contains('(') && value.contains(')') {
                let output = executor.run(&value);
                if let Some(first) = output.first() {
                    request.target.insert(key.clone(), first.clone());
                }
            } else {
                request.target.insert(key.clone(), value);
            }
        }
    }

    request.url = alt_resolve_variable(&request.url, &request.target);
    request.body = alt_resolve_variable(&request.body, &request.target);
    request.headers = resolve_headers(DelimiterPair::ALTERNATE, &request.headers, &request.target);
    request.detections =
        resolve_expressions(DelimiterPair::ALTERNATE, &request.detections, &request.target);
    request.generators =
        resolve_expressions(DelimiterPair::ALTERNATE, &request.generators, &request.target);
    request.middlewares =
        resolve_expressions(DelimiterPair::ALTERNATE, &request.middlewares, &request.target);
}

/// Resolve an ordered expression list (detections, generators, middlewares),
/// preserving order and count.
pub fn resolve_expressions(
    delims: DelimiterPair,
    expressions: &[String],
    target: &Bindings,
) -> Vec<String> {
    expressions
        .iter()
        .map(|expression| resolve_template(delims, expression, target, &FacadeLog))
        .collect()
}

/// Resolve header keys and values, preserving entry order and count. Entries
/// are never merged or deduplicated across maps.
pub fn resolve_headers(
    delims: DelimiterPair,
    headers: &[HashMap<String, String>],
    target: &Bindings,
) -> Vec<HashMap<String, String>> {
    headers
        .iter()
        .map(|entry| {
            entry
                .iter()
                .map(|(key, value)| {
                    (
                        resolve_template(delims, key, target, &FacadeLog),
                        resolve_template(delims, value, target, &FacadeLog),
                    )
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Fake executor returning canned lines and recording expressions.
    #[derive(Default)]
    struct FakeExecutor {
        output: Vec<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeExecutor {
        fn with_output(lines: &[&str]) -> Self {
            FakeExecutor {
                output: lines.iter().map(|line| line.to_string()).collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl VariableExecutor for FakeExecutor {
        fn run(&self, expression: &str) -> Vec<String> {
            self.calls.borrow_mut().push(expression.to_string());
            self.output.clone()
        }
    }

    fn value_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn literal_values_are_assigned_to_target() {
        let mut request = Request {
            values: vec![value_map(&[("token", "abc")])],
            ..Request::default()
        };
        resolve_request(&mut request, &FakeExecutor::default());
        assert_eq!(request.target.get("token"), Some("abc"));
    }

    #[test]
    fn primary_references_resolve_before_assignment() {
        let mut request = Request {
            values: vec![value_map(&[("redirect", "{{.original}}/next")])],
            ..Request::default()
        };
        request.target.insert("original", "http://a");
        resolve_request(&mut request, &FakeExecutor::default());
        assert_eq!(request.target.get("redirect"), Some("http://a/next"));
    }

    #[test]
    fn call_expressions_take_first_output_line() {
        let executor = FakeExecutor::with_output(&["first", "second"]);
        let mut request = Request {
            values: vec![value_map(&[("rand", "RandomString(8)")])],
            ..Request::default()
        };
        resolve_request(&mut request, &executor);
        assert_eq!(request.target.get("rand"), Some("first"));
        assert_eq!(executor.calls.borrow().as_slice(), ["RandomString(8)"]);
    }

    #[test]
    fn call_expression_without_output_leaves_target_alone() {
        let mut request = Request {
            values: vec![value_map(&[("rand", "Broken()")])],
            ..Request::default()
        };
        resolve_request(&mut request, &FakeExecutor::default());
        assert_eq!(request.target.get("rand"), None);
    }

    #[test]
    fn url_and_body_use_the_alternate_pass() {
        let mut request = Request {
            url: "[[.original]]/login".to_string(),
            body: "user=[[.user]]&redirect={{.user}}".to_string(),
            values: vec![value_map(&[("user", "admin")])],
            ..Request::default()
        };
        request.target.insert("original", "http://a");
        resolve_request(&mut request, &FakeExecutor::default());
        assert_eq!(request.url, "http://a/login");
        // curly references are literal text to the alternate pass
        assert_eq!(request.body, "user=admin&redirect={{.user}}");
    }

    #[test]
    fn headers_preserve_order_count_and_keys() {
        let headers = vec![
            value_map(&[("Content-Type", "application/json")]),
            value_map(&[("X-Token", "[[.token]]")]),
            value_map(&[("Content-Type", "text/plain")]),
        ];
        let mut target = Bindings::new();
        target.insert("token", "t0k");
        let resolved = resolve_headers(DelimiterPair::ALTERNATE, &headers, &target);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].get("Content-Type"), Some(&"application/json".to_string()));
        assert_eq!(resolved[1].get("X-Token"), Some(&"t0k".to_string()));
        assert_eq!(resolved[2].get("Content-Type"), Some(&"text/plain".to_string()));
    }

    #[test]
    fn expression_lists_preserve_order_and_count() {
        let detections = vec![
            "StatusCode() == 200".to_string(),
            "BodyContains(\"[[.marker]]\")".to_string(),
        ];
        let mut target = Bindings::new();
        target.insert("marker", "pwned");
        let resolved = resolve_expressions(DelimiterPair::ALTERNATE, &detections, &target);
        assert_eq!(
            resolved,
            vec![
                "StatusCode() == 200".to_string(),
                "BodyContains(\"pwned\")".to_string(),
            ]
        );
    }
}
