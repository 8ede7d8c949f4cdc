//! JSONPath body predicates.
//!
//! A predicate maps a JSONPath expression to either a literal (satisfied
//! when any selected node equals it) or the sentinel object
//! `{"exists": true}` (satisfied when the query selects any node at all,
//! including JSON `null`).

use jsonpath::Selector;
use serde_json::Value;

/// Whether `expected` is the `{"exists": true}` presence sentinel.
pub fn is_exists_sentinel(expected: &Value) -> bool {
    expected
        .as_object()
        .map(|map| map.len() == 1 && map.get("exists").and_then(Value::as_bool) == Some(true))
        .unwrap_or(false)
}

/// Evaluate one JSONPath predicate against a parsed request body.
///
/// Wildcard and array-index expressions select a multiset of nodes; literal
/// equality is satisfied when any member equals the expected value.
pub fn predicate_satisfied(expression: &str, expected: &Value, body: &Value) -> bool {
    let Ok(selector) = Selector::new(expression) else {
        return false;
    };
    let mut matches = selector.find(body).peekable();

    if is_exists_sentinel(expected) {
        return matches.peek().is_some();
    }
    matches.any(|node| node == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_equality() {
        let body = json!({"status": "active", "id": 7});
        assert!(predicate_satisfied("$.status", &json!("active"), &body));
        assert!(!predicate_satisfied("$.status", &json!("closed"), &body));
        assert!(predicate_satisfied("$.id", &json!(7), &body));
    }

    #[test]
    fn test_wildcard_matches_any_member() {
        let body = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
        assert!(predicate_satisfied("$.items[*].sku", &json!("b"), &body));
        assert!(!predicate_satisfied("$.items[*].sku", &json!("c"), &body));
    }

    #[test]
    fn test_exists_sentinel() {
        let body = json!({"user": {"email": null}});
        assert!(predicate_satisfied("$.user", &json!({"exists": true}), &body));
        // A selected null node still counts as existing.
        assert!(predicate_satisfied("$.user.email", &json!({"exists": true}), &body));
        assert!(!predicate_satisfied("$.user.phone", &json!({"exists": true}), &body));
    }

    #[test]
    fn test_sentinel_shape_is_strict() {
        assert!(is_exists_sentinel(&json!({"exists": true})));
        assert!(!is_exists_sentinel(&json!({"exists": false})));
        assert!(!is_exists_sentinel(&json!({"exists": true, "extra": 1})));
        assert!(!is_exists_sentinel(&json!("exists")));
    }

    #[test]
    fn test_invalid_expression_is_unsatisfied() {
        let body = json!({});
        assert!(!predicate_satisfied("not a path", &json!(1), &body));
    }
}
