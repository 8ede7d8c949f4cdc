//! Schema validation for collections.
//!
//! Validation never stops at the first problem: every failed rule is
//! collected with a dotted field path so operators can fix a whole file in
//! one pass.

use crate::config::model::{Collection, Mock, StatefulResourceConfig, COLLECTION_VERSION};
use crate::error::ValidationFailure;
use jsonpath::Selector;
use std::collections::HashSet;

/// Validate a collection against every schema rule.
///
/// Returns the full list of failures; an empty list means the collection is
/// well-formed.
pub fn validate_collection(collection: &Collection) -> Vec<ValidationFailure> {
    let mut errors = Vec::new();

    if collection.version != COLLECTION_VERSION {
        errors.push(ValidationFailure::new(
            "version",
            format!(
                "must be \"{}\", got \"{}\"",
                COLLECTION_VERSION, collection.version
            ),
        ));
    }

    let mut seen_ids = HashSet::new();
    for (index, mock) in collection.mocks.iter().enumerate() {
        let path = format!("mocks.{index}");
        validate_mock(mock, &path, &mut errors);
        if !mock.id.is_empty() && !seen_ids.insert(mock.id.clone()) {
            errors.push(ValidationFailure::new(
                format!("{path}.id"),
                format!("duplicate mock id '{}'", mock.id),
            ));
        }
    }

    let mut seen_resources = HashSet::new();
    for (index, resource) in collection.stateful_resources.iter().enumerate() {
        let path = format!("statefulResources.{index}");
        validate_resource(resource, &path, &mut errors);
        if !resource.name.is_empty() && !seen_resources.insert(resource.name.clone()) {
            errors.push(ValidationFailure::new(
                format!("{path}.name"),
                format!("duplicate resource name '{}'", resource.name),
            ));
        }
    }

    let mut seen_operations = HashSet::new();
    for (index, operation) in collection.custom_operations.iter().enumerate() {
        let path = format!("customOperations.{index}");
        if operation.name.is_empty() {
            errors.push(ValidationFailure::new(
                format!("{path}.name"),
                "operation name must not be empty",
            ));
        } else if !seen_operations.insert(operation.name.clone()) {
            errors.push(ValidationFailure::new(
                format!("{path}.name"),
                format!("duplicate operation name '{}'", operation.name),
            ));
        }
        if operation.steps.is_empty() {
            errors.push(ValidationFailure::new(
                format!("{path}.steps"),
                "operation must have at least one step",
            ));
        }
        match operation.consistency.as_str() {
            "" | "best_effort" | "atomic" => {}
            other => errors.push(ValidationFailure::new(
                format!("{path}.consistency"),
                format!("unknown consistency '{other}' (expected best_effort or atomic)"),
            )),
        }
    }

    for (index, endpoint) in collection.websockets.iter().enumerate() {
        if endpoint.path.is_empty() {
            errors.push(ValidationFailure::new(
                format!("websockets.{index}.path"),
                "endpoint path must not be empty",
            ));
        }
    }

    errors
}

fn validate_mock(mock: &Mock, path: &str, errors: &mut Vec<ValidationFailure>) {
    let populated = mock.populated_specs();
    match populated.len() {
        0 => errors.push(ValidationFailure::new(
            path,
            "mock must populate exactly one protocol spec",
        )),
        1 => {
            if let Some(declared) = mock.mock_type {
                if declared != populated[0] {
                    errors.push(ValidationFailure::new(
                        format!("{path}.type"),
                        format!(
                            "declared type '{}' does not match populated '{}' spec",
                            declared.id_prefix(),
                            populated[0].id_prefix()
                        ),
                    ));
                }
            }
        }
        _ => errors.push(ValidationFailure::new(
            path,
            format!("mock populates {} protocol specs, expected one", populated.len()),
        )),
    }

    let Some(http) = &mock.http else {
        return;
    };

    let matcher = &http.matcher;
    if matcher.path.is_some() && matcher.path_pattern.is_some() {
        errors.push(ValidationFailure::new(
            format!("{path}.http.matcher"),
            "path and pathPattern are mutually exclusive",
        ));
    }
    if let Some(pattern) = &matcher.path_pattern {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationFailure::new(
                format!("{path}.http.matcher.pathPattern"),
                format!("invalid regex: {e}"),
            ));
        }
    }
    if let Some(pattern) = &matcher.body_pattern {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationFailure::new(
                format!("{path}.http.matcher.bodyPattern"),
                format!("invalid regex: {e}"),
            ));
        }
    }
    for expression in matcher.body_jsonpath.keys() {
        if Selector::new(expression).is_err() {
            errors.push(ValidationFailure::new(
                format!("{path}.http.matcher.bodyJsonpath.{expression}"),
                "invalid JSONPath expression",
            ));
        }
    }

    let response = &http.response;
    if !(100..=599).contains(&response.status) {
        errors.push(ValidationFailure::new(
            format!("{path}.http.response.status"),
            format!("status {} outside 100-599", response.status),
        ));
    }
    if response.body.is_some() && response.body_file.is_some() {
        errors.push(ValidationFailure::new(
            format!("{path}.http.response"),
            "body and bodyFile are mutually exclusive",
        ));
    }
}

fn validate_resource(
    resource: &StatefulResourceConfig,
    path: &str,
    errors: &mut Vec<ValidationFailure>,
) {
    if resource.name.is_empty() {
        errors.push(ValidationFailure::new(
            format!("{path}.name"),
            "resource name must not be empty",
        ));
    }
    if resource.id_field.is_empty() {
        errors.push(ValidationFailure::new(
            format!("{path}.idField"),
            "idField must not be empty",
        ));
    }
    if !resource.base_path.is_empty() && !resource.base_path.starts_with('/') {
        errors.push(ValidationFailure::new(
            format!("{path}.basePath"),
            "basePath must start with '/'",
        ));
    }
    for (index, item) in resource.seed.iter().enumerate() {
        if !item.is_object() {
            errors.push(ValidationFailure::new(
                format!("{path}.seed.{index}"),
                "seed entries must be JSON objects",
            ));
        }
    }
    for (index, rule) in resource.validation.iter().enumerate() {
        if rule.field.is_empty() {
            errors.push(ValidationFailure::new(
                format!("{path}.validation.{index}.field"),
                "rule field must not be empty",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{HttpMatcher, HttpMockSpec, HttpResponseSpec};
    use serde_json::json;

    fn http_mock(id: &str) -> Mock {
        Mock {
            id: id.to_string(),
            http: Some(HttpMockSpec {
                matcher: HttpMatcher::default(),
                response: HttpResponseSpec::default(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_collection_passes() {
        let collection = Collection {
            mocks: vec![http_mock("a"), http_mock("b")],
            ..Default::default()
        };
        assert!(validate_collection(&collection).is_empty());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let collection = Collection {
            version: "2.0".to_string(),
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "version");
    }

    #[test]
    fn test_all_errors_reported_not_just_first() {
        let mut bad_status = http_mock("a");
        bad_status.http.as_mut().expect("http").response.status = 42;
        let mut bad_regex = http_mock("a"); // duplicate id on purpose
        bad_regex.http.as_mut().expect("http").matcher.path_pattern = Some("([".to_string());

        let collection = Collection {
            version: "0.9".to_string(),
            mocks: vec![bad_status, bad_regex],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"version"));
        assert!(paths.contains(&"mocks.0.http.response.status"));
        assert!(paths.contains(&"mocks.1.http.matcher.pathPattern"));
        assert!(paths.contains(&"mocks.1.id"));
    }

    #[test]
    fn test_path_and_pattern_mutually_exclusive() {
        let mut mock = http_mock("a");
        {
            let matcher = &mut mock.http.as_mut().expect("http").matcher;
            matcher.path = Some("/users".to_string());
            matcher.path_pattern = Some("^/users$".to_string());
        }
        let collection = Collection {
            mocks: vec![mock],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert!(errors.iter().any(|e| e.message.contains("mutually exclusive")));
    }

    #[test]
    fn test_type_spec_disagreement() {
        let mut mock = http_mock("a");
        mock.mock_type = Some(crate::config::model::MockType::Grpc);
        let collection = Collection {
            mocks: vec![mock],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert!(errors.iter().any(|e| e.path == "mocks.0.type"));
    }

    #[test]
    fn test_invalid_jsonpath_rejected() {
        let mut mock = http_mock("a");
        mock.http
            .as_mut()
            .expect("http")
            .matcher
            .body_jsonpath
            .insert("not a path".to_string(), json!("x"));
        let collection = Collection {
            mocks: vec![mock],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert!(errors.iter().any(|e| e.message.contains("JSONPath")));
    }

    #[test]
    fn test_seed_must_be_objects() {
        let collection = Collection {
            stateful_resources: vec![StatefulResourceConfig {
                name: "users".to_string(),
                base_path: String::new(),
                id_field: "id".to_string(),
                parent_field: None,
                max_items: 0,
                seed: vec![json!([1, 2, 3])],
                validation: vec![],
            }],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert!(errors.iter().any(|e| e.path == "statefulResources.0.seed.0"));
    }

    #[test]
    fn test_unknown_consistency_rejected() {
        let collection = Collection {
            custom_operations: vec![crate::config::model::CustomOperationConfig {
                name: "op".to_string(),
                consistency: "eventual".to_string(),
                steps: vec![],
                response: Default::default(),
            }],
            ..Default::default()
        };
        let errors = validate_collection(&collection);
        assert!(errors.iter().any(|e| e.path.ends_with("consistency")));
        assert!(errors.iter().any(|e| e.path.ends_with("steps")));
    }
}
