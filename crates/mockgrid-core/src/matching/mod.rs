//! Deterministic request matching and mock selection.
//!
//! Every eligible mock is scored against the incoming request; any specified
//! predicate that does not hold eliminates the mock outright. Among the
//! survivors the winner is chosen by priority, then score, then specificity,
//! then collection order. Matching never errors: an empty eligibility set is
//! the normal no-match signal.

pub mod jsonpath;

use crate::config::model::{Mock, MockType};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Protocol-neutral view of an inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    /// HTTP method, uppercase
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Headers with lowercased names
    pub headers: HashMap<String, String>,
    /// Raw request body
    pub body: Vec<u8>,
}

impl RequestEnvelope {
    /// Create an envelope for a method and path.
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a header, normalizing its name to lowercase.
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a query parameter.
    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set the raw body.
    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// A mock with its regular expressions compiled once at registry build
#[derive(Debug, Clone)]
pub struct CompiledHttpMock {
    /// The underlying mock definition
    pub mock: Mock,
    path_pattern: Option<Regex>,
    body_pattern: Option<Regex>,
}

impl CompiledHttpMock {
    /// Compile the mock's patterns. Fails on a regex that does not compile,
    /// which schema validation normally rules out earlier.
    pub fn compile(mock: Mock) -> Result<Self> {
        let matcher = mock.http.as_ref().map(|h| &h.matcher);
        let path_pattern = matcher
            .and_then(|m| m.path_pattern.as_deref())
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::compilation("matcher.pathPattern", e.to_string()))?;
        let body_pattern = matcher
            .and_then(|m| m.body_pattern.as_deref())
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::compilation("matcher.bodyPattern", e.to_string()))?;
        Ok(Self {
            mock,
            path_pattern,
            body_pattern,
        })
    }
}

/// A selected mock together with everything the renderer needs
#[derive(Debug, Clone)]
pub struct MatchOutcome<'a> {
    /// The winning mock
    pub mock: &'a Mock,
    /// Path parameters captured by the path pattern's groups
    pub path_params: HashMap<String, String>,
    /// Accumulated predicate score
    pub score: u32,
    /// Number of predicate kinds the matcher specified
    pub specificity: u32,
}

/// Match a request against a snapshot of compiled mocks.
///
/// Selection order: priority descending, score descending, specificity
/// descending, then collection insertion order. The last tie-break is
/// deliberate and stable: of two otherwise equal mocks, the one declared
/// first wins.
pub fn match_request<'a>(
    request: &RequestEnvelope,
    mocks: &'a [CompiledHttpMock],
) -> Option<MatchOutcome<'a>> {
    let mut best: Option<(Reverse<i32>, Reverse<u32>, Reverse<u32>, usize)> = None;
    let mut best_outcome: Option<MatchOutcome<'a>> = None;

    for (index, candidate) in mocks.iter().enumerate() {
        if !candidate.mock.is_enabled() {
            continue;
        }
        if candidate.mock.resolved_type() != MockType::Http {
            continue;
        }
        let Some((score, path_params)) = evaluate(candidate, request) else {
            continue;
        };

        let specificity = candidate
            .mock
            .http
            .as_ref()
            .map(|h| h.matcher.specificity())
            .unwrap_or(0);
        let key = (
            Reverse(candidate.mock.priority),
            Reverse(score),
            Reverse(specificity),
            index,
        );
        trace!(
            mock = %candidate.mock.id,
            score,
            specificity,
            priority = candidate.mock.priority,
            "candidate eligible"
        );

        if best.map_or(true, |current| key < current) {
            best = Some(key);
            best_outcome = Some(MatchOutcome {
                mock: &candidate.mock,
                path_params,
                score,
                specificity,
            });
        }
    }

    if let Some(outcome) = &best_outcome {
        debug!(mock = %outcome.mock.id, score = outcome.score, "request matched");
    } else {
        debug!(method = %request.method, path = %request.path, "no mock matched");
    }
    best_outcome
}

/// Score a single candidate. `None` means a specified predicate failed and
/// the mock is eliminated.
fn evaluate(
    candidate: &CompiledHttpMock,
    request: &RequestEnvelope,
) -> Option<(u32, HashMap<String, String>)> {
    let Some(http) = &candidate.mock.http else {
        // An http-typed mock always carries a spec; treat a bare one as a
        // catch-all with no predicates.
        return Some((0, HashMap::new()));
    };
    let matcher = &http.matcher;
    let mut score = 0u32;
    let mut path_params = HashMap::new();

    if let Some(method) = &matcher.method {
        if !method.eq_ignore_ascii_case(&request.method) {
            return None;
        }
        score += 2;
    }

    if let Some(path) = &matcher.path {
        if path != &request.path {
            return None;
        }
        score += 3;
    }

    if let Some(pattern) = &candidate.path_pattern {
        let captures = pattern.captures(&request.path)?;
        for (group_index, name) in pattern.capture_names().enumerate() {
            if group_index == 0 {
                continue;
            }
            if let Some(value) = captures.get(group_index) {
                let key = name.map_or_else(|| group_index.to_string(), str::to_string);
                path_params.insert(key, value.as_str().to_string());
            }
        }
        score += 2;
    }

    for (name, expected) in &matcher.headers {
        if request.header(name) != Some(expected.as_str()) {
            return None;
        }
        score += 1;
    }

    for (name, expected) in &matcher.query {
        if request.query.get(name) != Some(expected) {
            return None;
        }
        score += 1;
    }

    if let Some(needle) = &matcher.body_contains {
        if !request.body_str().is_some_and(|body| body.contains(needle.as_str())) {
            return None;
        }
        score += 1;
    }

    if let Some(expected) = &matcher.body_equals {
        if request.body_str() != Some(expected.as_str()) {
            return None;
        }
        score += 2;
    }

    if let Some(pattern) = &candidate.body_pattern {
        if !request.body_str().is_some_and(|body| pattern.is_match(body)) {
            return None;
        }
        score += 1;
    }

    if !matcher.body_jsonpath.is_empty() {
        let body = request.body_json()?;
        for (expression, expected) in &matcher.body_jsonpath {
            if !jsonpath::predicate_satisfied(expression, expected, &body) {
                return None;
            }
            score += 1;
        }
    }

    Some((score, path_params))
}
