//! Environment-variable substitution applied to raw configuration text
//! before parsing.
//!
//! Tokens have the form `${NAME}` or `${NAME:-default}`. A present and
//! non-empty environment value replaces the token; otherwise the default is
//! used, or the empty string when no default was written.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    // NAME is [A-Za-z_][A-Za-z0-9_]*; the default arm is everything up to
    // the closing brace.
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("substitution regex")
});

/// Replace every `${NAME}` / `${NAME:-default}` token in `input`.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Token replacement with an explicit variable lookup, for tests and
/// embedders that do not read the process environment.
pub fn substitute_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let replaced: Cow<'_, str> = TOKEN.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) if !value.is_empty() => value,
            _ => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        }
    });
    replaced.into_owned()
}
