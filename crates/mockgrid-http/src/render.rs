//! Response rendering: delay, captured path-parameter interpolation, and
//! body-file loading for matched mocks.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Response, StatusCode};
use mockgrid_core::config::model::HttpResponseSpec;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Duration;
use tracing::warn;

/// Produce the HTTP response a matched mock describes.
///
/// Applies the configured delay, interpolates `{{path.<name>}}` tokens from
/// the captured path parameters into the body and header values, and loads
/// `bodyFile` contents when configured.
pub async fn render_response(
    spec: &HttpResponseSpec,
    path_params: &HashMap<String, String>,
) -> Response<Body> {
    if let Some(delay_ms) = spec.delay_ms {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let (body, inferred_content_type) = render_body(spec, path_params).await;

    let status = StatusCode::from_u16(spec.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);

    let mut content_type_set = false;
    for (name, value) in &spec.headers {
        let value = interpolate(value, path_params);
        let Ok(header_name) = name.parse::<HeaderName>() else {
            warn!(header = %name, "skipping unparseable response header");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(&value) else {
            warn!(header = %name, "skipping unparseable response header value");
            continue;
        };
        if header_name == header::CONTENT_TYPE {
            content_type_set = true;
        }
        builder = builder.header(header_name, header_value);
    }
    if !content_type_set {
        if let Some(content_type) = inferred_content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
    }

    builder.body(Body::from(body)).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .expect("static response")
    })
}

async fn render_body(
    spec: &HttpResponseSpec,
    path_params: &HashMap<String, String>,
) -> (Vec<u8>, Option<&'static str>) {
    if let Some(file) = &spec.body_file {
        return match tokio::fs::read(file).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => (interpolate(&text, path_params).into_bytes(), None),
                Err(original) => (original.into_bytes(), None),
            },
            Err(e) => {
                warn!(file = %file, %e, "failed to read body file");
                (Vec::new(), None)
            }
        };
    }

    match &spec.body {
        None => (Vec::new(), None),
        Some(Value::String(text)) => (
            interpolate(text, path_params).into_bytes(),
            Some("text/plain; charset=utf-8"),
        ),
        Some(other) => {
            let serialized = serde_json::to_string(other).unwrap_or_default();
            (
                interpolate(&serialized, path_params).into_bytes(),
                Some("application/json"),
            )
        }
    }
}

/// Replace `{{path.<name>}}` tokens with captured path parameters.
fn interpolate(template: &str, path_params: &HashMap<String, String>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let mut result = template.to_string();
    for (name, value) in path_params {
        result = result.replace(&format!("{{{{path.{name}}}}}"), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.expect("collect").to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn test_json_body_with_default_content_type() {
        let spec = HttpResponseSpec {
            status: 201,
            body: Some(json!({"ok": true})),
            ..Default::default()
        };
        let response = render_response(&spec, &HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(body_string(response).await, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_path_param_interpolation_in_body_and_headers() {
        let spec = HttpResponseSpec {
            status: 200,
            headers: HashMap::from([("X-User".to_string(), "{{path.id}}".to_string())]),
            body: Some(json!({"user": "{{path.id}}"})),
            ..Default::default()
        };
        let params = HashMap::from([("id".to_string(), "42".to_string())]);
        let response = render_response(&spec, &params).await;
        assert_eq!(
            response.headers().get("x-user").and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert_eq!(body_string(response).await, r#"{"user":"42"}"#);
    }

    #[tokio::test]
    async fn test_explicit_content_type_wins() {
        let spec = HttpResponseSpec {
            status: 200,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/problem+json".to_string(),
            )]),
            body: Some(json!({"k": 1})),
            ..Default::default()
        };
        let response = render_response(&spec, &HashMap::new()).await;
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );
    }

    #[tokio::test]
    async fn test_body_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let file = dir.path().join("payload.json");
        tokio::fs::write(&file, r#"{"from":"file {{path.id}}"}"#).await.expect("write");

        let spec = HttpResponseSpec {
            status: 200,
            body_file: Some(file.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let params = HashMap::from([("id".to_string(), "7".to_string())]);
        let response = render_response(&spec, &params).await;
        assert_eq!(body_string(response).await, r#"{"from":"file 7"}"#);
    }

    #[tokio::test]
    async fn test_string_body_is_plain_text() {
        let spec = HttpResponseSpec {
            status: 200,
            body: Some(json!("pong")),
            ..Default::default()
        };
        let response = render_response(&spec, &HashMap::new()).await;
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(body_string(response).await, "pong");
    }
}
