//! Query HTTP Routes
//!
//! `GET /query/*path` runs the pipeline defined at `path`. The query
//! string carries the filter arguments; `Accept`, `Accept-Encoding` and
//! `If-Modified-Since` are honoured.
//!
//! Identity comes from headers set by an authenticating proxy:
//! `X-Auth-Issuer`, `X-Auth-Subject`, and comma separated
//! `X-Auth-Groups` / `X-Auth-Roles`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::cache::{parse_http_date, Identity};
use crate::engine::{EngineError, QueryEngine, QueryRequest, QueryResponse};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Create query routes
pub fn query_routes(engine: Arc<QueryEngine>) -> Router {
    Router::new()
        .route("/query/*path", get(query_handler))
        .with_state(engine)
}

async fn query_handler(
    State(engine): State<Arc<QueryEngine>>,
    Path(path): Path<String>,
    Query(arguments): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let request = QueryRequest {
        path,
        arguments,
        accept: header_str(&headers, header::ACCEPT.as_str()),
        accept_encoding: header_str(&headers, header::ACCEPT_ENCODING.as_str()),
        if_modified_since: header_str(&headers, header::IF_MODIFIED_SINCE.as_str())
            .as_deref()
            .and_then(parse_http_date),
        identity: identity(&headers),
    };

    match engine.execute(request).await {
        Ok(response) => into_http(response),
        Err(err) => err.into_response(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_list(headers: &HeaderMap, name: &str) -> Vec<String> {
    header_str(headers, name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn identity(headers: &HeaderMap) -> Identity {
    Identity {
        issuer: header_str(headers, "x-auth-issuer"),
        subject: header_str(headers, "x-auth-subject"),
        groups: header_list(headers, "x-auth-groups"),
        roles: header_list(headers, "x-auth-roles"),
    }
}

fn last_modified_header(value: &str) -> Option<(header::HeaderName, HeaderValue)> {
    HeaderValue::from_str(value)
        .ok()
        .map(|v| (header::LAST_MODIFIED, v))
}

fn into_http(response: QueryResponse) -> Response {
    match response {
        QueryResponse::NotModified { last_modified } => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            if let Some((name, value)) = last_modified_header(&last_modified) {
                response.headers_mut().insert(name, value);
            }
            response
        }
        QueryResponse::Stream {
            content_type,
            last_modified,
            body,
        } => {
            let mut response = Response::new(Body::from_stream(body));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            if let Some((name, value)) = last_modified.as_deref().and_then(last_modified_header) {
                headers.insert(name, value);
            }
            response
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AdmissionControl;
    use crate::engine::EngineConfig;
    use crate::observability::MetricsRegistry;
    use crate::pipeline::{DefaultSourceFactory, DefinitionStore};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(temp: &TempDir) -> Router {
        let defs = temp.path().join("demo");
        fs::create_dir_all(&defs).unwrap();
        fs::write(
            defs.join("data.json"),
            r#"{"source": {"type": "test", "row_count": 4}, "formats": ["tsv", "csv"]}"#,
        )
        .unwrap();
        let engine = QueryEngine::new(
            DefinitionStore::new(temp.path()),
            Arc::new(DefaultSourceFactory),
            AdmissionControl::new(2),
            Arc::new(MetricsRegistry::new()),
            EngineConfig::default(),
        );
        query_routes(Arc::new(engine))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_query_streams_csv() {
        let temp = TempDir::new().unwrap();
        let (status, headers, body) = get(app(&temp), "/query/demo/data.csv?_offset=1&_limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(body, "\"value\"\n1\n2\n");
    }

    #[tokio::test]
    async fn test_bad_argument_is_plain_text_400() {
        let temp = TempDir::new().unwrap();
        let (status, headers, body) = get(app(&temp), "/query/demo/data?_limit=bob").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(body, "Invalid argument to _limit filter, should be an integer");
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_404() {
        let temp = TempDir::new().unwrap();
        let (status, _, _) = get(app(&temp), "/query/demo/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(app(&temp), "/query/demo/../secret").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_encoded_query_arguments() {
        let temp = TempDir::new().unwrap();
        let (status, _, body) =
            get(app(&temp), "/query/demo/data?_query=value%3E%3D2%20and%20value%3C3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"value\"\n2\n");
    }

    #[test]
    fn test_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-subject", HeaderValue::from_static("alice"));
        headers.insert("x-auth-groups", HeaderValue::from_static("b, a,"));
        let identity = identity(&headers);
        assert_eq!(identity.subject.as_deref(), Some("alice"));
        assert_eq!(identity.groups, vec!["b".to_string(), "a".to_string()]);
        assert!(identity.issuer.is_none());
    }
}
