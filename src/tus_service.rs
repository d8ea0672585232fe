use axum::body::Body;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tower_http::cors::{Any, CorsLayer};

use crate::{AxumTusHeaders, TusConfig, TusHeaderMap};

/// Wraps the tus routes with the protocol envelope: method override,
/// `Tus-Resumable` enforcement and the capability headers on every response.
#[derive(Clone)]
pub struct TusLayer {
    headers: Arc<HeaderMap>,
}

impl TusLayer {
    pub fn new(config: &TusConfig) -> Self {
        let mut headers = HeaderMap::new();
        TusHeaderMap::with_tus_version(config.max_file_size).apply(&mut headers);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        Self {
            headers: Arc::new(headers),
        }
    }
}

impl<S> Layer<S> for TusLayer {
    type Service = TusService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TusService {
            service,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone)]
pub struct TusService<S> {
    service: S,
    headers: Arc<HeaderMap>,
}

impl<S> Service<Request<Body>> for TusService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        apply_method_override(&mut request);

        let headers = Arc::clone(&self.headers);

        if request.method() != Method::OPTIONS
            && !request.headers().contains_key(AxumTusHeaders::Resumable.name())
        {
            tracing::debug!(method = %request.method(), uri = %request.uri(), "Rejecting request without Tus-Resumable");
            let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
            stamp(&headers, response.headers_mut());
            return Box::pin(async move { Ok(response) });
        }

        // the service that was polled ready is the one that must be called
        let clone = self.service.clone();
        let mut inner = std::mem::replace(&mut self.service, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            stamp(&headers, response.headers_mut());
            Ok(response)
        })
    }
}

fn apply_method_override(request: &mut Request<Body>) {
    let method = request
        .headers()
        .get(AxumTusHeaders::MethodOverride.name())
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes()).ok());

    if let Some(method) = method {
        *request.method_mut() = method;
    }
}

fn stamp(tus_headers: &HeaderMap, headers: &mut HeaderMap) {
    for (name, value) in tus_headers {
        headers.insert(name.clone(), value.clone());
    }
}

/// Cross origin access for browser clients.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::PATCH,
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::DELETE,
        ])
        .allow_headers([
            HeaderName::from_static("tus-resumable"),
            HeaderName::from_static("upload-length"),
            HeaderName::from_static("upload-metadata"),
            HeaderName::from_static("upload-offset"),
            HeaderName::from_static("message-id"),
            HeaderName::from_static("x-http-method-override"),
            header::LOCATION,
            header::CONTENT_TYPE,
        ])
        .expose_headers([
            HeaderName::from_static("tus-resumable"),
            HeaderName::from_static("tus-version"),
            HeaderName::from_static("tus-extension"),
            HeaderName::from_static("tus-max-size"),
            HeaderName::from_static("upload-length"),
            HeaderName::from_static("upload-metadata"),
            HeaderName::from_static("upload-offset"),
            header::LOCATION,
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    fn layer() -> TusLayer {
        let mut config = TusConfig::new("/tmp/uploads", "/tmp/media");
        config.max_file_size = 2048;
        TusLayer::new(&config)
    }

    async fn echo_method(request: Request<Body>) -> Result<Response, Infallible> {
        Ok((StatusCode::OK, request.method().to_string()).into_response())
    }

    #[tokio::test]
    async fn test_missing_resumable_is_rejected() {
        let service = layer().layer(service_fn(echo_method));

        let response = service
            .oneshot(Request::post("/media").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["Tus-Resumable"], "1.0.0");
    }

    #[tokio::test]
    async fn test_options_needs_no_resumable() {
        let service = layer().layer(service_fn(echo_method));

        let response = service
            .oneshot(Request::options("/media").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["Tus-Max-Size"], "2048");
        assert_eq!(response.headers()["Cache-Control"], "no-store");
    }

    #[tokio::test]
    async fn test_method_override() {
        let service = layer().layer(service_fn(echo_method));

        let request = Request::post("/media/abc")
            .header("Tus-Resumable", "1.0.0")
            .header("X-HTTP-Method-Override", "delete")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"DELETE");
    }
}
