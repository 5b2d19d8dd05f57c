use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::HeaderName;
use http::{Request, Response, StatusCode};
use pin_project::pin_project;
use tower::{Layer, Service};
use url::form_urlencoded;

use crate::context::{DeadlineScope, RequestDeadline};
use crate::parse::parse_deadline;

/// Where the raw deadline value is read from on each request.
#[derive(Clone, Debug)]
enum Source {
    Header(HeaderName),
    Query(String),
}

impl Source {
    /// Three-way read: `None` means the field is absent, `Some` means it is
    /// present, including present with an empty value.
    fn extract<B>(&self, request: &Request<B>) -> Option<String> {
        match self {
            Source::Header(name) => request.headers().get(name).map(|value| {
                // Header bytes that are not UTF-8 cannot match any accepted
                // layout; surface them as an unparsable value, not an absent
                // field.
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            }),
            Source::Query(name) => request.uri().query().and_then(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.into_owned())
            }),
        }
    }
}

/// Tower layer that bounds each request with a caller-supplied deadline.
///
/// Reads the named header or query parameter, parses it with
/// [`parse_deadline`](crate::parse_deadline), and attaches the resulting
/// [`RequestDeadline`] to the request extensions before the inner service
/// runs. Requests without the field pass through untouched; requests with an
/// empty or unparsable value are answered with `400 Bad Request` and never
/// reach the inner service.
///
/// The deadline timer runs on the ambient tokio runtime, so the service must
/// be called from within one.
#[derive(Clone, Debug)]
pub struct DeadlineLayer {
    source: Source,
}

impl DeadlineLayer {
    /// Reads the deadline from the named HTTP header.
    pub fn from_header(name: HeaderName) -> Self {
        DeadlineLayer {
            source: Source::Header(name),
        }
    }

    /// Reads the deadline from the named URL query parameter. The first
    /// occurrence wins if the key repeats.
    pub fn from_query(name: impl Into<String>) -> Self {
        DeadlineLayer {
            source: Source::Query(name.into()),
        }
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService {
            inner,
            source: self.source.clone(),
        }
    }
}

/// Wraps `inner` in a [`DeadlineService`] reading the named HTTP header.
pub fn from_header<S>(name: HeaderName, inner: S) -> DeadlineService<S> {
    DeadlineLayer::from_header(name).layer(inner)
}

/// Wraps `inner` in a [`DeadlineService`] reading the named query parameter.
pub fn from_query<S>(name: impl Into<String>, inner: S) -> DeadlineService<S> {
    DeadlineLayer::from_query(name).layer(inner)
}

/// Service produced by [`DeadlineLayer`]. Stateless across requests: every
/// call parses its own input and derives its own independent deadline scope.
#[derive(Clone, Debug)]
pub struct DeadlineService<S> {
    inner: S,
    source: Source,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DeadlineService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let raw = match self.source.extract(&request) {
            None => {
                return ResponseFuture {
                    state: State::Passthrough {
                        inner: self.inner.call(request),
                    },
                }
            }
            Some(raw) => raw,
        };

        let requested = match parse_deadline(&raw) {
            Ok(requested) => requested,
            Err(error) => {
                tracing::debug!(source = ?self.source, %error, "rejecting request deadline");
                return ResponseFuture {
                    state: State::Rejected,
                };
            }
        };

        let scope = DeadlineScope::derive(request.extensions().get::<RequestDeadline>(), requested);
        let handle = scope.handle();
        tracing::trace!(deadline = %handle.deadline(), "bounding request with caller-supplied deadline");
        request.extensions_mut().insert(handle);

        ResponseFuture {
            state: State::Bounded {
                inner: self.inner.call(request),
                scope: Some(scope),
            },
        }
    }
}

/// Response future of [`DeadlineService`].
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    state: State<F>,
}

#[pin_project(project = StateProj)]
enum State<F> {
    /// The field value failed validation; reply 400 without running the inner
    /// service.
    Rejected,
    /// No deadline was requested; the inner service runs untouched.
    Passthrough {
        #[pin]
        inner: F,
    },
    /// The inner service runs under a derived deadline scope, released as soon
    /// as it completes.
    Bounded {
        #[pin]
        inner: F,
        scope: Option<DeadlineScope>,
    },
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    ResBody: Default,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().state.project() {
            StateProj::Rejected => {
                let mut response = Response::new(ResBody::default());
                *response.status_mut() = StatusCode::BAD_REQUEST;
                Poll::Ready(Ok(response))
            }
            StateProj::Passthrough { inner } => inner.poll(cx),
            StateProj::Bounded { inner, scope } => {
                let result = inner.poll(cx);
                if result.is_ready() {
                    // Release the cancellation resources the moment the
                    // handler is done; the caller may hold the future longer.
                    drop(scope.take());
                }
                result
            }
        }
    }
}
