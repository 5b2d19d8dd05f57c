//! Request deadline propagation for tower/axum HTTP services.
//!
//! [`DeadlineLayer`] wraps a handler and reads a caller-supplied timestamp from
//! a named HTTP header or URL query parameter. A parseable value becomes the
//! deadline of a [`RequestDeadline`] execution context attached to the request;
//! an unparseable or empty value short-circuits with `400 Bad Request` before
//! the wrapped handler runs; an absent field passes the request through
//! untouched.
//!
//! Accepted timestamp formats, tried in order: HTTP-date (IMF-fixdate), the
//! obsolete RFC 850 form, and ANSI C `asctime`.
//!
//! ```ignore
//! use http::header::HeaderName;
//! use http_deadline::DeadlineLayer;
//!
//! let app = axum::Router::new()
//!     .route("/teapotz", axum::routing::get(teapotz))
//!     .layer(DeadlineLayer::from_header(HeaderName::from_static("x-deadline")));
//! ```
//!
//! Handlers observe the deadline through the [`RequestDeadline`] request
//! extension. Cancellation is advisory: when the deadline elapses the
//! context's token fires, but nothing aborts work that does not await
//! [`RequestDeadline::cancelled`].
//!
//! Any caller that can set the field can shorten or lengthen execution policy,
//! so only expose the field to trusted parties.

mod context;
mod layer;
mod parse;

pub use context::RequestDeadline;
pub use layer::{from_header, from_query, DeadlineLayer, DeadlineService, ResponseFuture};
pub use parse::{parse_deadline, InvalidDeadline};
