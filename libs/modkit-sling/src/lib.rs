#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Fluent REST request builder for `ModKit` API clients
//!
//! This crate provides a builder for talking to REST APIs with:
//! - Base/child builders: configure a service once, [`derive`] per endpoint
//! - RFC 3986 path resolution against a base URL
//! - Query parameters from serde-tagged structs (see [`query`])
//! - JSON, urlencoded form, raw and streaming request bodies
//! - Status-driven decoding into a success or a failure target
//! - A pluggable [`Transport`], with a pooled hyper/rustls default
//!
//! # Example
//!
//! ```ignore
//! use modkit_sling::RequestBuilder;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct NewIssue<'a> { title: &'a str, body: &'a str }
//!
//! #[derive(Default, Deserialize)]
//! struct Issue { number: u64, title: String }
//!
//! #[derive(Default, Deserialize)]
//! struct GithubError { message: String }
//!
//! let github = RequestBuilder::new()
//!     .base("https://api.github.com/")
//!     .set_header("authorization", "Bearer <token>");
//!
//! let mut issue = Issue::default();
//! let mut error = GithubError::default();
//! let head = github
//!     .derive()
//!     .post("repos/octo/hello/issues")
//!     .json_body(Some(&NewIssue { title: "Bug", body: "It broke" }))
//!     .receive(Some(&mut issue), Some(&mut error))
//!     .await?;
//!
//! if head.is_success() {
//!     println!("created #{}", issue.number);
//! } else {
//!     println!("rejected: {}", error.message);
//! }
//! ```
//!
//! [`derive`]: RequestBuilder::derive

mod body;
mod config;
mod decode;
mod error;
mod executor;
mod finite;
pub mod query;
mod request;
mod response;
mod transport;
mod uri;

#[cfg(test)]
mod test_support;

pub use body::{BodyProvider, RequestBody};
pub use config::{DEFAULT_USER_AGENT, TransportConfig, TransportSecurity};
pub use decode::ResponseDecoder;
pub use error::{BoxError, DecodeError, EncodeError, HttpError, InvalidHeader, InvalidUriKind};
pub use query::QueryEncoding;
pub use request::RequestBuilder;
pub use response::{HttpResponse, LimitedBody, ResponseBody, ResponseHead};
pub use transport::{HyperTransport, Request, Transport, default_transport};
