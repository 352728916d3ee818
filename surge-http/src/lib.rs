#![forbid(unsafe_code)]

mod client;
mod error;
mod estimate;
mod types;
mod util;

pub use client::{HttpClient, HttpClientOptions};
pub use error::{Error, Result, TransportErrorKind};
pub use estimate::estimate_http_request_bytes;
pub use types::{HttpRequest, HttpResponse};
