use async_trait::async_trait;
use surge_http::{HttpClient, HttpRequest, HttpResponse, TransportErrorKind};

/// Transport-level request failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<surge_http::Error> for TransportError {
    fn from(err: surge_http::Error) -> Self {
        Self::new(err.transport_error_kind(), err.to_string())
    }
}

/// Request/response seam between the HTTP work unit and the network.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.request(req).await?)
    }
}

impl From<TransportError> for crate::error::WorkError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            kind: err.kind,
            message: err.message,
        }
    }
}
