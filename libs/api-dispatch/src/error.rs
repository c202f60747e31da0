use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;
use url::Url;

/// Boxed error used for causes coming out of hyper, tower and the connector.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure of a single dispatch.
///
/// Every network or protocol failure is folded into exactly one of these
/// kinds before it reaches the caller. Each variant carries the URL of the
/// hop that failed so callers can report "could not reach X because Y"
/// without inspecting transport internals.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The hop did not complete within the effective timeout.
    ///
    /// Reported as the HTTP 408 equivalent, see [`TransportError::status`].
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: Url, timeout: Duration },

    /// The redirect budget was exhausted before a final response arrived.
    #[error("too many redirects while requesting {url} (limit {max_redirects})")]
    RedirectsExceeded { url: Url, max_redirects: usize },

    /// Non-success status outside the relaxed-tolerance case.
    #[error("HTTP {status} from {url}: {body_preview}")]
    HttpStatus {
        url: Url,
        status: StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// Any other failure: DNS, connect, proxy tunnel, TLS, protocol, body.
    ///
    /// `reason` names the innermost network error when one exists in the
    /// source chain, otherwise the cause itself.
    #[error("could not reach {url}: {reason}")]
    Transport {
        url: Url,
        reason: String,
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// Wrap a lower-level failure, preferring a network-level root cause
    /// for the reported reason.
    pub(crate) fn transport(url: Url, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        let reason = network_cause(&*source)
            .map_or_else(|| source.to_string(), ToString::to_string);
        TransportError::Transport {
            url,
            reason,
            source,
        }
    }

    /// URL of the hop the failure belongs to.
    #[must_use]
    pub fn url(&self) -> &Url {
        match self {
            TransportError::Timeout { url, .. }
            | TransportError::RedirectsExceeded { url, .. }
            | TransportError::HttpStatus { url, .. }
            | TransportError::Transport { url, .. } => url,
        }
    }

    /// HTTP status semantics of the failure, if any.
    ///
    /// Timeouts map to `408 Request Timeout`.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Timeout { .. } => Some(StatusCode::REQUEST_TIMEOUT),
            TransportError::HttpStatus { status, .. } => Some(*status),
            TransportError::RedirectsExceeded { .. } | TransportError::Transport { .. } => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// The network-level error at the root of a `Transport` failure, if any.
    #[must_use]
    pub fn network_error(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Transport { source, .. } => network_cause(&**source),
            _ => None,
        }
    }
}

/// Walk the source chain looking for an I/O error.
fn network_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a std::io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        current = e.source();
    }
    None
}

/// Configuration-level failures, raised before any request is sent.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Configuration sources could not be read or deserialized
    #[error("failed to load dispatcher configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// An explicitly named configuration file does not exist
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Proxy host/port do not form a valid proxy address
    #[error("invalid proxy address '{address}': {reason}")]
    InvalidProxy { address: String, reason: String },

    /// User agent is not a valid header value
    #[error("invalid user agent: {0}")]
    InvalidUserAgent(#[from] http::header::InvalidHeaderValue),

    /// Stored proxy password could not be resolved
    #[error("failed to resolve proxy password for '{username}'")]
    Secret {
        username: String,
        #[source]
        source: BoxError,
    },

    /// TLS roots could not be loaded
    #[error("TLS configuration failed: {0}")]
    Tls(#[source] BoxError),
}
