use crate::error::ConfigError;
use http::header::{ACCEPT_CHARSET, ACCEPT_LANGUAGE, PRAGMA, USER_AGENT};
use http::{HeaderValue, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

pub const ACCEPT_CHARSET_VALUE: &str = "ISO-8859-1,utf-8;q=0.8,*;q=0.7";
pub const ACCEPT_LANGUAGE_VALUE: &str = "en-us,en;q=0.5";
pub const PRAGMA_VALUE: &str = "no-cache";

/// Tower layer that adds the fixed request headers to every hop:
/// `Accept-Charset`, `Accept-Language`, `Pragma` and `User-Agent`.
#[derive(Clone, Debug)]
pub struct StandardHeadersLayer {
    user_agent: HeaderValue,
}

impl StandardHeadersLayer {
    /// Create a new `StandardHeadersLayer` with the specified user agent string
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidUserAgent` if the user agent string is not
    /// a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, ConfigError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self { user_agent })
    }
}

impl<S> Layer<S> for StandardHeadersLayer {
    type Service = StandardHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StandardHeadersService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Service that adds the fixed header set to requests
#[derive(Clone, Debug)]
pub struct StandardHeadersService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StandardHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        headers
            .entry(ACCEPT_CHARSET)
            .or_insert(HeaderValue::from_static(ACCEPT_CHARSET_VALUE));
        headers
            .entry(ACCEPT_LANGUAGE)
            .or_insert(HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
        headers
            .entry(PRAGMA)
            .or_insert(HeaderValue::from_static(PRAGMA_VALUE));
        headers
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}
