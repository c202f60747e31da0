//! Outbound request description and construction.

use std::io::Write;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, REFERER};
use http::{HeaderValue, Method, Request, Uri};
use http_body_util::Full;
use url::Url;

use crate::error::{BoxError, TransportError};

/// `Accept-Encoding` value sent when encoded responses are accepted
pub const ACCEPT_ENCODING_VALUE: &str = "gzip,deflate;q=0.8";

/// Content type of every request body
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Accept media type used when the caller does not name one
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Compression applied to a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataCompression {
    #[default]
    None,
    /// gzip container (RFC 1952)
    Gzip,
    /// zlib-wrapped deflate (RFC 1950)
    Deflate,
}

impl DataCompression {
    /// Lowercase name, as sent in `Content-Encoding`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataCompression::None => "none",
            DataCompression::Gzip => "gzip",
            DataCompression::Deflate => "deflate",
        }
    }
}

/// Form-encoded request payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostData {
    form: String,
}

impl PostData {
    /// Wrap an already form-encoded string such as `keyID=1&vCode=abc`.
    #[must_use]
    pub fn new(form: impl Into<String>) -> Self {
        Self { form: form.into() }
    }

    /// Form-encode key/value pairs.
    ///
    /// # Errors
    /// Returns the serializer error if the pairs cannot be encoded.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, serde_urlencoded::ser::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        serde_urlencoded::to_string(&pairs).map(Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.form
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.form.is_empty()
    }

    /// Body bytes after applying `compression`.
    ///
    /// # Errors
    /// Returns the encoder's I/O error.
    pub fn encode(&self, compression: DataCompression) -> std::io::Result<Bytes> {
        let raw = self.form.as_bytes();
        let encoded = match compression {
            DataCompression::None => return Ok(Bytes::copy_from_slice(raw)),
            DataCompression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(raw)?;
                encoder.finish()?
            }
            DataCompression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(raw)?;
                encoder.finish()?
            }
        };
        Ok(Bytes::from(encoded))
    }
}

/// One outbound call as described by the caller.
///
/// Method and body are coupled: without a body the method is always GET and
/// compression is always [`DataCompression::None`], whatever was set.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    url: Url,
    method: Method,
    post_data: Option<PostData>,
    compression: DataCompression,
    accept_encoded: bool,
    accept: String,
}

impl RequestSpec {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            post_data: None,
            compression: DataCompression::None,
            accept_encoded: false,
            accept: DEFAULT_ACCEPT.to_owned(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_post_data(mut self, data: PostData) -> Self {
        self.post_data = Some(data);
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: DataCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Request gzip/deflate encoded responses and decode them transparently.
    #[must_use]
    pub fn with_accept_encoded(mut self, accept_encoded: bool) -> Self {
        self.accept_encoded = accept_encoded;
        self
    }

    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Effective method: GET whenever there is no body
    #[must_use]
    pub fn method(&self) -> Method {
        if self.post_data.is_some() {
            self.method.clone()
        } else {
            Method::GET
        }
    }

    #[must_use]
    pub fn post_data(&self) -> Option<&PostData> {
        self.post_data.as_ref()
    }

    /// Effective compression: none whenever there is no body
    #[must_use]
    pub fn compression(&self) -> DataCompression {
        if self.post_data.is_some() {
            self.compression
        } else {
            DataCompression::None
        }
    }

    #[must_use]
    pub fn accept_encoded(&self) -> bool {
        self.accept_encoded
    }

    #[must_use]
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Same call aimed at a redirect target.
    #[must_use]
    pub(crate) fn redirected(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }
}

/// URL actually requested for `spec`: a GET with a body carries the body as
/// its query string, joined with `&` to any query already present.
#[must_use]
pub fn effective_url(spec: &RequestSpec) -> Url {
    let mut url = spec.url.clone();
    if spec.method() == Method::GET
        && let Some(data) = spec.post_data.as_ref().filter(|d| !d.is_empty())
    {
        let query = match url.query().filter(|q| !q.is_empty()) {
            Some(existing) => format!("{existing}&{}", data.as_str()),
            None => data.as_str().to_owned(),
        };
        url.set_query(Some(&query));
    }
    url
}

/// Build the request for one hop.
///
/// Returns the URL requested (see [`effective_url`]) with the request. The
/// fixed header set is added by
/// [`StandardHeadersLayer`](crate::StandardHeadersLayer).
///
/// # Errors
/// Returns `TransportError::Transport` if the URL, the accept media type or
/// the referrer is not representable, or the body cannot be compressed.
pub fn build_request(
    spec: &RequestSpec,
    referrer: Option<&Url>,
) -> Result<(Url, Request<Full<Bytes>>), TransportError> {
    let url = effective_url(spec);
    let fail = |e: BoxError| TransportError::transport(url.clone(), e);

    let uri: Uri = url.as_str().parse().map_err(|e: http::uri::InvalidUri| fail(e.into()))?;
    let method = spec.method();

    let mut builder = Request::builder().method(method.clone()).uri(uri);
    let headers = builder
        .headers_mut()
        .ok_or_else(|| fail("request builder rejected method or URI".into()))?;
    headers.insert(
        ACCEPT,
        HeaderValue::from_str(&spec.accept).map_err(|e| fail(e.into()))?,
    );
    if spec.accept_encoded {
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODING_VALUE));
    }
    if let Some(referrer) = referrer {
        headers.insert(
            REFERER,
            HeaderValue::from_str(referrer.as_str()).map_err(|e| fail(e.into()))?,
        );
    }

    let body = match spec.post_data.as_ref() {
        Some(data) if method != Method::GET => {
            let compression = spec.compression();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
            if compression != DataCompression::None {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static(compression.as_str()));
            }
            data.encode(compression).map_err(|e| fail(e.into()))?
        }
        _ => Bytes::new(),
    };

    let request = builder.body(Full::new(body)).map_err(|e| fail(e.into()))?;
    Ok((url, request))
}
