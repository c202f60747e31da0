use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Limited};
use url::Url;

use crate::config::TrustedHosts;
use crate::error::BoxError;

/// Final response of a dispatch, body fully buffered.
///
/// Holding the body in memory means the connection has already gone back to
/// the pool by the time the caller sees this value.
#[derive(Debug, Clone)]
pub struct ResponseOutcome {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
}

impl ResponseOutcome {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase for the status, if it has one
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        self.status.canonical_reason()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        content_type(&self.headers)
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// URL of the last hop followed
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// `Content-Type` header value, if present and visible ASCII
#[must_use]
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Map a raw status code to the one reported: anything below 100 is
/// treated as `200 OK`.
///
/// # Errors
/// Returns an error for codes above 999, which have no `StatusCode`.
pub fn normalize_status(raw: u16) -> Result<StatusCode, http::status::InvalidStatusCode> {
    if raw < 100 {
        return Ok(StatusCode::OK);
    }
    StatusCode::from_u16(raw)
}

/// Whether a non-success status is accepted without failing the dispatch.
///
/// Only the trusted API hosts get this, and only when they answer with a
/// non-empty XML body: those hosts report API errors in XML with error
/// statuses and callers read the error document.
#[must_use]
pub fn tolerates_status(
    trusted: &TrustedHosts,
    url: &Url,
    content_type: Option<&str>,
    body: &[u8],
) -> bool {
    let trusted_host = url.host_str().is_some_and(|host| trusted.contains(host));
    let xml = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("xml"));
    trusted_host && xml && !body.is_empty()
}

/// Buffer a response body, failing once more than `limit` bytes arrive.
///
/// # Errors
/// Returns the body's own error, or `LengthLimitError` past `limit`.
pub async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes, BoxError>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    Ok(Limited::new(body, limit).collect().await?.to_bytes())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn trusted() -> TrustedHosts {
        TrustedHosts::default()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalize_status_below_100_is_ok() {
        for raw in [0, 1, 42, 99] {
            assert_eq!(normalize_status(raw).unwrap(), StatusCode::OK);
        }
    }

    #[test]
    fn test_normalize_status_passes_real_codes() {
        assert_eq!(normalize_status(100).unwrap(), StatusCode::CONTINUE);
        assert_eq!(normalize_status(404).unwrap(), StatusCode::NOT_FOUND);
        assert!(normalize_status(1000).is_err());
    }

    #[test]
    fn test_tolerance_requires_all_three_conditions() {
        let api = url("https://api.eveonline.com/char/CharacterSheet.xml.aspx");
        let other = url("https://example.com/char/CharacterSheet.xml.aspx");
        let xml = Some("text/xml; charset=utf-8");
        let body = b"<eveapi><error code=\"203\"/></eveapi>".as_slice();

        assert!(tolerates_status(&trusted(), &api, xml, body));
        assert!(!tolerates_status(&trusted(), &other, xml, body));
        assert!(!tolerates_status(&trusted(), &api, Some("text/html"), body));
        assert!(!tolerates_status(&trusted(), &api, None, body));
        assert!(!tolerates_status(&trusted(), &api, xml, b""));
    }

    #[test]
    fn test_tolerance_for_test_host_and_mixed_case_content_type() {
        let test_api = url("https://api.testeveonline.com/account/Characters.xml.aspx");
        assert!(tolerates_status(
            &trusted(),
            &test_api,
            Some("Application/XML"),
            b"<x/>"
        ));
    }

    #[tokio::test]
    async fn test_collect_body_within_limit() {
        let bytes = collect_body(Full::new(Bytes::from_static(b"hello")), 5)
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_collect_body_over_limit() {
        let err = collect_body(Full::new(Bytes::from_static(b"hello!")), 5)
            .await
            .unwrap_err();
        assert!(err.is::<http_body_util::LengthLimitError>());
    }

    #[test]
    fn test_outcome_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/xml".parse().unwrap());
        let outcome = ResponseOutcome::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"<ok/>"),
            url("https://api.eveonline.com/char/v2"),
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.reason(), Some("OK"));
        assert_eq!(outcome.content_type(), Some("text/xml"));
        assert_eq!(outcome.text(), "<ok/>");
        assert_eq!(outcome.url().path(), "/char/v2");
    }
}
