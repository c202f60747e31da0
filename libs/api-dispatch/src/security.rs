//! Limits applied when surfacing response data in errors.

/// Maximum body preview size carried by `TransportError::HttpStatus` (8KB).
///
/// Error responses from the API are often full HTML pages; only this much of
/// the body is kept, decoded lossily as UTF-8.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Lossy UTF-8 preview of `body`, truncated to [`ERROR_BODY_PREVIEW_LIMIT`].
#[must_use]
pub fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
