//! Tower layers applied to every outbound hop
//!
//! - [`StandardHeadersLayer`] - Adds the fixed header set and User-Agent

mod standard_headers;

pub use standard_headers::{
    ACCEPT_CHARSET_VALUE, ACCEPT_LANGUAGE_VALUE, PRAGMA_VALUE, StandardHeadersLayer,
    StandardHeadersService,
};
