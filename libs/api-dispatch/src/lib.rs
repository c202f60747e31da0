#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound API request dispatcher
//!
//! This crate sends requests to a remote XML API with:
//! - Manual redirect following (301/302 only) with a fixed hop budget
//! - A per-hop timeout clamped to 1s..=5min (20s otherwise)
//! - Platform or explicit proxy selection, with optional credentials
//! - Form bodies, sent as query strings for GET and optionally compressed
//!   (gzip/deflate) otherwise
//! - Optional transparent response decompression
//! - A single error type, [`TransportError`], for every failure
//!
//! Non-success statuses fail the dispatch, except when one of the two
//! trusted API hosts answers with a non-empty XML document: that document
//! carries the API's own error and is returned as a normal outcome.
//!
//! # Example
//!
//! ```ignore
//! use api_dispatch::{Dispatcher, DispatcherConfig, PostData, RequestSpec};
//! use http::Method;
//!
//! let dispatcher = Dispatcher::from_config(DispatcherConfig::load(None)?)?;
//!
//! let spec = RequestSpec::new("https://api.eveonline.com/char/CharacterSheet.xml.aspx".parse()?)
//!     .with_method(Method::POST)
//!     .with_post_data(PostData::from_pairs([("keyID", "1"), ("vCode", "abc")])?)
//!     .with_accept("text/xml");
//!
//! let outcome = dispatcher.send(spec).await?;
//! println!("{} from {}", outcome.status(), outcome.url());
//! ```

mod config;
mod dispatcher;
mod error;
mod layers;
mod proxy;
mod request;
mod response;
mod secrets;
pub mod security;
mod tls;

pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, DispatcherConfig, ENV_PREFIX, FALLBACK_TIMEOUT,
    MAX_REDIRECTS, MAX_TIMEOUT, MIN_TIMEOUT, PRODUCTION_API_HOST, ProxyAuthentication,
    ProxySettings, TEST_API_HOST, TlsRootConfig, TrustedHosts, effective_timeout,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder, RedirectBudget};
pub use error::{BoxError, ConfigError, TransportError};
pub use layers::{
    ACCEPT_CHARSET_VALUE, ACCEPT_LANGUAGE_VALUE, PRAGMA_VALUE, StandardHeadersLayer,
    StandardHeadersService,
};
pub use proxy::{ProxyConfig, ProxyConnector, ProxyCredentials, ProxyStream};
pub use request::{
    ACCEPT_ENCODING_VALUE, DEFAULT_ACCEPT, DataCompression, FORM_CONTENT_TYPE, PostData,
    RequestSpec, build_request, effective_url,
};
pub use response::{ResponseOutcome, normalize_status, tolerates_status};
pub use secrets::{PlaintextSecrets, SecretResolver, SecretString};
