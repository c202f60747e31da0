use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{LOCATION, PROXY_AUTHORIZATION};
use http::response::Parts;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::Full;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use url::Url;

use crate::config::{DispatcherConfig, ProxySettings, TrustedHosts, effective_timeout};
use crate::error::{BoxError, ConfigError, TransportError};
use crate::layers::StandardHeadersLayer;
use crate::proxy::{ProxyConfig, ProxyConnector, ProxyRoute};
use crate::request::{RequestSpec, build_request};
use crate::response::{
    ResponseOutcome, collect_body, content_type, normalize_status, tolerates_status,
};
use crate::secrets::{PlaintextSecrets, SecretResolver};
use crate::security::body_preview;
use crate::tls;

type HttpsClient = Client<HttpsConnector<ProxyConnector>, Full<Bytes>>;

/// Remaining redirect hops for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectBudget {
    max: usize,
    remaining: usize,
}

impl RedirectBudget {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Spend one hop. Returns `false`, leaving the budget untouched, once
    /// it is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Result of a single exchange with the server
#[derive(Debug)]
enum Hop {
    /// 301/302; the target is resolved once the budget allows another hop
    Redirect { headers: HeaderMap },
    /// Final response
    Complete(ResponseOutcome),
}

/// Builder for [`Dispatcher`]
///
/// # Example
///
/// ```rust,no_run
/// use api_dispatch::{DispatcherBuilder, DispatcherConfig};
///
/// let dispatcher = DispatcherBuilder::with_config(DispatcherConfig::default())
///     .max_redirects(3)
///     .build()?;
/// # Ok::<_, api_dispatch::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    timeout: Option<Duration>,
    secrets: Arc<dyn SecretResolver>,
}

impl DispatcherBuilder {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a builder from an existing configuration
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            timeout: None,
            secrets: Arc::new(PlaintextSecrets),
        }
    }

    /// Set the configured timeout, overriding `http_timeout_secs`; it is
    /// clamped when the dispatcher is built
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.config.proxy = proxy;
        self
    }

    #[must_use]
    pub fn trusted_hosts(mut self, trusted_hosts: TrustedHosts) -> Self {
        self.config.trusted_hosts = trusted_hosts;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Resolver for the stored proxy password (default: [`PlaintextSecrets`])
    #[must_use]
    pub fn secrets(mut self, resolver: impl SecretResolver + 'static) -> Self {
        self.secrets = Arc::new(resolver);
        self
    }

    /// Build the dispatcher
    ///
    /// # Errors
    /// Returns a `ConfigError` if the proxy password cannot be resolved, the
    /// proxy address or user agent is invalid, or TLS initialization fails
    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        let configured = self
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.http_timeout_secs));
        let timeout = effective_timeout(configured);
        if timeout != configured {
            tracing::warn!(
                configured = ?configured,
                effective = ?timeout,
                "configured HTTP timeout out of range, using fallback"
            );
        }

        let proxy = ProxyConfig::resolve(&self.config.proxy, self.secrets.as_ref())?;
        let route = ProxyRoute::from_config(&proxy)?;
        tracing::debug!(route = ?route, "proxy route selected");

        let https =
            tls::https_connector(self.config.tls_roots, ProxyConnector::new(route.clone()))?;

        // Redirects are never followed by the client itself
        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host);
        if let Some(secs) = self.config.pool_idle_timeout_secs {
            client_builder.pool_idle_timeout(Duration::from_secs(secs));
        }
        let client = client_builder.build::<_, Full<Bytes>>(https);

        let headers = StandardHeadersLayer::try_new(&self.config.user_agent)?;

        Ok(Dispatcher {
            client,
            headers,
            proxy: Arc::new(proxy),
            route,
            trusted_hosts: Arc::new(self.config.trusted_hosts),
            timeout,
            max_redirects: self.config.max_redirects,
            max_body_size: self.config.max_body_size,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends requests, following 301/302 redirects up to a fixed budget.
///
/// Cloning is cheap and clones share the connection pool; concurrent
/// [`send`](Self::send) calls are independent of each other.
#[derive(Clone)]
pub struct Dispatcher {
    client: HttpsClient,
    headers: StandardHeadersLayer,
    proxy: Arc<ProxyConfig>,
    route: ProxyRoute,
    trusted_hosts: Arc<TrustedHosts>,
    timeout: Duration,
    max_redirects: usize,
    max_body_size: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("proxy", &self.proxy)
            .field("trusted_hosts", &self.trusted_hosts)
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Builder with default configuration
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatcher for `config`, with proxy passwords stored in clear text
    ///
    /// # Errors
    /// See [`DispatcherBuilder::build`]
    pub fn from_config(config: DispatcherConfig) -> Result<Self, ConfigError> {
        DispatcherBuilder::with_config(config).build()
    }

    /// Timeout applied to each hop, after clamping
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    #[must_use]
    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// Send `spec`, following redirects.
    ///
    /// Every hop re-sends the same method, body and compression; the URL of
    /// the previous hop becomes the referrer.
    ///
    /// # Errors
    /// - `TransportError::Timeout` if a hop does not complete in time
    /// - `TransportError::RedirectsExceeded` if more than `max_redirects`
    ///   redirects are answered
    /// - `TransportError::HttpStatus` for a non-success final status outside
    ///   the trusted-host XML case
    /// - `TransportError::Transport` for everything else
    pub async fn send(&self, spec: RequestSpec) -> Result<ResponseOutcome, TransportError> {
        let mut budget = RedirectBudget::new(self.max_redirects);
        let mut spec = spec;
        let mut referrer: Option<Url> = None;

        loop {
            let (url, mut request) = build_request(&spec, referrer.as_ref())?;
            if let Some(auth) = self.route.forward_auth(request.uri()) {
                request.headers_mut().insert(PROXY_AUTHORIZATION, auth);
            }
            tracing::debug!(url = %url, method = %request.method(), "sending request");

            match self.exchange(spec.accept_encoded(), url.clone(), request).await? {
                Hop::Complete(outcome) => {
                    tracing::debug!(
                        url = %outcome.url(),
                        status = outcome.status().as_u16(),
                        bytes = outcome.body().len(),
                        "request completed"
                    );
                    return Ok(outcome);
                }
                Hop::Redirect { headers } => {
                    if !budget.try_consume() {
                        tracing::warn!(
                            url = %url,
                            max_redirects = budget.max(),
                            "redirect limit exceeded"
                        );
                        return Err(TransportError::RedirectsExceeded {
                            url,
                            max_redirects: budget.max(),
                        });
                    }
                    let location = redirect_target(&url, &headers)?;
                    tracing::debug!(
                        from = %url,
                        to = %location,
                        remaining = budget.remaining(),
                        "following redirect"
                    );
                    spec = spec.redirected(location);
                    referrer = Some(url);
                }
            }
        }
    }

    /// One request/response exchange under the hop timeout
    async fn exchange(
        &self,
        accept_encoded: bool,
        url: Url,
        request: Request<Full<Bytes>>,
    ) -> Result<Hop, TransportError> {
        let round_trip = async {
            let (parts, body) = if accept_encoded {
                let service = ServiceBuilder::new()
                    .layer(self.headers.clone())
                    .layer(DecompressionLayer::new())
                    .service(self.client.clone());
                fetch(service, request, &url, self.max_body_size).await?
            } else {
                let service = ServiceBuilder::new()
                    .layer(self.headers.clone())
                    .service(self.client.clone());
                fetch(service, request, &url, self.max_body_size).await?
            };
            self.classify(&url, parts, body)
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(hop) => hop,
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.timeout, "request timed out");
                Err(TransportError::Timeout {
                    url,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Turn a buffered response into the next step of the loop
    fn classify(&self, url: &Url, parts: Parts, body: Bytes) -> Result<Hop, TransportError> {
        if matches!(parts.status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) {
            return Ok(Hop::Redirect {
                headers: parts.headers,
            });
        }

        let status = normalize_status(parts.status.as_u16())
            .map_err(|e| TransportError::transport(url.clone(), e))?;
        let content_type = content_type(&parts.headers);

        if !status.is_success() && !tolerates_status(&self.trusted_hosts, url, content_type, &body) {
            tracing::debug!(url = %url, status = status.as_u16(), "request failed with status");
            return Err(TransportError::HttpStatus {
                url: url.clone(),
                status,
                body_preview: body_preview(&body),
                content_type: content_type.map(str::to_owned),
            });
        }

        Ok(Hop::Complete(ResponseOutcome::new(
            status,
            parts.headers,
            body,
            url.clone(),
        )))
    }
}

/// Resolve the `Location` of a redirect answered for `url`.
fn redirect_target(url: &Url, headers: &HeaderMap) -> Result<Url, TransportError> {
    let location = headers
        .get(LOCATION)
        .ok_or_else(|| {
            TransportError::transport(url.clone(), "redirect response without Location header")
        })?
        .to_str()
        .map_err(|e| TransportError::transport(url.clone(), e))?;
    url.join(location)
        .map_err(|e| TransportError::transport(url.clone(), e))
}

/// Send `request` through `service` and buffer the whole body.
async fn fetch<S, B>(
    service: S,
    request: Request<Full<Bytes>>,
    url: &Url,
    limit: usize,
) -> Result<(Parts, Bytes), TransportError>
where
    S: Service<Request<Full<Bytes>>, Response = Response<B>>,
    S::Error: Into<BoxError>,
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    let response = service
        .oneshot(request)
        .await
        .map_err(|e| TransportError::transport(url.clone(), e))?;
    let (parts, body) = response.into_parts();
    let body = collect_body(body, limit)
        .await
        .map_err(|e| TransportError::transport(url.clone(), e))?;
    Ok((parts, body))
}
