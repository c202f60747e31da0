use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secrets::SecretString;

/// Default User-Agent string for outbound API requests
pub const DEFAULT_USER_AGENT: &str = concat!("api-dispatch/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirect hops followed for one dispatch
pub const MAX_REDIRECTS: usize = 5;

/// Shortest accepted configured timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest accepted configured timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Timeout used when the configured value is out of bounds
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(20);

/// Host of the production API endpoint
pub const PRODUCTION_API_HOST: &str = "api.eveonline.com";

/// Host of the test API endpoint
pub const TEST_API_HOST: &str = "api.testeveonline.com";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "API_DISPATCH_";

/// Default response body limit (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Clamp a configured timeout into the accepted range.
///
/// Values below one second or above five minutes fall back to 20 seconds.
#[must_use]
pub fn effective_timeout(configured: Duration) -> Duration {
    if configured < MIN_TIMEOUT || configured > MAX_TIMEOUT {
        FALLBACK_TIMEOUT
    } else {
        configured
    }
}

/// How the outbound proxy authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyAuthentication {
    /// No credentials are sent to the proxy
    #[default]
    None,
    /// Credentials come from the platform proxy settings
    SystemDefault,
    /// Username and (encrypted) password from these settings
    Specified,
}

/// Proxy settings as stored by the configuration collaborator.
///
/// The password is kept in its stored (encrypted) form; it is resolved by a
/// [`SecretResolver`](crate::SecretResolver) when the dispatcher is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Use the proxy below instead of the platform default
    pub enabled: bool,

    /// Proxy host name or address
    pub host: String,

    /// Proxy port
    pub port: u16,

    /// Credential selection mode
    pub authentication: ProxyAuthentication,

    /// Proxy user name (also the key material for the stored password)
    pub username: String,

    /// Stored password, encrypted with the user name
    #[serde(skip_serializing)]
    pub password: SecretString,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 8080,
            authentication: ProxyAuthentication::None,
            username: String::new(),
            password: SecretString::default(),
        }
    }
}

/// The two API hosts exempted from strict status enforcement when they
/// answer with a non-empty XML body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustedHosts {
    /// Production API host
    pub production: String,

    /// Test API host
    pub test: String,
}

impl Default for TrustedHosts {
    fn default() -> Self {
        Self {
            production: PRODUCTION_API_HOST.to_owned(),
            test: TEST_API_HOST.to_owned(),
        }
    }
}

impl TrustedHosts {
    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.production) || host.eq_ignore_ascii_case(&self.test)
    }
}

/// TLS root certificate source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsRootConfig {
    /// Mozilla root certificates bundled with the binary
    #[default]
    WebPki,
    /// Root certificates from the operating system store
    Native,
}

/// Configuration of a [`Dispatcher`](crate::Dispatcher)
///
/// All fields have defaults, so an empty YAML document is a valid config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Configured request timeout in seconds, clamped by [`effective_timeout`]
    pub http_timeout_secs: u64,

    /// Redirect budget for one dispatch (default: 5)
    pub max_redirects: usize,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Outbound proxy settings
    pub proxy: ProxySettings,

    /// Hosts allowed to answer non-2xx with an XML body
    pub trusted_hosts: TrustedHosts,

    /// Maximum buffered response body size, after decompression
    pub max_body_size: usize,

    /// TLS root certificate source
    pub tls_roots: TlsRootConfig,

    /// Idle timeout for pooled connections in seconds (`None` keeps them)
    pub pool_idle_timeout_secs: Option<u64>,

    /// Maximum idle pooled connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: FALLBACK_TIMEOUT.as_secs(),
            max_redirects: MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: ProxySettings::default(),
            trusted_hosts: TrustedHosts::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout_secs: Some(90),
            pool_max_idle_per_host: 8,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration: defaults, then the YAML file (if given), then
    /// `API_DISPATCH_*` environment variables (`__` separates nested keys).
    ///
    /// # Errors
    /// Returns `ConfigError::NotFound` if `path` is given but is not a file,
    /// and `ConfigError::Load` if a source cannot be read or does not match
    /// the schema.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            // figment treats a missing file as an empty source
            if !path.is_file() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extract configuration from an already assembled figment.
    ///
    /// # Errors
    /// Returns `ConfigError::Load` if the figment does not match the schema.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Configured timeout after clamping
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        effective_timeout(Duration::from_secs(self.http_timeout_secs))
    }

    /// Config for tests against local mock servers: trusts `127.0.0.1`
    /// as the production host and uses a short timeout.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            http_timeout_secs: 5,
            trusted_hosts: TrustedHosts {
                production: "127.0.0.1".to_owned(),
                test: TEST_API_HOST.to_owned(),
            },
            pool_idle_timeout_secs: None,
            ..Default::default()
        }
    }
}
