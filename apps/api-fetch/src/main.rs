//! API fetch tool
//!
//! Sends a single request through `api-dispatch` and prints the final status,
//! URL and body. Useful for checking proxy and redirect behaviour of a
//! configuration file.
//!
//! # Usage
//!
//! ```bash
//! # Plain GET
//! api-fetch https://api.eveonline.com/server/ServerStatus.xml.aspx
//!
//! # POST a form body, gzip-compressed, through the configured proxy
//! api-fetch --config dispatch.yaml --method POST --data "keyID=1&vCode=abc" \
//!     --compression gzip https://api.eveonline.com/account/Characters.xml.aspx
//! ```

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use api_dispatch::{
    DataCompression, Dispatcher, DispatcherConfig, PostData, RequestSpec, TransportError,
};
use clap::{Parser, ValueEnum};
use http::Method;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

/// Send one request through the API dispatcher
#[derive(Parser, Debug)]
#[command(name = "api-fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target URL
    #[arg(value_name = "URL")]
    url: Url,

    /// YAML configuration file; `API_DISPATCH_*` variables override it
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// HTTP method (forced to GET when no --data is given)
    #[arg(long, short = 'X', default_value = "GET")]
    method: Method,

    /// Form-encoded body; sent as the query string for GET
    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Request body compression
    #[arg(long, value_enum, default_value_t = Compression::None)]
    compression: Compression,

    /// Accept media type
    #[arg(long, default_value = api_dispatch::DEFAULT_ACCEPT)]
    accept: String,

    /// Ask for gzip/deflate responses and decode them
    #[arg(long)]
    accept_encoded: bool,

    /// Print response headers
    #[arg(long, short = 'i')]
    include_headers: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Compression {
    None,
    Gzip,
    Deflate,
}

impl From<Compression> for DataCompression {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => DataCompression::None,
            Compression::Gzip => DataCompression::Gzip,
            Compression::Deflate => DataCompression::Deflate,
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("api_fetch=info,api_dispatch=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn spec_from_cli(cli: &Cli) -> RequestSpec {
    let mut spec = RequestSpec::new(cli.url.clone())
        .with_method(cli.method.clone())
        .with_compression(cli.compression.into())
        .with_accept(cli.accept.clone())
        .with_accept_encoded(cli.accept_encoded);
    if let Some(data) = &cli.data {
        spec = spec.with_post_data(PostData::new(data.clone()));
    }
    spec
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = DispatcherConfig::load(cli.config.as_deref())
        .context("failed to load dispatcher configuration")?;
    let dispatcher = Dispatcher::from_config(config).context("failed to build dispatcher")?;
    tracing::info!(
        url = %cli.url,
        timeout = ?dispatcher.effective_timeout(),
        max_redirects = dispatcher.max_redirects(),
        "sending request"
    );

    match dispatcher.send(spec_from_cli(cli)).await {
        Ok(outcome) => {
            eprintln!(
                "{} {} ({})",
                outcome.status().as_u16(),
                outcome.reason().unwrap_or(""),
                outcome.url()
            );
            if cli.include_headers {
                for (name, value) in outcome.headers() {
                    eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
                }
            }
            println!("{}", outcome.text());
            Ok(outcome.is_success())
        }
        Err(err) => {
            report(&err);
            Ok(false)
        }
    }
}

fn report(err: &TransportError) {
    eprintln!("Error: {err}");
    if let TransportError::HttpStatus {
        content_type: Some(content_type),
        ..
    } = err
    {
        eprintln!("  content type: {content_type}");
    }
    if let Some(io) = err.network_error() {
        eprintln!("  network error: {io} ({})", io.kind());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}
