//! Mockery Mock Engine - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use mockery::{FileDefinitionSource, MockRequest, MockResponse, MockServer, MockServerConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockery",
    about = "Mock engine for HTTP APIs - request resolution, response selection and rendering",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockery.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Dispatch one request to a mount URL, e.g.
    /// /mock/rest/project/petstore/application/v1/pets/7?verbose=true
    #[arg(short, long, value_name = "URL")]
    request: Option<String>,

    /// Request method for --request
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Dispatch the request this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let server = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServer::from_source(&FileDefinitionSource::new(&args.config)).await?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no endpoints)");
        MockServer::new(MockServerConfig::default())?
    };

    if args.validate {
        println!(
            "Configuration is valid ({} endpoints defined)",
            server.endpoint_count()
        );
        return Ok(());
    }

    let Some(url) = args.request.as_deref() else {
        info!(
            endpoints = server.endpoint_count(),
            "No request given, nothing to dispatch"
        );
        return Ok(());
    };

    let request = build_request(url, &args)?;
    for _ in 0..args.repeat.max(1) {
        let response = server.dispatch(&request).await;
        print_response(&response);
    }

    let stats = server.stats();
    info!(
        total = stats.total,
        matched = stats.matched,
        not_found = stats.not_found,
        no_response = stats.no_response,
        "Dispatch finished"
    );

    Ok(())
}

fn build_request(url: &str, args: &Args) -> Result<MockRequest> {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let mut request = MockRequest::from_mount_path(args.method.to_ascii_uppercase(), path)
        .with_context(|| format!("'{}' is not a mock mount path", path))?
        .with_query(query);

    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header '{}' must look like 'Name: value'", header))?;
        request = request.with_header(name.trim(), value.trim());
    }
    if let Some(body) = &args.data {
        request = request.with_body(body.as_str());
    }

    Ok(request)
}

fn print_response(response: &MockResponse) {
    println!("HTTP {} ({})", response.status, response.outcome);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!();
    println!("{}", response.body_text());
}
