//! harvesterd - periodic node metadata collection served over HTTP.
//!
//! Runs the configured collectors every interval, keeps the latest report in
//! memory, mirrors it to an output file and serves it on `/metadata`.

mod auth;
mod background;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use harvester_core::{RunOptions, SchemaSource, load_collectors};

use auth::{AccessLogLayer, TokenAuthLayer, TokenSet};
use background::CollectJob;
use state::SharedState;

// ============================================================
// CLI
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "harvesterd", about = "Node metadata harvesting daemon", version = harvester_core::VERSION)]
struct Args {
    /// Comma-separated collector names to run.
    #[arg(
        long,
        env = "HARVESTER_COLLECTORS",
        default_value = "null",
        value_delimiter = ','
    )]
    collectors: Vec<String>,

    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:18080", env = "HARVESTER_LISTEN")]
    listen: String,

    /// Collection interval in seconds.
    #[arg(
        long,
        default_value = "300",
        env = "HARVESTER_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// File the latest report is written to after every run.
    #[arg(
        long,
        default_value = "/var/lib/harvester/harvested-data.json",
        env = "HARVESTER_OUTPUT"
    )]
    output: PathBuf,

    /// JSON Schema used instead of the bundled one.
    #[arg(long, env = "HARVESTER_SCHEMA")]
    schema: Option<PathBuf>,

    /// Skip schema validation.
    #[arg(long, env = "HARVESTER_NO_VALIDATE")]
    no_validate: bool,

    /// Directories with collector manifests, later ones win.
    #[arg(
        long = "plugin-dir",
        value_name = "DIR",
        env = "HARVESTER_PLUGIN_DIRS",
        value_delimiter = ','
    )]
    plugin_dirs: Vec<PathBuf>,

    /// Accepted bearer token (repeatable, or comma-separated in the environment).
    #[arg(long = "auth-token", env = "HARVESTER_AUTH_TOKENS", value_delimiter = ',')]
    auth_tokens: Vec<String>,

    /// JSON file with token entries: [{"token": "...", "label": "...", "enabled": true}].
    #[arg(long, env = "HARVESTER_AUTH_TOKEN_FILE")]
    auth_token_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber. Default level is INFO, -q shows errors only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["harvesterd", "harvester_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// Router
// ============================================================

fn router(state: SharedState, tokens: Arc<TokenSet>) -> Router {
    let mut app = Router::new()
        .route("/metadata", get(handlers::handle_metadata))
        .route("/healthz", get(handlers::handle_healthz))
        .fallback(handlers::handle_not_found)
        .with_state(state);

    if !tokens.is_empty() {
        app = app.layer(TokenAuthLayer { tokens });
    }

    // Outermost, so rejected requests are logged too.
    app.layer(AccessLogLayer).layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    info!(version = harvester_core::VERSION, "harvesterd starting");

    let tokens = match TokenSet::load(&args.auth_tokens, args.auth_token_file.as_deref()) {
        Ok(tokens) => Arc::new(tokens),
        Err(e) => {
            error!(error = %e, "cannot load auth tokens");
            process::exit(1);
        }
    };
    if tokens.is_empty() {
        info!("auth disabled (no tokens configured)");
    } else {
        info!(tokens = tokens.len(), "auth enabled");
    }

    let addr: SocketAddr = match args.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(listen = %args.listen, error = %e, "invalid listen address");
            process::exit(1);
        }
    };

    let job = Arc::new(CollectJob {
        registry: load_collectors(&args.plugin_dirs),
        collectors: args.collectors.clone(),
        options: RunOptions {
            schema: args.schema.clone().map(SchemaSource::Path).unwrap_or_default(),
            validate: !args.no_validate,
        },
        output: Some(args.output.clone()),
    });
    info!(
        collectors = %args.collectors.join(","),
        interval_s = args.interval,
        output = %args.output.display(),
        "collection configured"
    );

    let state = state::new_state();
    {
        let state = state.clone();
        let interval = Duration::from_secs(args.interval);
        tokio::spawn(async move {
            background::collect_loop(state, job, interval).await;
        });
    }

    let app = router(state, tokens).into_make_service_with_connect_info::<SocketAddr>();

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(%addr, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn get_json(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn protected() -> Arc<TokenSet> {
        Arc::new(TokenSet::from_tokens(&["s3cret".into()]))
    }

    #[tokio::test]
    async fn test_metadata_serves_latest_slot() {
        let state = state::new_state();
        let app = router(state.clone(), Arc::new(TokenSet::default()));
        let (status, headers, body) = get_json(app.clone(), request("/metadata")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(body, json!({}));

        state::publish(&state, json!({"null": {"metadata": {"collector_name": "null"}}}));
        let (_, _, body) = get_json(app, request("/metadata")).await;
        assert_eq!(body["null"]["metadata"]["collector_name"], "null");
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = router(state::new_state(), Arc::new(TokenSet::default()));
        let response = app.oneshot(request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok\n");
    }

    #[tokio::test]
    async fn test_unknown_path_lists_endpoints() {
        let app = router(state::new_state(), Arc::new(TokenSet::default()));
        let (status, _, body) = get_json(app, request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found", "endpoints": ["/metadata", "/healthz"]}));
    }

    #[tokio::test]
    async fn test_auth_required_when_tokens_configured() {
        let app = router(state::new_state(), protected());

        let (status, headers, body) = get_json(app.clone(), request("/metadata")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body, json!({"error": "unauthorized", "reason": "missing_token"}));

        let wrong = Request::builder()
            .uri("/healthz")
            .header("X-Auth-Token", "guess")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = get_json(app.clone(), wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["reason"], "invalid_token");

        let good = Request::builder()
            .uri("/metadata")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(good).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.extensions().get::<auth::TokenLabel>(),
            Some(&auth::TokenLabel("env-1".into()))
        );
    }

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["harvesterd"]).unwrap();
        assert_eq!(args.listen, "0.0.0.0:18080");
        assert_eq!(args.interval, 300);
        assert_eq!(args.collectors, ["null"]);
        assert!(Args::try_parse_from(["harvesterd", "--interval", "0"]).is_err());

        let args = Args::try_parse_from(["harvesterd", "--collectors", "polkadot,reth"]).unwrap();
        assert_eq!(args.collectors, ["polkadot", "reth"]);
    }
}
