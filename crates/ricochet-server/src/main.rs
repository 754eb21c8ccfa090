//! ricochet-serve
//!
//! Loads parameter definitions and serves render sessions over HTTP.
//!
//! ```text
//! ricochet-serve [--bind=127.0.0.1:8480] [--config=path/to/ricochet.yaml] [--render-ttl-secs=1800]
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use ricochet::{DEFAULT_RENDER_TTL, Engine, HostEnvironment};
use ricochet_config::ResolvedConfig;
use ricochet_server::{AppState, build_router, spawn_idle_sweeper};

const DEFAULT_BIND: &str = "127.0.0.1:8480";

/// CLI arguments
struct Args {
    /// HTTP bind address
    bind: SocketAddr,
    /// Explicit config file; discovered from the working directory otherwise
    config: Option<Utf8PathBuf>,
    /// Idle time after which a render is closed
    render_ttl: Duration,
}

fn parse_args() -> Result<Args> {
    let mut bind = None;
    let mut config = None;
    let mut render_ttl = DEFAULT_RENDER_TTL;

    for arg in std::env::args().skip(1) {
        if let Some(value) = arg.strip_prefix("--bind=") {
            bind = Some(value.parse()?);
        } else if let Some(value) = arg.strip_prefix("--config=") {
            config = Some(Utf8PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--render-ttl-secs=") {
            render_ttl = Duration::from_secs(value.parse()?);
        } else {
            return Err(eyre!("unknown argument: {arg}"));
        }
    }

    Ok(Args {
        bind: match bind {
            Some(bind) => bind,
            None => DEFAULT_BIND.parse()?,
        },
        config,
        render_ttl,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ricochet=info,ricochet_server=info".into()),
        )
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => ResolvedConfig::load(path)?,
        None => ResolvedConfig::discover()?
            .ok_or_else(|| eyre!("no .config/ricochet.yaml found; pass --config=<path>"))?,
    };

    let engine = Engine::new(Arc::new(config.runner.build_runner()))
        .with_host_environment(HostEnvironment::capture());
    let state = Arc::new(AppState::new(engine, config).with_render_ttl(args.render_ttl));
    spawn_idle_sweeper(state.clone());
    let app = build_router(state);

    tracing::info!(
        bind = %args.bind,
        render_ttl_secs = args.render_ttl.as_secs(),
        "HTTP server listening"
    );
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
