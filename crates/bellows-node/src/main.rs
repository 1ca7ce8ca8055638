//! The `bellows-node` binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bellows_audit::{AuditSink, MemoryAuditSink, RecordsAuditSink};
use bellows_auth::{RecordResolver, RoleAccess};
use bellows_blob::{BlobStore, FsBlobStore, S3BlobStore};
use bellows_git::{ProcessRunner, RepoDirs};
use bellows_node::config::NodeConfig;
use bellows_node::{create_router, AppState, Forge};
use bellows_records::RecordStore;

/// Bellows - a self-hosted Git forge
#[derive(Parser, Debug)]
#[command(name = "bellows-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "bellows.toml")]
    config: PathBuf,

    /// HTTP listen address (overrides config)
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// SSH listen address (overrides config)
    #[arg(long)]
    ssh_addr: Option<SocketAddr>,

    /// Repository base directory (overrides config)
    #[arg(long)]
    repo_dir: Option<PathBuf>,
}

fn init_logging(level: &str, json_format: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bellows={level},tower_http=warn").into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        NodeConfig::from_file(&args.config)?
    } else {
        NodeConfig::default()
    };
    config.merge_env()?;
    if let Some(addr) = args.http_addr {
        config.http.addr = addr;
    }
    if let Some(addr) = args.ssh_addr {
        config.ssh.addr = addr;
    }
    if let Some(dir) = args.repo_dir {
        config.storage.repo_dir = dir;
    }
    config.validate_config()?;

    init_logging(&config.logging.level, config.logging.format == "json");
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting bellows");

    // Record store, or the public-only degraded mode without one.
    let (records, storeless) = match &config.storage.records_dsn {
        Some(path) => {
            let records = RecordStore::open(path)
                .with_context(|| format!("opening record store at {}", path.display()))?;
            (records, false)
        }
        None => {
            tracing::warn!(
                "no record store configured; serving on-disk repositories read-only to the public"
            );
            (RecordStore::in_memory(), true)
        }
    };

    let audit: Arc<dyn AuditSink> = if config.storage.records_dsn.is_some() {
        Arc::new(RecordsAuditSink::new(records.clone()))
    } else {
        Arc::new(MemoryAuditSink::new())
    };

    let blobs: Arc<dyn BlobStore> = match config.s3.resolve() {
        Some(s3) => {
            tracing::info!(bucket = %s3.bucket, region = %s3.region, "lfs blobs go to S3");
            Arc::new(S3BlobStore::new(s3))
        }
        None => {
            tracing::info!(dir = %config.storage.lfs_dir.display(), "lfs blobs go to the filesystem");
            Arc::new(FsBlobStore::new(&config.storage.lfs_dir))
        }
    };

    std::fs::create_dir_all(&config.storage.repo_dir)
        .with_context(|| format!("creating {}", config.storage.repo_dir.display()))?;

    let (push_events, _) = broadcast::channel(64);
    let forge = Arc::new(Forge {
        records: records.clone(),
        storeless,
        dirs: RepoDirs::new(&config.storage.repo_dir),
        runner: Arc::new(ProcessRunner::new()),
        resolver: Arc::new(RecordResolver::new(records.clone())),
        access: Arc::new(RoleAccess::new(records)),
        blobs,
        audit,
        push_events,
    });

    // SSH transport in the background; it loads or generates the host key
    // before accepting connections.
    let ssh_config = bellows_ssh::SshConfig {
        listen_addr: config.ssh.addr,
        host_key_path: config.ssh.host_key.clone(),
    };
    let ssh_services: Arc<dyn bellows_ssh::ForgeServices> = forge.clone();
    tokio::spawn(async move {
        if let Err(e) = bellows_ssh::run(ssh_config, ssh_services).await {
            tracing::error!(error = %e, "ssh transport exited");
        }
    });

    // HTTP transport in the foreground.
    let router = create_router(AppState { forge });
    let listener = tokio::net::TcpListener::bind(config.http.addr)
        .await
        .with_context(|| format!("binding {}", config.http.addr))?;
    tracing::info!(addr = %config.http.addr, "http transport listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown requested");
}
