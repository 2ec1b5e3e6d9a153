use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fleetwatch::{
    acceptor::{self, SessionAcceptor},
    alerts::SinkFactory,
    applier::ChangeApplier,
    config::{read_config_file, Config},
    hydrate,
    repository::{NatsRepository, Repository},
    scheduler::Scheduler,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value = "config.json")]
    file: String,
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level: LevelFilter = config
        .log_level
        .to_lowercase()
        .parse()
        .unwrap_or(LevelFilter::INFO);

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("error creating log directory {}", config.log_dir))?;
    let file_name = config
        .log_syntax
        .replace("%date%", &chrono::Local::now().format("%Y-%m-%d").to_string());
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(std::path::Path::new(&config.log_dir).join(file_name))
        .context("error opening log file")?;

    let filter = filter::Targets::new()
        .with_target("fleetwatch", level)
        .with_target("server", level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = read_config_file(&args.file)?;
    init_logging(&config)?;
    trace!("started with args: {args:?}");

    info!("starting fleetwatch server");

    // Certificate problems are fatal before anything else spins up.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let tls = acceptor::load_tls_config(&config.cert_file, &config.key_file)?;

    info!("connecting to nats at {}", config.nats_url);
    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("error connecting to nats")?;
    let repo: Arc<dyn Repository> = Arc::new(NatsRepository::new(
        nats.clone(),
        Duration::from_secs(config.nats_delay),
    ));

    info!("hydrating the fleet");
    let fleet = Arc::new(
        hydrate::hydrate(repo.as_ref())
            .await
            .context("something went wrong hydrating the fleet")?,
    );

    let shutdown = CancellationToken::new();

    let sink_factory = Arc::new(SinkFactory::new(config.notifications.clone()));
    let applier = ChangeApplier::new(fleet.clone(), repo.clone(), sink_factory);
    let applier_handle = tokio::spawn(applier.run(nats.clone(), shutdown.clone()));
    info!("listening for database changes");

    let scheduler = Scheduler::new(
        fleet.clone(),
        repo.clone(),
        Duration::from_secs(config.interval),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));
    info!("scheduler started");

    let listener = TcpListener::bind(&config.server_ip)
        .await
        .with_context(|| format!("error binding TLS listener on {}", config.server_ip))?;
    info!("tls server listening on {}", config.server_ip);
    let session_acceptor = SessionAcceptor::new(fleet.clone(), config.password.clone());
    let acceptor_handle = tokio::spawn(session_acceptor.run(listener, tls, shutdown.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping"),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    shutdown.cancel();
    let _ = acceptor_handle.await;
    let _ = scheduler_handle.await;
    if let Ok(Err(err)) = applier_handle.await {
        error!("change applier failed: {err:#}");
    }

    info!("all tasks stopped, exiting");
    Ok(())
}
