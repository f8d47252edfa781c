#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use args::Args;
use clap::Parser;
use conduit_config::Config;
use conduit_server::Server;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    let _telemetry_guard = conduit_telemetry::init(config.telemetry.as_ref(), &args.log)?;

    tracing::info!(
        config_path = %args.config.display(),
        agent = %config.agent.command.display(),
        max_sessions = config.agent.max_sessions,
        "starting conduit"
    );

    let server = Box::pin(Server::new(config)).await?;
    tracing::debug!(listen = %server.listen_address(), "server assembled");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to install signal handlers, shutting down"),
        }
        signal_token.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("conduit stopped");
    Ok(())
}

/// Wait for `SIGINT` or `SIGTERM`
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
