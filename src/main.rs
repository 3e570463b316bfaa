use std::process::ExitCode;

use draftauction_auctioneer::{
    config::AppConfig as _,
    telemetry,
    Config,
    Metrics,
    Service,
    BUILD_INFO,
};
use eyre::WrapErr as _;
use tokio::{
    select,
    signal::unix::{
        signal,
        SignalKind,
    },
};
use tracing::{
    error,
    info,
    warn,
};

#[tokio::main]
async fn main() -> ExitCode {
    eprintln!("{}", serde_json::to_string(&BUILD_INFO).expect("build info always serializes"));

    let cfg = match Config::get().wrap_err("failed to read configuration") {
        Ok(cfg) => cfg,
        Err(error) => {
            eprintln!("reading configuration failed:\n{error:?}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!(
        "{}",
        serde_json::to_string(&cfg).expect("config always serializes")
    );

    if let Err(error) = telemetry::configure()
        .set_filter_directives(&cfg.log)
        .set_force_stdout(cfg.force_stdout)
        .set_pretty_print(cfg.pretty_print)
        .try_init()
        .wrap_err("failed to setup telemetry")
    {
        eprintln!("initializing auctioneer failed:\n{error:?}");
        return ExitCode::FAILURE;
    }

    info!(
        config = serde_json::to_string(&cfg).expect("serializing to a string cannot fail"),
        "initializing auctioneer"
    );

    let metrics = Metrics::new();

    let mut service = match Service::spawn(cfg, metrics) {
        Ok(service) => service,
        Err(error) => {
            error!(%error, "failed initializing auctioneer");
            return ExitCode::FAILURE;
        }
    };

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting a SIGTERM listener should always work on Unix");

    select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM; shutting down");
            if let Err(error) = service.shutdown().await {
                warn!(%error, "encountered an error while shutting down");
            }
            info!("auctioneer stopped");
            ExitCode::SUCCESS
        }

        res = &mut service => {
            error!(
                error = res.err().map(tracing::field::display),
                "auctioneer task exited unexpectedly"
            );
            ExitCode::FAILURE
        }
    }
}
