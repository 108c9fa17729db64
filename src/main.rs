pub mod app;
pub mod config;
pub mod controller;
pub mod sensor;

use crate::config::Config;
use crate::controller::{CalibrationController, ConsolePrinter, Report, TokioClock};
use crate::sensor::{bus, Mmc5983ma};
use color_eyre::{eyre::eyre, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const REPORT_BUFFER: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let shutdown = CancellationToken::new();
    let _watcher = app::watch_for_shutdown(tokio::signal::ctrl_c(), shutdown.clone()).await;

    let config = setup().await?;
    info!("MMC5983MA calibration demo starting");

    let i2c = match bus::open_i2c(config.sensor.i2c_bus, config.sensor.address) {
        Ok(i2c) => i2c,
        Err(e) => {
            error!("Failed to open I2C bus {}: {}", config.sensor.i2c_bus, e);
            println!("{}", Report::Banner);
            eprintln!("{}", Report::NotConnected);
            return Ok(ExitCode::FAILURE);
        }
    };
    let driver = Mmc5983ma::new(i2c, config.sensor.bandwidth, config.driver_timing());

    let (report_sender, report_receiver) = mpsc::channel(REPORT_BUFFER);
    let printer = ConsolePrinter::spawn(report_receiver);

    let controller = CalibrationController::create(
        Box::new(driver),
        Arc::new(TokioClock),
        config.controller_settings(),
        report_sender.clone(),
    );
    let outcome = app::run(controller, report_sender, shutdown).await;

    // all senders are gone once run returns, so the printer drains and exits
    let printed = printer
        .await
        .map_err(|e| eyre!("Console printer failed: {}", e))?;
    info!("Printed {} reports", printed);

    Ok(outcome?.into())
}

async fn setup() -> Result<Config> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config = Config::load_or_create(&Config::default_path()).await?;
    setup_logging_env(config.log_level()?);
    Ok(config)
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
