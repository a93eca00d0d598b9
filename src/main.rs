//! astrodash - Combined weather and astronomy forecast
//!
//! Prints a multi-day forecast pairing Open-Meteo weather with NASA
//! astronomy events for one location, optionally refreshing in a loop.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use astrodash::cli::{format_forecast, Cli, RunOptions};
use astrodash::combined::CombinedForecastManager;
use astrodash::data::CombinedForecast;
use astrodash::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};
use astrodash::transport::ReqwestTransport;

/// Prints a forecast in the selected format
fn print_forecast(forecast: &CombinedForecast, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(forecast)?);
    } else {
        println!("{}", format_forecast(forecast));
    }
    Ok(())
}

/// Refreshes on `interval` until Ctrl-C
async fn watch(
    coordinator: Arc<CombinedForecastManager>,
    interval: Duration,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut handle = RefreshHandle::spawn(
        coordinator,
        RefreshConfig {
            interval,
            enabled: true,
        },
    );

    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(RefreshMessage::CombinedUpdated(forecast)) => {
                    print_forecast(&forecast, json)?;
                }
                Some(RefreshMessage::RefreshError(e)) => eprintln!("Error: {}", e),
                Some(RefreshMessage::RefreshStarted | RefreshMessage::RefreshCompleted) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays clean for the forecast
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = match RunOptions::load(&cli) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let transport = Arc::new(ReqwestTransport::new(&options.config.http)?);
    let coordinator = Arc::new(CombinedForecastManager::from_config(
        &options.config,
        options.location.clone(),
        transport,
    ));

    let succeeded = match coordinator.get_combined_forecast(None, false).await {
        Ok(forecast) => {
            print_forecast(&forecast, options.json)?;
            true
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    };

    if let Some(interval) = options.watch {
        watch(coordinator.clone(), interval, options.json).await?;
    }

    coordinator.shutdown().await;
    if !succeeded && options.watch.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
