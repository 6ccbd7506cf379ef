use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;

use lib_common::connections::{BackendLink, ReconnectPolicy};
use lib_common::core::{Reporter, WebserviceSink};
use lib_common::ingestors::ChatterPollingPlugin;
use lib_common::loggers::{install_panic_hook, Telemetry};
use lib_common::retrieve::ClientOptions;
use lib_common::twitch::{ChannelStreams, ChatterList, TwitchApi};

mod chatter_logic;
use chatter_logic::{config, logger};

const APP_NAME: &str = "server_chatters";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::load_config().context("Failed to load configuration")?;

    let http_options = ClientOptions {
        max_retries: settings.http_max_retries,
        timeout: settings.http_timeout,
        ..Default::default()
    };

    let telemetry = match &settings.telemetry_url {
        Some(url) => {
            let (telemetry, _forwarder) = Telemetry::spawn(url, APP_NAME, http_options.clone())
                .context("Failed to set up telemetry")?;
            Some(telemetry)
        }
        None => None,
    };
    logger::setup_logging(&settings.log_dir, &settings.log_level, telemetry)?;
    install_panic_hook();

    log::info!(
        "Starting {} for {} (channel id {})",
        APP_NAME,
        settings.channel_name,
        settings.channel_id
    );

    let api = TwitchApi::new(&settings.twitch_api_url, &settings.client_id, http_options.clone())
        .context("Invalid Twitch API settings")?;
    let streams = ChannelStreams::new(Arc::new(api), settings.channel_id.clone());
    let chatters = ChatterList::new(&settings.chatters_url, http_options.clone()).context("Invalid CHATTERS_URL")?;
    let sink = WebserviceSink::new(&settings.webservice_url, http_options).context("Invalid WEBSERVICE_URL")?;

    let (link, link_handle) = BackendLink::new(
        settings.ws_service.clone(),
        ReconnectPolicy::fixed(settings.reconnect_delay),
    );
    let reporter = Reporter::new(Arc::new(link_handle), Arc::new(sink));

    let plugin = Arc::new(ChatterPollingPlugin::new(
        settings.channel_name.clone(),
        Arc::new(streams),
        Arc::new(chatters),
        reporter,
        settings.poll_interval,
    ));

    let link_task = tokio::spawn(link.run());
    let poll_task = tokio::spawn(plugin.run());

    wait_for_shutdown().await?;

    link_task.abort();
    poll_task.abort();

    log::info!("Shutdown complete.");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                log::info!("Ctrl-C received, initiating shutdown.");
            }
            _ = term_signal.recv() => {
                log::info!("SIGTERM received, initiating shutdown.");
            }
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        log::info!("Ctrl-C received, initiating shutdown.");
    }
    Ok(())
}
