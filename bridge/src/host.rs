use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use myair_common::{BridgeConfig, DeviceInfo};
use rumqttc::AsyncClient;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    task::JoinHandle,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    appliance::ApplianceClient,
    bridge::{Bridge, SharedBridge},
    cli::Args,
    myair::MyAirClient,
    scheduler::RefreshScheduler,
    transport::{mqtt_options, spawn_event_loop, with_env_overrides, MqttEvent},
};

type HostBridge = SharedBridge<MyAirClient, AsyncClient>;

const MQTT_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(500);

pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = args.config_path();
    if !config_path.is_file() {
        eprintln!("ERROR: config file not found - looking for {config_path:?}");
        std::process::exit(1);
    }
    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config = BridgeConfig::from_yaml_str(&raw)
        .with_context(|| format!("invalid config file {}", config_path.display()))?;

    let mut client = MyAirClient::new(&config.myair_settings)
        .context("failed to build MyAir HTTP client")?;
    client.update().await.with_context(|| {
        format!(
            "failed to read initial state from MyAir at {}",
            config.myair_settings.base_url()
        )
    })?;

    let mqtt_settings = with_env_overrides(&config.mqtt_settings, |key| std::env::var(key).ok());
    let refresh = &config.myair_to_mqtt_settings;
    let info = DeviceInfo {
        id: refresh.device_id.clone(),
        name: refresh.device_name.clone(),
    };
    let will = info.last_will()?;

    let (mqtt, eventloop) = AsyncClient::new(
        mqtt_options(&mqtt_settings, will),
        MQTT_CHANNEL_CAPACITY,
    );
    let bridge = Bridge::new(
        info,
        config.myair_settings.max_zones,
        client,
        mqtt.clone(),
    )?;
    info!(
        "mirroring {} zones of {} as homie device {}",
        bridge.mirror().snapshot().zones.len(),
        config.myair_settings.aircon,
        refresh.device_id
    );
    let bridge = bridge.into_shared();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let poller = spawn_event_loop(eventloop, events_tx);
    let dispatcher = spawn_dispatcher(bridge.clone(), events_rx);
    let scheduler = spawn_refresh_loop(bridge.clone(), refresh.interval());

    info!(
        "bridging MyAir at {} to mqtt://{}:{}",
        config.myair_settings.base_url(),
        mqtt_settings.broker,
        mqtt_settings.port
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    scheduler.shutdown().await;
    dispatcher.abort();
    if let Err(err) = bridge.lock().await.shutdown().await {
        warn!("failed to publish disconnected state: {err}");
    }
    mqtt.disconnect().await?;
    tokio::time::sleep(SHUTDOWN_FLUSH).await;
    poller.abort();
    Ok(())
}

fn spawn_dispatcher(
    bridge: HostBridge,
    mut events: UnboundedReceiver<MqttEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut bridge = bridge.lock().await;
            let result = match event {
                MqttEvent::Connected => bridge.start().await,
                MqttEvent::Message { topic, payload } => {
                    bridge.handle_message(&topic, &payload).await
                }
            };
            if let Err(err) = result {
                warn!("mqtt message handling error: {err}");
            }
        }
    })
}

fn spawn_refresh_loop(bridge: HostBridge, period: Duration) -> RefreshScheduler {
    RefreshScheduler::spawn(period, move || {
        let bridge = bridge.clone();
        async move {
            if let Err(err) = bridge.lock().await.update().await {
                warn!("scheduled refresh failed: {err}");
            }
        }
    })
}
