use anyhow::Result;
use corduroy::bin_common::{
    init_logging_with_level, load_config_from_env, BinaryRunner, ClientConfig, ConfigType,
    RunConfig, ShutdownManager,
};
use corduroy::hypergate::{GatewayClient, GatewayEvent};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Connects one gateway session and logs what it sees until Ctrl+C
struct GatewayApp {
    run_config: RunConfig,
    client: Option<GatewayClient>,
    shutdown: ShutdownManager,
}

impl GatewayApp {
    fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected => info!("Connected to gateway"),
            GatewayEvent::Ready => info!("Session ready"),
            GatewayEvent::Reconnecting(count) => warn!("Reconnecting (attempt {})", count),
            GatewayEvent::Reconnected => info!("Session resumed"),
            GatewayEvent::Disconnected { code, reason } => {
                warn!("Disconnected: {} {}", code, reason)
            }
            GatewayEvent::Dispatch { event, .. } => info!("Dispatch: {}", event),
            GatewayEvent::Error(message) => error!("Gateway error: {}", message),
            GatewayEvent::HeartbeatAck { .. } | GatewayEvent::RawPayload(_) => {}
        }
    }
}

impl BinaryRunner for GatewayApp {
    async fn run(&mut self) -> Result<Option<String>> {
        let Some(client) = self.client.take() else {
            return Ok(None);
        };

        let status_interval = Duration::from_secs(self.run_config.status_interval_secs);
        let mut last_status = Instant::now();

        while self.shutdown.is_running() && !client.is_finished() {
            while let Some(event) = client.try_recv_event() {
                self.handle(event);
            }

            if last_status.elapsed() >= status_interval {
                let metrics = client.metrics();
                info!(
                    "Status: {:?}, {} frames in, {} frames out, latency {}ms",
                    metrics.connection_state,
                    metrics.frames_received,
                    metrics.frames_sent,
                    metrics.last_latency_ms
                );
                last_status = Instant::now();
            }

            self.shutdown
                .interruptible_sleep(Duration::from_millis(100))
                .await;
        }

        let metrics = client.metrics();
        let summary = format!(
            "Reconnects: {}, heartbeats: {}/{} acknowledged",
            metrics.reconnect_count, metrics.heartbeat_acks, metrics.heartbeats_sent
        );

        if client.is_finished() {
            client.wait().await?;
        } else {
            client.shutdown().await?;
        }

        Ok(Some(summary))
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Gateway);
    let config = ClientConfig::load(&config_path)?;

    init_logging_with_level(&config.log_level);
    config.log();

    let client = config.builder()?.build()?;

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut app = GatewayApp {
        run_config: RunConfig::new("Gateway client").with_status_interval(60),
        client: Some(client),
        shutdown,
    };
    app.execute().await
}
