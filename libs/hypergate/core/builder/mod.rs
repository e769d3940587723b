pub mod states;

use crate::core::client::GatewayClient;
use crate::core::config::GatewayConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::dispatcher::Dispatcher;
use crate::core::session::{GatewayContext, GatewaySession};
use crate::core::store::GatewayStore;
use crate::core::websocket::WebSocketConnector;
use crate::traits::*;
use hyperrest::{RateLimitedClient, RestConfig};
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`GatewayClient`]
///
/// Only the token is required. Discovery defaults to the REST API, the
/// transport to tokio-tungstenite and reconnection to [`Immediate`].
pub struct GatewayClientBuilder<T: TokenState> {
    _state: PhantomData<T>,
    config: GatewayConfig,
    connector: Option<Arc<dyn Connector>>,
    locator: Option<Arc<dyn GatewayLocator>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    handlers: Vec<(String, Arc<dyn EventHandler>, Vec<String>)>,
    default_handlers: bool,
}

impl GatewayClientBuilder<NoToken> {
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            config: GatewayConfig::new(String::new()),
            connector: None,
            locator: None,
            reconnect_strategy: None,
            handlers: Vec::new(),
            default_handlers: true,
        }
    }

    pub fn token(self, token: impl Into<String>) -> GatewayClientBuilder<HasToken> {
        GatewayClientBuilder {
            _state: PhantomData,
            config: GatewayConfig {
                token: token.into(),
                ..self.config
            },
            connector: self.connector,
            locator: self.locator,
            reconnect_strategy: self.reconnect_strategy,
            handlers: self.handlers,
            default_handlers: self.default_handlers,
        }
    }
}

impl Default for GatewayClientBuilder<NoToken> {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClientBuilder<HasToken> {
    /// Start from a complete configuration, e.g. one loaded from YAML
    pub fn from_config(config: GatewayConfig) -> Self {
        Self {
            _state: PhantomData,
            config,
            connector: None,
            locator: None,
            reconnect_strategy: None,
            handlers: Vec::new(),
            default_handlers: true,
        }
    }

    /// Validate the configuration and spawn the session
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<GatewayClient> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let locator: Arc<dyn GatewayLocator> = match self.locator {
            Some(locator) => locator,
            None => Arc::new(RateLimitedClient::new(RestConfig::new(config.token.clone()))?),
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(Immediate));

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut dispatcher = if self.default_handlers {
            Dispatcher::with_default_handlers(event_tx.clone())
        } else {
            Dispatcher::new(event_tx.clone())
        };
        for (event, handler, aliases) in self.handlers {
            dispatcher.register(event, handler, aliases);
        }

        let ctx = GatewayContext {
            config,
            connector,
            locator,
            store: GatewayStore::shared(),
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::new()),
        };
        let session = GatewaySession::new(ctx.clone(), dispatcher, reconnect_strategy, event_tx, command_rx);

        Ok(GatewayClient::spawn(ctx, session, command_tx, event_rx))
    }
}

impl<T: TokenState> GatewayClientBuilder<T> {
    /// Identify as shard `id` of `count`
    pub fn shard(mut self, id: u32, count: u32) -> Self {
        self.config.shard = Some((id, count));
        self
    }

    pub fn pm_channels(mut self, enabled: bool) -> Self {
        self.config.pm_channels = enabled;
        self
    }

    pub fn load_all_members(mut self, enabled: bool) -> Self {
        self.config.load_all_members = enabled;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.config.compress = enabled;
        self
    }

    pub fn fallback_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.config.fallback_gateway_url = url.into();
        self
    }

    pub fn unavailable_guild_timeout(mut self, timeout: Duration) -> Self {
        self.config.unavailable_guild_timeout = timeout;
        self
    }

    pub fn chunk_check_interval(mut self, interval: Duration) -> Self {
        self.config.chunk_check_interval = interval;
        self
    }

    pub fn chunk_stagger(mut self, stagger: Duration) -> Self {
        self.config.chunk_stagger = stagger;
        self
    }

    pub fn chunk_batch_size(mut self, size: usize) -> Self {
        self.config.chunk_batch_size = size;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Replace the WebSocket transport
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace gateway discovery
    pub fn locator(mut self, locator: Arc<dyn GatewayLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Register a dispatch handler, published under `event` and every alias
    pub fn handler<H>(mut self, event: impl Into<String>, handler: H, aliases: &[&str]) -> Self
    where
        H: EventHandler,
    {
        let aliases = aliases.iter().map(|alias| alias.to_string()).collect();
        self.handlers.push((event.into(), Arc::new(handler), aliases));
        self
    }

    /// Do not register the built-in GUILD_CREATE, CHANNEL_CREATE and MESSAGE_CREATE handlers
    pub fn without_default_handlers(mut self) -> Self {
        self.default_handlers = false;
        self
    }
}
