use crate::core::store::GatewayStore;
use serde_json::Value;
use thiserror::Error;

/// Why a handler refused a dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The guild is listed but not yet available
    #[error("guild {0} is unavailable")]
    Unavailable(String),

    /// The payload is missing a field the handler needs
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Result of a successful handler run
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    /// The constructed or updated object
    pub new: Value,
    /// The previous version, when the handler replaced one
    pub old: Option<Value>,
}

impl Handled {
    pub fn new(new: Value) -> Self {
        Self { new, old: None }
    }

    pub fn with_old(mut self, old: Option<Value>) -> Self {
        self.old = old;
        self
    }
}

/// Mutable view handed to handlers while a dispatch is applied
pub struct HandlerContext<'a> {
    pub store: &'a mut GatewayStore,
    large_guilds: &'a mut Vec<String>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(store: &'a mut GatewayStore, large_guilds: &'a mut Vec<String>) -> Self {
        Self { store, large_guilds }
    }

    /// Flag a guild whose members must be requested before readiness
    pub fn mark_large(&mut self, guild_id: impl Into<String>) {
        self.large_guilds.push(guild_id.into());
    }
}

/// Converts a dispatch payload into store updates and an application object
///
/// Handlers run synchronously on the session task; they must not block.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection>;
}

impl<F> EventHandler for F
where
    F: Fn(&mut HandlerContext<'_>, &Value) -> Result<Handled, Rejection> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection> {
        self(ctx, data)
    }
}
