pub mod error;
pub mod handler;
pub mod locator;
pub mod reconnect;
pub mod transport;

pub use error::{GatewayError, Result};
pub use handler::{EventHandler, Handled, HandlerContext, Rejection};
pub use locator::{GatewayLocator, StaticLocator};
pub use reconnect::{ExponentialBackoff, FixedDelay, Immediate, NeverReconnect, ReconnectionStrategy};
pub use transport::{CloseFrame, Connection, Connector, Frame, WsMessage};
