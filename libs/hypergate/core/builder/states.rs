/// Type-state markers for the builder pattern
///
/// A client cannot be built before a token is set.

/// Marker trait for token state
pub trait TokenState {}

/// Token has not been set
pub struct NoToken;
impl TokenState for NoToken {}

/// Token has been set
pub struct HasToken;
impl TokenState for HasToken {}
