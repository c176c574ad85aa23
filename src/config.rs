//! Connection configuration.
//!
//! A [`ClientConfig`] is handed to
//! [`Connection::establish`](crate::connection::Connection::establish)
//! together with the byte stream. All fields have working defaults; the
//! `with_*` methods chain for ergonomic construction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::auth::{AuthRegistry, ClientAuth};
use crate::message::server::{ServerMessage, ServerMessageDecoder};
use crate::metrics::{MetricsCollector, NoOpMetrics};

/// Configuration for a VNC client connection.
pub struct ClientConfig {
    /// Authentication methods in preference order. Empty means
    /// None-authentication only.
    pub auth: Vec<Arc<dyn ClientAuth>>,
    /// Pluggable security-type registry. When set, it owns method
    /// creation and `auth` contributes only the preference order.
    pub auth_registry: Option<AuthRegistry>,
    /// Request exclusive desktop access during ClientInit.
    pub exclusive: bool,
    /// Delivery target for parsed server messages. Messages are dropped
    /// when unset.
    pub server_message_tx: Option<mpsc::Sender<ServerMessage>>,
    /// Decoders for additional server message types, tried before the
    /// built-in parsers.
    pub server_message_decoders: Vec<Arc<dyn ServerMessageDecoder>>,
    /// Metrics sink; discards by default.
    pub metrics: Arc<dyn MetricsCollector>,
    /// Deadline for the whole handshake.
    pub connect_timeout: Option<Duration>,
    /// Deadline for individual reads inside a message or handshake step.
    /// Does not bound the idle wait for the next message.
    pub read_timeout: Option<Duration>,
    /// Deadline for individual writes.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            auth: Vec::new(),
            auth_registry: None,
            exclusive: false,
            server_message_tx: None,
            server_message_decoders: Vec::new(),
            metrics: Arc::new(NoOpMetrics),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with all defaults.
    pub fn new() -> Self {
        ClientConfig::default()
    }

    /// Appends an authentication method to the preference order.
    pub fn with_auth(mut self, auth: impl ClientAuth + 'static) -> Self {
        self.auth.push(Arc::new(auth));
        self
    }

    /// Installs a custom authentication registry.
    pub fn with_auth_registry(mut self, registry: AuthRegistry) -> Self {
        self.auth_registry = Some(registry);
        self
    }

    /// Requests exclusive desktop access.
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Sets the bounded channel server messages are delivered into.
    pub fn with_server_message_channel(mut self, tx: mpsc::Sender<ServerMessage>) -> Self {
        self.server_message_tx = Some(tx);
        self
    }

    /// Registers a decoder for an additional server message type.
    pub fn with_server_message_decoder(
        mut self,
        decoder: impl ServerMessageDecoder + 'static,
    ) -> Self {
        self.server_message_decoders.push(Arc::new(decoder));
        self
    }

    /// Sets the metrics sink.
    pub fn with_metrics(mut self, metrics: impl MetricsCollector + 'static) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Bounds the whole handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bounds individual read operations.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Bounds individual write operations.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Sets both read and write timeouts to the same value.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_read_timeout(timeout).with_write_timeout(timeout)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("auth_methods", &self.auth.len())
            .field("auth_registry", &self.auth_registry)
            .field("exclusive", &self.exclusive)
            .field("has_message_channel", &self.server_message_tx.is_some())
            .field("custom_decoders", &self.server_message_decoders.len())
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthNone, PasswordAuth};

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.auth.is_empty());
        assert!(config.auth_registry.is_none());
        assert!(!config.exclusive);
        assert!(config.server_message_tx.is_none());
        assert!(config.server_message_decoders.is_empty());
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let (tx, _rx) = mpsc::channel(16);
        let config = ClientConfig::new()
            .with_auth(PasswordAuth::new("secret"))
            .with_auth(AuthNone)
            .with_exclusive(true)
            .with_server_message_channel(tx)
            .with_connect_timeout(Duration::from_secs(30))
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.auth.len(), 2);
        assert_eq!(config.auth[0].security_type(), 2);
        assert_eq!(config.auth[1].security_type(), 1);
        assert!(config.exclusive);
        assert!(config.server_message_tx.is_some());
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.write_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_with_auth_registry() {
        let config = ClientConfig::new().with_auth_registry(AuthRegistry::with_defaults());
        let registry = config.auth_registry.as_ref().unwrap();
        assert!(registry.is_supported(1));
        assert!(registry.is_supported(2));
    }

    #[test]
    fn test_debug_output() {
        let config = ClientConfig::new().with_exclusive(true);
        let debug = format!("{config:?}");
        assert!(debug.contains("ClientConfig"));
        assert!(debug.contains("exclusive: true"));
    }
}
