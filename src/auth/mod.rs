//! Security type negotiation and authentication methods.
//!
//! A registry maps RFB security type codes to factories so applications
//! can plug in methods beyond the built-in None (type 1) and VNC Password
//! (type 2). Negotiation picks the first client-preferred type that the
//! server offers and the registry knows.

mod des;
mod password;

pub use des::{constant_time_eq, encrypt_challenge, secure_zero, CHALLENGE_LEN, DES_KEY_LEN};
pub use password::PasswordAuth;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::RfbStream;
use crate::error::{Result, RfbError};

/// Security type code for the None method.
pub const SECURITY_TYPE_NONE: u8 = 1;

/// Security type code for VNC Authentication (DES challenge-response).
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

/// A client-side authentication method.
///
/// Implementations exchange whatever bytes their security type requires
/// on the handshake stream. Every read and write must remain responsive
/// to the cancellation token.
#[async_trait]
pub trait ClientAuth: Send + Sync + std::fmt::Debug {
    /// The RFB security type code this method implements.
    fn security_type(&self) -> u8;

    /// Human-readable method name for logging.
    fn name(&self) -> &'static str;

    /// Performs the method's part of the handshake.
    async fn handshake(
        &self,
        stream: &mut (dyn RfbStream + '_),
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// The None authentication method (security type 1): no bytes exchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthNone;

#[async_trait]
impl ClientAuth for AuthNone {
    fn security_type(&self) -> u8 {
        SECURITY_TYPE_NONE
    }

    fn name(&self) -> &'static str {
        "None"
    }

    async fn handshake(
        &self,
        _stream: &mut (dyn RfbStream + '_),
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(RfbError::timeout("auth_none", "authentication cancelled"));
        }
        debug!("none authentication completed");
        Ok(())
    }
}

/// Factory that builds a fresh authentication method instance.
pub type AuthFactory = Box<dyn Fn() -> Box<dyn ClientAuth> + Send + Sync>;

/// Registry of pluggable authentication methods keyed by security type.
#[derive(Default)]
pub struct AuthRegistry {
    factories: RwLock<HashMap<u8, AuthFactory>>,
}

impl AuthRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        AuthRegistry::default()
    }

    /// Creates a registry with the default methods registered:
    /// None (type 1) and VNC Password with an empty password (type 2).
    ///
    /// Callers that need VNC Password should re-register type 2 with a
    /// factory that carries the real credential.
    pub fn with_defaults() -> Self {
        let registry = AuthRegistry::new();
        registry.register(SECURITY_TYPE_NONE, || Box::new(AuthNone));
        registry.register(SECURITY_TYPE_VNC_AUTH, || Box::new(PasswordAuth::new("")));
        registry
    }

    /// Registers a factory for a security type, replacing any previous
    /// registration.
    pub fn register<F>(&self, security_type: u8, factory: F)
    where
        F: Fn() -> Box<dyn ClientAuth> + Send + Sync + 'static,
    {
        debug!(security_type, "registering authentication method");
        self.factories_mut().insert(security_type, Box::new(factory));
    }

    /// Removes a security type from the registry. Returns whether a
    /// registration existed.
    pub fn unregister(&self, security_type: u8) -> bool {
        self.factories_mut().remove(&security_type).is_some()
    }

    /// Instantiates the method registered for `security_type`.
    pub fn create(&self, security_type: u8) -> Result<Box<dyn ClientAuth>> {
        let factories = self.factories();
        match factories.get(&security_type) {
            Some(factory) => Ok(factory()),
            None => Err(RfbError::unsupported(
                "auth_registry_create",
                format!("unsupported security type: {security_type}"),
            )),
        }
    }

    /// Returns the registered security types in ascending order.
    pub fn supported_types(&self) -> Vec<u8> {
        let mut types: Vec<u8> = self.factories().keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Returns whether `security_type` has a registered factory.
    pub fn is_supported(&self, security_type: u8) -> bool {
        self.factories().contains_key(&security_type)
    }

    /// Negotiates a method against the server's offered types.
    ///
    /// `preferred` gives the client's preference order; when empty, the
    /// server's offer order is used. The first type that is both offered
    /// and registered wins. Disjoint sets fail with `Unsupported`.
    pub fn negotiate(
        &self,
        server_types: &[u8],
        preferred: &[u8],
    ) -> Result<(Box<dyn ClientAuth>, u8)> {
        const OP: &str = "auth_negotiate";

        let order: &[u8] = if preferred.is_empty() {
            server_types
        } else {
            preferred
        };

        for &candidate in order {
            if server_types.contains(&candidate) && self.is_supported(candidate) {
                let auth = self.create(candidate)?;
                debug!(
                    security_type = candidate,
                    method = auth.name(),
                    "authentication method negotiated"
                );
                return Ok((auth, candidate));
            }
        }

        Err(RfbError::unsupported(
            OP,
            format!(
                "no mutual authentication method; server offered {server_types:?}, client supports {:?}",
                self.supported_types()
            ),
        ))
    }

    fn factories(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u8, AuthFactory>> {
        self.factories.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn factories_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u8, AuthFactory>> {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

/// Selects the method to use from the connection configuration.
///
/// When a registry is configured it owns method creation, with the
/// configured instances contributing only their preference order.
/// Otherwise the first configured instance whose type the server offered
/// is used, defaulting to [`AuthNone`].
pub(crate) fn negotiate_from_config(
    auth: &[Arc<dyn ClientAuth>],
    registry: Option<&AuthRegistry>,
    server_types: &[u8],
) -> Result<(Arc<dyn ClientAuth>, u8)> {
    const OP: &str = "auth_negotiate";

    if let Some(registry) = registry {
        let preferred: Vec<u8> = auth.iter().map(|a| a.security_type()).collect();
        let (method, security_type) = registry.negotiate(server_types, &preferred)?;
        return Ok((Arc::from(method), security_type));
    }

    let default_auth: Vec<Arc<dyn ClientAuth>> = vec![Arc::new(AuthNone)];
    let candidates = if auth.is_empty() { &default_auth } else { auth };

    for method in candidates {
        let security_type = method.security_type();
        if server_types.contains(&security_type) {
            return Ok((Arc::clone(method), security_type));
        }
    }

    Err(RfbError::unsupported(
        OP,
        format!("no suitable auth scheme found; server offered {server_types:?}"),
    ))
}

/// Reads exactly `buf.len()` bytes, racing the cancellation token.
pub(crate) async fn read_exact_cancellable(
    op: &'static str,
    stream: &mut (dyn RfbStream + '_),
    buf: &mut [u8],
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RfbError::timeout(op, "operation cancelled")),
        result = stream.read_exact(buf) => {
            result.map(|_| ()).map_err(|e| RfbError::io(op, e))
        }
    }
}

/// Writes all of `data`, racing the cancellation token.
pub(crate) async fn write_all_cancellable(
    op: &'static str,
    stream: &mut (dyn RfbStream + '_),
    data: &[u8],
    cancel: &CancellationToken,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    tokio::select! {
        _ = cancel.cancelled() => Err(RfbError::timeout(op, "operation cancelled")),
        result = async {
            stream.write_all(data).await?;
            stream.flush().await
        } => result.map_err(|e| RfbError::io(op, e)),
    }
}
