//! VNC Authentication (security type 2).
//!
//! The server sends a 16-byte random challenge; the client answers with
//! the challenge encrypted under single DES using the password-derived,
//! bit-reversed key. Only the first 8 password bytes are significant.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::des::{encrypt_challenge, secure_zero, with_min_duration, CHALLENGE_LEN, DES_KEY_LEN};
use super::{read_exact_cancellable, write_all_cancellable, ClientAuth, SECURITY_TYPE_VNC_AUTH};
use crate::connection::RfbStream;
use crate::error::{Result, RfbError};

/// Minimum wall-clock time for computing a challenge response.
const AUTH_FLOOR: Duration = Duration::from_millis(50);

/// VNC Password authentication.
///
/// The stored password bytes are overwritten when the value is dropped.
pub struct PasswordAuth {
    password: Vec<u8>,
}

impl PasswordAuth {
    /// Creates the method from a password.
    ///
    /// Passwords longer than 8 bytes are accepted; the excess is ignored
    /// by the key schedule, matching every deployed VNC server.
    pub fn new(password: impl Into<String>) -> Self {
        let password = password.into().into_bytes();
        if password.len() > DES_KEY_LEN {
            warn!(
                length = password.len(),
                "password exceeds the 8 significant bytes of VNC authentication"
            );
        }
        PasswordAuth { password }
    }
}

impl Drop for PasswordAuth {
    fn drop(&mut self) {
        secure_zero(&mut self.password);
    }
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose password material, even its length.
        f.debug_struct("PasswordAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl ClientAuth for PasswordAuth {
    fn security_type(&self) -> u8 {
        SECURITY_TYPE_VNC_AUTH
    }

    fn name(&self) -> &'static str {
        "VNC Password"
    }

    async fn handshake(
        &self,
        stream: &mut (dyn RfbStream + '_),
        cancel: &CancellationToken,
    ) -> Result<()> {
        const OP: &str = "auth_vnc_password";

        let mut challenge = [0u8; CHALLENGE_LEN];
        read_exact_cancellable(OP, stream, &mut challenge, cancel).await?;
        debug!("received authentication challenge");

        if cancel.is_cancelled() {
            return Err(RfbError::timeout(OP, "authentication cancelled"));
        }

        // The floor plus jitter makes the total time independent of how
        // quickly the key schedule and encryption happen to run.
        let mut response =
            with_min_duration(AUTH_FLOOR, async { encrypt_challenge(&self.password, &challenge) })
                .await?;

        let sent = write_all_cancellable(OP, stream, &response, cancel).await;
        secure_zero(&mut response);
        sent?;

        debug!("authentication response sent");
        Ok(())
    }
}
