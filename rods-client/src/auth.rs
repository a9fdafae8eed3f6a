//! Challenge/response authentication.
//!
//! The server sends a nonce; the client answers with
//! `MD5(nonce || pad(password))` where every zero byte of the digest is
//! replaced by `0x01`.

use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;
use md5::{Digest, Md5};
use rods_protocol::message::{AuthChallenge, AuthResponse};
use rods_protocol::{ApiNumber, MAX_PASSWORD_LENGTH};

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// The last attempt was rejected; the next call tries again.
    Failed,
}

/// Right-pads the password with NUL bytes, truncating longer passwords.
pub fn pad_password(password: &str) -> [u8; MAX_PASSWORD_LENGTH] {
    let mut padded = [0u8; MAX_PASSWORD_LENGTH];
    let bytes = password.as_bytes();
    let len = bytes.len().min(MAX_PASSWORD_LENGTH);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

/// Computes the response digest for a challenge.
pub fn challenge_response(challenge: &[u8], password: &str) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(challenge);
    hasher.update(pad_password(password));
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());

    // The server treats the digest as a C string.
    for byte in digest.iter_mut().filter(|b| **b == 0) {
        *byte = 1;
    }
    digest
}

impl Connection {
    /// Runs the two-step handshake.
    ///
    /// Any server-side rejection is reported as
    /// [`ClientError::Authentication`]; transport failures pass through.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), ClientError> {
        tracing::debug!("Requesting auth challenge for {}", user);
        let reply = self
            .call(ApiNumber::AuthRequest, None, Bytes::new())
            .await
            .map_err(rejected)?;
        let challenge: AuthChallenge = reply.unpack_body()?;

        let response = AuthResponse {
            response: challenge_response(&challenge.challenge, password).to_vec(),
            username: user.to_string(),
        };
        let reply = self
            .request(ApiNumber::AuthResponse, &response)
            .await
            .map_err(rejected)?;

        if reply.error.is_some() {
            return Err(ClientError::Authentication(
                "server returned an error with the auth response".to_string(),
            ));
        }

        tracing::info!("Authenticated as {}", user);
        Ok(())
    }
}

fn rejected(err: ClientError) -> ClientError {
    match err {
        ClientError::Remote {
            kind,
            code,
            messages,
        } => {
            let mut reason = format!("{} ({})", kind, code);
            if let Some(first) = messages.first() {
                reason.push_str(": ");
                reason.push_str(first);
            }
            ClientError::Authentication(reason)
        }
        other => other,
    }
}
