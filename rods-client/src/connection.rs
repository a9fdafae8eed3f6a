//! Connection management.
//!
//! A [`Connection`] owns one TCP stream. It performs the startup exchange
//! on connect, moves whole frames in both directions and sends the
//! disconnect notice exactly once.

use crate::config::SessionConfig;
use crate::error::ClientError;
use rods_protocol::message::{StartupPack, VersionInfo};
use rods_protocol::{Decoder, Encoder, Frame, Message, MessageType};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A connection to a catalog server.
pub struct Connection {
    stream: Option<TcpStream>,
    decoder: Decoder,
    peer: String,
    read_timeout: Option<Duration>,
    read_buffer_size: usize,
    /// Set after a transport failure; the stream position is unknown.
    poisoned: bool,
    version: VersionInfo,
}

impl Connection {
    /// Opens the socket and performs the startup exchange.
    pub async fn connect(config: &SessionConfig) -> Result<Self, ClientError> {
        let addr = config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|source| {
                tracing::debug!("Connection failed: {}", source);
                ClientError::Connect {
                    addr: addr.clone(),
                    source,
                }
            })?;

        stream.set_nodelay(true).ok();

        let mut conn = Self {
            stream: Some(stream),
            decoder: Decoder::new(),
            peer: addr,
            read_timeout: config.read_timeout,
            read_buffer_size: config.read_buffer_size,
            poisoned: false,
            version: VersionInfo::default(),
        };

        tracing::debug!("Sending startup pack for {}#{}", config.user, config.zone);
        conn.send(&Message::connect(&StartupPack::new(
            config.user.as_str(),
            config.zone.as_str(),
        )))
        .await?;

        let frame = conn.receive_frame().await?;
        if frame.int_info < 0 {
            return Err(ClientError::remote(frame.int_info, Vec::new()));
        }
        if frame.msg_type != MessageType::Version {
            return Err(ClientError::UnexpectedResponse(format!(
                "expected {} after startup, got {}",
                MessageType::Version,
                frame.msg_type
            )));
        }

        let version: VersionInfo = Message::try_from(frame)?.unpack_body()?;
        if version.status < 0 {
            return Err(ClientError::remote(version.status, Vec::new()));
        }

        tracing::info!(
            "Connected to {} (server {}, api {})",
            conn.peer,
            version.rel_version,
            version.api_version
        );
        conn.version = version;
        Ok(conn)
    }

    /// Returns the `host:port` this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Version acknowledgement received at connect time.
    pub fn server_version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.poisoned
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.poisoned {
            return Err(ClientError::Poisoned);
        }
        if self.stream.is_none() {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    /// Writes one complete message.
    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        self.ensure_usable()?;
        let encoded = Encoder::encode(message)?;
        tracing::debug!(
            "Sending {} int_info={} ({} bytes)",
            message.msg_type,
            message.int_info,
            encoded.len()
        );

        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = stream.write_all(&encoded).await {
            self.poisoned = true;
            return Err(ClientError::Io(e));
        }
        Ok(())
    }

    /// Reads exactly one frame, honoring the read timeout.
    ///
    /// Any transport or framing failure poisons the connection.
    pub async fn receive_frame(&mut self) -> Result<Frame, ClientError> {
        self.ensure_usable()?;

        let result = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_frame())
                .await
                .unwrap_or_else(|_| {
                    tracing::debug!("Read timeout");
                    Err(ClientError::Timeout)
                }),
            None => self.read_frame().await,
        };

        if let Err(e) = &result {
            if e.is_transport() || matches!(e, ClientError::Protocol(_)) {
                tracing::warn!("Connection to {} poisoned: {}", self.peer, e);
                self.poisoned = true;
            }
        }
        result
    }

    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            if let Some(frame) = self.decoder.decode_frame()? {
                tracing::debug!(
                    "Received {} int_info={} (msg={} error={} bs={})",
                    frame.msg_type,
                    frame.int_info,
                    frame.msg.len(),
                    frame.error.len(),
                    frame.bs.len()
                );
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                tracing::debug!("Connection closed (0 bytes)");
                return Err(ClientError::ConnectionClosed);
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    /// Sends the disconnect notice and closes the socket.
    ///
    /// Calling this again is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        let encoded = Encoder::encode(&Message::disconnect())?;
        if let Err(e) = stream.write_all(&encoded).await {
            tracing::warn!("Failed to send disconnect to {}: {}", self.peer, e);
        }
        stream.shutdown().await.ok();
        self.decoder.clear();

        tracing::info!("Disconnected from {}", self.peer);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        // Best effort: a full socket buffer just drops the notice.
        match Encoder::encode(&Message::disconnect()) {
            Ok(encoded) => {
                if let Err(e) = stream.try_write(&encoded) {
                    tracing::debug!("Disconnect on drop not sent to {}: {}", self.peer, e);
                }
            }
            Err(e) => tracing::debug!("Failed to encode disconnect: {}", e),
        }
    }
}
