//! Request/response invocation.
//!
//! One call is exactly one request followed by exactly one reply. A
//! negative status in the reply header becomes a typed
//! [`ClientError::Remote`] before the body is interpreted.

use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;
use rods_protocol::message::RError;
use rods_protocol::{ApiNumber, Frame, Message, MessageType, Pack, PackedStruct};

impl Connection {
    /// Invokes one server procedure and returns its reply.
    pub async fn call(
        &mut self,
        api: ApiNumber,
        body: Option<PackedStruct>,
        bs: Bytes,
    ) -> Result<Message, ClientError> {
        let mut request = Message::api_request(api).with_bs(bs);
        request.body = body;

        tracing::debug!("Calling {}", api);
        self.send(&request).await?;
        let frame = self.receive_frame().await?;
        let reply = check_reply(frame);
        if let Err(e) = &reply {
            tracing::debug!("{} failed: {}", api, e);
        }
        reply
    }

    /// Invokes a procedure with a typed body and no byte stream.
    pub async fn request<B: Pack>(&mut self, api: ApiNumber, body: &B) -> Result<Message, ClientError> {
        self.call(api, Some(body.pack()), Bytes::new()).await
    }
}

/// Maps a reply frame to its message, or to the error its status encodes.
pub(crate) fn check_reply(frame: Frame) -> Result<Message, ClientError> {
    if frame.msg_type != MessageType::ApiReply {
        return Err(ClientError::UnexpectedResponse(format!(
            "expected {}, got {}",
            MessageType::ApiReply,
            frame.msg_type
        )));
    }

    if frame.int_info < 0 {
        return Err(ClientError::remote(
            frame.int_info,
            error_messages(&frame.error),
        ));
    }

    Ok(Message::try_from(frame)?)
}

/// Decodes the error section; malformed diagnostics are dropped.
fn error_messages(section: &[u8]) -> Vec<String> {
    if section.iter().all(|b| *b == 0 || b.is_ascii_whitespace()) {
        return Vec::new();
    }
    match PackedStruct::from_xml(section).and_then(|s| RError::unpack(&s)) {
        Ok(err) => err.messages.into_iter().map(|m| m.msg).collect(),
        Err(e) => {
            tracing::debug!("Ignoring undecodable error section: {}", e);
            Vec::new()
        }
    }
}
