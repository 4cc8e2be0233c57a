//! In-call control channel: chat and feature toggles.
//!
//! Control messages ride the peer's data channel as JSON frames. The
//! channel opens some time after the transport connects; messages sent
//! before that are queued and flushed in FIFO order on open. Once the
//! channel closes it stays closed, and further sends fail with
//! [`SessionError::ChannelClosed`].

use std::collections::VecDeque;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use televisit_signaling_core::{ControlChannelState, PeerConnection};

use crate::errors::{Result, SessionError};
use crate::types::{ParticipantId, SessionId};

/// Payload of one control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ControlBody {
    /// Free-text chat, forwarded verbatim
    Chat { text: String },
    ScreenShareStart,
    ScreenShareStop,
    RecordingStart,
    RecordingStop,
}

/// One message on the control channel, stamped with its sender and send
/// time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub sender_id: ParticipantId,
    pub sent_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: ControlBody,
}

impl ControlMessage {
    pub fn new(sender_id: ParticipantId, body: ControlBody) -> Self {
        Self {
            sender_id,
            sent_at: Utc::now(),
            body,
        }
    }

    pub fn chat(sender_id: ParticipantId, text: impl Into<String>) -> Self {
        Self::new(sender_id, ControlBody::Chat { text: text.into() })
    }

    pub fn screen_share(sender_id: ParticipantId, active: bool) -> Self {
        let body = if active {
            ControlBody::ScreenShareStart
        } else {
            ControlBody::ScreenShareStop
        };
        Self::new(sender_id, body)
    }

    pub fn recording(sender_id: ParticipantId, active: bool) -> Self {
        let body = if active {
            ControlBody::RecordingStart
        } else {
            ControlBody::RecordingStop
        };
        Self::new(sender_id, body)
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}

struct ControlInner {
    state: ControlChannelState,
    queue: VecDeque<ControlMessage>,
}

/// Send side of the control channel for one session.
///
/// All operations serialize on one lock, so a flush cannot interleave
/// with concurrent sends and FIFO order holds across the open
/// transition.
pub struct ControlChannel {
    session_id: SessionId,
    peer: std::sync::Arc<dyn PeerConnection>,
    inner: Mutex<ControlInner>,
}

impl ControlChannel {
    pub fn new(session_id: SessionId, peer: std::sync::Arc<dyn PeerConnection>) -> Self {
        Self {
            session_id,
            peer,
            inner: Mutex::new(ControlInner {
                state: ControlChannelState::Connecting,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Send a message, queueing it if the channel has not opened yet
    pub async fn send(&self, message: ControlMessage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ControlChannelState::Connecting => {
                inner.queue.push_back(message);
                debug!(
                    "control channel not open yet for session {}, queued ({} pending)",
                    self.session_id,
                    inner.queue.len()
                );
                Ok(())
            }
            ControlChannelState::Open => {
                let frame = message.encode()?;
                self.peer.send_control(frame).await?;
                Ok(())
            }
            ControlChannelState::Closed => Err(SessionError::ChannelClosed),
        }
    }

    /// Apply a data-channel state notification from the transport.
    /// Opening flushes the queue in FIFO order; `Closed` is sticky.
    pub async fn handle_state_change(&self, state: ControlChannelState) {
        let mut inner = self.inner.lock().await;
        if inner.state == ControlChannelState::Closed {
            return;
        }
        inner.state = state;
        match state {
            ControlChannelState::Open => {
                let queued = std::mem::take(&mut inner.queue);
                if !queued.is_empty() {
                    debug!(
                        "control channel open for session {}, flushing {} queued messages",
                        self.session_id,
                        queued.len()
                    );
                }
                for message in queued {
                    match message.encode() {
                        Ok(frame) => {
                            if let Err(e) = self.peer.send_control(frame).await {
                                warn!(
                                    "flush failed on control channel for session {}: {}",
                                    self.session_id, e
                                );
                            }
                        }
                        Err(e) => warn!(
                            "could not encode queued control message for session {}: {}",
                            self.session_id, e
                        ),
                    }
                }
            }
            ControlChannelState::Closed => {
                let dropped = inner.queue.len();
                inner.queue.clear();
                if dropped > 0 {
                    warn!(
                        "control channel closed for session {} with {} undelivered messages",
                        self.session_id, dropped
                    );
                }
            }
            ControlChannelState::Connecting => {}
        }
    }

    /// Teardown path: mark closed and drop anything still queued
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = ControlChannelState::Closed;
        inner.queue.clear();
    }

    pub async fn state(&self) -> ControlChannelState {
        self.inner.lock().await.state
    }

    /// Messages waiting for the channel to open
    pub async fn queued(&self) -> usize {
        self.inner.lock().await.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use televisit_signaling_core::testing::FakePeerConnection;

    use super::*;

    fn channel_with_fake() -> (ControlChannel, std::sync::Arc<FakePeerConnection>) {
        let (peer, _events) = FakePeerConnection::new("control-test");
        let channel = ControlChannel::new(SessionId::from("session-ctl"), peer.clone());
        (channel, peer)
    }

    fn decode_all(peer: &FakePeerConnection) -> Vec<ControlMessage> {
        peer.sent_frames()
            .iter()
            .map(|f| ControlMessage::decode(f).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_messages_queued_then_flushed_in_order() {
        let (channel, peer) = channel_with_fake();
        let sender = ParticipantId::from("doctor-1");

        channel.send(ControlMessage::chat(sender.clone(), "first")).await.unwrap();
        channel.send(ControlMessage::chat(sender.clone(), "second")).await.unwrap();
        channel.send(ControlMessage::chat(sender.clone(), "third")).await.unwrap();
        assert_eq!(channel.queued().await, 3);
        assert!(peer.sent_frames().is_empty());

        channel.handle_state_change(ControlChannelState::Open).await;
        assert_eq!(channel.queued().await, 0);

        let texts: Vec<String> = decode_all(&peer)
            .into_iter()
            .map(|m| match m.body {
                ControlBody::Chat { text } => text,
                other => panic!("unexpected body {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_open_channel_sends_directly() {
        let (channel, peer) = channel_with_fake();
        channel.handle_state_change(ControlChannelState::Open).await;

        channel
            .send(ControlMessage::recording(ParticipantId::from("doctor-1"), true))
            .await
            .unwrap();
        assert_eq!(channel.queued().await, 0);
        let messages = decode_all(&peer);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, ControlBody::RecordingStart);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (channel, peer) = channel_with_fake();
        channel.handle_state_change(ControlChannelState::Open).await;
        channel.handle_state_change(ControlChannelState::Closed).await;

        let err = channel
            .send(ControlMessage::chat(ParticipantId::from("doctor-1"), "late"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ChannelClosed));
        assert!(peer.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_closed_is_sticky() {
        let (channel, _peer) = channel_with_fake();
        channel.close().await;
        channel.handle_state_change(ControlChannelState::Open).await;
        assert_eq!(channel.state().await, ControlChannelState::Closed);
    }

    #[test]
    fn test_wire_format() {
        let chat = ControlMessage::chat(ParticipantId::from("patient-7"), "hi there");
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["kind"], "chat");
        assert_eq!(value["text"], "hi there");
        assert_eq!(value["sender_id"], "patient-7");

        let share = ControlMessage::screen_share(ParticipantId::from("doctor-1"), true);
        let value = serde_json::to_value(&share).unwrap();
        assert_eq!(value["kind"], "screen-share-start");

        let bytes = chat.encode().unwrap();
        let back = ControlMessage::decode(&bytes).unwrap();
        assert_eq!(back, chat);
    }
}
