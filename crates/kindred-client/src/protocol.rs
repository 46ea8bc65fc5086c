use std::sync::Arc;

use tracing::trace;

use kindred_types::events::{ChannelCommand, ChannelEvent, Delivery};
use kindred_types::models::{MessageRecord, RecordOrigin, UserId, Viewer};

use crate::clock::{Clock, SystemClock, TimeDisplay};
use crate::error::Result;

/// Builds outbound commands and turns inbound deliveries into transcript records.
#[derive(Clone)]
pub struct ProtocolHandler {
    clock: Arc<dyn Clock>,
    display: TimeDisplay,
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), TimeDisplay::Local)
    }
}

impl ProtocolHandler {
    pub fn new(clock: Arc<dyn Clock>, display: TimeDisplay) -> Self {
        Self { clock, display }
    }

    pub fn display(&self) -> &TimeDisplay {
        &self.display
    }

    /// Join announcement: binds the connection to the viewer/counterpart room.
    pub fn join(&self, viewer: &Viewer, counterpart: &UserId) -> ChannelCommand {
        ChannelCommand::JoinChat {
            first_name: viewer.display_name().to_string(),
            user_id: viewer.id.clone(),
            target_user_id: counterpart.clone(),
        }
    }

    /// Message dispatch. `None` for empty or whitespace-only text.
    pub fn dispatch(&self, viewer: &Viewer, counterpart: &UserId, text: &str) -> Option<ChannelCommand> {
        if text.trim().is_empty() {
            return None;
        }
        Some(ChannelCommand::SendMessage {
            first_name: viewer.display_name().to_string(),
            last_name: viewer.last_name.clone(),
            user_id: viewer.id.clone(),
            target_user_id: counterpart.clone(),
            text: text.to_string(),
        })
    }

    /// Record for one delivery, stamped with local receipt time.
    pub fn on_delivery(&self, delivery: Delivery) -> MessageRecord {
        MessageRecord {
            sender_id: delivery.sender_id,
            sender_first_name: delivery.first_name,
            sender_last_name: delivery.last_name,
            text: delivery.text,
            timestamp: self.display.format(self.clock.now()),
            origin: RecordOrigin::Live,
        }
    }
}

pub fn encode(command: &ChannelCommand) -> Result<String> {
    Ok(serde_json::to_string(command)?)
}

pub fn decode(frame: &str) -> Result<ChannelEvent> {
    trace!("inbound frame: {}", preview(frame));
    Ok(serde_json::from_str(frame)?)
}

/// First 200 characters of a frame, for logs.
pub(crate) fn preview(frame: &str) -> &str {
    match frame.char_indices().nth(200) {
        Some((end, _)) => &frame[..end],
        None => frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, viewer};

    fn handler() -> ProtocolHandler {
        ProtocolHandler::new(Arc::new(FixedClock::at(15, 7)), TimeDisplay::utc())
    }

    #[test]
    fn blank_text_is_never_dispatched() {
        let h = handler();
        let me = viewer("U1", "Sam");
        let to = UserId::new("U2");
        assert!(h.dispatch(&me, &to, "").is_none());
        assert!(h.dispatch(&me, &to, "   ").is_none());
        assert!(h.dispatch(&me, &to, "\n\t").is_none());
    }

    #[test]
    fn dispatch_carries_sender_and_room() {
        let h = handler();
        let cmd = h
            .dispatch(&viewer("U1", "Sam"), &UserId::new("U2"), " hello ")
            .unwrap();
        match cmd {
            ChannelCommand::SendMessage {
                first_name,
                user_id,
                target_user_id,
                text,
                ..
            } => {
                assert_eq!(first_name, "Sam");
                assert_eq!(user_id, UserId::new("U1"));
                assert_eq!(target_user_id, UserId::new("U2"));
                assert_eq!(text, " hello ");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn delivery_is_stamped_at_receipt() {
        let record = handler().on_delivery(Delivery {
            first_name: "Amy".into(),
            last_name: "Lee".into(),
            sender_id: Some("U2".into()),
            text: "hey".into(),
        });
        assert_eq!(record.timestamp, "03:07 PM");
        assert_eq!(record.origin, RecordOrigin::Live);
        assert_eq!(record.sender_id, Some(UserId::new("U2")));
    }

    #[test]
    fn decode_rejects_unknown_events() {
        assert!(decode(r#"{"type":"typing","data":{}}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn encode_join_frame() {
        let frame = encode(&handler().join(&viewer("U1", "Sam"), &UserId::new("U2"))).unwrap();
        assert!(frame.contains(r#""type":"joinChat""#));
        assert!(frame.contains(r#""targetUserId":"U2""#));
    }
}
