use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kindred_types::events::{ChannelEvent, Delivery};
use kindred_types::models::{UserId, Viewer};

use crate::protocol::ProtocolHandler;
use crate::transport::{Transport, TransportHandle, TransportSignal};

/// Lifecycle of the live channel for one conversation view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Connecting,
    Connected,
    Disconnected,
}

/// Result of feeding one transport signal through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Connected,
    Disconnected { reason: Option<String> },
    Delivery(Delivery),
}

struct Link {
    handle: TransportHandle,
    /// Taken once the transport side hangs up, so a dead link is polled no further.
    signals: Option<mpsc::UnboundedReceiver<TransportSignal>>,
    viewer: Viewer,
    counterpart: UserId,
}

/// Owns at most one transport link, scoped to a (viewer, counterpart) pair.
///
/// Transitions:
/// - `open` with a known viewer: `Unopened -> Connecting`
/// - transport connected: `Connecting | Disconnected -> Connected`, emits the join
/// - transport disconnected: `Connecting | Connected -> Disconnected`
/// - transport hung up for good: reported once more, even from `Disconnected`
/// - `close`: any state `-> Unopened`, drops the link
///
/// Closing drops the link's signal receiver, so nothing the old link reports
/// afterwards can reach the view.
pub struct ConversationChannel<T> {
    transport: T,
    protocol: ProtocolHandler,
    state: ChannelState,
    link: Option<Link>,
}

impl<T: Transport> ConversationChannel<T> {
    pub fn new(transport: T, protocol: ProtocolHandler) -> Self {
        Self {
            transport,
            protocol,
            state: ChannelState::Unopened,
            link: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// True while a link exists that may still (re)connect.
    pub fn is_link_alive(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.signals.is_some())
    }

    pub fn counterpart(&self) -> Option<&UserId> {
        self.link.as_ref().map(|link| &link.counterpart)
    }

    pub fn protocol(&self) -> &ProtocolHandler {
        &self.protocol
    }

    /// Start connecting. A no-op without a viewer, or when a link for the same
    /// pair is already open; a link for a different pair is closed first.
    pub fn open(&mut self, viewer: Option<&Viewer>, counterpart: &UserId) -> bool {
        let Some(viewer) = viewer else {
            debug!("Viewer unknown, channel to {} stays unopened", counterpart);
            return false;
        };

        if let Some(link) = &self.link {
            if link.viewer.id == viewer.id && link.counterpart == *counterpart {
                return false;
            }
            self.close();
        }

        info!("Opening channel {} <-> {}", viewer.id, counterpart);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.transport.open(tx);
        self.link = Some(Link {
            handle,
            signals: Some(rx),
            viewer: viewer.clone(),
            counterpart: counterpart.clone(),
        });
        self.transition(ChannelState::Connecting);
        true
    }

    /// Dispatch `text` to the room. Dropped unless connected and non-blank.
    pub fn send(&mut self, text: &str) -> bool {
        if self.state != ChannelState::Connected {
            debug!("Dropping send while {:?}", self.state);
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        let Some(command) = self.protocol.dispatch(&link.viewer, &link.counterpart, text) else {
            return false;
        };

        debug!("Dispatching message to {}", link.counterpart);
        link.handle.emit(command)
    }

    /// Tear down the link. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            info!("Closing channel {} <-> {}", link.viewer.id, link.counterpart);
            link.handle.close();
        }
        self.transition(ChannelState::Unopened);
    }

    /// Next signal from the open link. Pends forever while no link is open.
    pub async fn next_signal(&mut self) -> TransportSignal {
        let Some(link) = self.link.as_mut() else {
            return std::future::pending().await;
        };
        let Some(signals) = link.signals.as_mut() else {
            return std::future::pending().await;
        };

        match signals.recv().await {
            Some(signal) => signal,
            None => {
                link.signals = None;
                TransportSignal::Disconnected {
                    reason: Some("transport went away".into()),
                }
            }
        }
    }

    /// Drive the state machine with one signal from the current link.
    pub fn apply(&mut self, signal: TransportSignal) -> Option<Inbound> {
        let link = match &self.link {
            Some(link) => link,
            None => {
                debug!("Ignoring {:?} on a closed channel", signal);
                return None;
            }
        };

        match signal {
            TransportSignal::Connected => {
                if self.state == ChannelState::Connected {
                    return None;
                }
                let join = self.protocol.join(&link.viewer, &link.counterpart);
                debug!("Joining room with {}", link.counterpart);
                if !link.handle.emit(join) {
                    warn!("Link to {} dropped the join announcement", link.counterpart);
                }
                self.transition(ChannelState::Connected);
                Some(Inbound::Connected)
            }

            TransportSignal::Disconnected { reason } => {
                let hung_up = link.signals.is_none();
                let live = matches!(self.state, ChannelState::Connecting | ChannelState::Connected);
                if !live && !hung_up {
                    return None;
                }
                info!(
                    "Channel to {} lost: {}",
                    link.counterpart,
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.transition(ChannelState::Disconnected);
                Some(Inbound::Disconnected { reason })
            }

            TransportSignal::Event(ChannelEvent::MessageReceived(delivery)) => {
                if self.state != ChannelState::Connected {
                    debug!("Ignoring delivery while {:?}", self.state);
                    return None;
                }
                Some(Inbound::Delivery(delivery))
            }
        }
    }

    fn transition(&mut self, next: ChannelState) {
        if self.state != next {
            debug!("Channel {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, delivered, protocol, viewer};
    use kindred_types::events::ChannelCommand;

    fn channel() -> (ConversationChannel<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        (ConversationChannel::new(transport.clone(), protocol()), transport)
    }

    fn connected() -> (ConversationChannel<MockTransport>, MockTransport) {
        let (mut ch, transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));
        ch.apply(TransportSignal::Connected);
        transport.commands(0);
        (ch, transport)
    }

    #[test]
    fn open_without_viewer_is_a_noop() {
        let (mut ch, transport) = channel();
        assert!(!ch.open(None, &UserId::new("U2")));
        assert_eq!(ch.state(), ChannelState::Unopened);
        assert_eq!(transport.opened(), 0);
    }

    #[test]
    fn open_is_idempotent_for_the_same_pair() {
        let (mut ch, transport) = channel();
        let me = viewer("U1", "Sam");
        assert!(ch.open(Some(&me), &UserId::new("U2")));
        assert!(!ch.open(Some(&me), &UserId::new("U2")));
        assert_eq!(transport.opened(), 1);
        assert_eq!(ch.state(), ChannelState::Connecting);
    }

    #[test]
    fn connect_emits_join() {
        let (mut ch, transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));

        assert_eq!(ch.apply(TransportSignal::Connected), Some(Inbound::Connected));
        assert!(ch.is_connected());
        assert_eq!(
            transport.commands(0),
            vec![ChannelCommand::JoinChat {
                first_name: "Sam".into(),
                user_id: "U1".into(),
                target_user_id: "U2".into(),
            }]
        );
    }

    #[test]
    fn blank_or_disconnected_sends_emit_nothing() {
        let (mut ch, transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));
        assert!(!ch.send("hello"));

        ch.apply(TransportSignal::Connected);
        transport.commands(0);
        assert!(!ch.send(""));
        assert!(!ch.send("   "));

        ch.apply(TransportSignal::Disconnected { reason: None });
        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert!(!ch.send("hello"));

        assert!(transport.commands(0).is_empty());
    }

    #[test]
    fn send_while_connected_dispatches_once() {
        let (mut ch, transport) = connected();
        assert!(ch.send("hello"));

        let commands = transport.commands(0);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0],
            ChannelCommand::SendMessage { text, .. } if text == "hello"
        ));
    }

    #[test]
    fn close_is_terminal_and_repeatable() {
        let (mut ch, transport) = connected();
        ch.close();
        ch.close();

        assert_eq!(ch.state(), ChannelState::Unopened);
        assert!(transport.is_closed(0));
        assert!(!transport.signal(0, delivered("U2", "Amy", "late")));
        assert_eq!(ch.apply(delivered("U2", "Amy", "late")), None);
    }

    #[test]
    fn new_counterpart_closes_old_link_first() {
        let (mut ch, transport) = connected();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U3"));

        assert_eq!(transport.opened(), 2);
        assert!(transport.is_closed(0));
        assert_eq!(transport.live_at_open(), vec![0, 0]);
        assert_eq!(ch.state(), ChannelState::Connecting);
        assert_eq!(ch.counterpart(), Some(&UserId::new("U3")));
    }

    #[test]
    fn delivery_before_connect_is_ignored() {
        let (mut ch, _transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));
        assert_eq!(ch.apply(delivered("U2", "Amy", "early")), None);
    }

    #[test]
    fn reconnect_rejoins_the_room() {
        let (mut ch, transport) = connected();
        ch.apply(TransportSignal::Disconnected { reason: None });
        assert_eq!(ch.apply(TransportSignal::Connected), Some(Inbound::Connected));
        assert!(matches!(
            transport.commands(0).as_slice(),
            [ChannelCommand::JoinChat { .. }]
        ));
    }

    #[tokio::test]
    async fn next_signal_reports_hangup_once() {
        let (mut ch, transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));
        transport.signal(0, TransportSignal::Connected);

        assert_eq!(ch.next_signal().await, TransportSignal::Connected);

        transport.hang_up(0);
        let hangup = ch.next_signal().await;
        assert!(matches!(hangup, TransportSignal::Disconnected { .. }));

        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), ch.next_signal()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn hangup_after_disconnect_is_final() {
        let (mut ch, transport) = channel();
        ch.open(Some(&viewer("U1", "Sam")), &UserId::new("U2"));
        transport.signal(0, TransportSignal::Disconnected { reason: Some("refused".into()) });

        let first = ch.next_signal().await;
        assert!(ch.apply(first).is_some());
        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert!(ch.is_link_alive());

        transport.hang_up(0);
        let last = ch.next_signal().await;
        assert!(matches!(ch.apply(last), Some(Inbound::Disconnected { .. })));
        assert!(!ch.is_link_alive());
    }
}
