//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use kindred_types::api::{ChatEntry, SenderRef};
use kindred_types::events::{ChannelCommand, ChannelEvent, Delivery};
use kindred_types::models::{MessageRecord, RecordOrigin, UserId, Viewer};

use crate::clock::{Clock, TimeDisplay};
use crate::error::{ChatError, Result};
use crate::history::HistorySource;
use crate::protocol::ProtocolHandler;
use crate::transport::{Transport, TransportHandle, TransportSignal};

pub fn viewer(id: &str, first_name: &str) -> Viewer {
    Viewer {
        id: id.into(),
        first_name: first_name.into(),
        last_name: "Park".into(),
    }
}

pub fn live_record(sender: &str, text: &str) -> MessageRecord {
    MessageRecord {
        sender_id: Some(sender.into()),
        sender_first_name: sender.into(),
        sender_last_name: String::new(),
        text: text.into(),
        timestamp: "03:07 PM".into(),
        origin: RecordOrigin::Live,
    }
}

pub fn history_record(sender: &str, text: &str) -> MessageRecord {
    MessageRecord {
        origin: RecordOrigin::History,
        ..live_record(sender, text)
    }
}

pub fn delivered(sender: &str, first_name: &str, text: &str) -> TransportSignal {
    TransportSignal::Event(ChannelEvent::MessageReceived(Delivery {
        first_name: first_name.into(),
        last_name: String::new(),
        sender_id: Some(sender.into()),
        text: text.into(),
    }))
}

pub fn chat_entry(sender: &str, first_name: &str, text: &str) -> ChatEntry {
    ChatEntry {
        sender: Some(SenderRef {
            id: sender.into(),
            first_name: first_name.into(),
            last_name: String::new(),
        }),
        text: text.into(),
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 15, 7, 0).unwrap()),
    }
}

pub fn protocol() -> ProtocolHandler {
    ProtocolHandler::new(Arc::new(FixedClock::at(15, 7)), TimeDisplay::utc())
}

/// Clock frozen at a time of day on 2024-05-01, UTC.
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self(Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct MockLink {
    /// `None` once the test hangs the link up.
    signals: Option<mpsc::UnboundedSender<TransportSignal>>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
}

impl MockLink {
    fn is_closed(&self) -> bool {
        self.signals.as_ref().is_none_or(|s| s.is_closed())
    }
}

#[derive(Default)]
struct MockState {
    links: Vec<MockLink>,
    /// Links still open at the moment each new link was opened.
    live_at_open: Vec<usize>,
}

/// Records every opened link; tests drive links by index.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    /// Push a signal into a link. False if the channel already let go of it.
    pub fn signal(&self, link: usize, signal: TransportSignal) -> bool {
        match &self.state.lock().unwrap().links[link].signals {
            Some(signals) => signals.send(signal).is_ok(),
            None => false,
        }
    }

    /// Drop the transport side of a link without any final signal.
    pub fn hang_up(&self, link: usize) {
        self.state.lock().unwrap().links[link].signals = None;
    }

    /// True once the channel has let go of the link (or it was hung up).
    pub fn is_closed(&self, link: usize) -> bool {
        self.state.lock().unwrap().links[link].is_closed()
    }

    /// Drain the commands emitted on a link so far.
    pub fn commands(&self, link: usize) -> Vec<ChannelCommand> {
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(command) = state.links[link].commands.try_recv() {
            out.push(command);
        }
        out
    }

    pub fn live_at_open(&self) -> Vec<usize> {
        self.state.lock().unwrap().live_at_open.clone()
    }
}

impl Transport for MockTransport {
    fn open(&self, signals: mpsc::UnboundedSender<TransportSignal>) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        let live = state.links.iter().filter(|l| !l.is_closed()).count();
        state.live_at_open.push(live);
        state.links.push(MockLink {
            signals: Some(signals),
            commands: rx,
        });
        TransportHandle::new(tx)
    }
}

/// History source answering from a canned result, optionally held back
/// until the test releases it.
pub struct MockHistory {
    entries: Option<Vec<ChatEntry>>,
    gate: Option<Arc<tokio::sync::Notify>>,
}

impl MockHistory {
    pub fn ok(entries: Vec<ChatEntry>) -> Self {
        Self {
            entries: Some(entries),
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            entries: None,
            gate: None,
        }
    }

    pub fn gated(entries: Vec<ChatEntry>, gate: Arc<tokio::sync::Notify>) -> Self {
        Self {
            entries: Some(entries),
            gate: Some(gate),
        }
    }
}

impl HistorySource for MockHistory {
    async fn fetch(&self, _counterpart: &UserId) -> Result<Vec<ChatEntry>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.entries
            .clone()
            .ok_or(ChatError::Unauthorized)
    }
}
