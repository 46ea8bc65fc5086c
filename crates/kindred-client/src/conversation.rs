use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kindred_types::api::ChatEntry;
use kindred_types::models::{CounterpartProfile, MessageRecord, Ownership, UserId, Viewer};

use crate::channel::{ChannelState, ConversationChannel, Inbound};
use crate::error::Result;
use crate::history::{History, HistorySource, resolve_counterpart};
use crate::protocol::ProtocolHandler;
use crate::session::SessionContext;
use crate::transcript::Transcript;
use crate::transport::{Transport, TransportSignal};

const UNTITLED: &str = "Chat";

/// Something the view should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    HistoryLoaded { count: usize },
    HistoryFailed { error: String },
    Connected,
    Disconnected { reason: Option<String> },
    /// A live record landed at `index` among the live records
    /// (`Transcript::live`). History loading later does not shift it.
    Delivered { index: usize },
}

type HistoryResult = (u64, Result<Vec<ChatEntry>>);

/// One mounted conversation view: owns the channel, the transcript, the
/// counterpart cache and the compose buffer for a single counterpart.
///
/// Everything is driven from [`Conversation::next_update`] on the owning
/// task. Results from a previous counterpart or from before `unmount` are
/// discarded: history results are tagged with the epoch they were requested
/// in, and a closed link can no longer report anything.
pub struct Conversation<T: Transport, H: HistorySource> {
    session: SessionContext,
    counterpart_id: UserId,
    channel: ConversationChannel<T>,
    history: Arc<H>,
    transcript: Transcript,
    counterpart: Option<CounterpartProfile>,
    compose: String,
    epoch: u64,
    mounted: bool,
    history_tx: mpsc::UnboundedSender<HistoryResult>,
    history_rx: mpsc::UnboundedReceiver<HistoryResult>,
    history_task: Option<JoinHandle<()>>,
}

impl<T: Transport, H: HistorySource> Conversation<T, H> {
    /// Mount a view for `counterpart_id`: starts the history load and, if the
    /// viewer is already known, opens the channel. Must run inside a tokio
    /// runtime.
    pub fn mount(
        session: SessionContext,
        counterpart_id: UserId,
        transport: T,
        history: H,
        protocol: ProtocolHandler,
    ) -> Self {
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        let mut conversation = Self {
            session,
            counterpart_id,
            channel: ConversationChannel::new(transport, protocol),
            history: Arc::new(history),
            transcript: Transcript::new(),
            counterpart: None,
            compose: String::new(),
            epoch: 0,
            mounted: true,
            history_tx,
            history_rx,
            history_task: None,
        };
        conversation.start();
        conversation
    }

    fn start(&mut self) {
        self.epoch += 1;
        info!(
            "Mounting conversation with {} (epoch {})",
            self.counterpart_id, self.epoch
        );
        self.fetch_history();
        self.channel
            .open(self.session.viewer.as_ref(), &self.counterpart_id);
    }

    fn fetch_history(&mut self) {
        if let Some(task) = self.history_task.take() {
            task.abort();
        }

        let epoch = self.epoch;
        let source = Arc::clone(&self.history);
        let counterpart = self.counterpart_id.clone();
        let tx = self.history_tx.clone();
        self.history_task = Some(tokio::spawn(async move {
            let result = source.fetch(&counterpart).await;
            let _ = tx.send((epoch, result));
        }));
    }

    /// The viewer's identity became known (or changed).
    pub fn set_viewer(&mut self, viewer: Viewer) {
        if !self.mounted {
            return;
        }
        debug!("Viewer resolved as {}", viewer.id);

        if self.counterpart.is_none() {
            self.counterpart = resolve_counterpart(self.transcript.history(), &viewer.id);
        }
        self.channel.open(Some(&viewer), &self.counterpart_id);
        self.session.viewer = Some(viewer);
    }

    /// Point the view at another counterpart. The old channel is closed before
    /// the new one opens, and everything tied to the old pair is dropped.
    pub fn switch_counterpart(&mut self, counterpart_id: UserId) {
        if !self.mounted || counterpart_id == self.counterpart_id {
            return;
        }

        self.channel.close();
        self.transcript = Transcript::new();
        self.counterpart = None;
        self.compose.clear();
        self.counterpart_id = counterpart_id;
        self.start();
    }

    /// Tear the view down. Nothing arriving afterwards is applied.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        info!("Unmounting conversation with {}", self.counterpart_id);
        self.mounted = false;
        self.channel.close();
        if let Some(task) = self.history_task.take() {
            task.abort();
        }
        self.epoch += 1;
    }

    pub fn compose(&mut self, text: impl Into<String>) {
        self.compose = text.into();
    }

    pub fn compose_buffer(&self) -> &str {
        &self.compose
    }

    /// Send the compose buffer. The buffer is cleared whether or not anything
    /// went out.
    pub fn submit(&mut self) -> bool {
        let text = mem::take(&mut self.compose);
        self.send(&text)
    }

    /// Fire-and-forget dispatch. The message shows up in the transcript only
    /// once the room delivers it back.
    pub fn send(&mut self, text: &str) -> bool {
        self.mounted && self.channel.send(text)
    }

    /// Wait for the next change worth showing. `None` once unmounted.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            if !self.mounted {
                return None;
            }

            tokio::select! {
                Some((epoch, result)) = self.history_rx.recv() => {
                    if let Some(update) = self.apply_history(epoch, result) {
                        return Some(update);
                    }
                }
                signal = self.channel.next_signal() => {
                    if let Some(update) = self.apply_signal(signal) {
                        return Some(update);
                    }
                }
            }
        }
    }

    fn apply_history(&mut self, epoch: u64, result: Result<Vec<ChatEntry>>) -> Option<Update> {
        if !self.mounted || epoch != self.epoch {
            debug!("Discarding history from epoch {} (now {})", epoch, self.epoch);
            return None;
        }
        self.history_task = None;

        match result {
            Ok(entries) => {
                let history = History::from_entries(
                    entries,
                    self.session.viewer.as_ref().map(|v| &v.id),
                    self.channel.protocol().display(),
                );
                let count = history.records.len();
                if self.counterpart.is_none() {
                    self.counterpart = history.counterpart;
                }
                self.transcript.seed(history.records);
                info!("Loaded {} messages with {}", count, self.counterpart_id);
                Some(Update::HistoryLoaded { count })
            }
            Err(e) => {
                warn!("History with {} unavailable: {}", self.counterpart_id, e);
                Some(Update::HistoryFailed {
                    error: e.to_string(),
                })
            }
        }
    }

    fn apply_signal(&mut self, signal: TransportSignal) -> Option<Update> {
        match self.channel.apply(signal)? {
            Inbound::Connected => Some(Update::Connected),
            Inbound::Disconnected { reason } => Some(Update::Disconnected { reason }),
            Inbound::Delivery(delivery) => {
                let record = self.channel.protocol().on_delivery(delivery);
                self.learn_counterpart(&record);
                let index = self.transcript.append(record);
                debug!("Appended live message #{}", index);
                Some(Update::Delivered { index })
            }
        }
    }

    fn learn_counterpart(&mut self, record: &MessageRecord) {
        if self.counterpart.is_some() {
            return;
        }
        let Some(viewer) = &self.session.viewer else {
            return;
        };
        let named = !record.sender_first_name.is_empty();
        if named && matches!(&record.sender_id, Some(id) if *id != viewer.id) {
            self.counterpart = Some(CounterpartProfile::from_record(record));
        }
    }

    // -- Accessors --

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Transcript records with the side each one is shown on.
    pub fn entries(&self) -> impl Iterator<Item = (&MessageRecord, Ownership)> + '_ {
        self.transcript.classified(self.session.viewer.as_ref())
    }

    /// History records with their side, oldest first.
    pub fn history_entries(&self) -> impl Iterator<Item = (&MessageRecord, Ownership)> + '_ {
        self.entries().take(self.transcript.history().len())
    }

    /// The live record reported by `Update::Delivered { index }`, with its side.
    pub fn live_entry(&self, index: usize) -> Option<(&MessageRecord, Ownership)> {
        self.entries().nth(self.transcript.history().len() + index)
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.session.viewer.as_ref()
    }

    pub fn counterpart_id(&self) -> &UserId {
        &self.counterpart_id
    }

    pub fn counterpart(&self) -> Option<&CounterpartProfile> {
        self.counterpart.as_ref()
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_connected(&self) -> bool {
        self.mounted && self.channel.is_connected()
    }

    /// Header title: the counterpart's name, or a generic one until known.
    pub fn title(&self) -> String {
        self.counterpart
            .as_ref()
            .map(CounterpartProfile::display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    /// "Connecting..." covers the wait for a first socket and any reconnect;
    /// "Disconnected" only once the link has given up.
    pub fn status_text(&self) -> &'static str {
        if self.is_connected() {
            "Connected"
        } else if self.channel.state() == ChannelState::Disconnected && !self.channel.is_link_alive() {
            "Disconnected"
        } else {
            "Connecting..."
        }
    }
}

impl<T: Transport, H: HistorySource> Drop for Conversation<T, H> {
    fn drop(&mut self) {
        self.unmount();
    }
}
