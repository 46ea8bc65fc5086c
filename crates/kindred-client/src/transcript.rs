use tracing::debug;

use kindred_types::models::{MessageRecord, Ownership, Viewer};

/// Ordered, append-only message records for one mounted conversation.
///
/// History and live deliveries race independently. History is older than
/// anything delivered live, so a late history load is spliced in ahead of the
/// live records already present; live records keep their receipt order and
/// no record is ever changed or removed.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    records: Vec<MessageRecord>,
    /// Number of leading records that came from history.
    history_len: usize,
    seeded: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the history load. Only the first call has any effect.
    pub fn seed(&mut self, history: Vec<MessageRecord>) -> bool {
        if self.seeded {
            debug!("Ignoring repeated history seed ({} records)", history.len());
            return false;
        }
        self.seeded = true;
        self.history_len = history.len();
        self.records.splice(0..0, history);
        true
    }

    /// Append one live record, returning its index among the live records.
    /// A later history seed does not shift it.
    pub fn append(&mut self, record: MessageRecord) -> usize {
        self.records.push(record);
        self.records.len() - self.history_len - 1
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn history(&self) -> &[MessageRecord] {
        &self.records[..self.history_len]
    }

    pub fn live(&self) -> &[MessageRecord] {
        &self.records[self.history_len..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records paired with the side they are displayed on.
    pub fn classified<'a>(
        &'a self,
        viewer: Option<&'a Viewer>,
    ) -> impl Iterator<Item = (&'a MessageRecord, Ownership)> + 'a {
        self.records.iter().map(move |record| {
            let side = match viewer {
                Some(v) if record.is_mine(v) => Ownership::Mine,
                _ => Ownership::Theirs,
            };
            (record, side)
        })
    }
}
