use std::future::Future;

use reqwest::Client;
use tracing::debug;
use url::Url;

use kindred_types::api::{ChatEntry, ChatResponse};
use kindred_types::models::{CounterpartProfile, MessageRecord, RecordOrigin, UserId};

use crate::clock::TimeDisplay;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::session::{Credentials, check_status, endpoint};

/// Loads the persisted transcript shared with one counterpart.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch(&self, counterpart: &UserId) -> impl Future<Output = Result<Vec<ChatEntry>>> + Send;
}

/// `GET {api}/chat/{counterpart}` with the session cookie.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    client: Client,
    api_url: Url,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl HttpHistory {
    pub fn new(client: Client, api_url: Url, credentials: Credentials) -> Self {
        Self {
            client,
            api_url,
            credentials,
            retry: RetryPolicy::None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<ChatEntry>> {
        let resp = self
            .credentials
            .apply(self.client.get(url.clone()))
            .send()
            .await?;
        let chat: ChatResponse = check_status(resp).await?.json().await?;
        Ok(chat.messages)
    }
}

impl HistorySource for HttpHistory {
    async fn fetch(&self, counterpart: &UserId) -> Result<Vec<ChatEntry>> {
        let url = endpoint(&self.api_url, &["chat", counterpart.as_str()])?;
        debug!("Fetching history from {}", url);
        self.retry.run("history fetch", || self.fetch_once(&url)).await
    }
}

/// Normalized result of one history load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub records: Vec<MessageRecord>,
    pub counterpart: Option<CounterpartProfile>,
}

impl History {
    pub fn from_entries(entries: Vec<ChatEntry>, viewer_id: Option<&UserId>, display: &TimeDisplay) -> Self {
        let records = normalize(entries, display);
        let counterpart = viewer_id.and_then(|id| resolve_counterpart(&records, id));
        Self {
            records,
            counterpart,
        }
    }
}

/// Lift each entry's embedded sender into the flat record shape and stamp it
/// with its creation time. An entry without a usable time gets a blank stamp.
pub fn normalize(entries: Vec<ChatEntry>, display: &TimeDisplay) -> Vec<MessageRecord> {
    entries
        .into_iter()
        .map(|entry| {
            let (sender_id, first_name, last_name) = match entry.sender {
                Some(sender) => (Some(sender.id), sender.first_name, sender.last_name),
                None => (None, String::new(), String::new()),
            };
            MessageRecord {
                sender_id,
                sender_first_name: first_name,
                sender_last_name: last_name,
                text: entry.text,
                timestamp: entry.created_at.map(|at| display.format(at)).unwrap_or_default(),
                origin: RecordOrigin::History,
            }
        })
        .collect()
}

/// Name of the first sender that is not the viewer. Records without a sender
/// id or without a name are skipped.
pub fn resolve_counterpart(records: &[MessageRecord], viewer_id: &UserId) -> Option<CounterpartProfile> {
    records
        .iter()
        .filter(|r| !r.sender_first_name.is_empty())
        .find(|r| matches!(&r.sender_id, Some(id) if id != viewer_id))
        .map(CounterpartProfile::from_record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kindred_types::api::SenderRef;

    fn entry(sender: Option<(&str, &str)>, text: &str, minute: u32) -> ChatEntry {
        ChatEntry {
            sender: sender.map(|(id, first)| SenderRef {
                id: id.into(),
                first_name: first.into(),
                last_name: String::new(),
            }),
            text: text.into(),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 15, minute, 0).unwrap()),
        }
    }

    #[test]
    fn single_entry_from_counterpart() {
        let viewer = UserId::new("U1");
        let history = History::from_entries(
            vec![entry(Some(("U2", "Amy")), "hi", 7)],
            Some(&viewer),
            &TimeDisplay::utc(),
        );

        assert_eq!(history.records.len(), 1);
        let record = &history.records[0];
        assert_eq!(record.sender_id, Some(UserId::new("U2")));
        assert_eq!(record.text, "hi");
        assert_eq!(record.timestamp, "03:07 PM");
        assert_eq!(record.origin, RecordOrigin::History);
        assert_eq!(history.counterpart.unwrap().first_name, "Amy");
    }

    #[test]
    fn counterpart_skips_viewer_messages() {
        let viewer = UserId::new("U1");
        let history = History::from_entries(
            vec![
                entry(Some(("U1", "Sam")), "hello?", 1),
                entry(Some(("U1", "Sam")), "anyone?", 2),
                entry(Some(("U2", "Amy")), "hi!", 3),
            ],
            Some(&viewer),
            &TimeDisplay::utc(),
        );
        assert_eq!(history.records.len(), 3);
        assert_eq!(history.counterpart.unwrap().first_name, "Amy");
    }

    #[test]
    fn only_viewer_messages_leave_counterpart_unknown() {
        let viewer = UserId::new("U1");
        let history = History::from_entries(
            vec![entry(Some(("U1", "Sam")), "hello?", 1)],
            Some(&viewer),
            &TimeDisplay::utc(),
        );
        assert!(history.counterpart.is_none());
    }

    #[test]
    fn missing_sender_becomes_anonymous_record() {
        let records = normalize(vec![entry(None, "orphan", 4)], &TimeDisplay::utc());
        assert_eq!(records[0].sender_id, None);
        assert_eq!(records[0].sender_first_name, "");
        assert!(resolve_counterpart(&records, &UserId::new("U1")).is_none());
    }

    #[test]
    fn unknown_viewer_defers_counterpart() {
        let history = History::from_entries(
            vec![entry(Some(("U2", "Amy")), "hi", 7)],
            None,
            &TimeDisplay::utc(),
        );
        assert_eq!(history.records.len(), 1);
        assert!(history.counterpart.is_none());
    }

    #[test]
    fn unpopulated_sender_and_missing_time() {
        let viewer = UserId::new("U1");
        let mut bare = entry(Some(("U2", "")), "bare id", 1);
        bare.created_at = None;

        let history = History::from_entries(
            vec![bare, entry(Some(("U2", "Amy")), "named", 2)],
            Some(&viewer),
            &TimeDisplay::utc(),
        );

        assert_eq!(history.records.len(), 2);
        assert_eq!(history.records[0].sender_id, Some(UserId::new("U2")));
        assert_eq!(history.records[0].timestamp, "");
        assert_eq!(history.counterpart.unwrap().first_name, "Amy");
    }
}
