pub mod channel;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelState, ConversationChannel};
pub use config::ClientConfig;
pub use conversation::{Conversation, Update};
pub use error::{ChatError, Result};
pub use history::{HistorySource, HttpHistory};
pub use retry::{Reconnect, RetryPolicy};
pub use session::{Credentials, ProfileClient, SessionContext};
pub use transport::{Transport, TransportHandle, TransportSignal, WebSocketTransport};
