use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use kindred_types::events::{ChannelCommand, ChannelEvent};

use crate::error::{ChatError, Result};
use crate::protocol::{self, preview};
use crate::retry::{Reconnect, RetryPolicy};
use crate::session::Credentials;

/// What a transport reports about one open link, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Connected,
    Disconnected { reason: Option<String> },
    Event(ChannelEvent),
}

/// Outbound half of an open link. Dropping or closing it tears the link down.
#[derive(Debug)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl TransportHandle {
    pub fn new(commands: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self { commands }
    }

    /// Queue a command on the link. Returns false if the link is already gone.
    pub fn emit(&self, command: ChannelCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Drop the command sender; the link task sees the hangup and closes the socket.
    pub fn close(self) {
        let Self { commands } = self;
        drop(commands);
    }
}

/// Opens duplex links to the conversation server.
///
/// A link reports through `signals` until either side goes away: the link
/// must stop when the `signals` receiver is dropped or the returned handle
/// is dropped, and it must not report anything afterwards.
pub trait Transport {
    fn open(&self, signals: mpsc::UnboundedSender<TransportSignal>) -> TransportHandle;
}

/// JSON-over-WebSocket link, authenticated by the session cookie on upgrade.
///
/// A dropped socket is replaced according to the `Reconnect` policy; every
/// new socket reports `Connected` again. Commands emitted while no socket is
/// up are discarded.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    credentials: Credentials,
    retry: RetryPolicy,
    reconnect: Reconnect,
}

impl WebSocketTransport {
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            retry: RetryPolicy::None,
            reconnect: Reconnect::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reconnect(mut self, reconnect: Reconnect) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, signals: mpsc::UnboundedSender<TransportSignal>) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_link(
            self.url.clone(),
            self.credentials.cookie_header(),
            self.retry,
            self.reconnect,
            signals,
            rx,
        ));
        TransportHandle::new(tx)
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &Url, cookie: Option<&str>) -> Result<Socket> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ChatError::Config(format!("session cookie is not a valid header: {}", e)))?;
        request.headers_mut().insert(header::COOKIE, value);
    }

    let (socket, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}

/// How one socket's session ended.
enum LinkEnd {
    /// The socket failed; the link may reconnect.
    Dropped(String),
    /// The handle or the listener went away; the link is over.
    TornDown,
}

async fn run_link(
    url: Url,
    cookie: Option<String>,
    retry: RetryPolicy,
    reconnect: Reconnect,
    signals: mpsc::UnboundedSender<TransportSignal>,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
) {
    let mut failures: u32 = 0;

    loop {
        let reason = match open_socket(&url, cookie.as_deref(), retry, &signals).await {
            None => return,
            Some(Ok(socket)) => {
                if signals.send(TransportSignal::Connected).is_err() {
                    return;
                }
                info!("Connected to {}", url);
                failures = 0;

                match serve_socket(&url, socket, &signals, &mut commands).await {
                    LinkEnd::TornDown => return,
                    LinkEnd::Dropped(reason) => reason,
                }
            }
            Some(Err(e)) => {
                warn!("Channel connect to {} failed: {}", url, e);
                e.to_string()
            }
        };

        info!("Disconnected from {}: {}", url, reason);
        if signals
            .send(TransportSignal::Disconnected { reason: Some(reason) })
            .is_err()
        {
            return;
        }

        failures += 1;
        let Some(delay) = reconnect.delay(failures) else {
            debug!("Not reconnecting to {} after {} failures", url, failures);
            return;
        };

        debug!("Reconnecting to {} in {:?}", url, delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = signals.closed() => return,
            _ = discard_until_closed(&mut commands) => return,
        }
    }
}

/// Connect with retries, giving up early if the listener goes away.
async fn open_socket(
    url: &Url,
    cookie: Option<&str>,
    retry: RetryPolicy,
    signals: &mpsc::UnboundedSender<TransportSignal>,
) -> Option<Result<Socket>> {
    let connecting = retry.run("channel connect", || connect(url, cookie));
    tokio::select! {
        result = connecting => Some(result),
        _ = signals.closed() => {
            debug!("Link to {} closed before connecting", url);
            None
        }
    }
}

/// Commands sent between sockets have nowhere to go. Returns once the handle is dropped.
async fn discard_until_closed(commands: &mut mpsc::UnboundedReceiver<ChannelCommand>) {
    while let Some(command) = commands.recv().await {
        debug!("No socket up, discarding {:?}", command);
    }
}

async fn serve_socket(
    url: &Url,
    socket: Socket,
    signals: &mpsc::UnboundedSender<TransportSignal>,
    commands: &mut mpsc::UnboundedReceiver<ChannelCommand>,
) -> LinkEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(event) => {
                        if signals.send(TransportSignal::Event(event)).is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return LinkEnd::TornDown;
                        }
                    }
                    Err(e) => warn!("Dropping malformed frame: {} -- raw: {}", e, preview(&text)),
                },
                Some(Ok(Message::Close(_))) => return LinkEnd::Dropped("closed by server".to_string()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                None => return LinkEnd::Dropped("connection ended".to_string()),
            },
            command = commands.recv() => match command {
                Some(command) => match protocol::encode(&command) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            return LinkEnd::Dropped(e.to_string());
                        }
                    }
                    Err(e) => warn!("Failed to encode {:?}: {}", command, e),
                },
                None => {
                    debug!("Handle dropped, closing link to {}", url);
                    let _ = sink.send(Message::Close(None)).await;
                    return LinkEnd::TornDown;
                }
            },
            _ = signals.closed() => {
                debug!("Listener gone, closing link to {}", url);
                let _ = sink.send(Message::Close(None)).await;
                return LinkEnd::TornDown;
            }
        }
    }
}
