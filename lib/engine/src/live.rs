//! Live updates from the engine's server-sent event stream.
//!
//! The channel is best-effort: dropped connections are retried with
//! exponential backoff, events that cannot be decoded are skipped, and
//! subscribers re-fetch whatever an event names instead of trusting event
//! payloads.

use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Url};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tidal_bridge_core::SubscriptionId;
use tidal_bridge_session::AuthorizedClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::client::{EngineClient, error_from_response};
use crate::error::EngineError;

/// Buffered events per subscription before the reader waits.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Shortest reconnect delay, whatever the configuration says.
const MIN_BACKOFF_MS: u64 = 50;

/// Largest unfinished line or event payload the stream parser will hold.
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Reconnect timing for the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Delay before the first reconnect, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,
    /// Upper bound for the reconnect delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl LiveConfig {
    /// Creates a reconnect configuration.
    #[must_use]
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Returns the first reconnect delay.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(MIN_BACKOFF_MS))
    }

    /// Returns the maximum reconnect delay.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms).max(self.initial_backoff())
    }

    /// Returns the delay that follows `current`.
    #[must_use]
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .clamp(self.initial_backoff(), self.max_backoff())
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(default_initial_backoff_ms(), default_max_backoff_ms())
    }
}

/// What happened to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEventKind {
    /// A new instance was created.
    Created,
    /// An instance changed state or fields.
    Updated,
    /// An instance was removed.
    Deleted,
    /// An event type this client does not interpret.
    Other(String),
}

impl LiveEventKind {
    fn from_name(name: &str) -> Self {
        match name {
            "created" | "create" => Self::Created,
            "updated" | "update" | "state" | "message" => Self::Updated,
            "deleted" | "delete" => Self::Deleted,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A change notification for one resource instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEvent {
    /// The resource type.
    pub resource_type: String,
    /// The instance id.
    pub id: String,
    /// What happened.
    pub kind: LiveEventKind,
}

/// Selects the events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFilter {
    resource_type: String,
    id: Option<String>,
}

impl LiveFilter {
    /// Every event for a resource type.
    #[must_use]
    pub fn for_type(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
        }
    }

    /// Events for one instance.
    #[must_use]
    pub fn for_instance(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
        }
    }

    /// Returns true if the event passes the filter.
    #[must_use]
    pub fn matches(&self, event: &LiveEvent) -> bool {
        event.resource_type == self.resource_type
            && self.id.as_deref().is_none_or(|id| id == event.id)
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub(crate) event: Option<String>,
    pub(crate) data: String,
    pub(crate) id: Option<String>,
}

/// Incremental `text/event-stream` parser.
///
/// Accepts arbitrary chunk boundaries, including ones that split a line or
/// a UTF-8 sequence. A line or event payload longer than the limit fails
/// the stream.
#[derive(Debug)]
pub(crate) struct SseParser {
    limit: usize,
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
    last_id: Option<String>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseParser {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            pending: Vec::new(),
            event: None,
            data: Vec::new(),
            data_bytes: 0,
            last_id: None,
        }
    }

    /// Feeds a chunk and returns the events it completed.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, EngineError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
        }

        if self.pending.len() > self.limit {
            return Err(self.overflow("line"));
        }
        Ok(events)
    }

    fn overflow(&self, what: &str) -> EngineError {
        EngineError::InvalidResponse {
            details: format!("live event {what} exceeds {} bytes", self.limit),
        }
    }

    fn process_line(&mut self, line: &str) -> Result<Option<SseEvent>, EngineError> {
        if line.is_empty() {
            return Ok(self.dispatch());
        }
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data_bytes += value.len() + 1;
                if self.data_bytes > self.limit {
                    return Err(self.overflow("data"));
                }
                self.data.push(value.to_string());
            }
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        self.data_bytes = 0;
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event,
            data,
            id: self.last_id.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "@type", alias = "type")]
    resource_type: String,
    #[serde(rename = "@id", alias = "id")]
    id: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Decodes the resource reference carried by an event.
pub(crate) fn decode_event(event: &SseEvent) -> Result<LiveEvent, EngineError> {
    let wire: WireEvent =
        serde_json::from_str(&event.data).map_err(|e| EngineError::InvalidResponse {
            details: format!("undecodable live event: {e}"),
        })?;

    let name = match (event.event.as_deref(), wire.kind.as_deref()) {
        (Some(name), _) if name != "message" => name,
        (_, Some(kind)) => kind,
        _ => "message",
    };

    Ok(LiveEvent {
        resource_type: wire.resource_type,
        id: wire.id,
        kind: LiveEventKind::from_name(name),
    })
}

/// Connects subscribers to the engine's event stream.
#[derive(Debug, Clone)]
pub struct LiveChannel {
    http: AuthorizedClient,
    url: Url,
    config: LiveConfig,
}

impl LiveChannel {
    /// Creates a channel for the client's engine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the stream URL is unusable.
    pub fn new(client: &EngineClient, config: LiveConfig) -> Result<Self, Report<EngineError>> {
        let url = client.config().stream_url()?;
        Ok(Self {
            http: client.http().clone(),
            url,
            config,
        })
    }

    /// Returns the stream URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Opens a subscription. Each subscription holds its own connection.
    #[must_use]
    pub fn subscribe(&self, filter: LiveFilter) -> LiveSubscription {
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let span = info_span!("live_subscription", subscription = %id);
        let task = tokio::spawn(run_subscription(self.clone(), filter, sender).instrument(span));
        LiveSubscription { id, receiver, task }
    }
}

/// Events for one filter. Dropping the subscription closes its connection.
#[derive(Debug)]
pub struct LiveSubscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<LiveEvent>,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    /// Returns the id that tags this subscription's log lines.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next matching event.
    ///
    /// Returns `None` once the subscription has stopped.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        self.receiver.recv().await
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum StreamEnd {
    Closed,
    Unsubscribed,
}

async fn run_subscription(
    channel: LiveChannel,
    filter: LiveFilter,
    sender: mpsc::Sender<LiveEvent>,
) {
    let mut backoff = channel.config.initial_backoff();

    loop {
        match read_stream(&channel, &filter, &sender, &mut backoff).await {
            Ok(StreamEnd::Unsubscribed) => return,
            Ok(StreamEnd::Closed) => debug!("event stream closed by the engine"),
            Err(e) => warn!(error = %e, "event stream failed"),
        }

        if sender.is_closed() {
            return;
        }
        debug!(delay_ms = backoff.as_millis(), "reconnecting to event stream");
        tokio::time::sleep(backoff).await;
        backoff = channel.config.next_backoff(backoff);
    }
}

async fn read_stream(
    channel: &LiveChannel,
    filter: &LiveFilter,
    sender: &mpsc::Sender<LiveEvent>,
    backoff: &mut Duration,
) -> Result<StreamEnd, EngineError> {
    let request = channel
        .http
        .request(Method::GET, channel.url.clone())
        .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        .build()
        .map_err(|e| EngineError::InvalidConfiguration {
            details: format!("failed to build stream request: {e}"),
        })?;

    let intercepted = channel
        .http
        .execute(request)
        .await
        .map_err(|e| EngineError::NetworkError {
            details: e.to_string(),
        })?;
    if !intercepted.response.status().is_success() {
        return Err(error_from_response(intercepted, channel.url.path()).await);
    }

    info!(url = %channel.url, "subscribed to engine events");
    *backoff = channel.config.initial_backoff();

    let mut parser = SseParser::default();
    let mut body = std::pin::pin!(intercepted.response.bytes_stream());
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| EngineError::NetworkError {
            details: e.to_string(),
        })?;

        for event in parser.feed(&chunk)? {
            let live = match decode_event(&event) {
                Ok(live) => live,
                Err(e) => {
                    debug!(error = %e, event_id = ?event.id, "skipping live event");
                    continue;
                }
            };
            if !filter.matches(&live) {
                continue;
            }
            if sender.send(live).await.is_err() {
                return Ok(StreamEnd::Unsubscribed);
            }
        }
    }

    Ok(StreamEnd::Closed)
}
