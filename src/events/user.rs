//! User event stream: long-poll for change signals, then fetch and de-duplicate chunks.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::http::Method;
use serde::de::Error as _;
use tokio::{sync::mpsc, time::Instant};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError},
	events::{
		self, DedupCache, EVENTS_ENDPOINT, EventChunk, LONG_POLL_ENDPOINT, StreamController,
		StreamItem,
	},
	http::PlatformHttpClient,
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::Session,
};

/// Stream position meaning "from the current end of the log".
pub const NOW: &str = "now";

/// Tuning knobs for [`EventStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventStreamOptions {
	/// Starting position; `None` asks the platform for the current one.
	pub stream_position: Option<String>,
	/// Delay after a failed fetch or long-poll before polling again.
	pub retry_delay: Duration,
	/// Size of the recent-id window.
	pub dedup_capacity: usize,
	/// Minimum spacing between two fetches.
	pub fetch_interval: Duration,
	/// Chunk size hint forwarded as `limit`.
	pub limit: Option<u32>,
}
impl EventStreamOptions {
	/// Starts from `position` instead of the current end of the log.
	pub fn stream_position(mut self, position: impl Into<String>) -> Self {
		self.stream_position = Some(position.into());

		self
	}

	/// Overrides the retry delay.
	pub fn retry_delay(mut self, delay: Duration) -> Self {
		self.retry_delay = delay;

		self
	}

	/// Overrides the de-duplication window.
	pub fn dedup_capacity(mut self, capacity: usize) -> Self {
		self.dedup_capacity = capacity;

		self
	}

	/// Overrides the minimum spacing between fetches.
	pub fn fetch_interval(mut self, interval: Duration) -> Self {
		self.fetch_interval = interval;

		self
	}

	/// Sets the chunk size hint.
	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);

		self
	}
}
impl Default for EventStreamOptions {
	fn default() -> Self {
		Self {
			stream_position: None,
			retry_delay: Duration::seconds(1),
			dedup_capacity: DedupCache::DEFAULT_CAPACITY,
			fetch_interval: Duration::seconds(1),
			limit: None,
		}
	}
}

#[derive(Debug, Deserialize)]
struct LongPollOptions {
	#[serde(default)]
	entries: Vec<LongPollServer>,
}

/// Realtime server offered by the `OPTIONS` call; a new one may be offered per attempt.
#[derive(Clone, Debug, Deserialize)]
struct LongPollServer {
	#[serde(rename = "type", default)]
	kind: String,
	url: String,
	#[serde(deserialize_with = "de_count", default = "default_max_retries")]
	max_retries: u64,
	#[serde(deserialize_with = "de_count", default = "default_retry_timeout")]
	retry_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct LongPollMessage {
	#[serde(default)]
	message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Signal {
	NewChange,
	Reconnect,
	Idle,
}

#[derive(Debug)]
enum Phase {
	Start,
	Connect,
	Poll { server: LongPollServer, attempts: u64 },
	Fetch { server: LongPollServer },
}
impl Phase {
	fn stage(&self) -> &'static str {
		match self {
			Self::Start => "start",
			Self::Connect => "connect",
			Self::Poll { .. } => "long_poll",
			Self::Fetch { .. } => "fetch",
		}
	}
}

/// Long-poll consumer of one user's event log.
///
/// Events are delivered in server order and never repeated within the de-duplication window.
/// Failures are reported as [`StreamItem::Error`] and polling resumes after
/// [`EventStreamOptions::retry_delay`].
pub struct EventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	session: Session<C, M>,
	options: EventStreamOptions,
	position: Option<String>,
	phase: Phase,
	dedup: DedupCache,
	buffer: VecDeque<StreamItem>,
	controller: StreamController,
	backoff: bool,
	last_fetch: Option<Instant>,
}
impl<C, M> EventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an idle stream; nothing is fetched until [`next`](Self::next) is polled.
	pub fn new(session: Session<C, M>, options: EventStreamOptions) -> Self {
		let position = options.stream_position.clone();
		let phase = if position.is_some() { Phase::Connect } else { Phase::Start };

		Self {
			session,
			dedup: DedupCache::new(options.dedup_capacity),
			options,
			position,
			phase,
			buffer: VecDeque::new(),
			controller: StreamController::new(),
			backoff: false,
			last_fetch: None,
		}
	}

	/// Handle that pauses, resumes, or closes this stream.
	pub fn controller(&self) -> StreamController {
		self.controller.clone()
	}

	/// Position the next fetch starts from.
	pub fn stream_position(&self) -> Option<&str> {
		self.position.as_deref()
	}

	/// Returns the next event or error, or `None` once the stream is closed.
	pub async fn next(&mut self) -> Option<StreamItem> {
		loop {
			if let Some(item) = self.buffer.pop_front() {
				return Some(item);
			}

			let proceed = if self.backoff {
				self.backoff = false;

				self.controller.sleep(self.options.retry_delay).await
			} else {
				self.controller.checkpoint().await
			};

			if !proceed {
				return None;
			}

			let stage = self.phase.stage();
			let span = FlowSpan::new(FlowKind::UserEvents, stage);

			if let Err(e) = span.instrument(self.step()).await {
				obs::warn_stream_error(FlowKind::UserEvents, stage, &e);
				obs::record_flow_outcome(FlowKind::UserEvents, FlowOutcome::Failure);

				self.phase = if self.position.is_some() { Phase::Connect } else { Phase::Start };
				self.backoff = true;
				self.buffer.push_back(StreamItem::Error(e));
			}
		}
	}

	/// Drives the stream on a Tokio task, forwarding items into a bounded channel.
	///
	/// The task stops when the stream closes or the receiver is dropped.
	pub fn spawn(mut self, capacity: usize) -> mpsc::Receiver<StreamItem> {
		let (sender, receiver) = mpsc::channel(capacity.max(1));

		tokio::spawn(async move {
			while let Some(item) = self.next().await {
				if sender.send(item).await.is_err() {
					break;
				}
			}
		});

		receiver
	}

	async fn step(&mut self) -> Result<()> {
		match std::mem::replace(&mut self.phase, Phase::Connect) {
			Phase::Start => {
				let chunk = self.fetch_chunk(NOW).await?;

				self.position = Some(chunk.next_stream_position);
			},
			Phase::Connect => {
				let server = self.long_poll_server().await?;

				self.phase = Phase::Poll { server, attempts: 0 };
			},
			Phase::Poll { server, attempts } if attempts > server.max_retries => (),
			Phase::Poll { server, attempts } => {
				self.phase = match self.long_poll(&server).await? {
					Some(Signal::NewChange) => Phase::Fetch { server },
					Some(Signal::Reconnect) => Phase::Connect,
					Some(Signal::Idle) => Phase::Poll { server, attempts: attempts + 1 },
					None => Phase::Poll { server, attempts },
				};
			},
			Phase::Fetch { server } => self.fetch(server).await?,
		}

		Ok(())
	}

	async fn fetch(&mut self, server: LongPollServer) -> Result<()> {
		if let Some(last) = self.last_fetch {
			let elapsed = Duration::try_from(last.elapsed()).unwrap_or(Duration::MAX);
			let wait = self.options.fetch_interval - elapsed;

			if wait.is_positive() && !self.controller.sleep(wait).await {
				self.phase = Phase::Fetch { server };

				return Ok(());
			}
		}

		let position = self.position.clone().unwrap_or_else(|| NOW.into());
		let chunk = self.fetch_chunk(&position).await?;

		self.last_fetch = Some(Instant::now());

		for entry in chunk.entries {
			let fresh = entry.event_id().is_none_or(|id| self.dedup.insert(id));

			if fresh {
				self.buffer.push_back(StreamItem::Event(entry));
			}
		}

		obs::record_flow_outcome(FlowKind::UserEvents, FlowOutcome::Success);

		self.position = Some(chunk.next_stream_position);
		self.phase = Phase::Poll { server, attempts: 0 };

		Ok(())
	}

	async fn fetch_chunk(&self, position: &str) -> Result<EventChunk> {
		let mut url = self.session.platform().config.events_url()?;

		{
			let mut query = url.query_pairs_mut();

			query.append_pair("stream_position", position);

			if let Some(limit) = self.options.limit {
				query.append_pair("limit", &limit.to_string());
			}
		}

		let response = self.session.send(EVENTS_ENDPOINT, events::get_request(url)?).await?;

		oauth::parse_json(EVENTS_ENDPOINT, &response)
	}

	async fn long_poll_server(&self) -> Result<LongPollServer> {
		let url = self.session.platform().config.events_url()?;
		let response =
			self.session.send(EVENTS_ENDPOINT, events::request(Method::OPTIONS, url)?).await?;
		let options: LongPollOptions = oauth::parse_json(EVENTS_ENDPOINT, &response)?;
		options
			.entries
			.into_iter()
			.find(|server| server.kind.is_empty() || server.kind == "realtime_server")
			.ok_or_else(|| {
				TransientError::Api {
					endpoint: EVENTS_ENDPOINT,
					message: "no realtime server was offered".into(),
					status: Some(response.status().as_u16()),
					retry_after: None,
				}
				.into()
			})
	}

	/// Holds one long-poll request; `None` means the stream was closed while waiting.
	async fn long_poll(&self, server: &LongPollServer) -> Result<Option<Signal>> {
		let mut url = Url::parse(&server.url)
			.map_err(|_| ConfigError::InvalidEndpoint { url: server.url.clone() })?;

		if let Some(position) = self.position.as_deref() {
			url.query_pairs_mut().append_pair("stream_position", position);
		}

		let request = events::get_request(url)?;
		let platform = self.session.platform();
		let timeout = StdDuration::from_secs(server.retry_timeout.max(1));
		let Some(outcome) = self
			.controller
			.until_closed(tokio::time::timeout(timeout, platform.execute(LONG_POLL_ENDPOINT, request)))
			.await
		else {
			return Ok(None);
		};
		let Ok(result) = outcome else {
			return Ok(Some(Signal::Idle));
		};
		let (response, meta) = result?;

		if !response.status().is_success() {
			return Err(oauth::map_api_failure(LONG_POLL_ENDPOINT, meta.as_ref(), &response));
		}

		let message: LongPollMessage = oauth::parse_json(LONG_POLL_ENDPOINT, &response)?;

		Ok(Some(match message.message.as_str() {
			"new_change" => Signal::NewChange,
			"reconnect" => Signal::Reconnect,
			_ => Signal::Idle,
		}))
	}
}
impl<C, M> Debug for EventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EventStream")
			.field("position", &self.position)
			.field("phase", &self.phase.stage())
			.field("buffered", &self.buffer.len())
			.field("status", &self.controller.status())
			.finish()
	}
}

fn default_max_retries() -> u64 {
	10
}

fn default_retry_timeout() -> u64 {
	610
}

/// Counts arrive either as JSON numbers or as numeric strings.
fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(u64),
		Text(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Number(number) => Ok(number),
		Raw::Text(text) => text.trim().parse().map_err(D::Error::custom),
	}
}
