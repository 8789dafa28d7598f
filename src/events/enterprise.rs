//! Enterprise admin-log consumer that polls on an interval and checkpoints its cursor.

// crates.io
use tokio::sync::mpsc;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	events::{self, EVENTS_ENDPOINT, EventChunk, StreamController, StreamItem},
	http::PlatformHttpClient,
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::Session,
	store::StreamStateStore,
};

/// Which enterprise log to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnterpriseStreamType {
	/// Complete, ordered history; supports date ranges.
	#[default]
	AdminLogs,
	/// Low-latency feed; no date ranges and no ordering guarantee.
	AdminLogsStreaming,
}
impl EnterpriseStreamType {
	/// Wire value of the `stream_type` parameter.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AdminLogs => "admin_logs",
			Self::AdminLogsStreaming => "admin_logs_streaming",
		}
	}
}
impl Display for EnterpriseStreamType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Resumable cursor of an [`EnterpriseEventStream`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
	/// Opaque position returned by the platform.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream_position: Option<String>,
	/// Lower date bound (complete mode only).
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub created_after: Option<OffsetDateTime>,
	/// Upper date bound (complete mode only).
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub created_before: Option<OffsetDateTime>,
	/// Event type filter; empty means every type.
	#[serde(default)]
	pub event_types: Vec<String>,
	/// Log being read.
	#[serde(default)]
	pub stream_type: EnterpriseStreamType,
}

/// Configuration of an [`EnterpriseEventStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnterpriseStreamOptions {
	/// Log to read.
	pub stream_type: EnterpriseStreamType,
	/// Starting cursor.
	pub stream_position: Option<String>,
	/// Lower date bound.
	pub created_after: Option<OffsetDateTime>,
	/// Upper date bound.
	pub created_before: Option<OffsetDateTime>,
	/// Event type filter.
	pub event_types: Vec<String>,
	/// Pause after an empty chunk or a failure; zero drains once and stops.
	pub polling_interval: Duration,
	/// Maximum events per fetch.
	pub chunk_size: u32,
}
impl EnterpriseStreamOptions {
	/// Largest chunk the platform serves.
	pub const MAX_CHUNK_SIZE: u32 = 500;

	/// Selects the log to read.
	pub fn stream_type(mut self, stream_type: EnterpriseStreamType) -> Self {
		self.stream_type = stream_type;

		self
	}

	/// Starts from a known cursor.
	pub fn stream_position(mut self, position: impl Into<String>) -> Self {
		self.stream_position = Some(position.into());

		self
	}

	/// Only returns events created at or after `instant`.
	pub fn created_after(mut self, instant: OffsetDateTime) -> Self {
		self.created_after = Some(instant);

		self
	}

	/// Only returns events created before `instant`.
	pub fn created_before(mut self, instant: OffsetDateTime) -> Self {
		self.created_before = Some(instant);

		self
	}

	/// Restricts the stream to the given event types.
	pub fn event_types<I, S>(mut self, types: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.event_types = types.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the polling interval.
	pub fn polling_interval(mut self, interval: Duration) -> Self {
		self.polling_interval = interval;

		self
	}

	/// Overrides the chunk size.
	pub fn chunk_size(mut self, size: u32) -> Self {
		self.chunk_size = size;

		self
	}

	/// Rejects option combinations the platform would refuse.
	pub fn validate(&self) -> Result<()> {
		let reason = if !(1..=Self::MAX_CHUNK_SIZE).contains(&self.chunk_size) {
			Some("chunk size must be between 1 and 500")
		} else if self.polling_interval.is_negative() {
			Some("polling interval must not be negative")
		} else if self.stream_type == EnterpriseStreamType::AdminLogsStreaming
			&& (self.created_after.is_some() || self.created_before.is_some())
		{
			Some("the streaming log does not accept date bounds")
		} else if matches!(
			(self.created_after, self.created_before),
			(Some(after), Some(before)) if before < after
		) {
			Some("created_before must not precede created_after")
		} else {
			None
		};

		match reason {
			Some(reason) => Err(ConfigError::InvalidStreamOptions { reason }.into()),
			None => Ok(()),
		}
	}

	/// Cursor the stream starts from when nothing was persisted.
	fn initial_state(&self, now: OffsetDateTime) -> StreamState {
		let mut state = StreamState {
			stream_position: self.stream_position.clone(),
			created_after: self.created_after,
			created_before: self.created_before,
			event_types: self.event_types.clone(),
			stream_type: self.stream_type,
		};

		if state.stream_position.is_none() {
			match state.stream_type {
				EnterpriseStreamType::AdminLogs =>
					if state.created_after.is_none() {
						state.created_after = Some(now);
					},
				EnterpriseStreamType::AdminLogsStreaming =>
					state.stream_position = Some(events::NOW.into()),
			}
		}

		state
	}
}
impl Default for EnterpriseStreamOptions {
	fn default() -> Self {
		Self {
			stream_type: EnterpriseStreamType::default(),
			stream_position: None,
			created_after: None,
			created_before: None,
			event_types: Vec::new(),
			polling_interval: Duration::seconds(60),
			chunk_size: Self::MAX_CHUNK_SIZE,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
	Fetching,
	Waiting,
	Done,
}

/// Interval poller over an enterprise's admin logs.
///
/// A non-empty chunk advances the cursor, is delivered in order, and is checkpointed to the
/// state sink before the next fetch. An empty chunk or a failure leaves the cursor in place;
/// the stream then waits [`polling_interval`](EnterpriseStreamOptions::polling_interval), or
/// finishes when the interval is zero.
pub struct EnterpriseEventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	session: Session<C, M>,
	state: StreamState,
	polling_interval: Duration,
	chunk_size: u32,
	sink: Option<Arc<dyn StreamStateStore>>,
	buffer: VecDeque<StreamItem>,
	controller: StreamController,
	phase: Phase,
}
impl<C, M> EnterpriseEventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a stream starting from `options`.
	pub fn new(session: Session<C, M>, options: EnterpriseStreamOptions) -> Result<Self> {
		options.validate()?;

		let state = options.initial_state(session.platform().now());

		Ok(Self {
			session,
			state,
			polling_interval: options.polling_interval,
			chunk_size: options.chunk_size,
			sink: None,
			buffer: VecDeque::new(),
			controller: StreamController::new(),
			phase: Phase::Fetching,
		})
	}

	/// Creates a stream that resumes from the state persisted in `store` and keeps
	/// checkpointing into it.
	///
	/// A persisted state replaces the starting cursor, filter, and stream type of `options`.
	pub async fn restore(
		session: Session<C, M>,
		options: EnterpriseStreamOptions,
		store: Arc<dyn StreamStateStore>,
	) -> Result<Self> {
		let mut stream = Self::new(session, options)?;

		if let Some(state) = store.read().await? {
			stream.state = state;
		}

		Ok(stream.with_state_store(store))
	}

	/// Checkpoints the cursor into `store` after every non-empty chunk.
	pub fn with_state_store(mut self, store: Arc<dyn StreamStateStore>) -> Self {
		self.sink = Some(store);

		self
	}

	/// Current cursor.
	pub fn stream_state(&self) -> &StreamState {
		&self.state
	}

	/// Replaces the cursor used by the next fetch.
	pub fn set_stream_state(&mut self, state: StreamState) {
		self.state = state;
	}

	/// Handle that pauses, resumes, or closes this stream.
	pub fn controller(&self) -> StreamController {
		self.controller.clone()
	}

	/// Returns the next event or error, or `None` once drained or closed.
	pub async fn next(&mut self) -> Option<StreamItem> {
		loop {
			if let Some(item) = self.buffer.pop_front() {
				return Some(item);
			}

			let proceed = match self.phase {
				Phase::Done => return None,
				Phase::Waiting => {
					self.phase = Phase::Fetching;

					self.controller.sleep(self.polling_interval).await
				},
				Phase::Fetching => self.controller.checkpoint().await,
			};

			if !proceed {
				return None;
			}

			let span = FlowSpan::new(FlowKind::EnterpriseEvents, "fetch");

			match span.instrument(self.fetch()).await {
				Ok(chunk) if !chunk.entries.is_empty() => {
					obs::record_flow_outcome(FlowKind::EnterpriseEvents, FlowOutcome::Success);

					self.buffer.extend(chunk.entries.into_iter().map(StreamItem::Event));
					self.state.stream_position = Some(chunk.next_stream_position);

					self.checkpoint_state().await;
				},
				Ok(_) => self.idle(),
				Err(e) => {
					obs::warn_stream_error(FlowKind::EnterpriseEvents, "fetch", &e);
					obs::record_flow_outcome(FlowKind::EnterpriseEvents, FlowOutcome::Failure);

					self.buffer.push_back(StreamItem::Error(e));
					self.idle();
				},
			}
		}
	}

	/// Drives the stream on a Tokio task, forwarding items into a bounded channel.
	///
	/// The task stops when the stream finishes or the receiver is dropped.
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

	fn idle(&mut self) {
		self.phase = if self.polling_interval.is_zero() { Phase::Done } else { Phase::Waiting };
	}

	async fn checkpoint_state(&mut self) {
		let Some(sink) = self.sink.as_ref() else {
			return;
		};

		if let Err(e) = sink.write(self.state.clone()).await {
			let e = Error::from(e);

			obs::warn_stream_error(FlowKind::EnterpriseEvents, "checkpoint", &e);

			self.buffer.push_back(StreamItem::Error(e));
		}
	}

	async fn fetch(&self) -> Result<EventChunk> {
		let state = &self.state;
		let created_after = state.created_after.map(events::format_timestamp).transpose()?;
		let created_before = state.created_before.map(events::format_timestamp).transpose()?;
		let mut url = self.session.platform().config.events_url()?;

		{
			let mut query = url.query_pairs_mut();

			query.append_pair("stream_type", state.stream_type.as_str());

			if let Some(position) = state.stream_position.as_deref() {
				query.append_pair("stream_position", position);
			}
			if let Some(after) = created_after.as_deref() {
				query.append_pair("created_after", after);
			}
			if let Some(before) = created_before.as_deref() {
				query.append_pair("created_before", before);
			}
			if !state.event_types.is_empty() {
				query.append_pair("event_type", &state.event_types.join(","));
			}

			query.append_pair("limit", &self.chunk_size.to_string());
		}

		let response = self.session.send(EVENTS_ENDPOINT, events::get_request(url)?).await?;

		oauth::parse_json(EVENTS_ENDPOINT, &response)
	}
}
impl<C, M> Debug for EnterpriseEventStream<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EnterpriseEventStream")
			.field("state", &self.state)
			.field("polling_interval", &self.polling_interval)
			.field("chunk_size", &self.chunk_size)
			.field("phase", &self.phase)
			.field("buffered", &self.buffer.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		clock::ManualClock,
		store::{MemoryStore, StoreError, StoreFuture},
	};

	type TestSession = Session<ScriptedHttpClient, ScriptedTransportErrorMapper>;
	type TestStream = EnterpriseEventStream<ScriptedHttpClient, ScriptedTransportErrorMapper>;

	const START: OffsetDateTime = datetime!(2025-01-01 0:00 UTC);

	struct BrokenSink;
	impl StreamStateStore for BrokenSink {
		fn read(&self) -> StoreFuture<'_, Option<StreamState>> {
			Box::pin(async { Ok(None) })
		}

		fn write(&self, _state: StreamState) -> StoreFuture<'_, ()> {
			Box::pin(async { Err(StoreError::Backend { message: "disk full".into() }) })
		}
	}

	fn token_reply() -> ScriptedReply {
		ScriptedReply::json(
			200,
			serde_json::json!({ "access_token": "at", "token_type": "bearer", "expires_in": 3600 }),
		)
	}

	fn chunk(count: usize, first: usize, next: &str) -> ScriptedReply {
		let entries: Vec<_> = (first..first + count)
			.map(|idx| serde_json::json!({ "event_id": format!("e-{idx}"), "event_type": "LOGIN" }))
			.collect();

		ScriptedReply::json(
			200,
			serde_json::json!({ "chunk_size": count, "entries": entries, "next_stream_position": next }),
		)
	}

	fn session(client: &ScriptedHttpClient) -> TestSession {
		Session::anonymous(scripted_platform(
			scripted_config(),
			client.clone(),
			ManualClock::new(START),
		))
	}

	fn drain() -> EnterpriseStreamOptions {
		EnterpriseStreamOptions::default().polling_interval(Duration::ZERO)
	}

	fn stream(client: &ScriptedHttpClient, options: EnterpriseStreamOptions) -> TestStream {
		EnterpriseEventStream::new(session(client), options).expect("Stream options should be valid.")
	}

	async fn collect(stream: &mut TestStream) -> Vec<StreamItem> {
		let mut items = Vec::new();

		while let Some(item) = stream.next().await {
			items.push(item);
		}

		items
	}

	#[tokio::test]
	async fn drain_stops_after_an_empty_chunk() {
		let client =
			ScriptedHttpClient::new([token_reply(), chunk(200, 0, "200"), chunk(0, 0, "200")]);
		let sink = MemoryStore::<StreamState>::default();
		let mut stream = stream(&client, drain())
			.with_state_store(Arc::new(sink.clone()));
		let items = collect(&mut stream).await;
		let ids: Vec<_> =
			items.iter().filter_map(StreamItem::event).filter_map(|e| e.event_id()).collect();

		assert_eq!(items.len(), 200);
		assert_eq!(ids.first().copied(), Some("e-0"));
		assert_eq!(ids.last().copied(), Some("e-199"));
		assert_eq!(stream.stream_state().stream_position.as_deref(), Some("200"));
		assert_eq!(sink.get().and_then(|state| state.stream_position).as_deref(), Some("200"));

		let requests = client.requests();

		assert_eq!(requests.len(), 3);
		assert_eq!(requests[1].query("stream_type").as_deref(), Some("admin_logs"));
		assert_eq!(requests[1].query("created_after").as_deref(), Some("2025-01-01T00:00:00Z"));
		assert_eq!(requests[1].query("limit").as_deref(), Some("500"));
		assert!(requests[1].query("stream_position").is_none());
		assert_eq!(requests[2].query("stream_position").as_deref(), Some("200"));
		assert!(stream.next().await.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn empty_chunks_keep_the_cursor_and_wait() {
		let client = ScriptedHttpClient::new([
			token_reply(),
			chunk(1, 0, "10"),
			chunk(0, 0, "99"),
			chunk(1, 1, "20"),
		]);
		let mut stream = stream(
			&client,
			EnterpriseStreamOptions::default()
				.stream_position("5")
				.event_types(["LOGIN", "FAILED_LOGIN"])
				.chunk_size(100),
		);
		let started = tokio::time::Instant::now();
		let first = stream.next().await.expect("First event should arrive.");
		let second = stream.next().await.expect("Second event should arrive.");

		assert_eq!(first.event().and_then(|e| e.event_id()), Some("e-0"));
		assert_eq!(second.event().and_then(|e| e.event_id()), Some("e-1"));
		assert!(started.elapsed() >= StdDuration::from_secs(60));
		assert_eq!(stream.stream_state().stream_position.as_deref(), Some("20"));

		let requests = client.requests();

		assert_eq!(requests[1].query("stream_position").as_deref(), Some("5"));
		assert_eq!(requests[1].query("event_type").as_deref(), Some("LOGIN,FAILED_LOGIN"));
		assert_eq!(requests[1].query("limit").as_deref(), Some("100"));
		assert_eq!(requests[2].query("stream_position").as_deref(), Some("10"));
		assert_eq!(requests[3].query("stream_position").as_deref(), Some("10"));
	}

	#[tokio::test(start_paused = true)]
	async fn paused_streams_stop_fetching_and_resume_from_the_cursor() {
		let client =
			ScriptedHttpClient::new([token_reply(), chunk(1, 0, "10"), chunk(1, 1, "20")]);
		let mut stream = stream(&client, EnterpriseStreamOptions::default().stream_position("5"));
		let controller = stream.controller();
		let first = stream.next().await.expect("First event should arrive.");

		assert_eq!(first.event().and_then(|e| e.event_id()), Some("e-0"));

		controller.pause();

		let stalled = tokio::time::timeout(StdDuration::from_secs(600), stream.next()).await;

		assert!(stalled.is_err());
		assert_eq!(client.requests().len(), 2);

		controller.resume();

		let second = stream.next().await.expect("Second event should arrive after resuming.");

		assert_eq!(second.event().and_then(|e| e.event_id()), Some("e-1"));
		assert_eq!(stream.stream_state().stream_position.as_deref(), Some("20"));

		let requests = client.requests();

		assert_eq!(requests.len(), 3);
		assert_eq!(requests[2].query("stream_position").as_deref(), Some("10"));
	}

	#[tokio::test]
	async fn drain_ends_on_error() {
		let client = ScriptedHttpClient::new([token_reply(), ScriptedReply::status(503)]);
		let mut stream = stream(&client, drain());
		let items = collect(&mut stream).await;

		assert_eq!(items.len(), 1);
		assert!(matches!(items[0], StreamItem::Error(Error::Transient(_))));
		assert_eq!(stream.stream_state().stream_position, None);
	}

	#[tokio::test]
	async fn restore_resumes_from_the_persisted_cursor() {
		let client = ScriptedHttpClient::new([token_reply(), chunk(1, 0, "43"), chunk(0, 0, "43")]);
		let store = MemoryStore::with_value(StreamState {
			stream_position: Some("42".into()),
			stream_type: EnterpriseStreamType::AdminLogsStreaming,
			..Default::default()
		});
		let mut stream = EnterpriseEventStream::restore(
			session(&client),
			drain(),
			Arc::new(store.clone()),
		)
		.await
		.expect("Restore should succeed.");

		assert_eq!(collect(&mut stream).await.len(), 1);
		assert_eq!(store.get().and_then(|state| state.stream_position).as_deref(), Some("43"));

		let requests = client.requests();

		assert_eq!(requests[1].query("stream_type").as_deref(), Some("admin_logs_streaming"));
		assert_eq!(requests[1].query("stream_position").as_deref(), Some("42"));
		assert!(requests[1].query("created_after").is_none());
	}

	#[tokio::test]
	async fn sink_failures_are_reported_after_the_events() {
		let client = ScriptedHttpClient::new([token_reply(), chunk(2, 0, "7"), chunk(0, 0, "7")]);
		let mut stream = stream(&client, drain())
			.with_state_store(Arc::new(BrokenSink));
		let items = collect(&mut stream).await;

		assert_eq!(items.len(), 3);
		assert!(items[0].event().is_some());
		assert!(items[1].event().is_some());
		assert!(matches!(items[2], StreamItem::Error(Error::Storage(_))));
		assert_eq!(stream.stream_state().stream_position.as_deref(), Some("7"));
	}

	#[tokio::test]
	async fn closed_streams_stop_fetching() {
		let client = ScriptedHttpClient::new([token_reply()]);
		let mut stream = stream(&client, EnterpriseStreamOptions::default());

		stream.controller().close();

		assert!(stream.next().await.is_none());
		assert!(client.requests().is_empty());
	}

	#[test]
	fn streaming_mode_starts_now_and_rejects_dates() {
		let streaming = EnterpriseStreamOptions::default()
			.stream_type(EnterpriseStreamType::AdminLogsStreaming);
		let state = streaming.initial_state(START);

		assert_eq!(state.stream_position.as_deref(), Some(events::NOW));
		assert_eq!(state.created_after, None);
		assert!(streaming.clone().created_after(START).validate().is_err());

		let complete = EnterpriseStreamOptions::default().initial_state(START);

		assert_eq!(complete.created_after, Some(START));
		assert_eq!(complete.stream_position, None);
	}

	#[test]
	fn options_are_validated() {
		let invalid = [
			EnterpriseStreamOptions::default().chunk_size(0),
			EnterpriseStreamOptions::default().chunk_size(501),
			EnterpriseStreamOptions::default().polling_interval(Duration::seconds(-1)),
			EnterpriseStreamOptions::default()
				.created_after(START)
				.created_before(START - Duration::days(1)),
		];

		for options in invalid {
			assert!(matches!(
				options.validate(),
				Err(Error::Config(ConfigError::InvalidStreamOptions { .. }))
			));
		}

		assert!(
			EnterpriseStreamOptions::default()
				.created_after(START)
				.created_before(START + Duration::days(1))
				.validate()
				.is_ok()
		);
	}

	#[test]
	fn stream_state_serializes_dates_as_rfc3339() {
		let state = StreamState {
			created_after: Some(START),
			event_types: vec!["LOGIN".into()],
			..Default::default()
		};
		let json = serde_json::to_value(&state).expect("State should serialize.");

		assert_eq!(json["created_after"], "2025-01-01T00:00:00Z");
		assert_eq!(json["stream_type"], "admin_logs");
		assert_eq!(serde_json::from_value::<StreamState>(json).expect("State should parse."), state);
	}
}
