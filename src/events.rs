//! Consumers of the platform's append-only event log.
//!
//! [`EventStream`] follows a user's events through long-polling; [`EnterpriseEventStream`]
//! polls the enterprise admin log on an interval. Both are explicit state machines driven by
//! [`next`](EventStream::next): a chunk is fully handed to the consumer before the next fetch is
//! issued, and a shared [`StreamController`] pauses, resumes, or closes them between suspension
//! points. Failures surface as [`StreamItem::Error`] values and do not end the stream.

pub mod dedup;
pub mod enterprise;
pub mod user;

pub use dedup::DedupCache;
pub use enterprise::*;
pub use user::*;

// crates.io
use oauth2::{
	HttpRequest,
	http::{Method, Request, header::ACCEPT},
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;
// self
use crate::{_prelude::*, error::ConfigError, manager};

/// Logical label of the events collection endpoint.
pub const EVENTS_ENDPOINT: &str = "events";
/// Logical label of the long-poll realtime endpoint.
pub const LONG_POLL_ENDPOINT: &str = "long_poll";

/// One raw event as returned by the platform.
///
/// The payload stays opaque; only the fields the streams need are exposed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(pub Value);
impl EventRecord {
	/// Platform-assigned event identifier.
	pub fn event_id(&self) -> Option<&str> {
		self.0.get("event_id").and_then(Value::as_str)
	}

	/// Event type label.
	pub fn event_type(&self) -> Option<&str> {
		self.0.get("event_type").and_then(Value::as_str)
	}

	/// Creation instant, when present and well formed.
	pub fn created_at(&self) -> Option<OffsetDateTime> {
		self.0
			.get("created_at")
			.and_then(Value::as_str)
			.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
	}

	/// Raw JSON payload.
	pub fn as_value(&self) -> &Value {
		&self.0
	}

	/// Consumes the record, returning the raw JSON payload.
	pub fn into_value(self) -> Value {
		self.0
	}
}

/// Item observed by a stream consumer.
#[derive(Clone, Debug)]
pub enum StreamItem {
	/// Next event in server order.
	Event(EventRecord),
	/// Non-fatal failure; the stream keeps running.
	Error(Error),
}
impl StreamItem {
	/// Returns the event, if this item carries one.
	pub fn event(&self) -> Option<&EventRecord> {
		match self {
			Self::Event(event) => Some(event),
			Self::Error(_) => None,
		}
	}
}

/// Run state shared between a stream and its controllers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
	/// Fetching and delivering.
	Running,
	/// Suspended before the next fetch or poll.
	Paused,
	/// Finished; [`next`](EventStream::next) returns `None` from now on.
	Closed,
}

/// Cloneable handle that pauses, resumes, or closes a stream from any task.
#[derive(Clone, Debug)]
pub struct StreamController(Arc<watch::Sender<StreamStatus>>);
impl StreamController {
	/// Creates a controller in the running state.
	pub fn new() -> Self {
		Self(Arc::new(watch::channel(StreamStatus::Running).0))
	}

	/// Current status.
	pub fn status(&self) -> StreamStatus {
		*self.0.borrow()
	}

	/// Suspends fetching; an in-flight fetch still completes.
	pub fn pause(&self) {
		self.transition(StreamStatus::Running, StreamStatus::Paused);
	}

	/// Resumes from the last known cursor.
	pub fn resume(&self) {
		self.transition(StreamStatus::Paused, StreamStatus::Running);
	}

	/// Closes the stream for good.
	pub fn close(&self) {
		self.0.send_replace(StreamStatus::Closed);
	}

	fn transition(&self, from: StreamStatus, to: StreamStatus) {
		self.0.send_if_modified(|status| {
			if *status == from {
				*status = to;

				true
			} else {
				false
			}
		});
	}

	/// Waits out a pause; returns `false` once the stream is closed.
	pub(crate) async fn checkpoint(&self) -> bool {
		let mut receiver = self.0.subscribe();
		let status = receiver.wait_for(|status| *status != StreamStatus::Paused).await.map(|s| *s);

		matches!(status, Ok(StreamStatus::Running))
	}

	/// Drives `fut` unless the stream is closed first.
	pub(crate) async fn until_closed<F>(&self, fut: F) -> Option<F::Output>
	where
		F: Future,
	{
		let mut receiver = self.0.subscribe();
		let closed =
			async move { receiver.wait_for(|status| *status == StreamStatus::Closed).await.is_ok() };

		tokio::select! {
			output = fut => Some(output),
			_ = closed => None,
		}
	}

	/// Sleeps for `delay` and then honors any pause; returns `false` once closed.
	pub(crate) async fn sleep(&self, delay: Duration) -> bool {
		self.until_closed(manager::sleep(delay)).await.is_some() && self.checkpoint().await
	}
}
impl Default for StreamController {
	fn default() -> Self {
		Self::new()
	}
}

/// One page of the events endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct EventChunk {
	#[serde(default)]
	pub(crate) entries: Vec<EventRecord>,
	#[serde(deserialize_with = "de_position")]
	pub(crate) next_stream_position: String,
}

/// Stream positions arrive as strings or integers; both are kept verbatim as text.
fn de_position<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Text(String),
		Number(serde_json::Number),
	}

	Ok(match Raw::deserialize(deserializer)? {
		Raw::Text(text) => text,
		Raw::Number(number) => number.to_string(),
	})
}

pub(crate) fn get_request(url: Url) -> Result<HttpRequest> {
	request(Method::GET, url)
}

pub(crate) fn request(method: Method, url: Url) -> Result<HttpRequest> {
	Request::builder()
		.method(method)
		.uri(url.as_str())
		.header(ACCEPT, "application/json")
		.body(Vec::new())
		.map_err(|e| ConfigError::from(e).into())
}

pub(crate) fn format_timestamp(instant: OffsetDateTime) -> Result<String> {
	instant.format(&Rfc3339).map_err(|e| ConfigError::from(e).into())
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;

	#[test]
	fn records_expose_identity_fields() {
		let record = EventRecord(serde_json::json!({
			"event_id": "e-1",
			"event_type": "ITEM_UPLOAD",
			"created_at": "2025-01-01T00:00:00-08:00",
			"source": { "id": "42" },
		}));

		assert_eq!(record.event_id(), Some("e-1"));
		assert_eq!(record.event_type(), Some("ITEM_UPLOAD"));
		assert_eq!(record.created_at().map(OffsetDateTime::unix_timestamp), Some(1_735_718_400));
		assert_eq!(record.as_value()["source"]["id"], "42");
	}

	#[test]
	fn chunk_positions_accept_numbers_and_strings() {
		let numeric: EventChunk = serde_json::from_value(serde_json::json!({
			"entries": [],
			"next_stream_position": 1_152_922_976_252_290_886u64,
		}))
		.expect("Numeric positions should parse.");
		let text: EventChunk =
			serde_json::from_value(serde_json::json!({ "next_stream_position": "now-ish" }))
				.expect("String positions should parse.");

		assert_eq!(numeric.next_stream_position, "1152922976252290886");
		assert_eq!(text.next_stream_position, "now-ish");
		assert!(text.entries.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn controller_pauses_resumes_and_closes() {
		let controller = StreamController::new();

		assert!(controller.checkpoint().await);

		controller.pause();

		let waiter = tokio::spawn({
			let controller = controller.clone();

			async move { controller.checkpoint().await }
		});

		tokio::time::sleep(StdDuration::from_millis(10)).await;

		assert!(!waiter.is_finished());

		controller.resume();

		assert!(waiter.await.expect("Checkpoint task should finish."));

		let sleeper = tokio::spawn({
			let controller = controller.clone();

			async move { controller.sleep(Duration::hours(1)).await }
		});

		tokio::task::yield_now().await;
		controller.close();

		assert!(!sleeper.await.expect("Sleep task should finish."));
		assert_eq!(controller.status(), StreamStatus::Closed);

		controller.resume();

		assert_eq!(controller.status(), StreamStatus::Closed);
	}
}
