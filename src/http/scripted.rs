//! In-process transport that replays scripted responses and records every request.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderName, HeaderValue, StatusCode},
};
// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{PlatformHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{ErrorStrategy, TransportErrorMapper},
};

/// Failure produced by [`ScriptedHttpClient`].
#[derive(Clone, Debug, ThisError)]
#[error("{0}")]
pub struct ScriptedTransportError(pub String);

/// Maps [`ScriptedTransportError`] into network failures.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransportErrorMapper;
impl TransportErrorMapper<ScriptedTransportError> for ScriptedTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ErrorStrategy,
		_endpoint: &'static str,
		_meta: Option<&ResponseMetadata>,
		error: HttpClientError<ScriptedTransportError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
			other => TransportError::network(ScriptedTransportError(other.to_string())).into(),
		}
	}
}

#[derive(Clone, Debug)]
enum ReplyKind {
	Response { status: u16, headers: Vec<(String, String)>, body: Vec<u8> },
	Failure(String),
	Pending,
}

/// One scripted outcome, consumed in FIFO order.
#[derive(Clone, Debug)]
pub struct ScriptedReply {
	kind: ReplyKind,
	delay: Option<StdDuration>,
}
impl ScriptedReply {
	/// Replies with a JSON body.
	pub fn json(status: u16, body: serde_json::Value) -> Self {
		Self {
			kind: ReplyKind::Response {
				status,
				headers: vec![("content-type".into(), "application/json".into())],
				body: body.to_string().into_bytes(),
			},
			delay: None,
		}
	}

	/// Replies with a raw body.
	pub fn text(status: u16, body: impl Into<String>) -> Self {
		Self {
			kind: ReplyKind::Response { status, headers: Vec::new(), body: body.into().into_bytes() },
			delay: None,
		}
	}

	/// Replies with an empty body.
	pub fn status(status: u16) -> Self {
		Self::text(status, "")
	}

	/// Fails at the transport layer.
	pub fn network_error(message: impl Into<String>) -> Self {
		Self { kind: ReplyKind::Failure(message.into()), delay: None }
	}

	/// Never resolves; useful for exercising client-side timeouts.
	pub fn pending() -> Self {
		Self { kind: ReplyKind::Pending, delay: None }
	}

	/// Adds a response header.
	pub fn header(mut self, name: &str, value: &str) -> Self {
		if let ReplyKind::Response { headers, .. } = &mut self.kind {
			headers.push((name.into(), value.into()));
		}

		self
	}

	/// Delays the reply on the Tokio clock.
	pub fn delay(mut self, delay: StdDuration) -> Self {
		self.delay = Some(delay);

		self
	}
}

/// A request observed by [`ScriptedHttpClient`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	/// HTTP method.
	pub method: String,
	/// Full request URL.
	pub url: Url,
	/// Request headers, lowercased names.
	pub headers: Vec<(String, String)>,
	/// Raw body.
	pub body: String,
}
impl RecordedRequest {
	/// Returns the first header value with the given (case-insensitive) name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Returns the first query parameter with the given name.
	pub fn query(&self, name: &str) -> Option<String> {
		self.url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
	}

	/// Decodes the body as an `application/x-www-form-urlencoded` map.
	pub fn form(&self) -> BTreeMap<String, String> {
		url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
	}
}

#[derive(Debug, Default)]
struct ScriptState {
	replies: Mutex<VecDeque<ScriptedReply>>,
	requests: Mutex<Vec<RecordedRequest>>,
}

/// Transport that answers requests from a queue of [`ScriptedReply`] values.
///
/// Clones share the same script, so a test keeps one handle for assertions while the
/// platform owns another. Once the script runs dry every request fails at the transport
/// layer.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHttpClient(Arc<ScriptState>);
impl ScriptedHttpClient {
	/// Creates a transport that replays `replies` in order.
	pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
		let client = Self::default();

		client.0.replies.lock().extend(replies);

		client
	}

	/// Appends a reply to the script.
	pub fn push(&self, reply: ScriptedReply) {
		self.0.replies.lock().push_back(reply);
	}

	/// Snapshot of every request observed so far.
	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}

	/// Number of replies not yet consumed.
	pub fn remaining(&self) -> usize {
		self.0.replies.lock().len()
	}
}
impl PlatformHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = ScriptedTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { state: Arc::clone(&self.0), slot }
	}
}

/// Handle returned by [`ScriptedHttpClient`].
#[derive(Clone, Debug)]
pub struct ScriptedHandle {
	state: Arc<ScriptState>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<ScriptedTransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let state = Arc::clone(&self.state);
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let recorded = record(&request);
			let reply = {
				state.requests.lock().push(recorded);

				state.replies.lock().pop_front()
			};
			let Some(reply) = reply else {
				return Err(HttpClientError::Reqwest(Box::new(ScriptedTransportError(
					"script exhausted".into(),
				))));
			};

			if let Some(delay) = reply.delay {
				tokio::time::sleep(delay).await;
			}

			match reply.kind {
				ReplyKind::Response { status, headers, body } => {
					let mut response = HttpResponse::new(body);

					*response.status_mut() =
						StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

					for (name, value) in headers {
						if let (Ok(name), Ok(value)) =
							(HeaderName::try_from(name), HeaderValue::try_from(value))
						{
							response.headers_mut().append(name, value);
						}
					}

					slot.store(ResponseMetadata::from_headers(status, response.headers()));

					Ok(response)
				},
				ReplyKind::Failure(message) =>
					Err(HttpClientError::Reqwest(Box::new(ScriptedTransportError(message)))),
				ReplyKind::Pending => std::future::pending().await,
			}
		})
	}
}

fn record(request: &HttpRequest) -> RecordedRequest {
	RecordedRequest {
		method: request.method().to_string(),
		url: Url::parse(&request.uri().to_string())
			.unwrap_or_else(|_| Url::parse("invalid://request").expect("Static URL must parse.")),
		headers: request
			.headers()
			.iter()
			.map(|(name, value)| {
				(name.as_str().to_owned(), value.to_str().unwrap_or_default().to_owned())
			})
			.collect(),
		body: String::from_utf8_lossy(request.body()).into_owned(),
	}
}
