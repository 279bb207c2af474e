//! Transport primitives and the request executor.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack: it sends one
//! [`HttpRequest`] and returns a [`RawResponse`] or a [`TransportError`]. The
//! [`RequestExecutor`] sits on top of it, turning a [`RequestDescriptor`] plus an optional
//! bearer token into one request, enforcing the descriptor's timeout, and classifying the
//! response into success or an [`Error`] kind. The executor has no side effects beyond the
//! network call itself.

// self
use crate::{_prelude::*, auth::TokenSecret, config::ClientConfig, error::ErrorDetail};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of sending one request.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// executor, the token lifecycle manager, and spawned refresh tasks.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the raw response, whatever its status.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Failures raised by a transport before a response was received.
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Connection, DNS, or TLS failure.
	#[error("Network failure: {message}.")]
	Network {
		/// Transport-specific message.
		message: String,
	},
	/// The transport's own deadline elapsed.
	#[error("Transport timed out.")]
	Timeout,
	/// Request could not be constructed by the transport.
	#[error("Request could not be built: {message}.")]
	Build {
		/// Transport-specific message.
		message: String,
	},
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::Timeout
		} else if e.is_builder() {
			Self::Build { message: e.to_string() }
		} else {
			Self::Network { message: e.to_string() }
		}
	}
}

/// HTTP methods used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Immutable description of one API call.
///
/// Descriptors are built per call and are only ever re-sent by the client's bounded
/// refresh-and-retry path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL (e.g. `/workouts`).
	pub path: String,
	/// Query parameters appended to the URL.
	pub query: Vec<(String, String)>,
	/// JSON body, already encoded.
	pub body: Option<Vec<u8>>,
	/// Extra headers.
	pub headers: Vec<(String, String)>,
	/// Per-request timeout.
	pub timeout: StdDuration,
	/// Public endpoints skip the bearer token and the refresh-and-retry path.
	pub public: bool,
}
impl RequestDescriptor {
	/// Creates a descriptor with the provided method, path, and timeout.
	pub fn new(method: Method, path: impl Into<String>, timeout: StdDuration) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			headers: Vec::new(),
			timeout,
			public: false,
		}
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(|e| {
			Error::Validation(ErrorDetail::new(format!("Request body could not be encoded: {e}")))
		})?;

		self.body = Some(bytes);

		Ok(self)
	}

	/// Appends query parameters.
	pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Adds one header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Overrides the timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Marks the endpoint as public (no bearer token, no refresh retry).
	pub fn public(mut self) -> Self {
		self.public = true;

		self
	}
}

/// Fully resolved request handed to an [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL.
	pub url: Url,
	/// Headers, including `Authorization` when a token was supplied.
	pub headers: Vec<(String, String)>,
	/// Encoded body.
	pub body: Option<Vec<u8>>,
	/// Deadline the transport may enforce on its own.
	pub timeout: StdDuration,
}
impl HttpRequest {
	/// Returns the first header value matching `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Raw HTTP response as received from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body as JSON; an empty body decodes as `null` (so `()` accepts `204`).
	pub fn decode<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let bytes: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
			b"null"
		} else {
			&self.body
		};
		let mut de = serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(&mut de).map_err(|e| Error::decode(e, Some(self.status)))
	}
}

/// `{ detail, error_code? }` error body emitted by the backend.
#[derive(Debug, Deserialize)]
struct ErrorBody {
	detail: serde_json::Value,
	#[serde(default)]
	error_code: Option<String>,
}

/// Sends one request and classifies the outcome.
#[derive(Clone)]
pub struct RequestExecutor {
	config: ClientConfig,
	transport: Arc<dyn HttpTransport>,
}
impl RequestExecutor {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an executor over the provided transport.
	pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
		Self { config, transport }
	}

	/// Configuration the executor resolves URLs against.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Builds and sends one request, enforcing the descriptor timeout.
	///
	/// The `Authorization: Bearer` header is attached only when `token` is supplied. A
	/// request exceeding its timeout is dropped (cancelling the transport future) and yields
	/// [`Error::Timeout`].
	pub async fn execute(
		&self,
		descriptor: &RequestDescriptor,
		token: Option<&TokenSecret>,
	) -> Result<RawResponse> {
		let request = self.build_request(descriptor, token)?;

		debug_event!(method = %descriptor.method, path = %descriptor.path, "sending API request");

		let response = match tokio::time::timeout(descriptor.timeout, self.transport.send(request))
			.await
		{
			Ok(Ok(response)) => response,
			Ok(Err(TransportError::Timeout)) | Err(_) => return Err(Error::Timeout),
			Ok(Err(TransportError::Network { message })) =>
				return Err(Error::Network { message, source: None }),
			Ok(Err(TransportError::Build { message })) =>
				return Err(Error::Validation(ErrorDetail::new(message))),
		};

		classify(response)
	}

	fn build_request(
		&self,
		descriptor: &RequestDescriptor,
		token: Option<&TokenSecret>,
	) -> Result<HttpRequest> {
		let url = self.config.endpoint(&descriptor.path, &descriptor.query)?;
		let mut headers = Vec::with_capacity(descriptor.headers.len() + 3);

		headers.push(("accept".to_owned(), "application/json".to_owned()));

		if descriptor.body.is_some() {
			headers.push(("content-type".to_owned(), "application/json".to_owned()));
		}
		if let Some(token) = token {
			headers.push(("authorization".to_owned(), token.bearer()));
		}

		headers.extend(descriptor.headers.iter().cloned());

		Ok(HttpRequest {
			method: descriptor.method,
			url,
			headers,
			body: descriptor.body.clone(),
			timeout: descriptor.timeout,
		})
	}
}
impl Debug for RequestExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutor").field("base_url", &self.config.base_url.as_str()).finish()
	}
}

/// Maps a raw response onto success or an [`Error`] kind.
pub fn classify(response: RawResponse) -> Result<RawResponse> {
	if response.is_success() {
		return Ok(response);
	}

	let detail = error_detail(&response);

	Err(match response.status {
		401 => Error::Unauthorized(detail),
		400 | 422 => Error::Validation(detail),
		429 | 500..=599 => Error::Server(detail),
		_ => Error::Rejected(detail),
	})
}

fn error_detail(response: &RawResponse) -> ErrorDetail {
	let detail = match serde_json::from_slice::<ErrorBody>(&response.body) {
		Ok(body) => {
			let message = match body.detail {
				serde_json::Value::String(message) => message,
				// Validation errors carry a list of field errors instead of a string.
				other => other.to_string(),
			};
			let detail = ErrorDetail::new(message);

			match body.error_code {
				Some(code) => detail.with_error_code(code),
				None => detail,
			}
		},
		Err(_) => ErrorDetail::new(body_preview(&response.body)),
	};

	detail.with_status(response.status)
}

fn body_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "empty response body".into();
	}

	trimmed.chars().take(RequestExecutor::BODY_PREVIEW_LIMIT).collect()
}

/// Reqwest-backed [`HttpTransport`].
///
/// Redirects are not followed by the default client so auth failures surface as-is.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client that does not follow redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestTransport {
	fn default() -> Self {
		Self::new().unwrap_or_else(|_| Self(ReqwestClient::default()))
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url).timeout(request.timeout);

			for (name, value) in request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(RawResponse { status, body })
		})
	}
}
