//! Authenticated API client with one refresh-and-retry on `401`.

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	http::{HttpTransport, Method, RawResponse, RequestDescriptor, RequestExecutor},
	obs::{self, OpKind, OpOutcome, OpSpan},
	session::TokenLifecycleManager,
};

/// Sends API calls with the session token attached.
///
/// A `401` on the first attempt asks the [`TokenLifecycleManager`] for a rotated token and
/// re-sends the same descriptor exactly once; a second `401` is surfaced as
/// [`Error::Unauthorized`]. Every other failure is returned untouched; transient retries belong
/// to the query cache.
#[derive(Clone)]
pub struct ApiClient {
	executor: RequestExecutor,
	session: TokenLifecycleManager,
}
impl ApiClient {
	/// Creates a client that authenticates through `session`.
	pub fn new(
		config: ClientConfig,
		transport: Arc<dyn HttpTransport>,
		session: TokenLifecycleManager,
	) -> Self {
		Self { executor: RequestExecutor::new(config, transport), session }
	}

	/// Session the client draws tokens from.
	pub fn session(&self) -> &TokenLifecycleManager {
		&self.session
	}

	/// Configuration shared with the executor.
	pub fn config(&self) -> &ClientConfig {
		self.executor.config()
	}

	/// Starts a descriptor carrying the configured request timeout.
	pub fn request(&self, method: Method, path: impl Into<String>) -> RequestDescriptor {
		RequestDescriptor::new(method, path, self.config().request_timeout)
	}

	/// `GET path`.
	pub async fn get<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(self.request(Method::Get, path)).await
	}

	/// `GET path?query`.
	pub async fn get_with_query<T>(&self, path: &str, query: Vec<(String, String)>) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(self.request(Method::Get, path).with_query(query)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
	where
		T: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::Post, path).json(body)?).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
	where
		T: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::Put, path).json(body)?).await
	}

	/// `DELETE path`; use `()` for `204 No Content`.
	pub async fn delete<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(self.request(Method::Delete, path)).await
	}

	/// Executes `descriptor` and decodes the JSON body.
	pub async fn send<T>(&self, descriptor: RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.execute(&descriptor).await?.decode()
	}

	/// Executes `descriptor` with at most one refresh-and-retry.
	pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<RawResponse> {
		const KIND: OpKind = OpKind::Request;

		obs::record_outcome(KIND, OpOutcome::Attempt);

		let result = OpSpan::new(KIND, "execute").instrument(self.execute_once(descriptor)).await;

		obs::record_outcome(KIND, OpOutcome::of(&result));

		result
	}

	async fn execute_once(&self, descriptor: &RequestDescriptor) -> Result<RawResponse> {
		if descriptor.public {
			return self.executor.execute(descriptor, None).await;
		}

		let token = self.session.get_valid_token().await?;

		match self.executor.execute(descriptor, Some(&token.access_token)).await {
			Err(Error::Unauthorized(_)) => {
				debug_event!(path = %descriptor.path, "request rejected; refreshing token once");

				let rotated = self.session.refresh_after_unauthorized(&token).await?;

				self.executor.execute(descriptor, Some(&rotated.access_token)).await
			},
			outcome => outcome,
		}
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("executor", &self.executor)
			.field("session", &self.session)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		http::{HttpRequest, TransportFuture},
	};

	// Accepts only `Bearer fresh`; the refresh endpoint hands out `fresh`.
	#[derive(Default)]
	struct RotatingServer {
		refreshes: AtomicUsize,
		requests: AtomicUsize,
		seen: Mutex<Vec<Option<String>>>,
	}
	impl HttpTransport for RotatingServer {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				if request.url.path() == "/auth/refresh" {
					self.refreshes.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(StdDuration::from_millis(10)).await;

					return Ok(RawResponse::new(
						200,
						r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600}"#,
					));
				}

				self.requests.fetch_add(1, Ordering::SeqCst);

				let auth = request.header("authorization").map(str::to_owned);

				self.seen.lock().push(auth.clone());

				Ok(match auth.as_deref() {
					Some("Bearer fresh") => RawResponse::new(200, r#"{"ok":true}"#),
					_ => RawResponse::new(401, r#"{"detail":"Token expired"}"#),
				})
			})
		}
	}

	#[derive(Debug, Deserialize, PartialEq)]
	struct Ack {
		ok: bool,
	}

	#[tokio::test]
	async fn concurrent_unauthorized_calls_share_one_refresh() {
		let server = Arc::new(RotatingServer::default());
		let session = build_test_session(test_config("https://api.example.com"), server.clone());

		session.manager.establish(token_fixture("stale", "r", Duration::hours(1))).await;

		let client = &session.client;
		let results = tokio::join!(
			client.get::<Ack>("/workouts"),
			client.get::<Ack>("/workouts"),
			client.get::<Ack>("/workouts"),
			client.get::<Ack>("/workouts"),
			client.get::<Ack>("/workouts"),
		);

		for result in [results.0, results.1, results.2, results.3, results.4] {
			assert_eq!(result.expect("Retried call should succeed."), Ack { ok: true });
		}

		assert_eq!(server.refreshes.load(Ordering::SeqCst), 1);
		assert_eq!(server.requests.load(Ordering::SeqCst), 10);
		assert_eq!(
			server.seen.lock().iter().filter(|auth| auth.as_deref() == Some("Bearer fresh")).count(),
			5
		);
	}

	#[tokio::test]
	async fn public_descriptor_skips_session() {
		let server = Arc::new(RotatingServer::default());
		let session = build_test_session(test_config("https://api.example.com"), server.clone());
		let descriptor = session.client.request(Method::Get, "/auth/health").public();
		let err = session
			.client
			.send::<Ack>(descriptor)
			.await
			.expect_err("Anonymous call should be rejected by the fake server.");

		assert!(matches!(err, Error::Unauthorized(_)));
		assert_eq!(server.seen.lock().as_slice(), &[None]);
		assert_eq!(server.refreshes.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn signed_out_session_fails_before_sending() {
		let server = Arc::new(RotatingServer::default());
		let session = build_test_session(test_config("https://api.example.com"), server.clone());
		let err = session.client.get::<Ack>("/workouts").await.expect_err("No session exists.");

		assert!(err.is_sign_out());
		assert_eq!(server.requests.load(Ordering::SeqCst), 0);
	}
}
