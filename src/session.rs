//! Token lifecycle: restore, early refresh, single-flight rotation, and forced sign-out.
//!
//! [`TokenLifecycleManager`] exclusively owns the current [`Token`]. Callers ask for a valid
//! token with [`TokenLifecycleManager::get_valid_token`]; a token inside the skew window (or
//! past expiry) starts a refresh. The refresh runs on a spawned task and every concurrent
//! caller awaits the same outcome, so N callers trigger exactly one call to the refresh
//! endpoint, and a caller that gives up waiting never cancels the rotation the others depend
//! on. A failed refresh clears the session and resolves every waiter with
//! [`Error::NotAuthenticated`].

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{RefreshRequest, Token, TokenGrant},
	config::ClientConfig,
	http::{HttpTransport, Method, RequestDescriptor, RequestExecutor},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::TokenStore,
};

type RefreshOutcome = watch::Receiver<Option<Result<Token>>>;

/// Observable lifecycle state of the session token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenState {
	/// Signed out or guest.
	NoToken,
	/// A token exists and is outside the skew window.
	Valid,
	/// A refresh call is in flight.
	Refreshing,
	/// A token exists but is expired or inside the skew window.
	Expired,
}

/// Point-in-time refresh counters for one manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
	/// Refresh calls sent to the server.
	pub attempts: u64,
	/// Refresh calls that produced a new token.
	pub successes: u64,
	/// Refresh calls that forced a sign-out.
	pub failures: u64,
}

#[derive(Debug, Default)]
struct RefreshCounters {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
}
impl RefreshCounters {
	fn snapshot(&self) -> RefreshStats {
		RefreshStats {
			attempts: self.attempts.load(Ordering::Relaxed),
			successes: self.successes.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
		}
	}
}

enum Slot {
	Unrestored,
	NoToken,
	Valid(Token),
	Refreshing { generation: u64, outcome: RefreshOutcome },
}

struct SlotState {
	slot: Slot,
	// Bumped on sign-in and sign-out so a late refresh cannot resurrect a replaced session.
	generation: u64,
}

struct Inner {
	executor: RequestExecutor,
	tokens: Arc<TokenStore>,
	skew: Duration,
	refresh_path: String,
	timeout: StdDuration,
	state: Mutex<SlotState>,
	restore: AsyncMutex<()>,
	// Held across "is this generation still current" and the matching storage write.
	persist: AsyncMutex<()>,
	counters: RefreshCounters,
	authenticated: watch::Sender<bool>,
}

/// Owns the session token and its refresh protocol.
///
/// Cloning is cheap; clones share the same session. Separate instances never share state,
/// so isolated sessions (tests, multiple accounts) can run side by side.
#[derive(Clone)]
pub struct TokenLifecycleManager(Arc<Inner>);
impl TokenLifecycleManager {
	/// Creates a manager whose token is lazily restored from `tokens` on first use.
	pub fn new(
		config: ClientConfig,
		transport: Arc<dyn HttpTransport>,
		tokens: Arc<TokenStore>,
	) -> Self {
		let (authenticated, _) = watch::channel(false);

		Self(Arc::new(Inner {
			skew: config.refresh_skew,
			refresh_path: config.refresh_path.clone(),
			timeout: config.request_timeout,
			executor: RequestExecutor::new(config, transport),
			tokens,
			state: Mutex::new(SlotState { slot: Slot::Unrestored, generation: 0 }),
			restore: AsyncMutex::new(()),
			persist: AsyncMutex::new(()),
			counters: RefreshCounters::default(),
			authenticated,
		}))
	}

	/// Returns a token that is valid beyond the skew window, refreshing first when needed.
	///
	/// Fails with [`Error::NotAuthenticated`] when no session exists or the refresh failed.
	pub async fn get_valid_token(&self) -> Result<Token> {
		self.ensure_restored().await;

		let outcome = {
			let mut state = self.0.state.lock();
			let now = OffsetDateTime::now_utc();
			let stale = match &state.slot {
				Slot::Unrestored | Slot::NoToken => return Err(Error::NotAuthenticated),
				Slot::Valid(token) if !token.is_stale_at(now, self.0.skew) =>
					return Ok(token.clone()),
				Slot::Valid(token) => Some(token.clone()),
				Slot::Refreshing { .. } => None,
			};

			match (stale, &state.slot) {
				(Some(previous), _) => self.begin_refresh(&mut state, previous),
				(None, Slot::Refreshing { outcome, .. }) => outcome.clone(),
				(None, _) => return Err(Error::NotAuthenticated),
			}
		};

		await_outcome(outcome).await
	}

	/// Refreshes after the server rejected `rejected` with 401.
	///
	/// If another caller already rotated past `rejected`, the newer token is returned without
	/// another refresh; if a refresh is in flight, its outcome is shared.
	pub async fn refresh_after_unauthorized(&self, rejected: &Token) -> Result<Token> {
		self.ensure_restored().await;

		let outcome = {
			let mut state = self.0.state.lock();
			let previous = match &state.slot {
				Slot::Unrestored | Slot::NoToken => return Err(Error::NotAuthenticated),
				Slot::Valid(current) if current.access_token != rejected.access_token =>
					return Ok(current.clone()),
				Slot::Valid(current) => Some(current.clone()),
				Slot::Refreshing { .. } => None,
			};

			match (previous, &state.slot) {
				(Some(previous), _) => self.begin_refresh(&mut state, previous),
				(None, Slot::Refreshing { outcome, .. }) => outcome.clone(),
				(None, _) => return Err(Error::NotAuthenticated),
			}
		};

		await_outcome(outcome).await
	}

	/// Installs a freshly issued token (sign-in) and persists it.
	///
	/// A persistence failure keeps the in-memory session alive; it only means the session will
	/// not survive a restart.
	pub async fn establish(&self, token: Token) {
		let generation = self.replace_slot(Slot::Valid(token.clone()));

		self.0.authenticated.send_replace(true);

		let _persist = self.0.persist.lock().await;

		// A later sign-in or sign-out owns the storage now.
		if self.generation() != generation {
			return;
		}
		if let Err(e) = self.0.tokens.save(&token).await {
			warn_event!(error = %e, "token could not be persisted; session is memory-only");
		}
	}

	/// Drops the session and clears persisted credentials.
	pub async fn sign_out(&self) {
		let generation = self.replace_slot(Slot::NoToken);

		self.0.authenticated.send_replace(false);

		let _persist = self.0.persist.lock().await;

		if self.generation() == generation {
			self.clear_persisted().await;
		}
	}

	/// Returns the current token without refreshing it.
	pub fn current_token(&self) -> Option<Token> {
		match &self.0.state.lock().slot {
			Slot::Valid(token) => Some(token.clone()),
			_ => None,
		}
	}

	/// Snapshot of the lifecycle state.
	pub fn state(&self) -> TokenState {
		let now = OffsetDateTime::now_utc();

		match &self.0.state.lock().slot {
			Slot::Unrestored | Slot::NoToken => TokenState::NoToken,
			Slot::Refreshing { .. } => TokenState::Refreshing,
			Slot::Valid(token) if token.is_stale_at(now, self.0.skew) => TokenState::Expired,
			Slot::Valid(_) => TokenState::Valid,
		}
	}

	/// Subscribes to authentication changes; `false` after sign-out or a failed refresh.
	pub fn watch_authenticated(&self) -> watch::Receiver<bool> {
		self.0.authenticated.subscribe()
	}

	/// Refresh counters for this manager.
	pub fn refresh_stats(&self) -> RefreshStats {
		self.0.counters.snapshot()
	}

	/// Loads the persisted token once; storage failures count as "signed out".
	pub async fn ensure_restored(&self) {
		if !matches!(self.0.state.lock().slot, Slot::Unrestored) {
			return;
		}

		let _serial = self.0.restore.lock().await;

		if !matches!(self.0.state.lock().slot, Slot::Unrestored) {
			return;
		}

		let loaded = match self.0.tokens.load().await {
			Ok(token) => token,
			Err(e) => {
				warn_event!(error = %e, "stored token is unreadable; treating session as signed out");

				None
			},
		};
		let authenticated = loaded.is_some();

		{
			let mut state = self.0.state.lock();

			// A sign-in or sign-out that raced the load wins.
			if matches!(state.slot, Slot::Unrestored) {
				state.slot = match loaded {
					Some(token) => Slot::Valid(token),
					None => Slot::NoToken,
				};
			}
		}

		if authenticated {
			self.0.authenticated.send_replace(true);
		}
	}

	fn begin_refresh(&self, state: &mut SlotState, previous: Token) -> RefreshOutcome {
		let (tx, rx) = watch::channel(None);
		let generation = state.generation;

		state.slot = Slot::Refreshing { generation, outcome: rx.clone() };

		let manager = self.clone();

		tokio::spawn(async move {
			let refresh = tokio::spawn({
				let manager = manager.clone();

				async move { manager.run_refresh(generation, previous).await }
			});
			let result = match refresh.await {
				Ok(result) => result,
				// The refresh task panicked; nobody else will settle this generation.
				Err(e) => {
					warn_event!(error = %e, "token refresh task aborted; signing out");

					manager.end_refresh(generation).await
				},
			};

			let _ = tx.send(Some(result));
		});

		rx
	}

	async fn run_refresh(&self, generation: u64, previous: Token) -> Result<Token> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh_token");

		obs::record_outcome(KIND, OpOutcome::Attempt);
		self.0.counters.attempts.fetch_add(1, Ordering::Relaxed);

		let exchanged = span.instrument(self.exchange(&previous)).await;
		let result = match exchanged {
			Ok(token) => self.commit_refresh(generation, token).await,
			Err(e) => {
				warn_event!(error = %e, "token refresh failed; signing out");

				self.end_refresh(generation).await
			},
		};

		obs::record_outcome(KIND, OpOutcome::of(&result));

		result
	}

	// Refresh never goes through the client's retry-after-refresh path.
	async fn exchange(&self, previous: &Token) -> Result<Token> {
		let descriptor = RequestDescriptor::new(Method::Post, &self.0.refresh_path, self.0.timeout)
			.json(&RefreshRequest { refresh_token: previous.refresh_token.expose() })?
			.public();
		let response = self.0.executor.execute(&descriptor, None).await?;
		let grant = response.decode::<TokenGrant>()?;

		Token::from_grant(&grant, Some(&previous.refresh_token), OffsetDateTime::now_utc())
	}

	async fn commit_refresh(&self, generation: u64, token: Token) -> Result<Token> {
		self.0.counters.successes.fetch_add(1, Ordering::Relaxed);

		let _persist = self.0.persist.lock().await;

		if self.refresh_is_current(generation) {
			if let Err(e) = self.0.tokens.save(&token).await {
				warn_event!(error = %e, "refreshed token could not be persisted");
			}
		}

		self.settle(generation, Some(token))
	}

	async fn end_refresh(&self, generation: u64) -> Result<Token> {
		self.0.counters.failures.fetch_add(1, Ordering::Relaxed);

		let _persist = self.0.persist.lock().await;

		if self.refresh_is_current(generation) {
			self.clear_persisted().await;
		}

		self.settle(generation, None)
	}

	fn replace_slot(&self, slot: Slot) -> u64 {
		let mut state = self.0.state.lock();

		state.generation += 1;
		state.slot = slot;

		state.generation
	}

	fn generation(&self) -> u64 {
		self.0.state.lock().generation
	}

	fn refresh_is_current(&self, generation: u64) -> bool {
		is_refreshing(&self.0.state.lock(), generation)
	}

	fn settle(&self, generation: u64, refreshed: Option<Token>) -> Result<Token> {
		let mut state = self.0.state.lock();

		if !is_refreshing(&state, generation) {
			// Superseded by sign-in or sign-out; report whatever session exists now.
			return match &state.slot {
				Slot::Valid(token) => Ok(token.clone()),
				_ => Err(Error::NotAuthenticated),
			};
		}

		match refreshed {
			Some(token) => {
				state.slot = Slot::Valid(token.clone());

				Ok(token)
			},
			None => {
				state.slot = Slot::NoToken;

				drop(state);
				self.0.authenticated.send_replace(false);

				Err(Error::NotAuthenticated)
			},
		}
	}

	async fn clear_persisted(&self) {
		if let Err(e) = self.0.tokens.clear().await {
			warn_event!(error = %e, "persisted token could not be cleared");
		}
	}
}
impl Debug for TokenLifecycleManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenLifecycleManager")
			.field("state", &self.state())
			.field("refresh", &self.refresh_stats())
			.finish()
	}
}

fn is_refreshing(state: &SlotState, generation: u64) -> bool {
	state.generation == generation
		&& matches!(state.slot, Slot::Refreshing { generation: started, .. } if started == generation)
}

async fn await_outcome(mut outcome: RefreshOutcome) -> Result<Token> {
	let settled = match outcome.wait_for(Option::is_some).await {
		Ok(value) => value.clone(),
		Err(_) => None,
	};

	settled.unwrap_or(Err(Error::NotAuthenticated))
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// self
	use super::*;
	use crate::{
		http::{HttpRequest, RawResponse, TransportFuture},
		store::MemoryKeyValueStore,
	};

	const FRESH_GRANT: &str = r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600}"#;

	struct CountingRefresh {
		calls: AtomicUsize,
		status: u16,
		body: &'static str,
	}
	impl HttpTransport for CountingRefresh {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let (status, body) = (self.status, self.body);

			Box::pin(async move {
				assert_eq!(request.url.path(), "/auth/refresh");
				assert!(request.header("authorization").is_none());

				tokio::time::sleep(StdDuration::from_millis(20)).await;

				Ok(RawResponse::new(status, body))
			})
		}
	}

	struct PanickingRefresh;
	impl HttpTransport for PanickingRefresh {
		fn send(&self, _: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move { blow_up() })
		}
	}

	fn blow_up() -> Result<RawResponse, crate::http::TransportError> {
		panic!("transport blew up mid-refresh")
	}

	fn manager(status: u16) -> (TokenLifecycleManager, Arc<CountingRefresh>, Arc<TokenStore>) {
		manager_with(status, FRESH_GRANT)
	}

	fn manager_with(
		status: u16,
		body: &'static str,
	) -> (TokenLifecycleManager, Arc<CountingRefresh>, Arc<TokenStore>) {
		let transport = Arc::new(CountingRefresh { calls: AtomicUsize::new(0), status, body });
		let (manager, tokens) = manager_over(transport.clone());

		(manager, transport, tokens)
	}

	fn manager_over(transport: Arc<dyn HttpTransport>) -> (TokenLifecycleManager, Arc<TokenStore>) {
		let config = ClientConfig::parse("https://api.example.com")
			.expect("Base URL should parse.")
			.build()
			.expect("Config should be valid.");
		let tokens = Arc::new(TokenStore::new(Arc::new(MemoryKeyValueStore::default())));
		let manager = TokenLifecycleManager::new(config, transport, tokens.clone());

		(manager, tokens)
	}

	fn expired(access: &str) -> Token {
		Token::new(access, "r", OffsetDateTime::now_utc() - Duration::seconds(1))
	}

	async fn assert_signed_out(manager: &TokenLifecycleManager, tokens: &TokenStore) {
		assert!(matches!(manager.get_valid_token().await, Err(Error::NotAuthenticated)));
		assert_eq!(manager.state(), TokenState::NoToken);
		assert!(!*manager.watch_authenticated().borrow());
		assert!(tokens.load().await.expect("Load should succeed.").is_none());
	}

	#[tokio::test]
	async fn valid_token_is_returned_without_refresh() {
		let (manager, transport, _) = manager(200);

		manager.establish(Token::new("a", "r", OffsetDateTime::now_utc() + Duration::hours(1))).await;

		let token = manager.get_valid_token().await.expect("Valid token should be returned.");

		assert_eq!(token.access_token.expose(), "a");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
		assert_eq!(manager.state(), TokenState::Valid);
	}

	#[tokio::test]
	async fn skew_window_triggers_single_refresh_for_concurrent_callers() {
		let (manager, transport, tokens) = manager(200);

		manager.establish(Token::new("a", "r", OffsetDateTime::now_utc() + Duration::seconds(10))).await;

		assert_eq!(manager.state(), TokenState::Expired);

		let (first, second, third) = tokio::join!(
			manager.get_valid_token(),
			manager.get_valid_token(),
			manager.get_valid_token(),
		);

		for token in [first, second, third] {
			assert_eq!(token.expect("Refresh should succeed.").access_token.expose(), "fresh");
		}

		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert_eq!(manager.refresh_stats(), RefreshStats { attempts: 1, successes: 1, failures: 0 });

		let stored = tokens.load().await.expect("Load should succeed.").expect("Token persisted.");

		assert_eq!(stored.access_token.expose(), "fresh");
		assert_eq!(stored.refresh_token.expose(), "r");
	}

	#[tokio::test]
	async fn failed_refresh_signs_out_every_waiter() {
		let (manager, transport, tokens) = manager(401);
		let mut authenticated = manager.watch_authenticated();

		manager.establish(Token::new("a", "r", OffsetDateTime::now_utc() - Duration::seconds(1))).await;

		assert!(*authenticated.borrow_and_update());

		let (first, second) = tokio::join!(manager.get_valid_token(), manager.get_valid_token());

		assert!(matches!(first, Err(Error::NotAuthenticated)));
		assert!(matches!(second, Err(Error::NotAuthenticated)));
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert_eq!(manager.state(), TokenState::NoToken);
		assert!(!*authenticated.borrow_and_update());
		assert!(tokens.load().await.expect("Load should succeed.").is_none());
	}

	#[tokio::test]
	async fn rejected_token_already_rotated_skips_refresh() {
		let (manager, transport, _) = manager(200);
		let stale = Token::new("old", "r", OffsetDateTime::now_utc() + Duration::hours(1));

		manager.establish(Token::new("new", "r", OffsetDateTime::now_utc() + Duration::hours(1))).await;

		let token = manager
			.refresh_after_unauthorized(&stale)
			.await
			.expect("Newer token should be handed back.");

		assert_eq!(token.access_token.expose(), "new");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn abandoned_waiter_does_not_cancel_refresh() {
		let (manager, transport, _) = manager(200);

		manager.establish(Token::new("a", "r", OffsetDateTime::now_utc() - Duration::seconds(1))).await;

		let abandoned = tokio::time::timeout(StdDuration::from_millis(1), manager.get_valid_token()).await;

		assert!(abandoned.is_err());

		let token = manager.get_valid_token().await.expect("Refresh should still complete.");

		assert_eq!(token.access_token.expose(), "fresh");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn restore_reads_persisted_token_once() {
		let (manager, _, tokens) = manager(200);
		let token = Token::new("persisted", "r", OffsetDateTime::now_utc() + Duration::hours(1));

		tokens.save(&token).await.expect("Seeding should succeed.");

		assert_eq!(manager.state(), TokenState::NoToken);

		let restored = manager.get_valid_token().await.expect("Persisted token should restore.");

		assert_eq!(restored.access_token.expose(), "persisted");
		assert!(*manager.watch_authenticated().borrow());

		manager.sign_out().await;

		assert!(matches!(manager.get_valid_token().await, Err(Error::NotAuthenticated)));
		assert!(tokens.load().await.expect("Load should succeed.").is_none());
	}

	#[tokio::test]
	async fn sign_out_during_refresh_is_not_undone_by_the_refresh() {
		let (manager, transport, tokens) = manager(200);

		manager.establish(expired("a")).await;

		let (refreshed, ()) = tokio::join!(manager.get_valid_token(), async {
			tokio::time::sleep(StdDuration::from_millis(5)).await;
			manager.sign_out().await;
		});

		assert!(matches!(refreshed, Err(Error::NotAuthenticated)));
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

		assert_signed_out(&manager, &tokens).await;
	}

	#[tokio::test]
	async fn sign_in_during_failing_refresh_keeps_the_new_session() {
		let (manager, transport, tokens) = manager(401);
		let replacement = Token::new("b", "r2", OffsetDateTime::now_utc() + Duration::hours(1));

		manager.establish(expired("a")).await;

		let (refreshed, ()) = tokio::join!(manager.get_valid_token(), async {
			tokio::time::sleep(StdDuration::from_millis(5)).await;
			manager.establish(replacement).await;
		});
		let refreshed = refreshed.expect("The newer session should be reported.");

		assert_eq!(refreshed.access_token.expose(), "b");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert_eq!(manager.state(), TokenState::Valid);
		assert!(*manager.watch_authenticated().borrow());

		let stored = tokens.load().await.expect("Load should succeed.").expect("Token persisted.");

		assert_eq!(stored.access_token.expose(), "b");
	}

	#[tokio::test]
	async fn out_of_range_lifetime_fails_the_refresh() {
		let (manager, transport, tokens) = manager_with(
			200,
			r#"{"access_token":"fresh","token_type":"bearer","expires_in":9223372036854775807}"#,
		);

		manager.establish(expired("a")).await;

		assert!(matches!(manager.get_valid_token().await, Err(Error::NotAuthenticated)));
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert_eq!(manager.refresh_stats(), RefreshStats { attempts: 1, successes: 0, failures: 1 });

		assert_signed_out(&manager, &tokens).await;
	}

	#[tokio::test]
	async fn aborted_refresh_task_still_settles_waiters() {
		let (manager, tokens) = manager_over(Arc::new(PanickingRefresh));

		manager.establish(expired("a")).await;

		let (first, second) = tokio::join!(manager.get_valid_token(), manager.get_valid_token());

		assert!(matches!(first, Err(Error::NotAuthenticated)));
		assert!(matches!(second, Err(Error::NotAuthenticated)));

		assert_signed_out(&manager, &tokens).await;
	}
}
