//! Keyed, TTL-aware cache of server responses.
//!
//! [`QueryCache::fetch`] serves fresh entries without touching the network, serves stale entries
//! immediately while one background load revalidates them, and coalesces concurrent loads of
//! the same key into one loader call. Failed loads are retried with [`RetryPolicy`] backoff when
//! the failure is transient. Mutations go through [`QueryCache::mutate`], which invalidates the
//! affected keys before handing the result back.

pub mod entry;
pub mod key;
pub mod retry;

pub use entry::*;
pub use key::*;
pub use retry::*;

// std
use std::{
	marker::PhantomData,
	sync::atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::{sync::watch, time::Instant};
// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

type Erased = Arc<dyn Any + Send + Sync>;
type LoadFuture = Pin<Box<dyn Future<Output = Result<Erased>> + Send>>;
type Loader = Arc<dyn Fn() -> LoadFuture + Send + Sync>;
type LoadOutcome = watch::Receiver<Option<Result<Loaded>>>;

#[derive(Clone)]
struct Loaded {
	data: Erased,
	fetched_at: Instant,
}

struct Slot {
	data: Option<Loaded>,
	stale_time: StdDuration,
	invalidated: bool,
	error: Option<Error>,
	inflight: Option<(u64, LoadOutcome)>,
	loader: Option<Loader>,
	notify: watch::Sender<u64>,
}
impl Slot {
	fn new(stale_time: StdDuration) -> Self {
		let (notify, _) = watch::channel(0);

		Self {
			data: None,
			stale_time,
			invalidated: false,
			error: None,
			inflight: None,
			loader: None,
			notify,
		}
	}

	fn is_stale(&self, now: Instant) -> bool {
		self.invalidated
			|| self
				.data
				.as_ref()
				.is_none_or(|loaded| now.duration_since(loaded.fetched_at) >= self.stale_time)
	}

	fn state(&self, now: Instant) -> EntryState {
		if self.inflight.is_some() {
			EntryState::Fetching
		} else if self.error.is_some() {
			EntryState::Error
		} else if self.is_stale(now) {
			EntryState::Stale
		} else {
			EntryState::Fresh
		}
	}

	fn is_observed(&self) -> bool {
		self.notify.receiver_count() > 0
	}

	fn bump(&self) {
		self.notify.send_modify(|version| *version = version.wrapping_add(1));
	}

	fn reset(&mut self) {
		self.data = None;
		self.invalidated = false;
		self.error = None;
		self.inflight = None;
	}
}

struct CacheInner {
	slots: Mutex<HashMap<QueryKey, Slot>>,
	retry: RetryPolicy,
	online: watch::Sender<bool>,
	next_load: AtomicU64,
}

/// Shared query cache; clones observe the same entries.
#[derive(Clone)]
pub struct QueryCache(Arc<CacheInner>);
impl QueryCache {
	/// Creates an empty cache that starts online.
	pub fn new(retry: RetryPolicy) -> Self {
		let (online, _) = watch::channel(true);

		Self(Arc::new(CacheInner {
			slots: Mutex::new(HashMap::new()),
			retry,
			online,
			next_load: AtomicU64::new(0),
		}))
	}

	/// Retry policy applied to loads.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.0.retry
	}

	/// Returns the entry for `key`, loading it with `loader` when needed.
	///
	/// - fresh: returned as-is, no load;
	/// - stale (TTL passed): the old value is returned and one background load is scheduled;
	/// - absent, failed, or invalidated by a mutation: waits for a load (joining one already in
	///   flight).
	///
	/// While offline the last good value is returned and nothing is loaded; with no value the
	/// call fails with a network error.
	pub async fn fetch<T, F, Fut>(
		&self,
		key: &QueryKey,
		stale_time: StdDuration,
		loader: F,
	) -> Result<CacheEntry<T>>
	where
		T: 'static + Send + Sync,
		F: 'static + Send + Sync + Fn() -> Fut,
		Fut: 'static + Send + Future<Output = Result<T>>,
	{
		let loader = erase(loader);
		let online = self.is_online();
		let now = Instant::now();
		let outcome = {
			let mut slots = self.0.slots.lock();
			let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(stale_time));

			slot.stale_time = stale_time;
			slot.loader = Some(loader.clone());

			if !online {
				return match &slot.data {
					Some(loaded) => typed(key, loaded, stale_time, slot.state(now)),
					None => Err(Error::offline()),
				};
			}

			let reusable = slot.error.is_none() && !slot.invalidated;

			if let Some(loaded) = slot.data.clone().filter(|_| reusable) {
				if !slot.is_stale(now) {
					return typed(key, &loaded, stale_time, EntryState::Fresh);
				}
				if slot.inflight.is_none() {
					debug_event!(key = %key, "serving stale entry while revalidating");

					self.start_load(key, slot, loader);
				}

				return typed(key, &loaded, stale_time, EntryState::Stale);
			}

			match slot.inflight.as_ref().map(|(_, outcome)| outcome.clone()) {
				Some(outcome) => outcome,
				None => self.start_load(key, slot, loader),
			}
		};
		let loaded = await_load(outcome).await?;

		typed(key, &loaded, stale_time, EntryState::Fresh)
	}

	/// Current entry for `key` without loading anything.
	pub fn peek<T>(&self, key: &QueryKey) -> Option<CacheEntry<T>>
	where
		T: 'static + Send + Sync,
	{
		let slots = self.0.slots.lock();
		let slot = slots.get(key)?;
		let loaded = slot.data.as_ref()?;

		typed(key, loaded, slot.stale_time, slot.state(Instant::now())).ok()
	}

	/// Subscribes to pushed updates for `key`.
	pub fn subscribe<T>(&self, key: &QueryKey) -> Subscription<T>
	where
		T: 'static + Send + Sync,
	{
		let mut slots = self.0.slots.lock();
		let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(StdDuration::ZERO));

		Subscription {
			cache: self.clone(),
			key: key.clone(),
			updates: slot.notify.subscribe(),
			_marker: PhantomData,
		}
	}

	/// Marks matching entries stale; observed entries are reloaded right away.
	///
	/// A load that was already in flight is detached: it still resolves its own waiters but no
	/// longer writes the entry, so every later read sees data loaded after the invalidation.
	/// Returns the number of matching entries.
	pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
		let online = self.is_online();
		let mut slots = self.0.slots.lock();
		let mut matched = 0;

		for (key, slot) in slots.iter_mut().filter(|(key, _)| pattern.matches(key)) {
			matched += 1;
			slot.invalidated = true;
			slot.inflight = None;

			let reload = if online && slot.is_observed() { slot.loader.clone() } else { None };

			match reload {
				Some(loader) => {
					self.start_load(key, slot, loader);
				},
				None => slot.bump(),
			}
		}

		debug_event!(?pattern, matched, "invalidated cache entries");

		matched
	}

	/// Drops matching entries; observed entries are emptied instead of removed.
	pub fn evict(&self, pattern: &KeyPattern) -> usize {
		let mut slots = self.0.slots.lock();
		let before = slots.len();
		let mut emptied = 0;

		slots.retain(|key, slot| {
			if !pattern.matches(key) {
				return true;
			}
			if slot.is_observed() {
				emptied += 1;
				slot.reset();
				slot.bump();

				return true;
			}

			false
		});

		before - slots.len() + emptied
	}

	/// Drops every entry (sign-out).
	pub fn clear(&self) {
		self.evict(&KeyPattern::All);
	}

	/// Runs `mutation`, then invalidates `patterns` before returning its result.
	///
	/// Offline, the mutation is not started and the call fails fast with a network error.
	/// Failed mutations invalidate nothing.
	pub async fn mutate<T, Fut>(&self, patterns: &[KeyPattern], mutation: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		const KIND: OpKind = OpKind::Mutation;

		if !self.is_online() {
			return Err(Error::offline());
		}

		obs::record_outcome(KIND, OpOutcome::Attempt);

		let result = OpSpan::new(KIND, "mutate").instrument(mutation).await;

		obs::record_outcome(KIND, OpOutcome::of(&result));

		if result.is_ok() {
			for pattern in patterns {
				self.invalidate(pattern);
			}
		}

		result
	}

	/// Returns `true` while the cache may use the network.
	pub fn is_online(&self) -> bool {
		*self.0.online.borrow()
	}

	/// Watches connectivity changes.
	pub fn connectivity(&self) -> watch::Receiver<bool> {
		self.0.online.subscribe()
	}

	/// Records a connectivity change; coming back online reloads observed stale entries.
	pub fn set_online(&self, online: bool) {
		let was_online = self.0.online.send_replace(online);

		if !online || was_online {
			return;
		}

		let now = Instant::now();
		let mut slots = self.0.slots.lock();

		for (key, slot) in slots.iter_mut() {
			let needs_load = slot.is_observed()
				&& slot.inflight.is_none()
				&& (slot.error.is_some() || slot.is_stale(now));

			if let (true, Some(loader)) = (needs_load, slot.loader.clone()) {
				self.start_load(key, slot, loader);
			}
		}
	}

	fn start_load(&self, key: &QueryKey, slot: &mut Slot, loader: Loader) -> LoadOutcome {
		let id = self.0.next_load.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = watch::channel(None);

		slot.inflight = Some((id, rx.clone()));
		slot.bump();

		let cache = self.clone();
		let key = key.clone();

		tokio::spawn(async move {
			let result = cache.run_load(loader).await;

			cache.settle(&key, id, &result);

			let _ = tx.send(Some(result));
		});

		rx
	}

	async fn run_load(&self, loader: Loader) -> Result<Loaded> {
		const KIND: OpKind = OpKind::Fetch;

		let span = OpSpan::new(KIND, "load");
		let mut attempt = 0;

		loop {
			obs::record_outcome(KIND, OpOutcome::Attempt);

			let result = span.instrument(loader()).await;

			obs::record_outcome(KIND, OpOutcome::of(&result));

			match result {
				Ok(data) => return Ok(Loaded { data, fetched_at: Instant::now() }),
				Err(e) => match self.0.retry.next_delay(&e, attempt) {
					Some(delay) => {
						debug_event!(error = %e, attempt, ?delay, "retrying failed load");

						tokio::time::sleep(delay).await;

						attempt += 1;
					},
					None => return Err(e),
				},
			}
		}
	}

	fn settle(&self, key: &QueryKey, id: u64, result: &Result<Loaded>) {
		let mut slots = self.0.slots.lock();
		let Some(slot) = slots.get_mut(key) else {
			return;
		};

		if !matches!(slot.inflight, Some((current, _)) if current == id) {
			return;
		}

		slot.inflight = None;

		match result {
			Ok(loaded) => {
				slot.data = Some(loaded.clone());
				slot.error = None;
				slot.invalidated = false;
			},
			Err(e) => {
				warn_event!(key = %key, error = %e, "load failed; keeping last good value");

				slot.error = Some(e.clone());
			},
		}

		slot.bump();
	}
}
impl Debug for QueryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("QueryCache")
			.field("entries", &self.0.slots.lock().len())
			.field("online", &self.is_online())
			.finish()
	}
}

fn erase<T, F, Fut>(loader: F) -> Loader
where
	T: 'static + Send + Sync,
	F: 'static + Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<T>>,
{
	Arc::new(move || {
		let load = loader();

		Box::pin(async move { load.await.map(|data| Arc::new(data) as Erased) })
	})
}

fn typed<T>(
	key: &QueryKey,
	loaded: &Loaded,
	stale_after: StdDuration,
	state: EntryState,
) -> Result<CacheEntry<T>>
where
	T: 'static + Send + Sync,
{
	let data = loaded.data.clone().downcast::<T>().map_err(|_| Error::Decode {
		path: key.to_string(),
		message: "cached value has a different type than requested".into(),
		status: None,
	})?;

	Ok(CacheEntry { key: key.clone(), data, fetched_at: loaded.fetched_at, stale_after, state })
}

async fn await_load(mut outcome: LoadOutcome) -> Result<Loaded> {
	let settled = match outcome.wait_for(Option::is_some).await {
		Ok(value) => value.clone(),
		Err(_) => None,
	};

	settled.unwrap_or_else(|| {
		Err(Error::Network { message: "cache load was abandoned".into(), source: None })
	})
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// self
	use super::*;
	use crate::error::ErrorDetail;

	const TTL: StdDuration = StdDuration::from_secs(60);

	fn counting_loader(
		calls: Arc<AtomicUsize>,
	) -> impl 'static + Send + Sync + Fn() -> Pin<Box<dyn Future<Output = Result<usize>> + Send>> {
		move || {
			let calls = calls.clone();

			Box::pin(async move {
				tokio::time::sleep(StdDuration::from_millis(10)).await;

				Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
			})
		}
	}

	fn failing_loader(
		calls: Arc<Mutex<Vec<Instant>>>,
		error: Error,
	) -> impl 'static + Send + Sync + Fn() -> Pin<Box<dyn Future<Output = Result<usize>> + Send>> {
		move || {
			let calls = calls.clone();
			let error = error.clone();

			Box::pin(async move {
				calls.lock().push(Instant::now());

				Err(error)
			})
		}
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_fetches_share_one_load() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");
		let (a, b, c, d, e) = tokio::join!(
			cache.fetch(&key, TTL, counting_loader(calls.clone())),
			cache.fetch(&key, TTL, counting_loader(calls.clone())),
			cache.fetch(&key, TTL, counting_loader(calls.clone())),
			cache.fetch(&key, TTL, counting_loader(calls.clone())),
			cache.fetch(&key, TTL, counting_loader(calls.clone())),
		);

		for entry in [a, b, c, d, e] {
			assert_eq!(*entry.expect("Coalesced fetch should succeed.").data, 1);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);

		let cached = cache
			.fetch(&key, TTL, counting_loader(calls.clone()))
			.await
			.expect("Fresh entry should be served.");

		assert_eq!(cached.state, EntryState::Fresh);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn stale_entry_is_served_while_one_background_load_runs() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");
		tokio::time::advance(TTL + StdDuration::from_secs(1)).await;

		let first = cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("SWR read.");
		let second = cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("SWR read.");

		assert_eq!((first.state, *first.data), (EntryState::Stale, 1));
		assert_eq!((second.state, *second.data), (EntryState::Stale, 1));
		assert_eq!(cache.peek::<usize>(&key).map(|entry| entry.state), Some(EntryState::Fetching));

		tokio::time::sleep(StdDuration::from_millis(50)).await;

		assert_eq!(calls.load(Ordering::SeqCst), 2);

		let refreshed = cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Fresh.");

		assert_eq!((refreshed.state, *refreshed.data), (EntryState::Fresh, 2));
	}

	#[tokio::test(start_paused = true)]
	async fn transient_failures_back_off_then_surface() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(Mutex::new(Vec::new()));
		let network = Error::Network { message: "unreachable".into(), source: None };
		let err = cache
			.fetch(&QueryKey::new("workouts"), TTL, failing_loader(calls.clone(), network))
			.await
			.expect_err("Exhausted retries should surface the error.");

		assert!(matches!(err, Error::Network { .. }));

		let calls = calls.lock().clone();

		assert_eq!(calls.len(), 3);

		let first_gap = calls[1] - calls[0];
		let second_gap = calls[2] - calls[1];

		assert!(first_gap >= StdDuration::from_millis(1_000));
		assert!(first_gap < StdDuration::from_millis(1_010));
		assert!(second_gap >= StdDuration::from_millis(2_000));
		assert!(second_gap < StdDuration::from_millis(2_010));
	}

	#[tokio::test(start_paused = true)]
	async fn validation_failures_are_not_retried() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(Mutex::new(Vec::new()));
		let invalid = Error::Validation(ErrorDetail::new("bad filter").with_status(422));
		let err = cache
			.fetch(&QueryKey::new("exercises"), TTL, failing_loader(calls.clone(), invalid))
			.await
			.expect_err("Validation errors should surface.");

		assert!(matches!(err, Error::Validation(_)));
		assert_eq!(calls.lock().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_reload_keeps_last_good_value() {
		let cache = QueryCache::new(RetryPolicy::NONE);
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("profile");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");
		cache.invalidate(&KeyPattern::kind("profile"));

		let failures = Arc::new(Mutex::new(Vec::new()));
		let result = cache.fetch(&key, TTL, failing_loader(failures, Error::Timeout)).await;

		assert!(matches!(result, Err(Error::Timeout)));

		let kept = cache.peek::<usize>(&key).expect("Last good value should survive.");

		assert_eq!((kept.state, *kept.data), (EntryState::Error, 1));
	}

	#[tokio::test(start_paused = true)]
	async fn invalidated_entry_waits_for_fresh_load() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts").param("limit", 50);

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");

		assert_eq!(cache.invalidate(&KeyPattern::kind("workouts")), 1);
		assert_eq!(cache.peek::<usize>(&key).map(|entry| entry.state), Some(EntryState::Stale));

		let reloaded = cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Reload.");

		assert_eq!((reloaded.state, *reloaded.data), (EntryState::Fresh, 2));
	}

	#[tokio::test(start_paused = true)]
	async fn invalidation_detaches_load_already_in_flight() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");
		let (early, late) = tokio::join!(cache.fetch(&key, TTL, counting_loader(calls.clone())), async {
			cache.invalidate(&KeyPattern::kind("workouts"));
			cache.fetch(&key, TTL, counting_loader(calls.clone())).await
		});
		let early = early.expect("Early load.");
		let late = late.expect("Late load.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert_ne!(*early.data, *late.data);
		assert_eq!(cache.peek::<usize>(&key).map(|entry| *entry.data), Some(*late.data));
	}

	#[tokio::test(start_paused = true)]
	async fn subscribers_receive_invalidation_refetch() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("stats");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");

		let mut subscription = cache.subscribe::<usize>(&key);

		cache.invalidate(&KeyPattern::exact(key.clone()));

		while subscription.current().map(|entry| *entry.data) != Some(2) {
			subscription.changed().await;
		}

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn offline_reads_serve_cache_and_mutations_fail_fast() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");
		cache.set_online(false);
		tokio::time::advance(TTL * 2).await;

		let offline = cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Cached.");

		assert_eq!((offline.state, *offline.data), (EntryState::Stale, 1));
		assert!(matches!(
			cache.fetch(&QueryKey::new("exercises"), TTL, counting_loader(calls.clone())).await,
			Err(Error::Network { .. })
		));

		let polled = Arc::new(AtomicUsize::new(0));
		let mutation = {
			let polled = polled.clone();

			async move {
				polled.fetch_add(1, Ordering::SeqCst);

				Ok(())
			}
		};

		assert!(matches!(cache.mutate(&[KeyPattern::all()], mutation).await, Err(Error::Network { .. })));
		assert_eq!(polled.load(Ordering::SeqCst), 0);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn reconnect_reloads_observed_stale_entries() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");
		let mut connectivity = cache.connectivity();

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");

		let mut subscription = cache.subscribe::<usize>(&key);

		cache.set_online(false);
		tokio::time::advance(TTL * 2).await;
		cache.set_online(true);

		assert!(connectivity.has_changed().expect("Sender should be alive."));
		assert!(*connectivity.borrow_and_update());

		while subscription.current().map(|entry| *entry.data) != Some(2) {
			subscription.changed().await;
		}

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn mutation_invalidates_before_returning() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");

		let created = cache
			.mutate(&[KeyPattern::kind("workouts")], async { Ok::<_, Error>("created") })
			.await
			.expect("Mutation should succeed.");

		assert_eq!(created, "created");
		assert_eq!(cache.peek::<usize>(&key).map(|entry| entry.state), Some(EntryState::Stale));

		let failed = cache
			.mutate(&[KeyPattern::kind("stats")], async {
				Err::<(), _>(Error::Validation(ErrorDetail::new("nope")))
			})
			.await;

		assert!(failed.is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn evict_and_clear_drop_entries() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let list = QueryKey::new("workouts");
		let detail = QueryKey::new("workout").param("id", 1);

		cache.fetch(&list, TTL, counting_loader(calls.clone())).await.expect("List load.");
		cache.fetch(&detail, TTL, counting_loader(calls.clone())).await.expect("Detail load.");

		assert_eq!(cache.evict(&KeyPattern::kind("workout")), 1);
		assert!(cache.peek::<usize>(&detail).is_none());
		assert!(cache.peek::<usize>(&list).is_some());
		assert!(cache.peek::<String>(&list).is_none());

		cache.clear();

		assert!(cache.peek::<usize>(&list).is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn clear_empties_observed_entries_without_ending_subscriptions() {
		let cache = QueryCache::new(RetryPolicy::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let key = QueryKey::new("workouts");

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Initial load.");

		let mut subscription = cache.subscribe::<usize>(&key);

		cache.clear();
		subscription.changed().await;

		assert!(subscription.current().is_none());

		cache.fetch(&key, TTL, counting_loader(calls.clone())).await.expect("Reload.");
		subscription.changed().await;

		assert_eq!(subscription.current().map(|entry| *entry.data), Some(2));
	}
}
