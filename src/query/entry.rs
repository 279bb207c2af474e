//! Typed views over cache slots and push subscriptions.

// std
use std::marker::PhantomData;
// crates.io
use tokio::{sync::watch, time::Instant};
// self
use crate::{
	_prelude::*,
	query::{QueryCache, QueryKey},
};

/// Freshness of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryState {
	/// Younger than its stale time and never invalidated.
	Fresh,
	/// Past its stale time, or invalidated by a mutation.
	Stale,
	/// A load for this key is in flight.
	Fetching,
	/// The most recent load failed; `data` is the last good value.
	Error,
}

/// One cached server response.
#[derive(Debug)]
pub struct CacheEntry<T> {
	/// Key the data was loaded for.
	pub key: QueryKey,
	/// Last successfully loaded value.
	pub data: Arc<T>,
	/// When `data` was loaded.
	pub fetched_at: Instant,
	/// Age after which `data` counts as stale.
	pub stale_after: StdDuration,
	/// Freshness at the time this view was taken.
	pub state: EntryState,
}
impl<T> Clone for CacheEntry<T> {
	fn clone(&self) -> Self {
		Self {
			key: self.key.clone(),
			data: self.data.clone(),
			fetched_at: self.fetched_at,
			stale_after: self.stale_after,
			state: self.state,
		}
	}
}

/// Push subscription to one cache key.
///
/// While a subscription is alive the key counts as observed: invalidation and reconnect refetch
/// it immediately. Dropping the subscription unsubscribes.
pub struct Subscription<T> {
	pub(super) cache: QueryCache,
	pub(super) key: QueryKey,
	pub(super) updates: watch::Receiver<u64>,
	pub(super) _marker: PhantomData<fn() -> T>,
}
impl<T> Subscription<T>
where
	T: 'static + Send + Sync,
{
	/// Key this subscription observes.
	pub fn key(&self) -> &QueryKey {
		&self.key
	}

	/// Current entry, if any value has been loaded.
	pub fn current(&self) -> Option<CacheEntry<T>> {
		self.cache.peek(&self.key)
	}

	/// Waits for the next change to the entry.
	///
	/// Eviction and [`QueryCache::clear`] empty an observed entry and notify its subscribers; they
	/// never end the subscription.
	pub async fn changed(&mut self) {
		// Observed slots are never removed, so the sender outlives this receiver.
		let _ = self.updates.changed().await;
	}
}
impl<T> Debug for Subscription<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Subscription").field("key", &self.key).finish()
	}
}
