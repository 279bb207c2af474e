//! Per-entity local state mirrored from the server.
//!
//! Each store owns its records and only changes them through its own actions: optimistic
//! `begin_*` actions that return a checkpoint for rollback, and `reconcile_*`/`confirm_*` actions
//! that fold confirmed server data in. Stores never write to each other; cross-store effects
//! travel as [`DomainEvent`]s through [`DomainStores::publish`].

pub mod exercise;
pub mod model;
pub mod user;
pub mod workout;

pub use exercise::ExerciseStore;
pub use model::*;
pub use user::{ProfileCheckpoint, UserStore};
pub use workout::{WorkoutCheckpoint, WorkoutStore};

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use serde::{Deserializer, Serializer};
use tokio::sync::broadcast;
// self
use crate::{_prelude::*, error::ErrorDetail};

static NEXT_TEMPORARY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a record that may not be confirmed by the server yet.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
	/// Server-assigned identifier.
	Server(String),
	/// Client-side placeholder for an optimistic record.
	Temporary(u64),
}
impl RecordId {
	/// Wraps a server identifier.
	pub fn server(id: impl Into<String>) -> Self {
		Self::Server(id.into())
	}

	/// Allocates a process-unique placeholder.
	pub fn temporary() -> Self {
		Self::Temporary(NEXT_TEMPORARY_ID.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns `true` for placeholders.
	pub fn is_temporary(&self) -> bool {
		matches!(self, Self::Temporary(_))
	}

	/// Server identifier usable in a request path.
	///
	/// Placeholders are rejected: the server has never seen them.
	pub fn server_id(&self) -> Result<&str> {
		match self {
			Self::Server(id) => Ok(id),
			Self::Temporary(_) => Err(Error::Validation(ErrorDetail::new(format!(
				"Record {self} is not confirmed by the server yet"
			)))),
		}
	}
}
impl Debug for RecordId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(self, f)
	}
}
impl Display for RecordId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Server(id) => f.write_str(id),
			Self::Temporary(n) => write!(f, "tmp-{n}"),
		}
	}
}
impl From<&str> for RecordId {
	fn from(id: &str) -> Self {
		Self::server(id)
	}
}
impl Serialize for RecordId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(self)
	}
}
impl<'de> Deserialize<'de> for RecordId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(Self::Server)
	}
}

/// Cross-store notification.
#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
	/// The server confirmed a new workout.
	WorkoutCreated(Workout),
	/// The server confirmed a finished workout.
	WorkoutCompleted(Workout),
	/// The server confirmed a deletion.
	WorkoutDeleted(RecordId),
	/// A session started for this user.
	SignedIn(UserProfile),
	/// The session ended (explicitly or by a failed refresh).
	SignedOut,
}

struct StoresInner {
	workouts: WorkoutStore,
	user: UserStore,
	exercises: ExerciseStore,
	events: broadcast::Sender<DomainEvent>,
}

/// The set of domain stores for one session, plus their event bus.
#[derive(Clone)]
pub struct DomainStores(Arc<StoresInner>);
impl DomainStores {
	const EVENT_CAPACITY: usize = 64;

	/// Creates empty stores.
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(Self::EVENT_CAPACITY);

		Self(Arc::new(StoresInner {
			workouts: WorkoutStore::default(),
			user: UserStore::default(),
			exercises: ExerciseStore::default(),
			events,
		}))
	}

	/// Workout store.
	pub fn workouts(&self) -> &WorkoutStore {
		&self.0.workouts
	}

	/// User store.
	pub fn user(&self) -> &UserStore {
		&self.0.user
	}

	/// Exercise library store.
	pub fn exercises(&self) -> &ExerciseStore {
		&self.0.exercises
	}

	/// Delivers `event` to every store, then to outside listeners.
	pub fn publish(&self, event: DomainEvent) {
		self.0.workouts.on_event(&event);
		self.0.user.on_event(&event);
		self.0.exercises.on_event(&event);

		// No listeners is fine.
		let _ = self.0.events.send(event);
	}

	/// Listens to published events.
	pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
		self.0.events.subscribe()
	}
}
impl Default for DomainStores {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for DomainStores {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DomainStores")
			.field("workouts", &self.0.workouts.list().len())
			.field("signed_in", &self.0.user.profile().is_some())
			.field("exercises", &self.0.exercises.len())
			.finish()
	}
}
