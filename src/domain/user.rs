//! Signed-in user's profile and preferences.

// self
use crate::{
	_prelude::*,
	domain::{DomainEvent, UpdateProfile, UserPreferences, UserProfile},
};

/// Profile snapshot taken before an optimistic edit.
#[derive(Clone, Debug)]
#[must_use = "dropping a checkpoint makes the optimistic edit impossible to roll back"]
pub struct ProfileCheckpoint(Option<UserProfile>);

#[derive(Debug, Default)]
struct UserState {
	profile: Option<UserProfile>,
	completed_workouts: u64,
}

/// Profile of the signed-in user.
#[derive(Debug, Default)]
pub struct UserStore(RwLock<UserState>);
impl UserStore {
	/// Current profile, if signed in.
	pub fn profile(&self) -> Option<UserProfile> {
		self.0.read().profile.clone()
	}

	/// Current preferences, falling back to defaults when signed out.
	pub fn preferences(&self) -> UserPreferences {
		self.0.read().profile.as_ref().map(|profile| profile.preferences.clone()).unwrap_or_default()
	}

	/// Workouts completed during this session.
	pub fn completed_workouts(&self) -> u64 {
		self.0.read().completed_workouts
	}

	/// Applies `update` ahead of confirmation.
	pub fn begin_update(&self, update: &UpdateProfile, now: OffsetDateTime) -> ProfileCheckpoint {
		let mut state = self.0.write();
		let checkpoint = ProfileCheckpoint(state.profile.clone());

		if let Some(profile) = state.profile.as_mut() {
			update.apply_to(profile, now);
		}

		checkpoint
	}

	/// Restores the profile captured by `checkpoint`.
	pub fn rollback(&self, checkpoint: ProfileCheckpoint) {
		self.0.write().profile = checkpoint.0;
	}

	/// Replaces the profile with the server's view.
	pub fn reconcile_profile(&self, profile: &UserProfile) {
		self.0.write().profile = Some(profile.clone());
	}

	pub(crate) fn on_event(&self, event: &DomainEvent) {
		let mut state = self.0.write();

		match event {
			DomainEvent::SignedIn(profile) =>
				*state = UserState { profile: Some(profile.clone()), completed_workouts: 0 },
			DomainEvent::SignedOut => *state = UserState::default(),
			DomainEvent::WorkoutCompleted(_) => state.completed_workouts += 1,
			_ => {},
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::domain::{Theme, Workout};

	fn profile() -> UserProfile {
		UserProfile {
			id: "u-1".into(),
			email: "lifter@example.com".into(),
			display_name: Some("Lifter".into()),
			preferences: UserPreferences::default(),
			created_at: datetime!(2025-01-01 0:00 UTC),
			updated_at: datetime!(2025-01-01 0:00 UTC),
		}
	}

	#[test]
	fn optimistic_update_rolls_back() {
		let store = UserStore::default();

		store.reconcile_profile(&profile());

		let update = UpdateProfile {
			display_name: None,
			preferences: Some(UserPreferences { theme: Theme::Dark, ..Default::default() }),
		};
		let checkpoint = store.begin_update(&update, datetime!(2025-02-01 0:00 UTC));

		assert_eq!(store.preferences().theme, Theme::Dark);

		store.rollback(checkpoint);

		assert_eq!(store.profile(), Some(profile()));
	}

	#[test]
	fn completed_workout_events_are_counted() {
		let store = UserStore::default();
		let workout = Workout {
			id: "w-1".into(),
			user_id: "u-1".into(),
			title: "Push".into(),
			started_at: datetime!(2025-01-01 0:00 UTC),
			completed_at: Some(datetime!(2025-01-01 1:00 UTC)),
			duration: Some(3_600),
			is_active: false,
			created_at: datetime!(2025-01-01 0:00 UTC),
			updated_at: datetime!(2025-01-01 1:00 UTC),
		};

		store.on_event(&DomainEvent::SignedIn(profile()));
		store.on_event(&DomainEvent::WorkoutCompleted(workout.clone()));
		store.on_event(&DomainEvent::WorkoutCompleted(workout));

		assert_eq!(store.completed_workouts(), 2);

		store.on_event(&DomainEvent::SignedOut);

		assert_eq!(store.completed_workouts(), 0);
		assert_eq!(store.preferences(), UserPreferences::default());
	}
}
