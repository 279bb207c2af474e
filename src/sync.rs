//! Glue between the API client, the query cache, and the domain stores.
//!
//! Reads go through [`QueryCache::fetch`]; their loaders reconcile the matching store whenever
//! the server answers, including background revalidation. Mutations apply an optimistic edit,
//! call the server, then reconcile (or roll back on failure) and invalidate the affected keys,
//! all before the returned future resolves.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::Token,
	client::ApiClient,
	domain::{
		AddExercise, CreateSet, CreateWorkout, DomainEvent, DomainStores, Exercise, ExerciseQuery,
		GoogleSignIn, LoginRequest, LoginResponse, RecordId, SetEntry, UpdateProfile, UpdateSet,
		UpdateWorkout, UserProfile, Workout, WorkoutDetail, WorkoutExercise, WorkoutQuery,
		WorkoutStats,
	},
	http::{Method, RequestDescriptor},
	query::{CacheEntry, KeyPattern, QueryCache, QueryKey},
};

/// Cache keys used by the synchronizer.
pub mod keys {
	// self
	use crate::{
		domain::{ExerciseQuery, RecordId, WorkoutQuery},
		query::QueryKey,
	};

	/// Kind of workout list keys.
	pub const WORKOUTS: &str = "workouts";
	/// Kind of workout detail keys.
	pub const WORKOUT: &str = "workout";
	/// Kind of the workout stats key.
	pub const WORKOUT_STATS: &str = "workout_stats";
	/// Kind of the profile key.
	pub const PROFILE: &str = "profile";
	/// Kind of exercise list keys.
	pub const EXERCISES: &str = "exercises";
	/// Kind of exercise detail keys.
	pub const EXERCISE: &str = "exercise";

	/// Key of one workout list page.
	pub fn workouts(query: &WorkoutQuery) -> QueryKey {
		query.pairs().into_iter().fold(QueryKey::new(WORKOUTS), |key, (name, value)| key.param(name, value))
	}

	/// Key of one workout detail.
	pub fn workout(id: &RecordId) -> QueryKey {
		QueryKey::new(WORKOUT).param("id", id)
	}

	/// Key of the workout stats.
	pub fn workout_stats() -> QueryKey {
		QueryKey::new(WORKOUT_STATS)
	}

	/// Key of the profile.
	pub fn profile() -> QueryKey {
		QueryKey::new(PROFILE)
	}

	/// Key of one exercise list page.
	pub fn exercises(query: &ExerciseQuery) -> QueryKey {
		query.pairs().into_iter().fold(QueryKey::new(EXERCISES), |key, (name, value)| key.param(name, value))
	}

	/// Key of one exercise.
	pub fn exercise(id: &str) -> QueryKey {
		QueryKey::new(EXERCISE).param("id", id)
	}
}

/// Session-scoped facade the UI layer talks to.
#[derive(Clone)]
pub struct Synchronizer {
	client: ApiClient,
	cache: QueryCache,
	stores: DomainStores,
	stale_time: StdDuration,
	signed_in: Arc<AtomicBool>,
}
impl Synchronizer {
	/// Creates a synchronizer with fresh domain stores.
	pub fn new(client: ApiClient, cache: QueryCache, stale_time: StdDuration) -> Self {
		Self {
			client,
			cache,
			stores: DomainStores::new(),
			stale_time,
			signed_in: Arc::new(AtomicBool::new(false)),
		}
	}

	/// API client.
	pub fn client(&self) -> &ApiClient {
		&self.client
	}

	/// Query cache.
	pub fn cache(&self) -> &QueryCache {
		&self.cache
	}

	/// Domain stores.
	pub fn stores(&self) -> &DomainStores {
		&self.stores
	}

	/// Resumes a persisted session; `None` when no session was stored.
	pub async fn restore(&self) -> Result<Option<UserProfile>> {
		let session = self.client.session();

		session.ensure_restored().await;

		if session.current_token().is_none() {
			return Ok(None);
		}

		self.signed_in.store(true, Ordering::SeqCst);

		let profile = self.profile().await?;
		let profile = UserProfile::clone(&profile.data);

		self.stores.publish(DomainEvent::SignedIn(profile.clone()));

		Ok(Some(profile))
	}

	/// Signs in with email and password.
	pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<UserProfile> {
		let body = LoginRequest { email: email.trim().to_owned(), password: password.to_owned() };

		self.sign_in(self.client.request(Method::Post, "/auth/login").json(&body)?.public()).await
	}

	/// Signs in with Google credentials obtained by the platform SDK.
	pub async fn sign_in_with_google(&self, token: &str, google_jwt: &str) -> Result<UserProfile> {
		let body = GoogleSignIn { token: token.to_owned(), google_jwt: google_jwt.to_owned() };

		self.sign_in(self.client.request(Method::Post, "/auth/google").json(&body)?.public()).await
	}

	/// Ends the session and drops every cached and stored record.
	pub async fn sign_out(&self) {
		self.client.session().sign_out().await;
		self.cache.clear();
		self.signed_in.store(false, Ordering::SeqCst);
		self.stores.publish(DomainEvent::SignedOut);
	}

	/// Uncached `GET /auth/me`.
	pub async fn current_user(&self) -> Result<UserProfile> {
		let profile = self.observe(self.client.get::<UserProfile>("/auth/me").await)?;

		self.stores.user().reconcile_profile(&profile);

		Ok(profile)
	}

	/// One page of workouts.
	pub async fn workouts(&self, query: &WorkoutQuery) -> Result<CacheEntry<Vec<Workout>>> {
		query.validate()?;

		let (client, stores, pairs) = (self.client.clone(), self.stores.clone(), query.pairs());

		self.read(&keys::workouts(query), move || {
			let (client, stores, pairs) = (client.clone(), stores.clone(), pairs.clone());

			async move {
				let workouts = client.get_with_query::<Vec<Workout>>("/workouts", pairs).await?;

				stores.workouts().reconcile_list(&workouts);

				Ok::<_, Error>(workouts)
			}
		})
		.await
	}

	/// One workout with its exercises and sets.
	pub async fn workout(&self, id: &RecordId) -> Result<CacheEntry<WorkoutDetail>> {
		let path = format!("/workouts/{}", id.server_id()?);
		let (client, stores) = (self.client.clone(), self.stores.clone());

		self.read(&keys::workout(id), move || {
			let (client, stores, path) = (client.clone(), stores.clone(), path.clone());

			async move {
				let detail = client.get::<WorkoutDetail>(&path).await?;

				stores.workouts().reconcile_detail(&detail);

				Ok::<_, Error>(detail)
			}
		})
		.await
	}

	/// Workout aggregates.
	pub async fn workout_stats(&self) -> Result<CacheEntry<WorkoutStats>> {
		let client = self.client.clone();

		self.read(&keys::workout_stats(), move || {
			let client = client.clone();

			async move { client.get::<WorkoutStats>("/workouts/stats").await }
		})
		.await
	}

	/// Profile of the signed-in user.
	pub async fn profile(&self) -> Result<CacheEntry<UserProfile>> {
		let (client, stores) = (self.client.clone(), self.stores.clone());

		self.read(&keys::profile(), move || {
			let (client, stores) = (client.clone(), stores.clone());

			async move {
				let profile = client.get::<UserProfile>("/users/profile").await?;

				stores.user().reconcile_profile(&profile);

				Ok::<_, Error>(profile)
			}
		})
		.await
	}

	/// One page of the exercise library.
	pub async fn exercises(&self, query: &ExerciseQuery) -> Result<CacheEntry<Vec<Exercise>>> {
		query.validate()?;

		let (client, stores, pairs) = (self.client.clone(), self.stores.clone(), query.pairs());

		self.read(&keys::exercises(query), move || {
			let (client, stores, pairs) = (client.clone(), stores.clone(), pairs.clone());

			async move {
				let exercises = client.get_with_query::<Vec<Exercise>>("/exercises", pairs).await?;

				stores.exercises().reconcile_list(&exercises);

				Ok::<_, Error>(exercises)
			}
		})
		.await
	}

	/// One exercise library entry.
	pub async fn exercise(&self, id: &str) -> Result<CacheEntry<Exercise>> {
		let path = format!("/exercises/{id}");
		let (client, stores) = (self.client.clone(), self.stores.clone());

		self.read(&keys::exercise(id), move || {
			let (client, stores, path) = (client.clone(), stores.clone(), path.clone());

			async move {
				let exercise = client.get::<Exercise>(&path).await?;

				stores.exercises().reconcile_one(&exercise);

				Ok::<_, Error>(exercise)
			}
		})
		.await
	}

	/// Starts a workout.
	pub async fn create_workout(&self, request: CreateWorkout) -> Result<Workout> {
		request.validate()?;

		let patterns = [KeyPattern::kind(keys::WORKOUTS), KeyPattern::kind(keys::WORKOUT_STATS)];

		self.mutate(&patterns, async {
			let workouts = self.stores.workouts();
			let user_id = self.stores.user().profile().map(|profile| profile.id).unwrap_or_default();
			let (provisional, checkpoint) = workouts.begin_create(&request, &user_id, now());
			let result = self.client.post::<Workout, _>("/workouts", &request).await;

			reconcile_or_rollback(
				result,
				|workout| {
					workouts.confirm_created(&provisional, workout);
					self.stores.publish(DomainEvent::WorkoutCreated(workout.clone()));
				},
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	/// Edits a workout header.
	pub async fn update_workout(&self, id: &RecordId, update: UpdateWorkout) -> Result<Workout> {
		update.validate()?;

		self.apply_workout_update(id, &update).await
	}

	/// Finishes a workout now.
	pub async fn complete_workout(&self, id: &RecordId) -> Result<Workout> {
		let now = now();
		let started_at = self.stores.workouts().get(id).map_or(now, |workout| workout.started_at);
		let workout = self.apply_workout_update(id, &UpdateWorkout::complete(started_at, now)).await?;

		self.stores.publish(DomainEvent::WorkoutCompleted(workout.clone()));

		Ok(workout)
	}

	/// Deletes a workout.
	pub async fn delete_workout(&self, id: &RecordId) -> Result<()> {
		let path = format!("/workouts/{}", id.server_id()?);
		let patterns = [KeyPattern::kind(keys::WORKOUTS), KeyPattern::kind(keys::WORKOUT_STATS)];

		self.mutate(&patterns, async {
			let workouts = self.stores.workouts();
			let checkpoint = workouts.begin_delete(id);
			let result = self.client.delete::<()>(&path).await;

			reconcile_or_rollback(
				result,
				|_| {
					self.cache.evict(&KeyPattern::exact(keys::workout(id)));
					self.stores.publish(DomainEvent::WorkoutDeleted(id.clone()));
				},
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	/// Adds a library exercise to a workout.
	pub async fn add_exercise(
		&self,
		workout_id: &RecordId,
		request: AddExercise,
	) -> Result<WorkoutExercise> {
		let path = format!("/workouts/{}/exercises", workout_id.server_id()?);

		self.mutate(&[KeyPattern::exact(keys::workout(workout_id))], async {
			let workouts = self.stores.workouts();
			let details = self.stores.exercises().details(&request.exercise_id);
			let (provisional, checkpoint) =
				workouts.begin_add_exercise(workout_id, &request, details, now());
			let result = self.client.post::<WorkoutExercise, _>(&path, &request).await;

			reconcile_or_rollback(
				result,
				|confirmed| workouts.confirm_exercise(workout_id, &provisional, confirmed.clone()),
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	/// Removes a library exercise (and its sets) from a workout.
	pub async fn remove_exercise(&self, workout_id: &RecordId, exercise_id: &str) -> Result<()> {
		let path = format!("/workouts/{}/exercises/{exercise_id}", workout_id.server_id()?);

		self.mutate(&[KeyPattern::exact(keys::workout(workout_id))], async {
			let workouts = self.stores.workouts();
			let checkpoint = workouts.begin_remove_exercise(workout_id, exercise_id);
			let result = self.client.delete::<()>(&path).await;

			reconcile_or_rollback(result, |_| {}, || workouts.rollback(checkpoint))
		})
		.await
	}

	/// Logs a set for a library exercise in a workout.
	pub async fn add_set(
		&self,
		workout_id: &RecordId,
		exercise_id: &str,
		request: CreateSet,
	) -> Result<SetEntry> {
		request.validate()?;

		let path = format!("/workouts/{}/exercises/{exercise_id}/sets", workout_id.server_id()?);

		self.mutate(&[KeyPattern::exact(keys::workout(workout_id))], async {
			let workouts = self.stores.workouts();
			let (provisional, checkpoint) =
				workouts.begin_add_set(workout_id, exercise_id, &request, now());
			let result = self.client.post::<SetEntry, _>(&path, &request).await;

			reconcile_or_rollback(
				result,
				|confirmed| workouts.confirm_set(workout_id, &provisional, confirmed.clone()),
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	/// Edits a logged set.
	pub async fn update_set(
		&self,
		workout_id: &RecordId,
		set_id: &RecordId,
		update: UpdateSet,
	) -> Result<SetEntry> {
		let path = format!("/workouts/sets/{}", set_id.server_id()?);

		self.mutate(&[KeyPattern::exact(keys::workout(workout_id))], async {
			let workouts = self.stores.workouts();
			let checkpoint = workouts.begin_update_set(workout_id, set_id, &update);
			let result = self.client.put::<SetEntry, _>(&path, &update).await;

			reconcile_or_rollback(
				result,
				|confirmed| workouts.reconcile_set(workout_id, confirmed.clone()),
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	/// Deletes a logged set.
	pub async fn delete_set(&self, workout_id: &RecordId, set_id: &RecordId) -> Result<()> {
		let path = format!("/workouts/sets/{}", set_id.server_id()?);

		self.mutate(&[KeyPattern::exact(keys::workout(workout_id))], async {
			let workouts = self.stores.workouts();
			let checkpoint = workouts.begin_delete_set(workout_id, set_id);
			let result = self.client.delete::<()>(&path).await;

			reconcile_or_rollback(result, |_| {}, || workouts.rollback(checkpoint))
		})
		.await
	}

	/// Edits the profile or preferences.
	pub async fn update_profile(&self, update: UpdateProfile) -> Result<UserProfile> {
		update.validate()?;

		self.mutate(&[KeyPattern::kind(keys::PROFILE)], async {
			let user = self.stores.user();
			let checkpoint = user.begin_update(&update, now());
			let result = self.client.put::<UserProfile, _>("/users/profile", &update).await;

			reconcile_or_rollback(
				result,
				|profile| user.reconcile_profile(profile),
				|| user.rollback(checkpoint),
			)
		})
		.await
	}

	async fn sign_in(&self, descriptor: RequestDescriptor) -> Result<UserProfile> {
		if !self.cache.is_online() {
			return Err(Error::offline());
		}

		let response = self.client.send::<LoginResponse>(descriptor).await?;
		let token = Token::from_grant(&response.grant, None, now())?;

		self.cache.clear();
		self.client.session().establish(token).await;
		self.signed_in.store(true, Ordering::SeqCst);
		self.stores.publish(DomainEvent::SignedIn(response.user.clone()));

		Ok(response.user)
	}

	async fn apply_workout_update(&self, id: &RecordId, update: &UpdateWorkout) -> Result<Workout> {
		let path = format!("/workouts/{}", id.server_id()?);
		let patterns = [
			KeyPattern::kind(keys::WORKOUTS),
			KeyPattern::kind(keys::WORKOUT_STATS),
			KeyPattern::exact(keys::workout(id)),
		];

		self.mutate(&patterns, async {
			let workouts = self.stores.workouts();
			let checkpoint = workouts.begin_update(id, update, now());
			let result = self.client.put::<Workout, _>(&path, update).await;

			reconcile_or_rollback(
				result,
				|workout| workouts.reconcile_workout(workout),
				|| workouts.rollback(checkpoint),
			)
		})
		.await
	}

	async fn read<T, F, Fut>(&self, key: &QueryKey, loader: F) -> Result<CacheEntry<T>>
	where
		T: 'static + Send + Sync,
		F: 'static + Send + Sync + Fn() -> Fut,
		Fut: 'static + Send + Future<Output = Result<T>>,
	{
		let result = self.cache.fetch(key, self.stale_time, loader).await;

		self.observe(result)
	}

	async fn mutate<T, Fut>(&self, patterns: &[KeyPattern], mutation: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let result = self.cache.mutate(patterns, mutation).await;

		self.observe(result)
	}

	// A failed refresh ends the session for every collaborator exactly once.
	fn observe<T>(&self, result: Result<T>) -> Result<T> {
		if let Err(e) = &result
			&& e.is_sign_out()
			&& self.signed_in.swap(false, Ordering::SeqCst)
		{
			warn_event!("session ended by a failed token refresh");

			self.cache.clear();
			self.stores.publish(DomainEvent::SignedOut);
		}

		result
	}
}
impl Debug for Synchronizer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Synchronizer")
			.field("cache", &self.cache)
			.field("stores", &self.stores)
			.field("signed_in", &self.signed_in.load(Ordering::SeqCst))
			.finish()
	}
}

fn reconcile_or_rollback<T>(
	result: Result<T>,
	reconcile: impl FnOnce(&T),
	rollback: impl FnOnce(),
) -> Result<T> {
	match &result {
		Ok(value) => reconcile(value),
		Err(_) => rollback(),
	}

	result
}

fn now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}

#[cfg(test)]
mod tests {
	// std
	use std::cell::Cell;
	// self
	use super::*;
	use crate::domain::ExerciseCategory;

	#[test]
	fn keys_follow_request_parameters() {
		let query = WorkoutQuery { is_active: Some(true), limit: 10, offset: 20 };

		assert_eq!(keys::workouts(&query).to_string(), "workouts?is_active=true&limit=10&offset=20");
		assert!(KeyPattern::kind(keys::WORKOUTS).matches(&keys::workouts(&query)));
		assert!(KeyPattern::exact(keys::workout(&"w-1".into())).matches(&keys::workout(&"w-1".into())));
		assert!(!KeyPattern::exact(keys::workout(&"w-1".into())).matches(&keys::workout(&"w-2".into())));

		let exercises = ExerciseQuery { category: Some(ExerciseCategory::Cardio), ..Default::default() };

		assert_eq!(keys::exercises(&exercises).get("category"), Some("cardio"));
	}

	#[test]
	fn failed_results_roll_back() {
		let (reconciled, rolled_back) = (Cell::new(false), Cell::new(false));
		let result = reconcile_or_rollback::<()>(
			Err(Error::Timeout),
			|_| reconciled.set(true),
			|| rolled_back.set(true),
		);

		assert!(matches!(result, Err(Error::Timeout)));
		assert!(!reconciled.get());
		assert!(rolled_back.get());
	}
}
