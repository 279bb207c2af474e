//! Wire models exchanged with the SetLogger backend.

// self
use crate::{_prelude::*, auth::TokenGrant, domain::RecordId, error::ErrorDetail};

/// Workout header as listed by `GET /workouts`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workout {
	/// Workout identifier.
	pub id: RecordId,
	/// Owner.
	#[serde(default)]
	pub user_id: String,
	/// Title (1-30 characters).
	pub title: String,
	/// Start instant.
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	/// Completion instant, once finished.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
	/// Duration in seconds, once finished.
	#[serde(default)]
	pub duration: Option<i64>,
	/// Whether the workout is still in progress.
	pub is_active: bool,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last update instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

/// Workout with its exercises and sets, as returned by `GET /workouts/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDetail {
	/// Header fields.
	#[serde(flatten)]
	pub workout: Workout,
	/// Exercises in order.
	#[serde(default)]
	pub exercises: Vec<WorkoutExercise>,
}

/// One exercise slot inside a workout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExercise {
	/// Workout-exercise row identifier.
	pub id: RecordId,
	/// Parent workout.
	pub workout_id: RecordId,
	/// Library exercise.
	pub exercise_id: String,
	/// Zero-based position in the workout.
	pub order_index: u32,
	/// Free-form notes.
	#[serde(default)]
	pub notes: Option<String>,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Library details; absent on the `POST` response.
	#[serde(default)]
	pub exercise_details: Option<ExerciseDetails>,
	/// Logged sets; absent on the `POST` response.
	#[serde(default)]
	pub sets: Vec<SetEntry>,
}

/// Library fields embedded in a workout detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDetails {
	/// Library exercise identifier.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Category slug.
	pub category: String,
	/// Target body parts.
	#[serde(default)]
	pub body_part: Vec<String>,
	/// Required equipment.
	#[serde(default)]
	pub equipment: Vec<String>,
	/// Description and instructions.
	#[serde(default)]
	pub description: Option<String>,
}
impl From<&Exercise> for ExerciseDetails {
	fn from(exercise: &Exercise) -> Self {
		Self {
			id: exercise.id.clone(),
			name: exercise.name.clone(),
			category: exercise.category.as_str().into(),
			body_part: exercise.body_part.clone(),
			equipment: exercise.equipment.clone(),
			description: exercise.description.clone(),
		}
	}
}

/// One logged set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
	/// Set identifier.
	pub id: RecordId,
	/// Parent workout-exercise row.
	pub workout_exercise_id: RecordId,
	/// Repetitions.
	#[serde(default)]
	pub reps: Option<u32>,
	/// Weight in the user's unit.
	#[serde(default)]
	pub weight: Option<f64>,
	/// Duration in seconds.
	#[serde(default)]
	pub duration: Option<u32>,
	/// Distance in meters.
	#[serde(default)]
	pub distance: Option<f64>,
	/// Whether the set was completed.
	pub completed: bool,
	/// Rest after the set, in seconds.
	#[serde(default)]
	pub rest_time: Option<u32>,
	/// Free-form notes.
	#[serde(default)]
	pub notes: Option<String>,
	/// Position within the exercise.
	pub order_index: u32,
	/// Completion instant.
	#[serde(with = "time::serde::rfc3339")]
	pub completed_at: OffsetDateTime,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// Aggregates from `GET /workouts/stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutStats {
	/// Every workout.
	pub total_workouts: u64,
	/// Workouts still in progress.
	pub active_workouts: u64,
	/// Finished workouts.
	pub completed_workouts: u64,
	/// Summed duration in seconds.
	#[serde(default)]
	pub total_duration: Option<i64>,
	/// Mean duration in seconds.
	#[serde(default)]
	pub average_duration: Option<i64>,
}

/// Body of `POST /workouts`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkout {
	/// Title (1-30 characters).
	pub title: String,
	/// Start instant; the server uses "now" when absent.
	#[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
	pub started_at: Option<OffsetDateTime>,
}
impl CreateWorkout {
	/// Creates a request starting now.
	pub fn new(title: impl Into<String>) -> Self {
		Self { title: title.into(), started_at: None }
	}

	/// Rejects titles the server would refuse.
	pub fn validate(&self) -> Result<()> {
		validate_title(&self.title)
	}
}

/// Body of `PUT /workouts/{id}`; absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWorkout {
	/// New title.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Completion instant.
	#[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
	/// Duration in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<i64>,
	/// Active flag.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub is_active: Option<bool>,
}
impl UpdateWorkout {
	/// Update that finishes a workout started at `started_at`.
	pub fn complete(started_at: OffsetDateTime, now: OffsetDateTime) -> Self {
		Self {
			title: None,
			completed_at: Some(now),
			duration: Some((now - started_at).whole_seconds().max(0)),
			is_active: Some(false),
		}
	}

	/// Rejects values the server would refuse.
	pub fn validate(&self) -> Result<()> {
		if let Some(title) = &self.title {
			validate_title(title)?;
		}
		if self.duration.is_some_and(|duration| duration < 0) {
			return Err(invalid("duration must not be negative"));
		}

		Ok(())
	}

	/// Applies the present fields to `workout`.
	pub fn apply_to(&self, workout: &mut Workout, now: OffsetDateTime) {
		if let Some(title) = &self.title {
			workout.title.clone_from(title);
		}
		if let Some(completed_at) = self.completed_at {
			workout.completed_at = Some(completed_at);
		}
		if let Some(duration) = self.duration {
			workout.duration = Some(duration);
		}
		if let Some(is_active) = self.is_active {
			workout.is_active = is_active;
		}

		workout.updated_at = now;
	}
}

/// Body of `POST /workouts/{id}/exercises`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddExercise {
	/// Library exercise.
	pub exercise_id: String,
	/// Zero-based position.
	pub order_index: u32,
	/// Free-form notes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
}

/// Body of `POST /workouts/{id}/exercises/{exercise_id}/sets`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSet {
	/// Repetitions (strength).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reps: Option<u32>,
	/// Weight in the user's unit.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight: Option<f64>,
	/// Duration in seconds (timed or cardio).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u32>,
	/// Distance in meters (cardio).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub distance: Option<f64>,
	/// Whether the set was completed.
	pub completed: bool,
	/// Rest after the set, in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rest_time: Option<u32>,
	/// Free-form notes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
}
impl CreateSet {
	/// Completed strength set.
	pub fn strength(reps: u32, weight: f64) -> Self {
		Self {
			reps: Some(reps),
			weight: Some(weight),
			duration: None,
			distance: None,
			completed: true,
			rest_time: None,
			notes: None,
		}
	}

	/// Rejects sets the server would refuse: at least one metric, positive counts.
	pub fn validate(&self) -> Result<()> {
		if self.reps.is_none() && self.duration.is_none() && self.distance.is_none() {
			return Err(invalid("a set needs reps, duration, or distance"));
		}
		if self.reps == Some(0) || self.duration == Some(0) {
			return Err(invalid("reps and duration must be positive"));
		}
		if self.weight.is_some_and(|weight| weight < 0.) {
			return Err(invalid("weight must not be negative"));
		}
		if self.distance.is_some_and(|distance| distance <= 0.) {
			return Err(invalid("distance must be positive"));
		}

		Ok(())
	}
}

/// Body of `PUT /workouts/sets/{set_id}`; absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSet {
	/// Repetitions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reps: Option<u32>,
	/// Weight.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight: Option<f64>,
	/// Duration in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u32>,
	/// Distance in meters.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub distance: Option<f64>,
	/// Completion flag.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed: Option<bool>,
	/// Rest time in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rest_time: Option<u32>,
	/// Notes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
}
impl UpdateSet {
	/// Applies the present fields to `set`.
	pub fn apply_to(&self, set: &mut SetEntry) {
		set.reps = self.reps.or(set.reps);
		set.weight = self.weight.or(set.weight);
		set.duration = self.duration.or(set.duration);
		set.distance = self.distance.or(set.distance);
		set.completed = self.completed.unwrap_or(set.completed);
		set.rest_time = self.rest_time.or(set.rest_time);

		if let Some(notes) = &self.notes {
			set.notes = Some(notes.clone());
		}
	}
}

/// Preferred weight unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
	/// Kilograms.
	Kg,
	/// Pounds.
	#[default]
	Lbs,
}

/// UI theme preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
	/// Light.
	Light,
	/// Dark.
	Dark,
	/// Follow the system.
	#[default]
	Auto,
}

/// Per-user app preferences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserPreferences {
	/// Weight unit.
	pub weight_unit: WeightUnit,
	/// Theme.
	pub theme: Theme,
	/// Default rest timer in seconds (0-600).
	pub default_rest_timer: u32,
	/// Haptic feedback toggle.
	pub haptic_feedback: bool,
	/// Sound toggle.
	pub sound_enabled: bool,
	/// Start the rest timer after each set.
	pub auto_start_rest_timer: bool,
}
impl Default for UserPreferences {
	fn default() -> Self {
		Self {
			weight_unit: WeightUnit::Lbs,
			theme: Theme::Auto,
			default_rest_timer: 60,
			haptic_feedback: true,
			sound_enabled: true,
			auto_start_rest_timer: false,
		}
	}
}

/// Signed-in user's profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// User identifier.
	pub id: String,
	/// Email address.
	pub email: String,
	/// Display name.
	#[serde(default)]
	pub display_name: Option<String>,
	/// Preferences.
	#[serde(default)]
	pub preferences: UserPreferences,
	/// Account creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last profile update instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

/// Body of `PUT /users/profile`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
	/// New display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	/// Replacement preferences.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preferences: Option<UserPreferences>,
}
impl UpdateProfile {
	/// Rejects values the server would refuse.
	pub fn validate(&self) -> Result<()> {
		if self.display_name.as_ref().is_some_and(|name| name.chars().count() > 100) {
			return Err(invalid("display name must be 100 characters or less"));
		}
		if self.preferences.as_ref().is_some_and(|preferences| preferences.default_rest_timer > 600) {
			return Err(invalid("default rest timer must be between 0 and 600 seconds"));
		}

		Ok(())
	}

	/// Applies the present fields to `profile`.
	pub fn apply_to(&self, profile: &mut UserProfile, now: OffsetDateTime) {
		if let Some(name) = &self.display_name {
			profile.display_name = Some(name.clone());
		}
		if let Some(preferences) = &self.preferences {
			profile.preferences = preferences.clone();
		}

		profile.updated_at = now;
	}
}

/// Exercise library category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseCategory {
	/// Strength training.
	Strength,
	/// Cardio.
	Cardio,
	/// Flexibility.
	Flexibility,
	/// Balance.
	Balance,
	/// Bodyweight.
	Bodyweight,
}
impl ExerciseCategory {
	/// Wire slug.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Strength => "strength",
			Self::Cardio => "cardio",
			Self::Flexibility => "flexibility",
			Self::Balance => "balance",
			Self::Bodyweight => "bodyweight",
		}
	}
}
impl Display for ExerciseCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Exercise library entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
	/// Exercise identifier.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Category.
	pub category: ExerciseCategory,
	/// Target body parts.
	#[serde(default)]
	pub body_part: Vec<String>,
	/// Required equipment.
	#[serde(default)]
	pub equipment: Vec<String>,
	/// Description and instructions.
	#[serde(default)]
	pub description: Option<String>,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// Filters for `GET /workouts`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkoutQuery {
	/// Only active (or only finished) workouts.
	pub is_active: Option<bool>,
	/// Page size (1-100).
	pub limit: u32,
	/// Page offset.
	pub offset: u32,
}
impl WorkoutQuery {
	/// Rejects pages the server would refuse.
	pub fn validate(&self) -> Result<()> {
		if !(1..=100).contains(&self.limit) {
			return Err(invalid("workout page size must be between 1 and 100"));
		}

		Ok(())
	}

	/// Query-string pairs.
	pub fn pairs(&self) -> Vec<(String, String)> {
		let mut pairs = Vec::with_capacity(3);

		if let Some(is_active) = self.is_active {
			pairs.push(("is_active".into(), is_active.to_string()));
		}

		pairs.push(("limit".into(), self.limit.to_string()));
		pairs.push(("offset".into(), self.offset.to_string()));

		pairs
	}
}
impl Default for WorkoutQuery {
	fn default() -> Self {
		Self { is_active: None, limit: 50, offset: 0 }
	}
}

/// Filters for `GET /exercises`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExerciseQuery {
	/// Category filter.
	pub category: Option<ExerciseCategory>,
	/// Body part filter.
	pub body_part: Option<String>,
	/// Equipment filter.
	pub equipment: Option<String>,
	/// Case-insensitive name search (at least 2 characters).
	pub search: Option<String>,
	/// Page size (1-200).
	pub limit: u32,
	/// Page offset.
	pub offset: u32,
}
impl ExerciseQuery {
	/// Rejects filters the server would refuse.
	pub fn validate(&self) -> Result<()> {
		if !(1..=200).contains(&self.limit) {
			return Err(invalid("exercise page size must be between 1 and 200"));
		}
		if self.search.as_ref().is_some_and(|search| search.trim().chars().count() < 2) {
			return Err(invalid("search query must be at least 2 characters"));
		}

		Ok(())
	}

	/// Query-string pairs; the search term is trimmed.
	pub fn pairs(&self) -> Vec<(String, String)> {
		let mut pairs = Vec::with_capacity(6);

		if let Some(category) = self.category {
			pairs.push(("category".into(), category.as_str().into()));
		}
		if let Some(body_part) = &self.body_part {
			pairs.push(("body_part".into(), body_part.clone()));
		}
		if let Some(equipment) = &self.equipment {
			pairs.push(("equipment".into(), equipment.clone()));
		}
		if let Some(search) = &self.search {
			pairs.push(("search".into(), search.trim().into()));
		}

		pairs.push(("limit".into(), self.limit.to_string()));
		pairs.push(("offset".into(), self.offset.to_string()));

		pairs
	}
}
impl Default for ExerciseQuery {
	fn default() -> Self {
		Self { category: None, body_part: None, equipment: None, search: None, limit: 100, offset: 0 }
	}
}

/// Body of `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Email address.
	pub email: String,
	/// Password.
	pub password: String,
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest").field("email", &self.email).finish_non_exhaustive()
	}
}

/// Body of `POST /auth/google`.
#[derive(Clone, Serialize)]
pub struct GoogleSignIn {
	/// Google OAuth access token.
	pub token: String,
	/// Google ID token.
	pub google_jwt: String,
}
impl Debug for GoogleSignIn {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("GoogleSignIn(..)")
	}
}

/// Response of the sign-in endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
	/// Issued credentials.
	#[serde(flatten)]
	pub grant: TokenGrant,
	/// Signed-in user.
	pub user: UserProfile,
}

fn validate_title(title: &str) -> Result<()> {
	match title.trim().chars().count() {
		1..=30 => Ok(()),
		_ => Err(invalid("workout title must be 1-30 characters")),
	}
}

fn invalid(message: &str) -> Error {
	Error::Validation(ErrorDetail::new(message))
}
