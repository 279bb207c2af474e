//! Workout list, workout details, and their optimistic edits.

// std
use std::mem;
// self
use crate::{
	_prelude::*,
	domain::{
		AddExercise, CreateSet, CreateWorkout, DomainEvent, ExerciseDetails, RecordId, SetEntry,
		UpdateSet, UpdateWorkout, Workout, WorkoutDetail, WorkoutExercise,
	},
};

/// Undo record for one optimistic edit of a workout.
///
/// Rolling back touches only the record the edit changed, so edits that overlap on the same
/// workout and were already confirmed stay in place.
#[derive(Clone, Debug)]
#[must_use = "dropping a checkpoint makes the optimistic edit impossible to roll back"]
pub struct WorkoutCheckpoint {
	id: RecordId,
	undo: Undo,
}
impl WorkoutCheckpoint {
	/// Workout the checkpoint covers.
	pub fn id(&self) -> &RecordId {
		&self.id
	}
}

#[derive(Clone, Debug)]
enum Undo {
	Created,
	Header { listed: Option<Workout>, detail: Option<Workout> },
	Deleted { listed: Option<(usize, Workout)>, detail: Option<WorkoutDetail> },
	AddedExercise(RecordId),
	RemovedExercises(Vec<(usize, WorkoutExercise)>),
	AddedSet(RecordId),
	UpdatedSet(Option<SetEntry>),
	// Owning exercise row, position, and the removed set.
	DeletedSet(Option<(RecordId, usize, SetEntry)>),
}

#[derive(Debug, Default)]
struct WorkoutState {
	list: Vec<Workout>,
	details: HashMap<RecordId, WorkoutDetail>,
}
impl WorkoutState {
	fn position(&self, id: &RecordId) -> Option<usize> {
		self.list.iter().position(|workout| workout.id == *id)
	}

	fn listed(&self, id: &RecordId) -> Option<(usize, Workout)> {
		self.position(id).map(|i| (i, self.list[i].clone()))
	}

	fn undo(&mut self, id: &RecordId, undo: Undo) {
		match undo {
			Undo::Created => {
				self.list.retain(|workout| workout.id != *id);
				self.details.remove(id);
			},
			Undo::Header { listed, detail } => {
				if let (Some(previous), Some(i)) = (listed, self.position(id)) {
					self.list[i] = previous;
				}
				if let (Some(previous), Some(current)) = (detail, self.details.get_mut(id)) {
					current.workout = previous;
				}
			},
			Undo::Deleted { listed, detail } => {
				if let Some((index, workout)) = listed {
					if self.position(id).is_none() {
						let index = index.min(self.list.len());

						self.list.insert(index, workout);
					}
				}
				if let Some(detail) = detail {
					self.details.entry(id.clone()).or_insert(detail);
				}
			},
			Undo::AddedExercise(provisional) =>
				if let Some(detail) = self.details.get_mut(id) {
					detail.exercises.retain(|exercise| exercise.id != provisional);
				},
			Undo::RemovedExercises(removed) => {
				let Some(detail) = self.details.get_mut(id) else {
					return;
				};

				for (index, exercise) in removed {
					if detail.exercises.iter().any(|present| present.id == exercise.id) {
						continue;
					}

					let index = index.min(detail.exercises.len());

					detail.exercises.insert(index, exercise);
				}
			},
			Undo::AddedSet(provisional) =>
				if let Some(detail) = self.details.get_mut(id) {
					for exercise in &mut detail.exercises {
						exercise.sets.retain(|set| set.id != provisional);
					}
				},
			Undo::UpdatedSet(previous) => {
				let Some(previous) = previous else {
					return;
				};

				if let Some(set) = self.sets_mut(id).find(|set| set.id == previous.id) {
					*set = previous;
				}
			},
			Undo::DeletedSet(removed) => {
				let Some((owner, index, set)) = removed else {
					return;
				};

				if self.sets_mut(id).any(|present| present.id == set.id) {
					return;
				}

				let exercise = self
					.details
					.get_mut(id)
					.and_then(|detail| detail.exercises.iter_mut().find(|exercise| exercise.id == owner));

				if let Some(exercise) = exercise {
					let index = index.min(exercise.sets.len());

					exercise.sets.insert(index, set);
				}
			},
		}
	}

	fn upsert(&mut self, workout: &Workout) {
		match self.position(&workout.id) {
			Some(i) => self.list[i] = workout.clone(),
			None => self.list.push(workout.clone()),
		}

		if let Some(detail) = self.details.get_mut(&workout.id) {
			detail.workout = workout.clone();
		}
	}

	fn exercise_mut(
		&mut self,
		workout_id: &RecordId,
		exercise_id: &str,
	) -> Option<&mut WorkoutExercise> {
		self.details
			.get_mut(workout_id)?
			.exercises
			.iter_mut()
			.find(|exercise| exercise.exercise_id == exercise_id)
	}

	fn sets_mut(&mut self, workout_id: &RecordId) -> impl Iterator<Item = &mut SetEntry> {
		self.details
			.get_mut(workout_id)
			.into_iter()
			.flat_map(|detail| detail.exercises.iter_mut())
			.flat_map(|exercise| exercise.sets.iter_mut())
	}
}

/// Workouts known to this session.
#[derive(Debug, Default)]
pub struct WorkoutStore(RwLock<WorkoutState>);
impl WorkoutStore {
	/// Listed workouts, optimistic ones included.
	pub fn list(&self) -> Vec<Workout> {
		self.0.read().list.clone()
	}

	/// One listed workout.
	pub fn get(&self, id: &RecordId) -> Option<Workout> {
		let state = self.0.read();

		state.position(id).map(|i| state.list[i].clone())
	}

	/// Loaded detail of one workout.
	pub fn detail(&self, id: &RecordId) -> Option<WorkoutDetail> {
		self.0.read().details.get(id).cloned()
	}

	/// Most recently started workout that is still in progress.
	pub fn active(&self) -> Option<Workout> {
		self.0
			.read()
			.list
			.iter()
			.filter(|workout| workout.is_active)
			.max_by_key(|workout| workout.started_at)
			.cloned()
	}

	/// Inserts a placeholder workout for `request`.
	pub fn begin_create(
		&self,
		request: &CreateWorkout,
		user_id: &str,
		now: OffsetDateTime,
	) -> (RecordId, WorkoutCheckpoint) {
		let id = RecordId::temporary();
		let workout = Workout {
			id: id.clone(),
			user_id: user_id.to_owned(),
			title: request.title.trim().to_owned(),
			started_at: request.started_at.unwrap_or(now),
			completed_at: None,
			duration: None,
			is_active: true,
			created_at: now,
			updated_at: now,
		};
		let mut state = self.0.write();

		state.details.insert(id.clone(), WorkoutDetail { workout: workout.clone(), exercises: Vec::new() });
		state.list.insert(0, workout);

		(id.clone(), WorkoutCheckpoint { id, undo: Undo::Created })
	}

	/// Applies `update` to the workout ahead of confirmation.
	pub fn begin_update(
		&self,
		id: &RecordId,
		update: &UpdateWorkout,
		now: OffsetDateTime,
	) -> WorkoutCheckpoint {
		let mut state = self.0.write();
		let undo = Undo::Header {
			listed: state.position(id).map(|i| state.list[i].clone()),
			detail: state.details.get(id).map(|detail| detail.workout.clone()),
		};

		if let Some(i) = state.position(id) {
			update.apply_to(&mut state.list[i], now);
		}
		if let Some(detail) = state.details.get_mut(id) {
			update.apply_to(&mut detail.workout, now);
		}

		WorkoutCheckpoint { id: id.clone(), undo }
	}

	/// Hides the workout ahead of confirmation.
	pub fn begin_delete(&self, id: &RecordId) -> WorkoutCheckpoint {
		let mut state = self.0.write();
		let listed = state.listed(id);

		state.list.retain(|workout| workout.id != *id);

		let detail = state.details.remove(id);

		WorkoutCheckpoint { id: id.clone(), undo: Undo::Deleted { listed, detail } }
	}

	/// Appends a placeholder exercise slot to a loaded workout detail.
	pub fn begin_add_exercise(
		&self,
		workout_id: &RecordId,
		request: &AddExercise,
		details: Option<ExerciseDetails>,
		now: OffsetDateTime,
	) -> (RecordId, WorkoutCheckpoint) {
		let id = RecordId::temporary();
		let mut state = self.0.write();

		if let Some(detail) = state.details.get_mut(workout_id) {
			detail.exercises.push(WorkoutExercise {
				id: id.clone(),
				workout_id: workout_id.clone(),
				exercise_id: request.exercise_id.clone(),
				order_index: request.order_index,
				notes: request.notes.clone(),
				created_at: now,
				exercise_details: details,
				sets: Vec::new(),
			});
			detail.exercises.sort_by_key(|exercise| exercise.order_index);
		}

		(id.clone(), WorkoutCheckpoint { id: workout_id.clone(), undo: Undo::AddedExercise(id) })
	}

	/// Removes a library exercise (and its sets) from a loaded workout detail.
	pub fn begin_remove_exercise(&self, workout_id: &RecordId, exercise_id: &str) -> WorkoutCheckpoint {
		let mut state = self.0.write();
		let mut removed = Vec::new();

		if let Some(detail) = state.details.get_mut(workout_id) {
			for (index, exercise) in mem::take(&mut detail.exercises).into_iter().enumerate() {
				if exercise.exercise_id == exercise_id {
					removed.push((index, exercise));
				} else {
					detail.exercises.push(exercise);
				}
			}
		}

		WorkoutCheckpoint { id: workout_id.clone(), undo: Undo::RemovedExercises(removed) }
	}

	/// Appends a placeholder set to the exercise's slot in a loaded workout detail.
	pub fn begin_add_set(
		&self,
		workout_id: &RecordId,
		exercise_id: &str,
		request: &CreateSet,
		now: OffsetDateTime,
	) -> (RecordId, WorkoutCheckpoint) {
		let id = RecordId::temporary();
		let mut state = self.0.write();

		if let Some(exercise) = state.exercise_mut(workout_id, exercise_id) {
			let order_index = exercise.sets.len() as u32;

			exercise.sets.push(SetEntry {
				id: id.clone(),
				workout_exercise_id: exercise.id.clone(),
				reps: request.reps,
				weight: request.weight,
				duration: request.duration,
				distance: request.distance,
				completed: request.completed,
				rest_time: request.rest_time,
				notes: request.notes.clone(),
				order_index,
				completed_at: now,
				created_at: now,
			});
		}

		(id.clone(), WorkoutCheckpoint { id: workout_id.clone(), undo: Undo::AddedSet(id) })
	}

	/// Applies `update` to a set ahead of confirmation.
	pub fn begin_update_set(
		&self,
		workout_id: &RecordId,
		set_id: &RecordId,
		update: &UpdateSet,
	) -> WorkoutCheckpoint {
		let mut state = self.0.write();
		let mut previous = None;

		if let Some(set) = state.sets_mut(workout_id).find(|set| set.id == *set_id) {
			previous = Some(set.clone());

			update.apply_to(set);
		}

		WorkoutCheckpoint { id: workout_id.clone(), undo: Undo::UpdatedSet(previous) }
	}

	/// Removes a set ahead of confirmation.
	pub fn begin_delete_set(&self, workout_id: &RecordId, set_id: &RecordId) -> WorkoutCheckpoint {
		let mut state = self.0.write();
		let mut removed = None;

		if let Some(detail) = state.details.get_mut(workout_id) {
			for exercise in &mut detail.exercises {
				if let Some(i) = exercise.sets.iter().position(|set| set.id == *set_id) {
					removed = Some((exercise.id.clone(), i, exercise.sets.remove(i)));

					break;
				}
			}
		}

		WorkoutCheckpoint { id: workout_id.clone(), undo: Undo::DeletedSet(removed) }
	}

	/// Reverts the one record the optimistic edit behind `checkpoint` changed.
	pub fn rollback(&self, checkpoint: WorkoutCheckpoint) {
		let WorkoutCheckpoint { id, undo } = checkpoint;

		debug_event!(workout = %id, "rolling back optimistic workout edit");

		self.0.write().undo(&id, undo);
	}

	/// Swaps a placeholder workout for the server's record.
	pub fn confirm_created(&self, provisional: &RecordId, confirmed: &Workout) {
		let mut state = self.0.write();

		match state.position(provisional) {
			Some(i) => state.list[i] = confirmed.clone(),
			None => state.upsert(confirmed),
		}

		let exercises = state.details.remove(provisional).map(|detail| detail.exercises).unwrap_or_default();

		state
			.details
			.insert(confirmed.id.clone(), WorkoutDetail { workout: confirmed.clone(), exercises });
	}

	/// Folds a confirmed workout header in.
	pub fn reconcile_workout(&self, workout: &Workout) {
		self.0.write().upsert(workout);
	}

	/// Upserts listed workouts; placeholders and unlisted records are kept.
	pub fn reconcile_list(&self, workouts: &[Workout]) {
		let mut state = self.0.write();

		for workout in workouts {
			state.upsert(workout);
		}
	}

	/// Replaces the detail of one workout with the server's view.
	pub fn reconcile_detail(&self, detail: &WorkoutDetail) {
		let mut state = self.0.write();

		state.upsert(&detail.workout);
		state.details.insert(detail.workout.id.clone(), detail.clone());
	}

	/// Swaps a placeholder exercise slot for the server's row.
	///
	/// The `POST` response carries neither library details nor sets; those are kept from the
	/// placeholder.
	pub fn confirm_exercise(
		&self,
		workout_id: &RecordId,
		provisional: &RecordId,
		mut confirmed: WorkoutExercise,
	) {
		let mut state = self.0.write();
		let Some(detail) = state.details.get_mut(workout_id) else {
			return;
		};

		match detail.exercises.iter_mut().find(|exercise| exercise.id == *provisional) {
			Some(placeholder) => {
				if confirmed.exercise_details.is_none() {
					confirmed.exercise_details = placeholder.exercise_details.take();
				}

				confirmed.sets.append(&mut placeholder.sets);

				for set in &mut confirmed.sets {
					set.workout_exercise_id = confirmed.id.clone();
				}

				*placeholder = confirmed;
			},
			None => detail.exercises.push(confirmed),
		}

		detail.exercises.sort_by_key(|exercise| exercise.order_index);
	}

	/// Swaps a placeholder set for the server's row.
	pub fn confirm_set(&self, workout_id: &RecordId, provisional: &RecordId, confirmed: SetEntry) {
		let mut state = self.0.write();

		if let Some(set) = state.sets_mut(workout_id).find(|set| set.id == *provisional) {
			*set = confirmed;

			return;
		}

		let owner = state.details.get_mut(workout_id).and_then(|detail| {
			detail.exercises.iter_mut().find(|exercise| exercise.id == confirmed.workout_exercise_id)
		});

		if let Some(exercise) = owner {
			exercise.sets.push(confirmed);
		}
	}

	/// Replaces one set with the server's row.
	pub fn reconcile_set(&self, workout_id: &RecordId, confirmed: SetEntry) {
		let id = confirmed.id.clone();

		self.confirm_set(workout_id, &id, confirmed);
	}

	/// Drops everything.
	pub fn clear(&self) {
		*self.0.write() = WorkoutState::default();
	}

	pub(crate) fn on_event(&self, event: &DomainEvent) {
		match event {
			DomainEvent::SignedOut | DomainEvent::SignedIn(_) => self.clear(),
			DomainEvent::WorkoutDeleted(id) => {
				let mut state = self.0.write();

				state.list.retain(|workout| workout.id != *id);
				state.details.remove(id);
			},
			_ => {},
		}
	}
}
