//! Exercise library mirror.

// self
use crate::{
	_prelude::*,
	domain::{DomainEvent, Exercise, ExerciseCategory, ExerciseDetails},
};

/// Exercise library entries seen so far, keyed by id.
#[derive(Debug, Default)]
pub struct ExerciseStore(RwLock<BTreeMap<String, Exercise>>);
impl ExerciseStore {
	/// One entry.
	pub fn get(&self, id: &str) -> Option<Exercise> {
		self.0.read().get(id).cloned()
	}

	/// Embeddable details for one entry.
	pub fn details(&self, id: &str) -> Option<ExerciseDetails> {
		self.0.read().get(id).map(ExerciseDetails::from)
	}

	/// Every entry, sorted by name.
	pub fn all(&self) -> Vec<Exercise> {
		let mut exercises = self.0.read().values().cloned().collect::<Vec<_>>();

		exercises.sort_by(|a, b| a.name.cmp(&b.name));

		exercises
	}

	/// Entries of one category, sorted by name.
	pub fn by_category(&self, category: ExerciseCategory) -> Vec<Exercise> {
		self.all().into_iter().filter(|exercise| exercise.category == category).collect()
	}

	/// Number of known entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is known yet.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Upserts a page of entries; entries outside the page are kept.
	pub fn reconcile_list(&self, exercises: &[Exercise]) {
		let mut library = self.0.write();

		for exercise in exercises {
			library.insert(exercise.id.clone(), exercise.clone());
		}
	}

	/// Upserts one entry.
	pub fn reconcile_one(&self, exercise: &Exercise) {
		self.reconcile_list(std::slice::from_ref(exercise));
	}

	pub(crate) fn on_event(&self, event: &DomainEvent) {
		if matches!(event, DomainEvent::SignedOut) {
			self.0.write().clear();
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn exercise(id: &str, name: &str, category: ExerciseCategory) -> Exercise {
		Exercise {
			id: id.into(),
			name: name.into(),
			category,
			body_part: vec!["legs".into()],
			equipment: Vec::new(),
			description: None,
			created_at: datetime!(2025-01-01 0:00 UTC),
		}
	}

	#[test]
	fn pages_merge_into_sorted_library() {
		let store = ExerciseStore::default();

		store.reconcile_list(&[
			exercise("2", "Squat", ExerciseCategory::Strength),
			exercise("1", "Rowing", ExerciseCategory::Cardio),
		]);
		store.reconcile_one(&exercise("3", "Deadlift", ExerciseCategory::Strength));

		let names = store.all().into_iter().map(|exercise| exercise.name).collect::<Vec<_>>();

		assert_eq!(names, ["Deadlift", "Rowing", "Squat"]);
		assert_eq!(store.by_category(ExerciseCategory::Cardio).len(), 1);
		assert_eq!(store.details("2").map(|details| details.category), Some("strength".into()));

		store.on_event(&DomainEvent::SignedOut);

		assert!(store.is_empty());
	}
}
