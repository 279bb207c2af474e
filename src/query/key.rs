//! Structural cache keys and the patterns that select them.

// self
use crate::_prelude::*;

/// Cache key made of an entity kind plus sorted filter parameters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
	kind: String,
	params: BTreeMap<String, String>,
}
impl QueryKey {
	/// Creates a key for `kind` with no parameters.
	pub fn new(kind: impl Into<String>) -> Self {
		Self { kind: kind.into(), params: BTreeMap::new() }
	}

	/// Adds one filter parameter; parameter order never affects equality.
	pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
		self.params.insert(name.into(), value.to_string());

		self
	}

	/// Adds `name` only when `value` is present.
	pub fn param_opt(self, name: impl Into<String>, value: Option<impl Display>) -> Self {
		match value {
			Some(value) => self.param(name, value),
			None => self,
		}
	}

	/// Entity kind.
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// Value of parameter `name`, if set.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}
}
impl Debug for QueryKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(self, f)
	}
}
impl Display for QueryKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.kind)?;

		for (i, (name, value)) in self.params.iter().enumerate() {
			write!(f, "{}{name}={value}", if i == 0 { '?' } else { '&' })?;
		}

		Ok(())
	}
}

/// Selects cache keys for invalidation or eviction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPattern {
	/// Every key.
	All,
	/// Every key of one entity kind, whatever its parameters.
	Kind(String),
	/// Keys of one kind whose parameter `name` equals `value`.
	Param {
		/// Entity kind.
		kind: String,
		/// Parameter name.
		name: String,
		/// Required value.
		value: String,
	},
	/// Exactly one key.
	Exact(QueryKey),
}
impl KeyPattern {
	/// Matches every key.
	pub fn all() -> Self {
		Self::All
	}

	/// Matches every key of `kind`.
	pub fn kind(kind: impl Into<String>) -> Self {
		Self::Kind(kind.into())
	}

	/// Matches keys of `kind` carrying `name=value`.
	pub fn param(kind: impl Into<String>, name: impl Into<String>, value: impl Display) -> Self {
		Self::Param { kind: kind.into(), name: name.into(), value: value.to_string() }
	}

	/// Matches exactly `key`.
	pub fn exact(key: QueryKey) -> Self {
		Self::Exact(key)
	}

	/// Returns `true` when `key` is selected by this pattern.
	pub fn matches(&self, key: &QueryKey) -> bool {
		match self {
			Self::All => true,
			Self::Kind(kind) => key.kind == *kind,
			Self::Param { kind, name, value } =>
				key.kind == *kind && key.get(name) == Some(value.as_str()),
			Self::Exact(exact) => exact == key,
		}
	}
}
impl From<QueryKey> for KeyPattern {
	fn from(key: QueryKey) -> Self {
		Self::Exact(key)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parameter_order_is_irrelevant() {
		let a = QueryKey::new("workouts").param("limit", 50).param("is_active", true);
		let b = QueryKey::new("workouts").param("is_active", true).param("limit", 50);

		assert_eq!(a, b);
		assert_eq!(a.to_string(), "workouts?is_active=true&limit=50");
		assert_eq!(
			QueryKey::new("exercises").param_opt("search", None::<&str>),
			QueryKey::new("exercises")
		);
	}

	#[test]
	fn patterns_select_expected_keys() {
		let list = QueryKey::new("workouts").param("limit", 50);
		let detail = QueryKey::new("workout").param("id", 7);

		assert!(KeyPattern::all().matches(&detail));
		assert!(KeyPattern::kind("workouts").matches(&list));
		assert!(!KeyPattern::kind("workouts").matches(&detail));
		assert!(KeyPattern::param("workout", "id", 7).matches(&detail));
		assert!(!KeyPattern::param("workout", "id", 8).matches(&detail));
		assert!(KeyPattern::from(list.clone()).matches(&list));
		assert!(!KeyPattern::exact(list).matches(&QueryKey::new("workouts")));
	}
}
