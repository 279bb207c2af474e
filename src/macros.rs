// Borrows every field value of a `tracing` event without emitting anything.
#[cfg_attr(feature = "tracing", allow(unused_macros))]
macro_rules! event_fields {
	() => {};
	($name:ident = % $value:expr $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	($name:ident = ? $value:expr $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	($name:ident = $value:expr $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	(% $value:ident $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	(? $value:ident $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	($value:ident $(, $($rest:tt)*)?) => {
		let _ = &$value;
		$(event_fields!($($rest)*);)?
	};
	($message:literal $(, $($rest:tt)*)?) => {};
}

// Forwards to `tracing::warn!` when the `tracing` feature is enabled; otherwise only borrows the
// field values.
macro_rules! warn_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::warn!($($arg)*);
		}
		#[cfg(not(feature = "tracing"))]
		{
			event_fields!($($arg)*);
		}
	};
}

// Forwards to `tracing::debug!` when the `tracing` feature is enabled; otherwise only borrows the
// field values.
macro_rules! debug_event {
	($($arg:tt)*) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!($($arg)*);
		}
		#[cfg(not(feature = "tracing"))]
		{
			event_fields!($($arg)*);
		}
	};
}
