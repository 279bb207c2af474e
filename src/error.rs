//! Client-wide error taxonomy shared by the executor, session, cache, and stores.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared, clonable handle to a foreign error source.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// Every variant is `Clone` so a single in-flight refresh or cache load can hand the same
/// outcome to all of its waiters.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Server rejected the bearer token (HTTP 401).
	#[error("Request is unauthorized: {0}.")]
	Unauthorized(ErrorDetail),
	/// Server rejected the payload (HTTP 400/422).
	#[error("Request failed validation: {0}.")]
	Validation(ErrorDetail),
	/// Server failed or throttled the request (HTTP 5xx/429); safe to retry.
	#[error("Server error: {0}.")]
	Server(ErrorDetail),
	/// Any other 4xx response; not retried.
	#[error("Request was rejected: {0}.")]
	Rejected(ErrorDetail),
	/// Network, DNS, or TLS failure before a response arrived.
	#[error("Network error: {message}.")]
	Network {
		/// Human-readable summary.
		message: String,
		/// Transport-specific failure, when available.
		#[source]
		source: Option<SharedError>,
	},
	/// Request exceeded its timeout and was cancelled.
	#[error("Request timed out.")]
	Timeout,
	/// Response body could not be decoded into the expected shape.
	#[error("Response could not be decoded at `{path}`: {message}.")]
	Decode {
		/// JSON path of the failing field.
		path: String,
		/// Decoder message.
		message: String,
		/// HTTP status code of the decoded response, when available.
		status: Option<u16>,
	},
	/// No usable session exists; the caller must sign in again.
	#[error("Not authenticated; sign in again.")]
	NotAuthenticated,
}
impl Error {
	/// Builds a network error with the provided summary and no source.
	pub fn offline() -> Self {
		Self::Network { message: "device is offline".into(), source: None }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { message: src.to_string(), source: Some(Arc::new(src)) }
	}

	/// Builds a [`Error::Decode`] from a path-aware JSON failure.
	pub fn decode(
		err: serde_path_to_error::Error<serde_json::Error>,
		status: Option<u16>,
	) -> Self {
		Self::Decode { path: err.path().to_string(), message: err.inner().to_string(), status }
	}

	/// Returns `true` for failures that a retry may fix (network, server, timeout).
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network { .. } | Self::Server(_) | Self::Timeout)
	}

	/// Returns `true` when the error must be treated as a forced sign-out.
	pub fn is_sign_out(&self) -> bool {
		matches!(self, Self::NotAuthenticated)
	}

	/// Returns the server-provided detail for HTTP-classified errors.
	pub fn detail(&self) -> Option<&ErrorDetail> {
		match self {
			Self::Unauthorized(detail)
			| Self::Validation(detail)
			| Self::Server(detail)
			| Self::Rejected(detail) => Some(detail),
			_ => None,
		}
	}

	/// Returns the machine-readable `error_code`, when the server supplied one.
	pub fn error_code(&self) -> Option<&str> {
		self.detail().and_then(|detail| detail.error_code.as_deref())
	}
}

/// Error payload extracted from a `{ detail, error_code? }` response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
	/// HTTP status code of the failing response.
	pub status: Option<u16>,
	/// Human-readable message (`detail` from the body, or a body preview).
	pub message: String,
	/// Machine-readable code, when present.
	pub error_code: Option<String>,
}
impl ErrorDetail {
	/// Creates a detail with only a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { status: None, message: message.into(), error_code: None }
	}

	/// Attaches the HTTP status code.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Attaches a machine-readable error code.
	pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
		self.error_code = Some(code.into());

		self
	}
}
impl Display for ErrorDetail {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match (&self.error_code, self.status) {
			(Some(code), Some(status)) => write!(f, "{} ({code}, HTTP {status})", self.message),
			(Some(code), None) => write!(f, "{} ({code})", self.message),
			(None, Some(status)) => write!(f, "{} (HTTP {status})", self.message),
			(None, None) => f.write_str(&self.message),
		}
	}
}

/// Configuration and validation failures raised while assembling a client.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// Base URL could not be parsed.
	#[error("Base URL is invalid: {message}.")]
	InvalidBaseUrl {
		/// Parser message.
		message: String,
	},
	/// Base URL must use `http` or `https`.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Base URL cannot have paths joined onto it.
	#[error("Base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Offending URL.
		url: String,
	},
	/// Request timeout must be positive.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Builder failure message.
		message: String,
	},
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::HttpClientBuild { message: e.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_client_error_with_source() {
		let store_error = StoreError::Backend { message: "keychain locked".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("keychain locked"));

		let source = StdError::source(&error)
			.expect("Client error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn transient_classification_matches_retry_policy() {
		assert!(Error::Timeout.is_transient());
		assert!(Error::offline().is_transient());
		assert!(Error::Server(ErrorDetail::new("boom").with_status(503)).is_transient());
		assert!(!Error::Unauthorized(ErrorDetail::new("expired")).is_transient());
		assert!(!Error::Validation(ErrorDetail::new("bad title")).is_transient());
		assert!(!Error::NotAuthenticated.is_transient());
		assert!(Error::NotAuthenticated.is_sign_out());
	}

	#[test]
	fn detail_keeps_error_code_and_message() {
		let error = Error::Validation(
			ErrorDetail::new("Workout title cannot be empty")
				.with_status(422)
				.with_error_code("WORKOUT_TITLE_EMPTY"),
		);

		assert_eq!(error.error_code(), Some("WORKOUT_TITLE_EMPTY"));
		assert_eq!(
			error.to_string(),
			"Request failed validation: Workout title cannot be empty (WORKOUT_TITLE_EMPTY, HTTP 422)."
		);
	}
}
