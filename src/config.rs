//! Client configuration and its validating builder.

// self
use crate::{_prelude::*, error::ConfigError, query::RetryPolicy};

/// Validated configuration shared by every component of one client instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	/// Base URL of the API (e.g. `https://api.setlogger.app`).
	pub base_url: Url,
	/// Timeout applied to every request.
	pub request_timeout: StdDuration,
	/// Safety margin subtracted from token expiry before refreshing early.
	pub refresh_skew: Duration,
	/// Path of the refresh endpoint.
	pub refresh_path: String,
	/// Default time a cached query stays fresh.
	pub stale_time: StdDuration,
	/// Retry policy for failed cache loads.
	pub retry: RetryPolicy,
}
impl ClientConfig {
	/// Default request timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default refresh skew window.
	pub const DEFAULT_REFRESH_SKEW: Duration = Duration::seconds(60);
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
	/// Default query freshness window.
	pub const DEFAULT_STALE_TIME: StdDuration = StdDuration::from_secs(5 * 60);

	/// Starts a builder for the provided base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Parses `base_url` and starts a builder.
	pub fn parse(base_url: &str) -> Result<ClientConfigBuilder, ConfigError> {
		Url::parse(base_url)
			.map(ClientConfigBuilder::new)
			.map_err(|e| ConfigError::InvalidBaseUrl { message: e.to_string() })
	}

	/// Resolves `path` (and query pairs) against the base URL, keeping any base path prefix.
	pub fn endpoint(&self, path: &str, query: &[(String, String)]) -> Result<Url, ConfigError> {
		let mut url = self.base_url.clone();
		let joined = format!(
			"{}/{}",
			self.base_url.path().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		url.set_path(&joined);
		url.set_query(None);

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
		}
		if url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase { url: self.base_url.to_string() });
		}

		Ok(url)
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	base_url: Url,
	request_timeout: StdDuration,
	refresh_skew: Duration,
	refresh_path: String,
	stale_time: StdDuration,
	retry: RetryPolicy,
}
impl ClientConfigBuilder {
	fn new(base_url: Url) -> Self {
		Self {
			base_url,
			request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
			refresh_skew: ClientConfig::DEFAULT_REFRESH_SKEW,
			refresh_path: ClientConfig::DEFAULT_REFRESH_PATH.into(),
			stale_time: ClientConfig::DEFAULT_STALE_TIME,
			retry: RetryPolicy::default(),
		}
	}

	/// Overrides the per-request timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the refresh skew window; negative values clamp to zero.
	pub fn refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the default query freshness window.
	pub fn stale_time(mut self, stale_time: StdDuration) -> Self {
		self.stale_time = stale_time;

		self
	}

	/// Overrides the retry policy for failed cache loads.
	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase { url: self.base_url.to_string() });
		}
		if self.request_timeout.is_zero() {
			return Err(ConfigError::ZeroTimeout);
		}

		Ok(ClientConfig {
			base_url: self.base_url,
			request_timeout: self.request_timeout,
			refresh_skew: self.refresh_skew,
			refresh_path: self.refresh_path,
			stale_time: self.stale_time,
			retry: self.retry,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn endpoint_keeps_base_path_prefix_and_query() {
		let config = ClientConfig::parse("https://api.example.com/v1/")
			.expect("Base URL should parse.")
			.build()
			.expect("Config should be valid.");
		let url = config
			.endpoint("/workouts", &[("is_active".into(), "true".into()), ("limit".into(), "50".into())])
			.expect("Endpoint should resolve.");

		assert_eq!(url.as_str(), "https://api.example.com/v1/workouts?is_active=true&limit=50");
	}

	#[test]
	fn builder_rejects_bad_scheme_and_zero_timeout() {
		let err = ClientConfig::parse("ftp://example.com")
			.expect("URL should parse.")
			.build()
			.expect_err("ftp scheme should be rejected.");

		assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));

		let err = ClientConfig::parse("https://example.com")
			.expect("URL should parse.")
			.request_timeout(StdDuration::ZERO)
			.build()
			.expect_err("Zero timeout should be rejected.");

		assert_eq!(err, ConfigError::ZeroTimeout);
		assert!(matches!(
			ClientConfig::parse("not a url"),
			Err(ConfigError::InvalidBaseUrl { .. })
		));
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = ClientConfig::parse("http://127.0.0.1:8000")
			.expect("URL should parse.")
			.refresh_skew(Duration::seconds(-5))
			.build()
			.expect("Config should be valid.");

		assert_eq!(config.refresh_skew, Duration::ZERO);
		assert_eq!(config.refresh_path, "/auth/refresh");
		assert_eq!(config.request_timeout, StdDuration::from_secs(30));
		assert_eq!(config.retry, RetryPolicy::default());
	}
}
