//! The session token and the grant payload the auth endpoints return.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ErrorDetail};

/// Lifecycle status of a token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is usable and outside the skew window.
	Active,
	/// Token is still valid but inside the skew window; refresh early.
	Stale,
	/// Token passed its expiry instant.
	Expired,
}

/// The current session credentials.
///
/// Exactly one token is current per signed-in session; it is owned by the
/// [`TokenLifecycleManager`](crate::session::TokenLifecycleManager) and persisted through the
/// [`TokenStore`](crate::store::TokenStore).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Bearer secret sent on authenticated requests.
	pub access_token: TokenSecret,
	/// Secret exchanged at the refresh endpoint.
	pub refresh_token: TokenSecret,
	/// Absolute expiry of the access token.
	pub expires_at: OffsetDateTime,
}
impl Token {
	/// Creates a token from raw secrets and an absolute expiry.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at,
		}
	}

	/// Builds a token from an auth endpoint grant issued at `now`.
	///
	/// Refresh responses may omit `refresh_token`; the previous refresh secret is kept in
	/// that case. A grant with neither a new nor a previous refresh secret is rejected.
	pub fn from_grant(
		grant: &TokenGrant,
		previous_refresh: Option<&TokenSecret>,
		now: OffsetDateTime,
	) -> Result<Self> {
		if grant.access_token.trim().is_empty() {
			return Err(invalid_grant("access_token is empty"));
		}
		if grant.expires_in <= 0 {
			return Err(invalid_grant("expires_in must be positive"));
		}

		let refresh_token = match (&grant.refresh_token, previous_refresh) {
			(Some(fresh), _) if !fresh.trim().is_empty() => TokenSecret::new(fresh.as_str()),
			(_, Some(previous)) => previous.clone(),
			_ => return Err(invalid_grant("refresh_token is missing")),
		};

		let expires_at = now
			.checked_add(Duration::seconds(grant.expires_in))
			.ok_or_else(|| invalid_grant("expires_in is out of range"))?;

		Ok(Self { access_token: TokenSecret::new(grant.access_token.as_str()), refresh_token, expires_at })
	}

	/// Rebuilds a token from its persisted epoch-millisecond expiry.
	pub fn from_epoch_ms(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at_ms: i64,
	) -> Option<Self> {
		let nanos = i128::from(expires_at_ms).checked_mul(1_000_000)?;
		let expires_at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;

		Some(Self::new(access_token, refresh_token, expires_at))
	}

	/// Expiry expressed as milliseconds since the Unix epoch.
	pub fn expires_at_epoch_ms(&self) -> i64 {
		(self.expires_at.unix_timestamp_nanos() / 1_000_000) as i64
	}

	/// Computes the status at `now` for the provided skew window.
	pub fn status_at(&self, now: OffsetDateTime, skew: Duration) -> TokenStatus {
		if now >= self.expires_at {
			TokenStatus::Expired
		} else if self.expires_at - now <= skew {
			TokenStatus::Stale
		} else {
			TokenStatus::Active
		}
	}

	/// Returns `true` once the expiry instant has passed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		matches!(self.status_at(now, Duration::ZERO), TokenStatus::Expired)
	}

	/// Returns `true` when the token is expired or inside the skew window.
	pub fn is_stale_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		!matches!(self.status_at(now, skew), TokenStatus::Active)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Token payload returned by `/auth/refresh`, `/auth/login`, and `/auth/google`.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Newly minted access token.
	pub access_token: String,
	/// Token type; always `bearer` for this backend.
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Lifetime of the access token in seconds.
	pub expires_in: i64,
	/// Rotated refresh token, when the server issued one.
	#[serde(default)]
	pub refresh_token: Option<String>,
}

impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("rotates_refresh_token", &self.refresh_token.is_some())
			.finish()
	}
}

/// Body sent to the refresh endpoint.
#[derive(Clone, Serialize)]
pub(crate) struct RefreshRequest<'a> {
	pub(crate) refresh_token: &'a str,
}

fn default_token_type() -> String {
	"bearer".into()
}

fn invalid_grant(message: &str) -> Error {
	Error::Validation(ErrorDetail::new(format!("Token grant is invalid: {message}")))
}
