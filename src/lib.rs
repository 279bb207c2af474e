//! Authenticated API client for the SetLogger fitness backend: single-flight token refresh, a
//! TTL-aware query cache, and optimistic domain stores kept coherent with the server.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[macro_use]
mod macros;

pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod obs;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Token,
		client::ApiClient,
		config::ClientConfig,
		http::HttpTransport,
		query::QueryCache,
		session::TokenLifecycleManager,
		store::{MemoryKeyValueStore, TokenStore},
		sync::Synchronizer,
	};

	/// Everything an integration test needs to drive one isolated session.
	pub struct TestSession {
		/// Key-value backend behind the token store.
		pub backend: Arc<MemoryKeyValueStore>,
		/// Token store shared with the manager.
		pub tokens: Arc<TokenStore>,
		/// Token lifecycle manager.
		pub manager: TokenLifecycleManager,
		/// Authenticated API client.
		pub client: ApiClient,
	}

	/// Builds a token fixture that expires `ttl` from now.
	pub fn token_fixture(access: &str, refresh: &str, ttl: Duration) -> Token {
		Token::new(access, refresh, OffsetDateTime::now_utc() + ttl)
	}

	/// Parses a base URL and builds a config with test-friendly defaults.
	pub fn test_config(base_url: &str) -> ClientConfig {
		let url = Url::parse(base_url).expect("Test base URL should parse.");

		ClientConfig::builder(url)
			.request_timeout(StdDuration::from_secs(5))
			.build()
			.expect("Test client config should be valid.")
	}

	/// Wires an isolated session over the provided transport.
	pub fn build_test_session(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> TestSession {
		let backend = Arc::new(MemoryKeyValueStore::default());
		let tokens = Arc::new(TokenStore::new(backend.clone()));
		let manager = TokenLifecycleManager::new(config.clone(), transport.clone(), tokens.clone());
		let client = ApiClient::new(config, transport, manager.clone());

		TestSession { backend, tokens, manager, client }
	}

	/// Wires a full synchronizer (client + cache + stores) over the provided transport.
	pub fn build_test_synchronizer(
		config: ClientConfig,
		transport: Arc<dyn HttpTransport>,
	) -> (Synchronizer, TestSession) {
		let session = build_test_session(config.clone(), transport);
		let cache = QueryCache::new(config.retry.clone());
		let synchronizer = Synchronizer::new(session.client.clone(), cache, config.stale_time);

		(synchronizer, session)
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest transport pointed at an `httpmock` server.
	pub fn test_reqwest_transport() -> Arc<dyn HttpTransport> {
		Arc::new(
			crate::http::ReqwestTransport::new().expect("Reqwest test transport should build."),
		)
	}
}

mod _prelude {
	pub use std::{
		any::Any,
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, setlogger_client as _};
