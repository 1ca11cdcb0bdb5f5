// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

//! Authenticated client for the Google Docs v1 and Drive v3 APIs.
//!
//! Token lifecycle: before every request the client checks staleness
//! against the five-minute window and refreshes proactively; a 401 reply
//! triggers exactly one reactive refresh-and-retry. The refresh critical
//! section sits behind a mutex, so concurrent callers observing a stale
//! token coalesce into a single refresh and all see the new token.
//! Refreshed tokens are applied in place and handed to the token-update
//! callback; persisting them is the caller's responsibility.

use std::sync::Arc;

use chrono::Utc;
use common::{OAuth2Tokens, TokenUpdateCallback};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{SourceError, SourceErrorKind, SourceResult, REQUEST_SEMAPHORE};

pub const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Default OAuth2 token exchange endpoint; overridable per connection via
/// `refreshExchangeUri`.
pub const DEFAULT_REFRESH_EXCHANGE_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct RefreshReply {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	refresh_token: Option<String>,
}

pub struct GoogleApiClient {
	client: reqwest::Client,
	docs_base: String,
	drive_base: String,
	refresh_exchange_uri: String,
	tokens: Mutex<OAuth2Tokens>,
	on_token_update: Option<TokenUpdateCallback>,
}

impl std::fmt::Debug for GoogleApiClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GoogleApiClient")
			.field("docs_base", &self.docs_base)
			.field("drive_base", &self.drive_base)
			.finish()
	}
}

impl GoogleApiClient {
	pub fn new(
		tokens: OAuth2Tokens,
		refresh_exchange_uri: Option<String>,
		on_token_update: Option<TokenUpdateCallback>,
	) -> Self {
		Self::with_base_urls(
			tokens,
			refresh_exchange_uri.unwrap_or_else(|| DEFAULT_REFRESH_EXCHANGE_URI.to_string()),
			DOCS_API_BASE.to_string(),
			DRIVE_API_BASE.to_string(),
			on_token_update,
		)
	}

	/// Test seam: point every endpoint at a mock server.
	pub fn with_base_urls(
		tokens: OAuth2Tokens,
		refresh_exchange_uri: String,
		docs_base: String,
		drive_base: String,
		on_token_update: Option<TokenUpdateCallback>,
	) -> Self {
		GoogleApiClient {
			client: reqwest::Client::new(),
			docs_base,
			drive_base,
			refresh_exchange_uri,
			tokens: Mutex::new(tokens),
			on_token_update,
		}
	}

	pub fn docs_url(&self, path: &str) -> String {
		format!("{}{}", self.docs_base, path)
	}

	pub fn drive_url(&self, path: &str) -> String {
		format!("{}{}", self.drive_base, path)
	}

	/// Returns a usable bearer token, refreshing first when the stored one
	/// is stale. Single-flight: the mutex serializes refreshes and late
	/// arrivals observe the already-fresh token.
	async fn access_token(&self) -> SourceResult<String> {
		let mut tokens = self.tokens.lock().await;
		if tokens.is_stale(Utc::now()) {
			self.refresh_locked(&mut tokens).await?;
		}
		Ok(tokens.access_token.clone())
	}

	/// Unconditional refresh, used after a 401.
	async fn force_refresh(&self) -> SourceResult<String> {
		let mut tokens = self.tokens.lock().await;
		self.refresh_locked(&mut tokens).await?;
		Ok(tokens.access_token.clone())
	}

	async fn refresh_locked(&self, tokens: &mut OAuth2Tokens) -> SourceResult<()> {
		let Some(refresh_token) = tokens.refresh_token.clone() else {
			return Err(SourceError::new(
				SourceErrorKind::AuthExpired,
				Arc::new(anyhow::anyhow!("access token is stale and no refresh token is stored")),
			));
		};
		debug!(endpoint = %self.refresh_exchange_uri, "refreshing oauth2 access token");
		let response = self
			.client
			.post(&self.refresh_exchange_uri)
			.form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
			.send()
			.await
			.map_err(SourceError::from)?;
		if !response.status().is_success() {
			let status = response.status();
			let body = response.text().await.unwrap_or_default();
			return Err(SourceError::new(
				SourceErrorKind::AuthExpired,
				Arc::new(anyhow::anyhow!("token refresh failed with {status}: {body}")),
			));
		}
		let reply: RefreshReply = response.json().await.map_err(SourceError::from)?;

		tokens.access_token = reply.access_token;
		if let Some(refresh_token) = reply.refresh_token {
			tokens.refresh_token = Some(refresh_token);
		}
		tokens.expires_at =
			reply.expires_in.map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));

		if let Some(callback) = &self.on_token_update {
			callback(tokens.clone()).await;
		}
		Ok(())
	}

	async fn send_with_token(
		&self,
		method: reqwest::Method,
		url: &str,
		body: Option<&Value>,
		token: &str,
	) -> SourceResult<reqwest::Response> {
		let mut request = self.client.request(method, url).bearer_auth(token);
		if let Some(body) = body {
			request = request.json(body);
		}
		request.send().await.map_err(SourceError::from)
	}

	/// Issues a request with the reactive 401 protocol: one refresh, one
	/// retry, then the failure surfaces.
	async fn request_json(
		&self,
		method: reqwest::Method,
		url: &str,
		body: Option<&Value>,
	) -> SourceResult<Value> {
		let _permit = REQUEST_SEMAPHORE.acquire().await.map_err(|_| SourceError::cancelled())?;
		let token = self.access_token().await?;
		let mut response = self.send_with_token(method.clone(), url, body, &token).await?;

		if response.status().as_u16() == 401 {
			warn!(url = url, "401 from google api, refreshing token and retrying once");
			let token = self.force_refresh().await?;
			response = self.send_with_token(method, url, body, &token).await?;
			if response.status().as_u16() == 401 {
				let body = response.text().await.unwrap_or_default();
				return Err(SourceError::new(
					SourceErrorKind::AuthExpired,
					Arc::new(anyhow::anyhow!("google api rejected refreshed token: {body}")),
				));
			}
		}

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			let kind = match status.as_u16() {
				403 => SourceErrorKind::AuthRequired,
				404 => SourceErrorKind::NotFound,
				400 => SourceErrorKind::InvalidQuery,
				_ => SourceErrorKind::Upstream,
			};
			return Err(SourceError::new(
				kind,
				Arc::new(anyhow::anyhow!("google api returned {status}: {body}")),
			));
		}
		if status.as_u16() == 204 {
			return Ok(Value::Null);
		}
		let text = response.text().await.map_err(SourceError::from)?;
		if text.is_empty() {
			return Ok(Value::Null);
		}
		Ok(serde_json::from_str(&text)?)
	}

	pub async fn get_json(&self, url: &str) -> SourceResult<Value> {
		self.request_json(reqwest::Method::GET, url, None).await
	}

	pub async fn post_json(&self, url: &str, body: &Value) -> SourceResult<Value> {
		self.request_json(reqwest::Method::POST, url, Some(body)).await
	}

	pub async fn delete(&self, url: &str) -> SourceResult<()> {
		self.request_json(reqwest::Method::DELETE, url, None).await?;
		Ok(())
	}

	/// Current token snapshot, for tests and connection write-back.
	pub async fn tokens(&self) -> OAuth2Tokens {
		self.tokens.lock().await.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use wiremock::{
		matchers::{method, path},
		Mock, MockServer, ResponseTemplate,
	};

	fn stale_tokens() -> OAuth2Tokens {
		OAuth2Tokens {
			access_token: "stale-token".to_string(),
			refresh_token: Some("refresh-1".to_string()),
			expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
		}
	}

	fn fresh_tokens() -> OAuth2Tokens {
		OAuth2Tokens {
			access_token: "fresh-token".to_string(),
			refresh_token: Some("refresh-1".to_string()),
			expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
		}
	}

	fn client_for(server: &MockServer, tokens: OAuth2Tokens) -> GoogleApiClient {
		GoogleApiClient::with_base_urls(
			tokens,
			format!("{}/token", server.uri()),
			server.uri(),
			server.uri(),
			None,
		)
	}

	#[tokio::test]
	async fn test_stale_token_triggers_proactive_refresh() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"access_token": "new-token",
				"expires_in": 3600
			})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
			.mount(&server)
			.await;

		let client = client_for(&server, stale_tokens());
		let value = client.get_json(&client.docs_url("/documents/d1")).await.unwrap();
		assert_eq!(value["ok"], true);
		assert_eq!(client.tokens().await.access_token, "new-token");
	}

	#[tokio::test]
	async fn test_refresh_without_refresh_token_is_auth_expired() {
		let server = MockServer::start().await;
		let client = client_for(
			&server,
			OAuth2Tokens {
				access_token: "stale".to_string(),
				refresh_token: None,
				expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
			},
		);
		let err = client.get_json(&client.docs_url("/documents/d1")).await.unwrap_err();
		assert_eq!(err.kind(), SourceErrorKind::AuthExpired);
	}

	#[tokio::test]
	async fn test_reactive_401_refreshes_exactly_once() {
		let server = MockServer::start().await;
		// First call is rejected, the retry with the refreshed token passes.
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(401))
			.up_to_n_times(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"access_token": "recovered-token",
				"expires_in": 3600
			})))
			.expect(1)
			.mount(&server)
			.await;

		let client = client_for(&server, fresh_tokens());
		let value = client.get_json(&client.docs_url("/documents/d1")).await.unwrap();
		assert_eq!(value["ok"], true);
		assert_eq!(client.tokens().await.access_token, "recovered-token");
	}

	#[tokio::test]
	async fn test_persistent_401_surfaces_auth_expired() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"access_token": "still-bad",
				"expires_in": 3600
			})))
			.expect(1)
			.mount(&server)
			.await;

		let client = client_for(&server, fresh_tokens());
		let err = client.get_json(&client.docs_url("/documents/d1")).await.unwrap_err();
		assert_eq!(err.kind(), SourceErrorKind::AuthExpired);
	}

	#[tokio::test]
	async fn test_concurrent_stale_callers_share_one_refresh() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"access_token": "shared-token",
				"expires_in": 3600
			})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
			.mount(&server)
			.await;

		let client = Arc::new(client_for(&server, stale_tokens()));
		let mut handles = Vec::new();
		for _ in 0..8 {
			let client = Arc::clone(&client);
			handles.push(tokio::spawn(async move {
				client.get_json(&client.docs_url("/documents/d1")).await
			}));
		}
		for handle in handles {
			assert!(handle.await.unwrap().is_ok());
		}
		assert_eq!(client.tokens().await.access_token, "shared-token");
	}

	#[tokio::test]
	async fn test_refresh_invokes_token_update_callback() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"access_token": "callback-token",
				"refresh_token": "refresh-2",
				"expires_in": 1800
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/documents/d1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
			.mount(&server)
			.await;

		let observed = Arc::new(tokio::sync::Mutex::new(Vec::<OAuth2Tokens>::new()));
		let calls = Arc::new(AtomicUsize::new(0));
		let callback: TokenUpdateCallback = {
			let observed = Arc::clone(&observed);
			let calls = Arc::clone(&calls);
			Arc::new(move |tokens| {
				let observed = Arc::clone(&observed);
				calls.fetch_add(1, Ordering::SeqCst);
				Box::pin(async move {
					observed.lock().await.push(tokens);
				})
			})
		};

		let client = GoogleApiClient::with_base_urls(
			stale_tokens(),
			format!("{}/token", server.uri()),
			server.uri(),
			server.uri(),
			Some(callback),
		);
		client.get_json(&client.docs_url("/documents/d1")).await.unwrap();

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		let observed = observed.lock().await;
		assert_eq!(observed[0].access_token, "callback-token");
		assert_eq!(observed[0].refresh_token.as_deref(), Some("refresh-2"));
		assert!(observed[0].expires_at.unwrap() > Utc::now());
	}
}
