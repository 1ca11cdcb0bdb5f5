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

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Tokens within a five-minute window of expiry are treated as already
/// expired so that a refresh lands before the backend starts rejecting
/// requests.
pub const STALE_TOKEN_WINDOW: Duration = Duration::from_secs(5 * 60);

/// The auth method a provider declares. The stored credential record must
/// validate against this method before a connection is created.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMethod {
	None,
	ApiKey,
	Basic,
	Bearer,
	OAuth2,
	Custom,
}

/// The canonical credential record attached to a connection.
///
/// `Basic` and `Bearer` carry references into the external secret store,
/// never the secrets themselves. `OAuth2` tokens live inline because they
/// are mutated on refresh and written back through the owning project.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DataSourceAuth {
	None,
	ApiKey {
		key: String,
	},
	Basic {
		username_ref: String,
		password_ref: String,
	},
	Bearer {
		token_ref: String,
	},
	#[serde(rename = "oauth2")]
	OAuth2 {
		access_token: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		refresh_token: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		expires_at: Option<DateTime<Utc>>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		scopes: Option<Vec<String>>,
	},
	Custom(serde_json::Value),
}

impl DataSourceAuth {
	pub fn method(&self) -> AuthMethod {
		match self {
			DataSourceAuth::None => AuthMethod::None,
			DataSourceAuth::ApiKey { .. } => AuthMethod::ApiKey,
			DataSourceAuth::Basic { .. } => AuthMethod::Basic,
			DataSourceAuth::Bearer { .. } => AuthMethod::Bearer,
			DataSourceAuth::OAuth2 { .. } => AuthMethod::OAuth2,
			DataSourceAuth::Custom(_) => AuthMethod::Custom,
		}
	}

	/// Checks this record against a declared auth method. Validation only
	/// looks at presence; secret refs are not resolved here.
	pub fn validate_against(&self, method: AuthMethod) -> bool {
		match (method, self) {
			(AuthMethod::None, DataSourceAuth::None) => true,
			(AuthMethod::ApiKey, DataSourceAuth::ApiKey { key }) => !key.is_empty(),
			(AuthMethod::Basic, DataSourceAuth::Basic { username_ref, password_ref }) =>
				!username_ref.is_empty() && !password_ref.is_empty(),
			(AuthMethod::Bearer, DataSourceAuth::Bearer { token_ref }) => !token_ref.is_empty(),
			(AuthMethod::OAuth2, DataSourceAuth::OAuth2 { access_token, .. }) =>
				!access_token.is_empty(),
			(AuthMethod::Custom, DataSourceAuth::Custom(_)) => true,
			_ => false,
		}
	}

	/// The token material of an `OAuth2` record, in the shape the refresh
	/// protocol and the token-update callback speak.
	pub fn oauth2_tokens(&self) -> Option<OAuth2Tokens> {
		match self {
			DataSourceAuth::OAuth2 { access_token, refresh_token, expires_at, .. } =>
				Some(OAuth2Tokens {
					access_token: access_token.clone(),
					refresh_token: refresh_token.clone(),
					expires_at: *expires_at,
				}),
			_ => None,
		}
	}

	/// True for OAuth2 records whose access token is missing an expiry or
	/// expires within [`STALE_TOKEN_WINDOW`] of `now`. Non-OAuth records
	/// are never stale.
	pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
		self.oauth2_tokens().map(|tokens| tokens.is_stale(now)).unwrap_or(false)
	}
}

/// The OAuth2 token material handed to the token-update callback after a
/// successful refresh. The callback persists it into the owning project's
/// stored connection; the client itself never reaches back into higher
/// layers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Tokens {
	pub access_token: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<DateTime<Utc>>,
}

impl OAuth2Tokens {
	pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
		match self.expires_at {
			Some(expires_at) => {
				let window = chrono::Duration::from_std(STALE_TOKEN_WINDOW)
					.unwrap_or_else(|_| chrono::Duration::seconds(300));
				expires_at <= now + window
			},
			// No expiry recorded: refresh proactively rather than risk a 401.
			None => true,
		}
	}
}

/// Persists refreshed tokens. Invoked by OAuth-using clients after each
/// successful refresh, with the new token material already applied to the
/// in-memory auth state.
pub type TokenUpdateCallback = Arc<dyn Fn(OAuth2Tokens) -> BoxFuture<'static, ()> + Send + Sync>;

/// Read-only resolution of `*_ref` credential references against the
/// external secret store.
#[async_trait]
pub trait SecretResolver: Send + Sync + 'static {
	async fn resolve(&self, secret_ref: &str) -> anyhow::Result<Option<String>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn oauth(expires_in_secs: i64) -> DataSourceAuth {
		DataSourceAuth::OAuth2 {
			access_token: "at-1".to_string(),
			refresh_token: Some("rt-1".to_string()),
			expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
			scopes: None,
		}
	}

	#[test]
	fn test_validation_matrix() {
		assert!(DataSourceAuth::None.validate_against(AuthMethod::None));
		assert!(!DataSourceAuth::None.validate_against(AuthMethod::ApiKey));

		assert!(DataSourceAuth::ApiKey { key: "secret".into() }
			.validate_against(AuthMethod::ApiKey));
		assert!(!DataSourceAuth::ApiKey { key: "".into() }.validate_against(AuthMethod::ApiKey));

		assert!(DataSourceAuth::Basic {
			username_ref: "ref/user".into(),
			password_ref: "ref/pass".into()
		}
		.validate_against(AuthMethod::Basic));
		assert!(!DataSourceAuth::Basic { username_ref: "ref/user".into(), password_ref: "".into() }
			.validate_against(AuthMethod::Basic));

		assert!(DataSourceAuth::Bearer { token_ref: "ref/token".into() }
			.validate_against(AuthMethod::Bearer));
		assert!(oauth(3600).validate_against(AuthMethod::OAuth2));
		assert!(!oauth(3600).validate_against(AuthMethod::Bearer));
		assert!(DataSourceAuth::Custom(serde_json::json!({"anything": true}))
			.validate_against(AuthMethod::Custom));
	}

	#[test]
	fn test_staleness_window() {
		let now = Utc::now();
		// Expires in an hour: fresh.
		assert!(!oauth(3600).is_stale(now));
		// Expires in two minutes: inside the five-minute window.
		assert!(oauth(120).is_stale(now));
		// Already expired.
		assert!(oauth(-60).is_stale(now));
		// No recorded expiry: refresh proactively.
		let no_expiry = DataSourceAuth::OAuth2 {
			access_token: "at".into(),
			refresh_token: Some("rt".into()),
			expires_at: None,
			scopes: None,
		};
		assert!(no_expiry.is_stale(now));
		// Non-OAuth records are never stale.
		assert!(!DataSourceAuth::ApiKey { key: "k".into() }.is_stale(now));
	}

	#[test]
	fn test_oauth2_tokens_view() {
		let tokens = oauth(3600).oauth2_tokens().unwrap();
		assert_eq!(tokens.access_token, "at-1");
		assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
		assert!(tokens.expires_at.is_some());
		assert!(DataSourceAuth::None.oauth2_tokens().is_none());
		assert!(DataSourceAuth::ApiKey { key: "k".into() }.oauth2_tokens().is_none());
	}

	#[test]
	fn test_tokens_without_expiry_are_stale() {
		let tokens = OAuth2Tokens {
			access_token: "at".into(),
			refresh_token: None,
			expires_at: None,
		};
		assert!(tokens.is_stale(Utc::now()));
	}

	#[test]
	fn test_serde_tagged_form() {
		let auth = DataSourceAuth::OAuth2 {
			access_token: "at".into(),
			refresh_token: None,
			expires_at: None,
			scopes: None,
		};
		let json = serde_json::to_value(&auth).unwrap();
		assert_eq!(json["method"], "oauth2");
		assert_eq!(json["accessToken"], "at");
		assert!(json.get("refreshToken").is_none());

		let api_key: DataSourceAuth =
			serde_json::from_str(r#"{"method":"apiKey","key":"k1"}"#).unwrap();
		assert_eq!(api_key, DataSourceAuth::ApiKey { key: "k1".into() });
	}
}
