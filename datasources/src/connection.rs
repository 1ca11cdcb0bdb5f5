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

use std::{fmt, sync::Arc};

use common::{
	new_opaque_key, slugify, AccessMethod, Capabilities, DataSourceAuth, OAuth2Tokens, SourceUri,
	TerminateSignal, TokenUpdateCallback,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sources::{ResourceAccessor, SourceResult};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{factory, DataSourceProvider};

/// The persisted form of a connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
	pub id: String,
	pub provider_type: String,
	pub access_method: AccessMethod,
	pub name: String,
	#[serde(default)]
	pub config: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<DataSourceAuth>,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	#[serde(default)]
	pub is_primary: bool,
	#[serde(default)]
	pub priority: i32,
}

fn default_enabled() -> bool {
	true
}

/// The mutable surface of [`Connection::update`]. Identity fields are
/// deliberately absent.
#[derive(Clone, Debug, Default)]
pub struct ConnectionUpdate {
	pub name: Option<String>,
	pub config: Option<Map<String, Value>>,
	pub auth: Option<DataSourceAuth>,
	pub enabled: Option<bool>,
	pub is_primary: Option<bool>,
	pub priority: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectionOptions {
	pub auth: Option<DataSourceAuth>,
	pub enabled: Option<bool>,
	pub is_primary: bool,
	pub priority: i32,
	pub project_id: Option<String>,
}

/// A configured, addressable instance of a provider. Mostly immutable:
/// id, provider type and access method never change after construction;
/// everything else moves through [`Connection::update`].
pub struct Connection {
	id: String,
	provider: Arc<dyn DataSourceProvider>,
	name: String,
	config: Map<String, Value>,
	auth: Option<DataSourceAuth>,
	enabled: bool,
	is_primary: bool,
	priority: i32,
	/// Owning project, for token write-back.
	project_id: Option<String>,
	token_update_callback: Option<TokenUpdateCallback>,
	terminate_sig: TerminateSignal,
	accessor: OnceCell<Arc<dyn ResourceAccessor>>,
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("provider_type", &self.provider_type())
			.field("access_method", &self.access_method())
			.field("name", &self.name)
			.field("enabled", &self.enabled)
			.field("is_primary", &self.is_primary)
			.field("priority", &self.priority)
			.finish()
	}
}

impl Connection {
	pub fn new(
		provider: Arc<dyn DataSourceProvider>,
		name: impl Into<String>,
		config: Map<String, Value>,
		options: ConnectionOptions,
	) -> Self {
		let config = provider.effective_config(&config);
		Connection {
			id: new_opaque_key("ds"),
			provider,
			name: name.into(),
			config,
			auth: options.auth,
			enabled: options.enabled.unwrap_or(true),
			is_primary: options.is_primary,
			priority: options.priority,
			project_id: options.project_id,
			token_update_callback: None,
			terminate_sig: TerminateSignal::default(),
			accessor: OnceCell::new(),
		}
	}

	/// Rehydrates a persisted connection. The record's provider identity
	/// must match the resolved provider.
	pub fn from_record(
		record: ConnectionRecord,
		provider: Arc<dyn DataSourceProvider>,
	) -> anyhow::Result<Self> {
		if record.provider_type != provider.provider_type() ||
			record.access_method != provider.access_method()
		{
			return Err(anyhow::anyhow!(
				"connection record `{}` names provider `{}`/{}, resolved `{}`/{}",
				record.id,
				record.provider_type,
				record.access_method,
				provider.provider_type(),
				provider.access_method(),
			));
		}
		Ok(Connection {
			id: record.id,
			provider,
			name: record.name,
			config: record.config,
			auth: record.auth,
			enabled: record.enabled,
			is_primary: record.is_primary,
			priority: record.priority,
			project_id: None,
			token_update_callback: None,
			terminate_sig: TerminateSignal::default(),
			accessor: OnceCell::new(),
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn provider(&self) -> &Arc<dyn DataSourceProvider> {
		&self.provider
	}

	// Derived from the provider, read-only on the connection.

	pub fn provider_type(&self) -> &str {
		self.provider.provider_type()
	}

	pub fn access_method(&self) -> AccessMethod {
		self.provider.access_method()
	}

	pub fn capabilities(&self) -> &Capabilities {
		self.provider.capabilities()
	}

	/// Defensive copy on egress.
	pub fn config(&self) -> Map<String, Value> {
		self.config.clone()
	}

	pub fn auth(&self) -> Option<&DataSourceAuth> {
		self.auth.as_ref()
	}

	pub fn enabled(&self) -> bool {
		self.enabled
	}

	pub fn is_primary(&self) -> bool {
		self.is_primary
	}

	pub fn priority(&self) -> i32 {
		self.priority
	}

	pub fn project_id(&self) -> Option<&str> {
		self.project_id.as_deref()
	}

	pub fn terminate_sig(&self) -> &TerminateSignal {
		&self.terminate_sig
	}

	pub fn token_update_callback(&self) -> Option<TokenUpdateCallback> {
		self.token_update_callback.clone()
	}

	/// Installs the persistence hook OAuth-using accessors invoke after a
	/// refresh. Must be set before the accessor is first created.
	pub fn set_token_update_callback(&mut self, callback: TokenUpdateCallback) {
		self.token_update_callback = Some(callback);
	}

	/// Applies refreshed tokens to the in-memory auth record. Persistence
	/// already happened through the callback; this keeps the live record
	/// consistent with it.
	pub fn record_refreshed_tokens(&mut self, tokens: &OAuth2Tokens) {
		if let Some(DataSourceAuth::OAuth2 { access_token, refresh_token, expires_at, .. }) =
			self.auth.as_mut()
		{
			*access_token = tokens.access_token.clone();
			if tokens.refresh_token.is_some() {
				*refresh_token = tokens.refresh_token.clone();
			}
			*expires_at = tokens.expires_at;
		}
	}

	pub fn uri_prefix(&self) -> String {
		format!("{}+{}+{}://", self.access_method(), self.provider_type(), slugify(&self.name))
	}

	/// Fully qualifies a resource path. Already-prefixed URIs pass through
	/// unchanged.
	pub fn uri_for_resource(&self, resource_path: &str) -> String {
		if SourceUri::is_prefixed(resource_path) {
			return resource_path.to_string();
		}
		format!("{}{}", self.uri_prefix(), resource_path)
	}

	/// Mutates the mutable surface. Identity (id, provider type, access
	/// method) cannot change; those fields simply do not exist on
	/// [`ConnectionUpdate`]. Changing config or auth drops the cached
	/// accessor so the next use rebuilds it.
	pub fn update(&mut self, update: ConnectionUpdate) {
		let mut invalidate = false;
		if let Some(name) = update.name {
			self.name = name;
			invalidate = true;
		}
		if let Some(config) = update.config {
			self.config = config;
			invalidate = true;
		}
		if let Some(auth) = update.auth {
			self.auth = Some(auth);
			invalidate = true;
		}
		if let Some(enabled) = update.enabled {
			self.enabled = enabled;
		}
		if let Some(is_primary) = update.is_primary {
			self.is_primary = is_primary;
		}
		if let Some(priority) = update.priority {
			self.priority = priority;
		}
		if invalidate {
			debug!(connection_id = %self.id, "connection changed, dropping cached accessor");
			self.accessor = OnceCell::new();
		}
	}

	/// Lazily obtains the accessor via the factory and caches the handle
	/// on the connection, layered over the factory's id-keyed cache.
	pub async fn resource_accessor(&self) -> SourceResult<Arc<dyn ResourceAccessor>> {
		self.accessor
			.get_or_try_init(|| async { factory::global().get_accessor(self).await })
			.await
			.cloned()
	}

	/// Defensive copy on egress: the record owns fresh copies of config
	/// and auth.
	pub fn to_record(&self) -> ConnectionRecord {
		ConnectionRecord {
			id: self.id.clone(),
			provider_type: self.provider_type().to_string(),
			access_method: self.access_method(),
			name: self.name.clone(),
			config: self.config.clone(),
			auth: self.auth.clone(),
			enabled: self.enabled,
			is_primary: self.is_primary,
			priority: self.priority,
		}
	}

	pub fn to_json(&self) -> Value {
		serde_json::to_value(self.to_record()).unwrap_or(Value::Null)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::providers::FilesystemProvider;
	use serde_json::json;

	fn fs_config(root: &str) -> Map<String, Value> {
		let mut config = Map::new();
		config.insert("dataSourceRoot".to_string(), json!(root));
		config
	}

	fn connection() -> Connection {
		Connection::new(
			Arc::new(FilesystemProvider::new()),
			"My Local Files",
			fs_config("/tmp/data"),
			ConnectionOptions { priority: 5, ..Default::default() },
		)
	}

	#[test]
	fn test_uri_prefix_and_qualification() {
		let connection = connection();
		assert_eq!(connection.uri_prefix(), "bb+filesystem+my-local-files://");
		assert_eq!(
			connection.uri_for_resource("docs/readme.md"),
			"bb+filesystem+my-local-files://docs/readme.md"
		);
		// Already-prefixed URIs pass through unchanged.
		let qualified = "bb+filesystem+other://x.txt";
		assert_eq!(connection.uri_for_resource(qualified), qualified);
	}

	#[test]
	fn test_parse_of_generated_uri_round_trips() {
		let connection = connection();
		let uri: SourceUri = connection.uri_for_resource("a/b.txt").parse().unwrap();
		assert_eq!(uri.access_method, connection.access_method());
		assert_eq!(uri.provider_type, connection.provider_type());
		assert_eq!(uri.connection_name, slugify(connection.name()));
		assert_eq!(uri.resource_path, "a/b.txt");
	}

	#[test]
	fn test_update_touches_only_mutable_surface() {
		let mut connection = connection();
		let id_before = connection.id().to_string();
		connection.update(ConnectionUpdate {
			name: Some("Renamed".to_string()),
			priority: Some(9),
			enabled: Some(false),
			..Default::default()
		});
		assert_eq!(connection.id(), id_before);
		assert_eq!(connection.name(), "Renamed");
		assert_eq!(connection.priority(), 9);
		assert!(!connection.enabled());
		assert_eq!(connection.provider_type(), "filesystem");
		assert_eq!(connection.access_method(), AccessMethod::Bb);
	}

	#[test]
	fn test_config_is_defensively_copied() {
		let connection = connection();
		let mut leaked = connection.config();
		leaked.insert("dataSourceRoot".to_string(), json!("/evil"));
		assert_eq!(connection.config()["dataSourceRoot"], json!("/tmp/data"));
	}

	#[test]
	fn test_record_round_trip() {
		let connection = connection();
		let record = connection.to_record();
		let json = serde_json::to_string(&record).unwrap();
		let parsed: ConnectionRecord = serde_json::from_str(&json).unwrap();
		let rehydrated =
			Connection::from_record(parsed, Arc::new(FilesystemProvider::new())).unwrap();
		assert_eq!(rehydrated.id(), connection.id());
		assert_eq!(rehydrated.name(), connection.name());
		assert_eq!(rehydrated.priority(), connection.priority());
		assert_eq!(rehydrated.config()["dataSourceRoot"], json!("/tmp/data"));
	}

	#[test]
	fn test_from_record_rejects_provider_mismatch() {
		let record = ConnectionRecord {
			id: "ds-x".to_string(),
			provider_type: "notion".to_string(),
			access_method: AccessMethod::Bb,
			name: "wiki".to_string(),
			config: Map::new(),
			auth: None,
			enabled: true,
			is_primary: false,
			priority: 0,
		};
		assert!(Connection::from_record(record, Arc::new(FilesystemProvider::new())).is_err());
	}

	#[test]
	fn test_record_refreshed_tokens_updates_auth_in_place() {
		let mut connection = Connection::new(
			Arc::new(FilesystemProvider::new()),
			"c",
			fs_config("/tmp"),
			ConnectionOptions {
				auth: Some(DataSourceAuth::OAuth2 {
					access_token: "old".to_string(),
					refresh_token: Some("r0".to_string()),
					expires_at: None,
					scopes: None,
				}),
				..Default::default()
			},
		);
		connection.record_refreshed_tokens(&OAuth2Tokens {
			access_token: "new".to_string(),
			refresh_token: None,
			expires_at: None,
		});
		match connection.auth().unwrap() {
			DataSourceAuth::OAuth2 { access_token, refresh_token, .. } => {
				assert_eq!(access_token, "new");
				// Absent refresh token keeps the stored one.
				assert_eq!(refresh_token.as_deref(), Some("r0"));
			},
			other => panic!("unexpected auth {other:?}"),
		}
	}
}
