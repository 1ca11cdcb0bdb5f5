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

use std::{collections::HashMap, sync::Arc};

use common::{AccessMethod, DataSourceAuth, RegistrySettings};
use serde_json::{Map, Value};
use sources::McpManager;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
	manifest, Connection, ConnectionOptions, DataSourceProvider, GenericMcpProvider,
	PluginProvider,
};

/// When set, every `instance()` call builds a fresh registry instead of
/// sharing the process singleton. Used by tests that need isolation.
pub const REGISTRY_ISOLATION_ENV: &str = "DATASOURCE_REGISTRY_ISOLATED";

static INSTANCE: OnceCell<Arc<DataSourceRegistry>> = OnceCell::const_new();

/// Everything registry initialization needs from the outside world.
#[derive(Clone, Default)]
pub struct RegistryContext {
	pub settings: RegistrySettings,
	pub mcp_manager: Option<Arc<dyn McpManager>>,
}

/// Process-wide provider registry. Built once; concurrent first accessors
/// share the same initialization future.
pub struct DataSourceRegistry {
	bb_providers: HashMap<String, Arc<dyn DataSourceProvider>>,
	mcp_providers: HashMap<String, Arc<dyn DataSourceProvider>>,
	settings: RegistrySettings,
}

impl std::fmt::Debug for DataSourceRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DataSourceRegistry")
			.field("bb_providers", &self.bb_providers.keys().collect::<Vec<_>>())
			.field("mcp_providers", &self.mcp_providers.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl DataSourceRegistry {
	/// The process singleton. First access initializes with the given
	/// context; late contexts are ignored. Under
	/// [`REGISTRY_ISOLATION_ENV`], every call builds a fresh instance.
	pub async fn instance(context: RegistryContext) -> anyhow::Result<Arc<DataSourceRegistry>> {
		if std::env::var(REGISTRY_ISOLATION_ENV).is_ok() {
			return Ok(Arc::new(Self::initialize(context).await?));
		}
		INSTANCE
			.get_or_try_init(|| async { Ok(Arc::new(Self::initialize(context).await?)) })
			.await
			.cloned()
	}

	/// Test constructor bypassing the singleton.
	pub async fn initialize(context: RegistryContext) -> anyhow::Result<DataSourceRegistry> {
		let RegistryContext { settings, mcp_manager } = context;
		let mut bb_providers: HashMap<String, Arc<dyn DataSourceProvider>> = HashMap::new();
		let mut mcp_providers: HashMap<String, Arc<dyn DataSourceProvider>> = HashMap::new();

		// Built-ins, gated by product variant and the manifest flag.
		for spec in manifest::BUILTIN_MANIFEST {
			if !spec.enabled || !spec.variants.contains(&settings.product_variant) {
				continue;
			}
			match manifest::instantiate_builtin(spec.provider_type) {
				Some(provider) => {
					bb_providers.insert(spec.provider_type.to_string(), provider);
				},
				None => warn!(
					provider_type = spec.provider_type,
					"manifest names a builtin this build does not carry"
				),
			}
		}

		// Plug-ins; user entries override built-ins of the same type since
		// their descriptors live outside the built-in tree.
		for descriptor in manifest::scan_plugin_dirs(&settings.plugin_dirs) {
			let provider_type = descriptor.provider_type.clone();
			match PluginProvider::new(descriptor) {
				Ok(provider) => {
					if bb_providers.insert(provider_type.clone(), Arc::new(provider)).is_some() {
						info!(provider_type = %provider_type, "plugin overrides builtin provider");
					}
				},
				Err(err) => warn!(provider_type = %provider_type, error = ?err, "skipping plugin"),
			}
		}

		// MCP discovery: one generic provider per server exposing at least
		// one resource.
		if let Some(manager) = &mcp_manager {
			match manager.list_servers().await {
				Ok(servers) => {
					for server in servers {
						if server.resource_count == 0 {
							continue;
						}
						let provider =
							GenericMcpProvider::new(server.clone(), Arc::clone(manager));
						mcp_providers.insert(server.id.clone(), Arc::new(provider));
					}
				},
				Err(err) => warn!(error = ?err, "mcp server discovery failed"),
			}
		}

		info!(
			bb = bb_providers.len(),
			mcp = mcp_providers.len(),
			"data source registry initialized"
		);
		Ok(DataSourceRegistry { bb_providers, mcp_providers, settings })
	}

	/// Looks up `(providerType, accessMethod?)`. Without an access method,
	/// bb providers win over mcp providers of the same type.
	pub fn get_provider(
		&self,
		provider_type: &str,
		access_method: Option<AccessMethod>,
	) -> Option<Arc<dyn DataSourceProvider>> {
		match access_method {
			Some(AccessMethod::Bb) => self.bb_providers.get(provider_type).cloned(),
			Some(AccessMethod::Mcp) => self.mcp_providers.get(provider_type).cloned(),
			None => self
				.bb_providers
				.get(provider_type)
				.or_else(|| self.mcp_providers.get(provider_type))
				.cloned(),
		}
	}

	/// All providers; MCP entries are restricted to the allow-list when
	/// one is configured.
	pub fn list_providers(&self) -> Vec<Arc<dyn DataSourceProvider>> {
		let mut providers: Vec<Arc<dyn DataSourceProvider>> =
			self.bb_providers.values().cloned().collect();
		providers.extend(self.filtered_mcp_providers());
		providers.sort_by(|left, right| {
			(left.access_method(), left.provider_type().to_string())
				.cmp(&(right.access_method(), right.provider_type().to_string()))
		});
		providers
	}

	fn filtered_mcp_providers(&self) -> Vec<Arc<dyn DataSourceProvider>> {
		self.mcp_providers
			.values()
			.filter(|provider| match &self.settings.mcp_server_allowlist {
				Some(allowlist) => allowlist.iter().any(|id| id == provider.provider_type()),
				None => true,
			})
			.cloned()
			.collect()
	}

	pub fn settings(&self) -> &RegistrySettings {
		&self.settings
	}

	/// Validates config and (when supplied) auth, then constructs the
	/// connection.
	pub fn create_connection(
		&self,
		provider: &Arc<dyn DataSourceProvider>,
		name: &str,
		config: Map<String, Value>,
		options: ConnectionOptions,
	) -> anyhow::Result<Connection> {
		if !provider.validate_config(&config) {
			return Err(anyhow::anyhow!(
				"invalid config for provider `{}`: required fields {:?}",
				provider.provider_type(),
				provider.required_config_fields(),
			));
		}
		if let Some(auth) = &options.auth {
			if !provider.validate_auth(auth) {
				return Err(anyhow::anyhow!(
					"auth record does not match method {:?} declared by provider `{}`",
					provider.auth_method(),
					provider.provider_type(),
				));
			}
		}
		Ok(Connection::new(Arc::clone(provider), name, config, options))
	}

	/// Rehydrates a persisted connection record against this registry's
	/// providers.
	pub fn connection_from_record(
		&self,
		record: crate::ConnectionRecord,
	) -> anyhow::Result<Connection> {
		let provider = self
			.get_provider(&record.provider_type, Some(record.access_method))
			.ok_or_else(|| {
				anyhow::anyhow!(
					"no provider `{}` under access method `{}`",
					record.provider_type,
					record.access_method
				)
			})?;
		Connection::from_record(record, provider)
	}
}

/// Convenience wrapper mirroring the common call shape: resolve provider
/// by type, validate, construct.
pub async fn create_connection_for_type(
	registry: &DataSourceRegistry,
	provider_type: &str,
	access_method: Option<AccessMethod>,
	name: &str,
	config: Map<String, Value>,
	auth: Option<DataSourceAuth>,
) -> anyhow::Result<Connection> {
	let provider = registry
		.get_provider(provider_type, access_method)
		.ok_or_else(|| anyhow::anyhow!("unknown provider `{provider_type}`"))?;
	registry.create_connection(
		&provider,
		name,
		config,
		ConnectionOptions { auth, ..Default::default() },
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use common::Capabilities;
	use serde_json::json;
	use serial_test::serial;
	use sources::{McpContent, McpResource, McpServerInfo, SourceError, SourceResult};

	#[derive(Debug)]
	struct TwoServerManager;

	#[async_trait]
	impl McpManager for TwoServerManager {
		async fn list_servers(&self) -> SourceResult<Vec<McpServerInfo>> {
			Ok(vec![
				McpServerInfo {
					id: "weather".to_string(),
					name: "Weather".to_string(),
					capabilities: Some(Capabilities::read_list_only()),
					resource_count: 3,
				},
				McpServerInfo {
					id: "empty".to_string(),
					name: "Empty".to_string(),
					capabilities: None,
					resource_count: 0,
				},
			])
		}

		async fn list_resources(&self, _server_id: &str) -> SourceResult<Vec<McpResource>> {
			Ok(Vec::new())
		}

		async fn load_resource(&self, server_id: &str, path: &str) -> SourceResult<McpContent> {
			Err(SourceError::not_found(format!("{server_id}:{path}")))
		}
	}

	fn context_with_manager() -> RegistryContext {
		RegistryContext {
			settings: RegistrySettings::default(),
			mcp_manager: Some(Arc::new(TwoServerManager)),
		}
	}

	#[tokio::test]
	async fn test_builtins_and_mcp_discovery() {
		let registry = DataSourceRegistry::initialize(context_with_manager()).await.unwrap();
		assert!(registry.get_provider("filesystem", Some(AccessMethod::Bb)).is_some());
		assert!(registry.get_provider("notion", None).is_some());
		assert!(registry.get_provider("googledocs", None).is_some());
		// Only the server with resources is registered.
		assert!(registry.get_provider("weather", Some(AccessMethod::Mcp)).is_some());
		assert!(registry.get_provider("empty", Some(AccessMethod::Mcp)).is_none());
		// Unspecified method falls back to mcp when no bb provider exists.
		assert_eq!(
			registry.get_provider("weather", None).unwrap().access_method(),
			AccessMethod::Mcp
		);
	}

	#[tokio::test]
	async fn test_plugin_discovery_and_override() {
		let dir = tempfile::tempdir().unwrap();
		let plugin_dir = dir.path().join("files.datasource");
		std::fs::create_dir_all(&plugin_dir).unwrap();
		std::fs::write(
			plugin_dir.join("info.json"),
			json!({
				"providerType": "filesystem",
				"base": "filesystem",
				"displayName": "Patched Filesystem",
				"configDefaults": { "dataSourceRoot": "/srv/files" }
			})
			.to_string(),
		)
		.unwrap();

		let context = RegistryContext {
			settings: RegistrySettings {
				plugin_dirs: vec![dir.path().to_path_buf()],
				..Default::default()
			},
			mcp_manager: None,
		};
		let registry = DataSourceRegistry::initialize(context).await.unwrap();
		let provider = registry.get_provider("filesystem", Some(AccessMethod::Bb)).unwrap();
		assert_eq!(provider.name(), "Patched Filesystem");
		// The descriptor default satisfies the required field.
		assert!(provider.validate_config(&Map::new()));
	}

	#[tokio::test]
	async fn test_mcp_allowlist_filters_listings() {
		let context = RegistryContext {
			settings: RegistrySettings {
				mcp_server_allowlist: Some(vec!["other".to_string()]),
				..Default::default()
			},
			mcp_manager: Some(Arc::new(TwoServerManager)),
		};
		let registry = DataSourceRegistry::initialize(context).await.unwrap();
		let listed = registry.list_providers();
		assert!(listed
			.iter()
			.all(|provider| provider.access_method() == AccessMethod::Bb));
		// Direct lookup still resolves; only listings are gated.
		assert!(registry.get_provider("weather", Some(AccessMethod::Mcp)).is_some());
	}

	#[tokio::test]
	async fn test_create_connection_validates_first() {
		let registry = DataSourceRegistry::initialize(RegistryContext::default()).await.unwrap();
		let provider = registry.get_provider("notion", None).unwrap();

		let err = registry
			.create_connection(&provider, "wiki", Map::new(), ConnectionOptions::default())
			.unwrap_err();
		assert!(err.to_string().contains("invalid config"));

		let mut config = Map::new();
		config.insert("workspaceId".to_string(), json!("ws-1"));
		let err = registry
			.create_connection(
				&provider,
				"wiki",
				config.clone(),
				ConnectionOptions {
					auth: Some(DataSourceAuth::Bearer { token_ref: "ref".into() }),
					..Default::default()
				},
			)
			.unwrap_err();
		assert!(err.to_string().contains("auth record"));

		let connection = registry
			.create_connection(
				&provider,
				"wiki",
				config,
				ConnectionOptions {
					auth: Some(DataSourceAuth::ApiKey { key: "secret".into() }),
					..Default::default()
				},
			)
			.unwrap();
		assert_eq!(connection.provider_type(), "notion");
		let record = connection.to_record();
		let rehydrated = registry.connection_from_record(record).unwrap();
		assert_eq!(rehydrated.id(), connection.id());
	}

	#[tokio::test]
	#[serial]
	async fn test_singleton_is_single_flight() {
		std::env::remove_var(REGISTRY_ISOLATION_ENV);
		let mut handles = Vec::new();
		for _ in 0..8 {
			handles.push(tokio::spawn(DataSourceRegistry::instance(RegistryContext::default())));
		}
		let mut instances = Vec::new();
		for handle in handles {
			instances.push(handle.await.unwrap().unwrap());
		}
		for window in instances.windows(2) {
			assert!(Arc::ptr_eq(&window[0], &window[1]));
		}
	}

	#[tokio::test]
	#[serial]
	async fn test_isolation_env_forces_fresh_instances() {
		std::env::set_var(REGISTRY_ISOLATION_ENV, "1");
		let first = DataSourceRegistry::instance(RegistryContext::default()).await.unwrap();
		let second = DataSourceRegistry::instance(RegistryContext::default()).await.unwrap();
		assert!(!Arc::ptr_eq(&first, &second));
		std::env::remove_var(REGISTRY_ISOLATION_ENV);
	}
}
