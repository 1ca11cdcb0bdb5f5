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

use common::AccessMethod;
use once_cell::sync::Lazy;
use sources::{ResourceAccessor, SourceError, SourceErrorKind, SourceResult};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Connection;

static FACTORY: Lazy<AccessorFactory> = Lazy::new(AccessorFactory::new);

/// The process-wide factory.
pub fn global() -> &'static AccessorFactory {
	&FACTORY
}

/// Maps connections to accessors, one cache per access method, keyed by
/// connection id. Creation happens under the write lock, so two
/// concurrent first uses of a connection build the accessor once.
pub struct AccessorFactory {
	bb_cache: RwLock<HashMap<String, Arc<dyn ResourceAccessor>>>,
	mcp_cache: RwLock<HashMap<String, Arc<dyn ResourceAccessor>>>,
}

impl AccessorFactory {
	pub fn new() -> Self {
		AccessorFactory { bb_cache: RwLock::new(HashMap::new()), mcp_cache: RwLock::new(HashMap::new()) }
	}

	fn cache_for(&self, access_method: AccessMethod) -> &RwLock<HashMap<String, Arc<dyn ResourceAccessor>>> {
		match access_method {
			AccessMethod::Bb => &self.bb_cache,
			AccessMethod::Mcp => &self.mcp_cache,
		}
	}

	pub async fn get_accessor(
		&self,
		connection: &Connection,
	) -> SourceResult<Arc<dyn ResourceAccessor>> {
		let provider = connection.provider();
		if provider.access_method() != connection.access_method() {
			return Err(SourceError::new(
				SourceErrorKind::InvalidUri,
				Arc::new(anyhow::anyhow!(
					"access method mismatch between connection `{}` and provider `{}`",
					connection.id(),
					provider.provider_type(),
				)),
			));
		}

		let cache = self.cache_for(connection.access_method());
		if let Some(accessor) = cache.read().await.get(connection.id()) {
			return Ok(Arc::clone(accessor));
		}

		let mut cache = cache.write().await;
		// Re-check: another task may have built it while we waited.
		if let Some(accessor) = cache.get(connection.id()) {
			return Ok(Arc::clone(accessor));
		}
		debug!(connection_id = %connection.id(), provider = %provider.provider_type(), "creating accessor");
		let accessor = provider.create_accessor(connection).await.map_err(|err| {
			SourceError::new(SourceErrorKind::Io, Arc::new(err))
		})?;
		cache.insert(connection.id().to_string(), Arc::clone(&accessor));
		Ok(accessor)
	}

	pub async fn clear_cache(&self) {
		self.bb_cache.write().await.clear();
		self.mcp_cache.write().await.clear();
	}

	pub async fn clear_connection_cache(&self, connection_id: &str) {
		self.bb_cache.write().await.remove(connection_id);
		self.mcp_cache.write().await.remove(connection_id);
	}
}

impl Default for AccessorFactory {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ConnectionOptions, DataSourceProvider};
	use async_trait::async_trait;
	use common::{AuthMethod, Capabilities, SourceCapability};
	use serde_json::Map;
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Provider that counts accessor creations.
	#[derive(Debug)]
	struct CountingProvider {
		capabilities: Capabilities,
		creations: Arc<AtomicUsize>,
	}

	#[derive(Debug)]
	struct NullAccessor {
		capabilities: Capabilities,
		uri_prefix: String,
	}

	#[async_trait]
	impl ResourceAccessor for NullAccessor {
		fn capabilities(&self) -> &Capabilities {
			&self.capabilities
		}

		fn uri_prefix(&self) -> &str {
			&self.uri_prefix
		}

		async fn check_connectivity(&self) -> anyhow::Result<()> {
			Ok(())
		}

		fn is_resource_within_data_source(&self, _uri: &str) -> bool {
			false
		}

		async fn resource_exists(&self, _uri: &str, _options: sources::ExistsOptions) -> bool {
			false
		}

		async fn load_resource(
			&self,
			_uri: &str,
			_options: sources::LoadOptions,
		) -> SourceResult<sources::LoadedResource> {
			Err(SourceError::unsupported("loadResource"))
		}

		async fn get_metadata(&self) -> sources::DataSourceMetadata {
			sources::DataSourceMetadata::default()
		}
	}

	#[async_trait]
	impl DataSourceProvider for CountingProvider {
		fn provider_type(&self) -> &str {
			"counting"
		}

		fn access_method(&self) -> AccessMethod {
			AccessMethod::Bb
		}

		fn name(&self) -> &str {
			"Counting"
		}

		fn description(&self) -> &str {
			"counts creations"
		}

		fn required_config_fields(&self) -> &[&str] {
			&[]
		}

		fn auth_method(&self) -> AuthMethod {
			AuthMethod::None
		}

		fn capabilities(&self) -> &Capabilities {
			&self.capabilities
		}

		async fn build_accessor(
			&self,
			connection: &Connection,
		) -> anyhow::Result<Arc<dyn ResourceAccessor>> {
			self.creations.fetch_add(1, Ordering::SeqCst);
			Ok(Arc::new(NullAccessor {
				capabilities: self.capabilities.clone(),
				uri_prefix: connection.uri_prefix(),
			}))
		}
	}

	fn counting_setup() -> (Arc<CountingProvider>, Arc<AtomicUsize>) {
		let creations = Arc::new(AtomicUsize::new(0));
		let provider = Arc::new(CountingProvider {
			capabilities: Capabilities::new(
				[SourceCapability::Read],
				[common::LoadCapability::PlainText],
				[],
				[],
			),
			creations: Arc::clone(&creations),
		});
		(provider, creations)
	}

	#[tokio::test]
	async fn test_cache_returns_same_accessor_until_cleared() {
		let factory = AccessorFactory::new();
		let (provider, creations) = counting_setup();
		let provider: Arc<dyn DataSourceProvider> = provider;
		let connection =
			Connection::new(provider, "c1", Map::new(), ConnectionOptions::default());

		let first = factory.get_accessor(&connection).await.unwrap();
		let second = factory.get_accessor(&connection).await.unwrap();
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(creations.load(Ordering::SeqCst), 1);

		factory.clear_connection_cache(connection.id()).await;
		let third = factory.get_accessor(&connection).await.unwrap();
		assert!(!Arc::ptr_eq(&first, &third));
		assert_eq!(creations.load(Ordering::SeqCst), 2);

		factory.clear_cache().await;
		factory.get_accessor(&connection).await.unwrap();
		assert_eq!(creations.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_concurrent_first_use_creates_once() {
		let factory = Arc::new(AccessorFactory::new());
		let (provider, creations) = counting_setup();
		let provider: Arc<dyn DataSourceProvider> = provider;
		let connection = Arc::new(Connection::new(
			provider,
			"c1",
			Map::new(),
			ConnectionOptions::default(),
		));

		let mut handles = Vec::new();
		for _ in 0..16 {
			let factory = Arc::clone(&factory);
			let connection = Arc::clone(&connection);
			handles.push(tokio::spawn(async move {
				factory.get_accessor(&connection).await
			}));
		}
		for handle in handles {
			assert!(handle.await.unwrap().is_ok());
		}
		assert_eq!(creations.load(Ordering::SeqCst), 1);
	}
}
