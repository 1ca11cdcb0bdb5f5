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

use std::sync::Arc;

use async_trait::async_trait;
use common::{Capabilities, SourceCapability, SourceUri, TerminateSignal};

use super::manager::McpManager;
use crate::{
	DataSourceMetadata, ExistsOptions, ListOptions, LoadOptions, LoadedResource, ResourceAccessor,
	ResourceContent, ResourceListing, ResourceMetadata, SourceError, SourceResult,
};

/// Thin delegating accessor for one externally-managed MCP server.
/// Everything beyond what the server declared at registration is refused.
#[derive(Clone, Debug)]
pub struct McpSource {
	server_id: String,
	manager: Arc<dyn McpManager>,
	uri_prefix: String,
	capabilities: Capabilities,
	terminate_sig: TerminateSignal,
}

impl McpSource {
	pub fn new(
		server_id: String,
		manager: Arc<dyn McpManager>,
		declared_capabilities: Option<Capabilities>,
		uri_prefix: String,
		terminate_sig: TerminateSignal,
	) -> Self {
		McpSource {
			server_id,
			manager,
			uri_prefix,
			capabilities: declared_capabilities.unwrap_or_else(Capabilities::read_list_only),
			terminate_sig,
		}
	}

	pub fn server_id(&self) -> &str {
		&self.server_id
	}

	fn ensure_alive(&self) -> SourceResult<()> {
		if self.terminate_sig.is_dead() {
			return Err(SourceError::cancelled());
		}
		Ok(())
	}

	/// MCP resource paths are opaque to this layer.
	fn resource_path(&self, uri_or_path: &str) -> SourceResult<String> {
		if SourceUri::is_prefixed(uri_or_path) {
			Ok(SourceUri::resource_path_for(&self.uri_prefix, uri_or_path)?)
		} else {
			Ok(uri_or_path.to_string())
		}
	}
}

#[async_trait]
impl ResourceAccessor for McpSource {
	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn uri_prefix(&self) -> &str {
		&self.uri_prefix
	}

	async fn check_connectivity(&self) -> anyhow::Result<()> {
		self.manager.list_resources(&self.server_id).await?;
		Ok(())
	}

	fn is_resource_within_data_source(&self, uri: &str) -> bool {
		self.resource_path(uri).is_ok()
	}

	async fn resource_exists(&self, uri: &str, _options: ExistsOptions) -> bool {
		let Ok(path) = self.resource_path(uri) else {
			return false;
		};
		self.manager.load_resource(&self.server_id, &path).await.is_ok()
	}

	async fn load_resource(&self, uri: &str, _options: LoadOptions) -> SourceResult<LoadedResource> {
		self.ensure_alive()?;
		if !self.has_capability(SourceCapability::Read) {
			return Err(SourceError::unsupported("loadResource"));
		}
		let path = self.resource_path(uri)?;
		let content = self.manager.load_resource(&self.server_id, &path).await?;

		let mime_type = content.mime_type.clone();
		let resource_content = match (content.text, content.blob) {
			(Some(text), _) => ResourceContent::Text(text),
			(None, Some(blob)) => ResourceContent::Bytes(blob),
			(None, None) => ResourceContent::Text(String::new()),
		};
		let size = resource_content.byte_len();
		Ok(LoadedResource {
			content: resource_content,
			metadata: ResourceMetadata {
				uri: uri.to_string(),
				mime_type,
				size: Some(size),
				..Default::default()
			},
			is_partial: false,
		})
	}

	async fn list_resources(&self, _options: ListOptions) -> SourceResult<ResourceListing> {
		self.ensure_alive()?;
		if !self.has_capability(SourceCapability::List) {
			return Err(SourceError::unsupported("listResources"));
		}
		let resources = self
			.manager
			.list_resources(&self.server_id)
			.await?
			.into_iter()
			.map(|resource| ResourceMetadata {
				uri: format!("{}{}", self.uri_prefix, resource.path),
				name: resource.name,
				mime_type: resource.mime_type,
				note: resource.description,
				..Default::default()
			})
			.collect();
		Ok(ResourceListing { resources, pagination: None })
	}

	async fn get_metadata(&self) -> DataSourceMetadata {
		let mut metadata = DataSourceMetadata::default();
		match self.manager.list_resources(&self.server_id).await {
			Ok(resources) => {
				metadata.resource_count = Some(resources.len() as u64);
			},
			Err(_) => {
				metadata.notes.push("(metadata unavailable)".to_string());
			},
		}
		metadata
	}
}
