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
use common::{AccessMethod, AuthMethod, Capabilities};
use sources::{McpManager, McpServerInfo, McpSource, ResourceAccessor};

use crate::{Connection, DataSourceProvider};

/// One provider per discovered MCP server that exposes resources. The
/// provider type is the server id; the server's declared capabilities cap
/// the surface, defaulting to read/list.
#[derive(Debug)]
pub struct GenericMcpProvider {
	server: McpServerInfo,
	manager: Arc<dyn McpManager>,
	capabilities: Capabilities,
	description: String,
}

impl GenericMcpProvider {
	pub fn new(server: McpServerInfo, manager: Arc<dyn McpManager>) -> Self {
		let capabilities =
			server.capabilities.clone().unwrap_or_else(Capabilities::read_list_only);
		let description = format!("Resources of MCP server `{}`", server.name);
		GenericMcpProvider { server, manager, capabilities, description }
	}

	pub fn server(&self) -> &McpServerInfo {
		&self.server
	}
}

#[async_trait]
impl DataSourceProvider for GenericMcpProvider {
	fn provider_type(&self) -> &str {
		&self.server.id
	}

	fn access_method(&self) -> AccessMethod {
		AccessMethod::Mcp
	}

	fn name(&self) -> &str {
		&self.server.name
	}

	fn description(&self) -> &str {
		&self.description
	}

	fn required_config_fields(&self) -> &[&str] {
		// Server-defined; nothing required by the core.
		&[]
	}

	fn auth_method(&self) -> AuthMethod {
		// Credentials, if any, are the MCP manager's concern.
		AuthMethod::None
	}

	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn content_type_guidance(&self) -> &str {
		"Opaque resources served by an external MCP server; text or binary per resource."
	}

	async fn build_accessor(
		&self,
		connection: &Connection,
	) -> anyhow::Result<Arc<dyn ResourceAccessor>> {
		let source = McpSource::new(
			self.server.id.clone(),
			Arc::clone(&self.manager),
			self.server.capabilities.clone(),
			connection.uri_prefix(),
			connection.terminate_sig().child(),
		);
		Ok(Arc::new(source))
	}
}
