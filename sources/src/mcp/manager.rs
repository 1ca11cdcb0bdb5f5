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

//! Interface to the Model-Context-Protocol manager. The transport and
//! server lifecycle live outside this layer; accessors only see this
//! trait.

use async_trait::async_trait;
use common::Capabilities;
use serde::{Deserialize, Serialize};

use crate::SourceResult;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerInfo {
	pub id: String,
	pub name: String,
	/// Capabilities the server declared at registration, if any. Absent
	/// means the read/list default applies.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capabilities: Option<Capabilities>,
	#[serde(default)]
	pub resource_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResource {
	pub path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpContent {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub blob: Option<Vec<u8>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
}

/// The slice of the MCP manager this layer consumes.
#[async_trait]
pub trait McpManager: std::fmt::Debug + Send + Sync + 'static {
	/// Every registered server, whether or not it exposes resources.
	async fn list_servers(&self) -> SourceResult<Vec<McpServerInfo>>;

	async fn list_resources(&self, server_id: &str) -> SourceResult<Vec<McpResource>>;

	async fn load_resource(&self, server_id: &str, path: &str) -> SourceResult<McpContent>;
}
