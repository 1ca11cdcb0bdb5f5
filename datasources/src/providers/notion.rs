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
use common::{AccessMethod, AuthMethod, Capabilities, DataSourceAuth, NotionConfig};
use serde_json::Value;
use sources::{notion_capabilities, NotionSource, ResourceAccessor};

use crate::{Connection, DataSourceProvider};

const GUIDANCE: &str = "Serves Notion pages, databases, blocks, users and comments as \
Markdown. Pages support block-level edits through the portable block pipeline; page \
writes replace all existing blocks, which discards Notion-side block identity.";

const INSTRUCTIONS: &str = "Resource paths have the form `<kind>/<id>` with kind one of \
page, database, workspace, block, user, comment. Configure `workspaceId` and an \
integration API key with access to the target pages.";

#[derive(Debug)]
pub struct NotionProvider {
	capabilities: Capabilities,
}

impl NotionProvider {
	pub fn new() -> Self {
		NotionProvider { capabilities: notion_capabilities() }
	}
}

impl Default for NotionProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DataSourceProvider for NotionProvider {
	fn provider_type(&self) -> &str {
		"notion"
	}

	fn access_method(&self) -> AccessMethod {
		AccessMethod::Bb
	}

	fn name(&self) -> &str {
		"Notion"
	}

	fn description(&self) -> &str {
		"Pages and databases of a Notion workspace"
	}

	fn required_config_fields(&self) -> &[&str] {
		&["workspaceId"]
	}

	fn auth_method(&self) -> AuthMethod {
		AuthMethod::ApiKey
	}

	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn content_type_guidance(&self) -> &str {
		GUIDANCE
	}

	fn instructions(&self) -> &str {
		INSTRUCTIONS
	}

	async fn build_accessor(
		&self,
		connection: &Connection,
	) -> anyhow::Result<Arc<dyn ResourceAccessor>> {
		let config: NotionConfig = serde_json::from_value(Value::Object(connection.config()))?;
		let api_key = match connection.auth() {
			Some(DataSourceAuth::ApiKey { key }) if !key.is_empty() => key.clone(),
			_ => return Err(anyhow::anyhow!("notion connections require an apiKey auth record")),
		};
		let source = NotionSource::new(
			config,
			api_key,
			connection.uri_prefix(),
			connection.terminate_sig().child(),
		);
		Ok(Arc::new(source))
	}
}
