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
use common::{AccessMethod, AuthMethod, Capabilities, DataSourceAuth, GoogleDocsConfig};
use serde_json::Value;
use sources::{googledocs_capabilities, GoogleApiClient, GoogleDocsSource, ResourceAccessor};

use crate::{Connection, DataSourceProvider};

const GUIDANCE: &str = "Serves Google Docs documents as Markdown with headings, tables \
and page breaks. Documents support block-level edits emitted as Docs batch updates; \
the write path replaces the whole document body.";

const INSTRUCTIONS: &str = "Resource paths: `document/<id>`, `folder/<id>`, \
`search/<urlencoded-query>`, `drive/overview`. Requires an oauth2 auth record; access \
tokens are refreshed automatically and written back through the owning project.";

#[derive(Debug)]
pub struct GoogleDocsProvider {
	capabilities: Capabilities,
}

impl GoogleDocsProvider {
	pub fn new() -> Self {
		GoogleDocsProvider { capabilities: googledocs_capabilities() }
	}
}

impl Default for GoogleDocsProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DataSourceProvider for GoogleDocsProvider {
	fn provider_type(&self) -> &str {
		"googledocs"
	}

	fn access_method(&self) -> AccessMethod {
		AccessMethod::Bb
	}

	fn name(&self) -> &str {
		"Google Docs"
	}

	fn description(&self) -> &str {
		"Documents in Google Drive, addressed through Docs and Drive APIs"
	}

	fn required_config_fields(&self) -> &[&str] {
		// folderId, driveId and refreshExchangeUri are all optional.
		&[]
	}

	fn auth_method(&self) -> AuthMethod {
		AuthMethod::OAuth2
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
		let config: GoogleDocsConfig = serde_json::from_value(Value::Object(connection.config()))?;
		let tokens = connection
			.auth()
			.and_then(DataSourceAuth::oauth2_tokens)
			.ok_or_else(|| {
				anyhow::anyhow!("googledocs connections require an oauth2 auth record")
			})?;
		let client = Arc::new(GoogleApiClient::new(
			tokens,
			config.refresh_exchange_uri.clone(),
			connection.token_update_callback(),
		));
		let source = GoogleDocsSource::new(
			config,
			client,
			connection.uri_prefix(),
			connection.terminate_sig().child(),
		);
		Ok(Arc::new(source))
	}
}
