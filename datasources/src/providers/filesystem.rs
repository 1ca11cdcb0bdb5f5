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
use common::{AccessMethod, AuthMethod, Capabilities, FilesystemConfig};
use serde_json::Value;
use sources::{filesystem_capabilities, FileSystemSource, ResourceAccessor};

use crate::{Connection, DataSourceProvider};

const GUIDANCE: &str = "Serves plain text and binary files from a local directory tree. \
Resource paths are POSIX-relative; text files support ranged loads, regex search, \
search/replace edits, move and delete.";

const INSTRUCTIONS: &str = "Configure `dataSourceRoot` with the directory to expose. \
Paths containing `..` or starting with `/` are refused. `.gitignore` and `.bb-ignore` \
patterns are honoured for listings and searches.";

#[derive(Debug)]
pub struct FilesystemProvider {
	capabilities: Capabilities,
}

impl FilesystemProvider {
	pub fn new() -> Self {
		FilesystemProvider { capabilities: filesystem_capabilities() }
	}
}

impl Default for FilesystemProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl DataSourceProvider for FilesystemProvider {
	fn provider_type(&self) -> &str {
		"filesystem"
	}

	fn access_method(&self) -> AccessMethod {
		AccessMethod::Bb
	}

	fn name(&self) -> &str {
		"Local Filesystem"
	}

	fn description(&self) -> &str {
		"Files and directories under a configured root directory"
	}

	fn required_config_fields(&self) -> &[&str] {
		&["dataSourceRoot"]
	}

	fn auth_method(&self) -> AuthMethod {
		AuthMethod::None
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
		let config: FilesystemConfig =
			serde_json::from_value(Value::Object(connection.config()))?;
		let source = FileSystemSource::new(
			config,
			connection.uri_prefix(),
			connection.terminate_sig().child(),
		)?;
		Ok(Arc::new(source))
	}
}
