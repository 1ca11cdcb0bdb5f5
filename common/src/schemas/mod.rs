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

//! Configuration schemas for the built-in data source providers and for
//! the registry itself. Provider configs travel as loose JSON maps on the
//! connection; these structs are the typed view an accessor takes at
//! construction time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
	true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemConfig {
	/// Directory every resource path is resolved against. Operations that
	/// would escape it are refused.
	pub data_source_root: PathBuf,
	#[serde(default = "default_true")]
	pub strict_root: bool,
	#[serde(default = "default_true")]
	pub follow_symlinks: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
	pub workspace_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleDocsConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub folder_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub drive_id: Option<String>,
	/// Token exchange endpoint for OAuth2 refresh. Defaults to the Google
	/// endpoint when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_exchange_uri: Option<String>,
}

/// Product variants gate which built-in providers the registry loads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductVariant {
	#[default]
	Opensource,
	Saas,
}

/// Settings the registry reads once at first initialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
	#[serde(default)]
	pub product_variant: ProductVariant,
	/// Directories scanned for `*.datasource` plug-in entries.
	#[serde(default)]
	pub plugin_dirs: Vec<PathBuf>,
	/// When set, MCP-discovered providers are restricted to these server
	/// ids. Used to enforce feature gates.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mcp_server_allowlist: Option<Vec<String>>,
}

impl RegistrySettings {
	pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
		Ok(serde_yaml::from_str(raw)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_filesystem_config_defaults() {
		let config: FilesystemConfig =
			serde_json::from_str(r#"{"dataSourceRoot": "/tmp/data"}"#).unwrap();
		assert_eq!(config.data_source_root, PathBuf::from("/tmp/data"));
		assert!(config.strict_root);
		assert!(config.follow_symlinks);
	}

	#[test]
	fn test_googledocs_config_optional_fields() {
		let config: GoogleDocsConfig = serde_json::from_str("{}").unwrap();
		assert!(config.folder_id.is_none());
		assert!(config.drive_id.is_none());
		assert!(config.refresh_exchange_uri.is_none());
	}

	#[test]
	fn test_registry_settings_from_yaml() {
		let settings = RegistrySettings::from_yaml(
			"productVariant: saas\npluginDirs:\n  - /opt/plugins\nmcpServerAllowlist:\n  - weather\n",
		)
		.unwrap();
		assert_eq!(settings.product_variant, ProductVariant::Saas);
		assert_eq!(settings.plugin_dirs, vec![PathBuf::from("/opt/plugins")]);
		assert_eq!(settings.mcp_server_allowlist, Some(vec!["weather".to_string()]));
	}
}
