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

//! The built-in provider manifest and plug-in discovery.
//!
//! Plug-ins are descriptor-based: a `<name>.datasource` directory holding
//! an `info.json` that names one of the compiled-in accessor kinds as its
//! base. There is no dynamic code loading; a plug-in re-brands and
//! re-configures a built-in, it cannot ship new code.

use std::{fmt, path::Path, sync::Arc};

use async_trait::async_trait;
use common::{AccessMethod, AuthMethod, Capabilities, ProductVariant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sources::ResourceAccessor;
use tracing::{info, warn};

use crate::{
	providers::{FilesystemProvider, GoogleDocsProvider, NotionProvider},
	Connection, DataSourceProvider,
};

pub const PLUGIN_DIR_SUFFIX: &str = ".datasource";
pub const PLUGIN_INFO_FILE: &str = "info.json";

pub struct BuiltinProviderSpec {
	pub provider_type: &'static str,
	pub variants: &'static [ProductVariant],
	pub enabled: bool,
}

/// Which built-ins exist, and in which product variants they ship.
pub const BUILTIN_MANIFEST: &[BuiltinProviderSpec] = &[
	BuiltinProviderSpec {
		provider_type: "filesystem",
		variants: &[ProductVariant::Opensource, ProductVariant::Saas],
		enabled: true,
	},
	BuiltinProviderSpec {
		provider_type: "notion",
		variants: &[ProductVariant::Opensource, ProductVariant::Saas],
		enabled: true,
	},
	BuiltinProviderSpec {
		provider_type: "googledocs",
		variants: &[ProductVariant::Opensource, ProductVariant::Saas],
		enabled: true,
	},
];

pub fn instantiate_builtin(provider_type: &str) -> Option<Arc<dyn DataSourceProvider>> {
	match provider_type {
		"filesystem" => Some(Arc::new(FilesystemProvider::new())),
		"notion" => Some(Arc::new(NotionProvider::new())),
		"googledocs" => Some(Arc::new(GoogleDocsProvider::new())),
		_ => None,
	}
}

/// `info.json` of a plug-in entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
	/// Provider type the plug-in registers as.
	pub provider_type: String,
	/// Built-in accessor kind the plug-in is backed by.
	pub base: String,
	pub display_name: String,
	#[serde(default)]
	pub description: String,
	/// Config values merged under the connection's own config.
	#[serde(default)]
	pub config_defaults: Map<String, Value>,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

fn default_enabled() -> bool {
	true
}

/// Scans plug-in directories for `*.datasource` entries. Unreadable or
/// malformed entries are logged and skipped.
pub fn scan_plugin_dirs(plugin_dirs: &[impl AsRef<Path>]) -> Vec<PluginDescriptor> {
	let mut descriptors = Vec::new();
	for dir in plugin_dirs {
		let dir = dir.as_ref();
		let entries = match std::fs::read_dir(dir) {
			Ok(entries) => entries,
			Err(err) => {
				warn!(dir = %dir.display(), error = ?err, "cannot read plugin directory");
				continue;
			},
		};
		for entry in entries.flatten() {
			let path = entry.path();
			let is_plugin = path
				.file_name()
				.and_then(|name| name.to_str())
				.map(|name| name.ends_with(PLUGIN_DIR_SUFFIX))
				.unwrap_or(false);
			if !is_plugin || !path.is_dir() {
				continue;
			}
			let info_path = path.join(PLUGIN_INFO_FILE);
			match std::fs::read_to_string(&info_path)
				.map_err(anyhow::Error::from)
				.and_then(|raw| Ok(serde_json::from_str::<PluginDescriptor>(&raw)?))
			{
				Ok(descriptor) if descriptor.enabled => {
					info!(
						provider_type = %descriptor.provider_type,
						base = %descriptor.base,
						path = %path.display(),
						"discovered data source plugin"
					);
					descriptors.push(descriptor);
				},
				Ok(_) => {},
				Err(err) => {
					warn!(path = %info_path.display(), error = ?err, "skipping malformed plugin descriptor");
				},
			}
		}
	}
	descriptors
}

/// A provider assembled from a plug-in descriptor: the base built-in's
/// behavior under the plug-in's identity, with the descriptor's config
/// defaults filled in.
pub struct PluginProvider {
	descriptor: PluginDescriptor,
	base: Arc<dyn DataSourceProvider>,
}

impl PluginProvider {
	pub fn new(descriptor: PluginDescriptor) -> anyhow::Result<Self> {
		let base = instantiate_builtin(&descriptor.base).ok_or_else(|| {
			anyhow::anyhow!(
				"plugin `{}` names unknown base accessor kind `{}`",
				descriptor.provider_type,
				descriptor.base
			)
		})?;
		Ok(PluginProvider { descriptor, base })
	}

	fn merged_config(&self, config: &Map<String, Value>) -> Map<String, Value> {
		let mut merged = self.descriptor.config_defaults.clone();
		for (key, value) in config {
			merged.insert(key.clone(), value.clone());
		}
		merged
	}
}

impl fmt::Debug for PluginProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PluginProvider")
			.field("provider_type", &self.descriptor.provider_type)
			.field("base", &self.descriptor.base)
			.finish()
	}
}

#[async_trait]
impl DataSourceProvider for PluginProvider {
	fn provider_type(&self) -> &str {
		&self.descriptor.provider_type
	}

	fn access_method(&self) -> AccessMethod {
		self.base.access_method()
	}

	fn name(&self) -> &str {
		&self.descriptor.display_name
	}

	fn description(&self) -> &str {
		&self.descriptor.description
	}

	fn required_config_fields(&self) -> &[&str] {
		self.base.required_config_fields()
	}

	fn auth_method(&self) -> AuthMethod {
		self.base.auth_method()
	}

	fn capabilities(&self) -> &Capabilities {
		self.base.capabilities()
	}

	fn content_type_guidance(&self) -> &str {
		self.base.content_type_guidance()
	}

	fn instructions(&self) -> &str {
		self.base.instructions()
	}

	fn validate_config(&self, config: &Map<String, Value>) -> bool {
		// Descriptor defaults can satisfy required fields.
		let merged = self.merged_config(config);
		self.base.validate_config(&merged)
	}

	fn effective_config(&self, config: &Map<String, Value>) -> Map<String, Value> {
		self.merged_config(config)
	}

	async fn build_accessor(
		&self,
		connection: &Connection,
	) -> anyhow::Result<Arc<dyn ResourceAccessor>> {
		self.base.build_accessor(connection).await
	}
}
