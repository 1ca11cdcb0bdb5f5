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

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use common::{AccessMethod, AuthMethod, Capabilities, DataSourceAuth};
use serde_json::{Map, Value};
use sources::ResourceAccessor;

use crate::Connection;

/// A backend kind. Providers are stateless, constructed once at registry
/// initialization and alive for the process lifetime; per-connection state
/// lives on connections and their accessors.
#[async_trait]
pub trait DataSourceProvider: fmt::Debug + Send + Sync {
	/// Unique within an access method; the same id may exist under both
	/// `bb` and `mcp`.
	fn provider_type(&self) -> &str;

	fn access_method(&self) -> AccessMethod;

	fn name(&self) -> &str;

	fn description(&self) -> &str;

	/// Template of the URIs this provider serves, for display.
	fn uri_template(&self) -> String {
		format!("{}+{}+<connection>://<resource-path>", self.access_method(), self.provider_type())
	}

	fn required_config_fields(&self) -> &[&str];

	fn auth_method(&self) -> AuthMethod;

	fn capabilities(&self) -> &Capabilities;

	/// Help text for higher layers about the content shapes this backend
	/// serves.
	fn content_type_guidance(&self) -> &str {
		""
	}

	/// Detailed usage instructions consumed by higher layers.
	fn instructions(&self) -> &str {
		""
	}

	/// True iff every required config field is present and well-typed.
	fn validate_config(&self, config: &Map<String, Value>) -> bool {
		self.required_config_fields().iter().all(|field| {
			config
				.get(*field)
				.map(|value| !value.is_null() && !matches!(value, Value::String(text) if text.is_empty()))
				.unwrap_or(false)
		})
	}

	fn validate_auth(&self, auth: &DataSourceAuth) -> bool {
		auth.validate_against(self.auth_method())
	}

	/// The configuration a new connection stores for the given user
	/// config. Descriptor-backed providers merge their defaults
	/// underneath; everything else passes the map through.
	fn effective_config(&self, config: &Map<String, Value>) -> Map<String, Value> {
		config.clone()
	}

	/// Constructs the accessor. Implementations do not re-check the
	/// connection's identity; [`DataSourceProvider::create_accessor`]
	/// already did.
	async fn build_accessor(
		&self,
		connection: &Connection,
	) -> anyhow::Result<Arc<dyn ResourceAccessor>>;

	/// Builds an accessor for one connection, failing fast when the
	/// connection belongs to a different provider or access method.
	async fn create_accessor(
		&self,
		connection: &Connection,
	) -> anyhow::Result<Arc<dyn ResourceAccessor>> {
		if connection.provider_type() != self.provider_type() {
			return Err(anyhow::anyhow!(
				"connection `{}` belongs to provider `{}`, not `{}`",
				connection.id(),
				connection.provider_type(),
				self.provider_type(),
			));
		}
		if connection.access_method() != self.access_method() {
			return Err(anyhow::anyhow!(
				"connection `{}` uses access method `{}`, provider expects `{}`",
				connection.id(),
				connection.access_method(),
				self.access_method(),
			));
		}
		self.build_accessor(connection).await
	}
}
