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

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccessMethod;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum UriError {
	#[error("invalid resource uri: {0}")]
	Invalid(String),
	#[error("uri `{uri}` does not belong to connection `{expected_prefix}`")]
	NotForConnection { uri: String, expected_prefix: String },
}

/// A fully-qualified resource address:
/// `<accessMethod>+<providerType>+<connectionName>://<resourcePath>`.
///
/// The resource path grammar is provider-specific and is validated by the
/// accessor, not here. The one exception is [`validate_relative_path`],
/// which filesystem accessors run before touching the disk.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceUri {
	pub access_method: AccessMethod,
	pub provider_type: String,
	pub connection_name: String,
	pub resource_path: String,
}

impl SourceUri {
	pub fn new(
		access_method: AccessMethod,
		provider_type: impl Into<String>,
		connection_name: impl Into<String>,
		resource_path: impl Into<String>,
	) -> Self {
		SourceUri {
			access_method,
			provider_type: provider_type.into(),
			connection_name: connection_name.into(),
			resource_path: resource_path.into(),
		}
	}

	/// The `<accessMethod>+<providerType>+<connectionName>://` head of the URI.
	pub fn prefix(&self) -> String {
		format!("{}+{}+{}://", self.access_method, self.provider_type, self.connection_name)
	}

	/// True if the given string already carries a `bb+` or `mcp+` URI head.
	/// Such strings are passed through unchanged when qualifying resource
	/// paths.
	pub fn is_prefixed(candidate: &str) -> bool {
		let Some((head, _)) = candidate.split_once("://") else {
			return false;
		};
		head.starts_with("bb+") || head.starts_with("mcp+")
	}

	/// Strips `prefix` from `uri`, returning the bare resource path.
	pub fn resource_path_for(prefix: &str, uri: &str) -> Result<String, UriError> {
		match uri.strip_prefix(prefix) {
			Some(path) => Ok(path.to_string()),
			None => Err(UriError::NotForConnection {
				uri: uri.to_string(),
				expected_prefix: prefix.to_string(),
			}),
		}
	}
}

fn is_provider_type(value: &str) -> bool {
	!value.is_empty()
		&& value.chars().next().is_some_and(|ch| ch.is_ascii_lowercase())
		&& value
			.chars()
			.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
}

fn is_connection_name(value: &str) -> bool {
	!value.is_empty()
		&& value
			.chars()
			.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

impl FromStr for SourceUri {
	type Err = UriError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let (head, resource_path) = value
			.split_once("://")
			.ok_or_else(|| UriError::Invalid(format!("missing `://` in `{value}`")))?;

		let mut parts = head.splitn(3, '+');
		let access_method = parts
			.next()
			.ok_or_else(|| UriError::Invalid(value.to_string()))?
			.parse::<AccessMethod>()
			.map_err(|err| UriError::Invalid(format!("{err} in `{value}`")))?;
		let provider_type = parts
			.next()
			.ok_or_else(|| UriError::Invalid(format!("missing provider type in `{value}`")))?;
		let connection_name = parts
			.next()
			.ok_or_else(|| UriError::Invalid(format!("missing connection name in `{value}`")))?;

		if !is_provider_type(provider_type) {
			return Err(UriError::Invalid(format!("bad provider type `{provider_type}`")));
		}
		if !is_connection_name(connection_name) {
			return Err(UriError::Invalid(format!("bad connection name `{connection_name}`")));
		}

		Ok(SourceUri {
			access_method,
			provider_type: provider_type.to_string(),
			connection_name: connection_name.to_string(),
			resource_path: resource_path.to_string(),
		})
	}
}

impl fmt::Display for SourceUri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}+{}+{}://{}",
			self.access_method, self.provider_type, self.connection_name, self.resource_path
		)
	}
}

/// Rejects resource paths that could escape a filesystem root: absolute
/// paths and any path containing a `..` segment.
pub fn validate_relative_path(resource_path: &str) -> Result<(), UriError> {
	if resource_path.starts_with('/') {
		return Err(UriError::Invalid(format!("absolute resource path `{resource_path}`")));
	}
	let path = Path::new(resource_path);
	for component in path.components() {
		if matches!(component, std::path::Component::ParentDir) {
			return Err(UriError::Invalid(format!(
				"`..` segment in resource path `{resource_path}`"
			)));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_round_trip() {
		let uri: SourceUri = "bb+filesystem+local-files://docs/readme.md".parse().unwrap();
		assert_eq!(uri.access_method, AccessMethod::Bb);
		assert_eq!(uri.provider_type, "filesystem");
		assert_eq!(uri.connection_name, "local-files");
		assert_eq!(uri.resource_path, "docs/readme.md");
		assert_eq!(uri.to_string(), "bb+filesystem+local-files://docs/readme.md");
	}

	#[test]
	fn test_parse_mcp_opaque_path() {
		let uri: SourceUri = "mcp+weather-server+forecasts://city/berlin".parse().unwrap();
		assert_eq!(uri.access_method, AccessMethod::Mcp);
		assert_eq!(uri.provider_type, "weather-server");
		assert_eq!(uri.resource_path, "city/berlin");
	}

	#[test]
	fn test_parse_empty_resource_path() {
		let uri: SourceUri = "bb+notion+team-wiki://".parse().unwrap();
		assert_eq!(uri.resource_path, "");
		assert_eq!(uri.prefix(), "bb+notion+team-wiki://");
	}

	#[test]
	fn test_parse_failures() {
		assert!("filesystem+local://x".parse::<SourceUri>().is_err());
		assert!("bb+filesystem://x".parse::<SourceUri>().is_err());
		assert!("bb+Filesystem+local://x".parse::<SourceUri>().is_err());
		assert!("bb+filesystem+Local Name://x".parse::<SourceUri>().is_err());
		assert!("http+filesystem+local://x".parse::<SourceUri>().is_err());
		assert!("no-scheme-here".parse::<SourceUri>().is_err());
	}

	#[test]
	fn test_is_prefixed() {
		assert!(SourceUri::is_prefixed("bb+filesystem+local://a/b.txt"));
		assert!(SourceUri::is_prefixed("mcp+srv+conn://res"));
		assert!(!SourceUri::is_prefixed("https://example.com"));
		assert!(!SourceUri::is_prefixed("docs/readme.md"));
	}

	#[test]
	fn test_resource_path_for() {
		let path =
			SourceUri::resource_path_for("bb+notion+wiki://", "bb+notion+wiki://page/abc").unwrap();
		assert_eq!(path, "page/abc");
		let err = SourceUri::resource_path_for("bb+notion+wiki://", "bb+notion+other://page/abc")
			.unwrap_err();
		assert!(matches!(err, UriError::NotForConnection { .. }));
	}

	#[test]
	fn test_validate_relative_path() {
		assert!(validate_relative_path("docs/readme.md").is_ok());
		assert!(validate_relative_path("./docs/readme.md").is_ok());
		assert!(validate_relative_path("/etc/passwd").is_err());
		assert!(validate_relative_path("../outside").is_err());
		assert!(validate_relative_path("docs/../../outside").is_err());
	}
}
