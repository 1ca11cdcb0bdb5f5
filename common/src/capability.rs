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

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a data source is serviced: `bb` integrations run in-process, `mcp`
/// integrations are delegated to an external Model-Context-Protocol server.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
	Bb,
	Mcp,
}

impl AccessMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			AccessMethod::Bb => "bb",
			AccessMethod::Mcp => "mcp",
		}
	}
}

impl fmt::Display for AccessMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Error)]
#[error("unknown access method: {0}")]
pub struct UnknownAccessMethod(pub String);

impl FromStr for AccessMethod {
	type Err = UnknownAccessMethod;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"bb" => Ok(AccessMethod::Bb),
			"mcp" => Ok(AccessMethod::Mcp),
			other => Err(UnknownAccessMethod(other.to_string())),
		}
	}
}

/// Coarse operation kinds a data source can service. An accessor must
/// refuse any operation whose capability its provider does not advertise.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceCapability {
	Read,
	Write,
	List,
	Search,
	Move,
	Delete,
	BlockRead,
	BlockEdit,
}

/// Content shapes a load operation can produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadCapability {
	PlainText,
	Structured,
	Both,
}

/// Edit primitives a data source understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditCapability {
	SearchReplaceOperations,
	RangeOperations,
	BlockOperations,
	TextFormatting,
	ParagraphFormatting,
	Tables,
	Colors,
	Fonts,
}

/// Search modes a data source understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchCapability {
	TextSearch,
	RegexSearch,
	StructuredQuerySearch,
}

/// The full advertised capability surface of a provider. Providers build
/// one of these at construction time; connections and accessors only ever
/// read it.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
	#[serde(default)]
	pub operations: BTreeSet<SourceCapability>,
	#[serde(default)]
	pub load: BTreeSet<LoadCapability>,
	#[serde(default)]
	pub edit: BTreeSet<EditCapability>,
	#[serde(default)]
	pub search: BTreeSet<SearchCapability>,
}

impl Capabilities {
	pub fn new(
		operations: impl IntoIterator<Item = SourceCapability>,
		load: impl IntoIterator<Item = LoadCapability>,
		edit: impl IntoIterator<Item = EditCapability>,
		search: impl IntoIterator<Item = SearchCapability>,
	) -> Self {
		Capabilities {
			operations: operations.into_iter().collect(),
			load: load.into_iter().collect(),
			edit: edit.into_iter().collect(),
			search: search.into_iter().collect(),
		}
	}

	/// Minimal surface for a delegated source that declared nothing.
	pub fn read_list_only() -> Self {
		Capabilities::new(
			[SourceCapability::Read, SourceCapability::List],
			[LoadCapability::PlainText],
			[],
			[],
		)
	}

	pub fn supports(&self, capability: SourceCapability) -> bool {
		self.operations.contains(&capability)
	}

	pub fn supports_load(&self, capability: LoadCapability) -> bool {
		self.load.contains(&capability)
	}

	pub fn supports_edit(&self, capability: EditCapability) -> bool {
		self.edit.contains(&capability)
	}

	pub fn supports_search(&self, capability: SearchCapability) -> bool {
		self.search.contains(&capability)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_access_method_wire_form() {
		assert_eq!(AccessMethod::Bb.to_string(), "bb");
		assert_eq!(AccessMethod::Mcp.to_string(), "mcp");
		assert_eq!("bb".parse::<AccessMethod>().unwrap(), AccessMethod::Bb);
		assert_eq!("mcp".parse::<AccessMethod>().unwrap(), AccessMethod::Mcp);
		assert!("http".parse::<AccessMethod>().is_err());
	}

	#[test]
	fn test_capability_wire_strings_are_camel_case() {
		let json = serde_json::to_string(&SourceCapability::BlockEdit).unwrap();
		assert_eq!(json, "\"blockEdit\"");
		let json = serde_json::to_string(&EditCapability::SearchReplaceOperations).unwrap();
		assert_eq!(json, "\"searchReplaceOperations\"");
		let json = serde_json::to_string(&SearchCapability::StructuredQuerySearch).unwrap();
		assert_eq!(json, "\"structuredQuerySearch\"");
		let parsed: LoadCapability = serde_json::from_str("\"plainText\"").unwrap();
		assert_eq!(parsed, LoadCapability::PlainText);
	}

	#[test]
	fn test_capabilities_supports() {
		let caps = Capabilities::new(
			[SourceCapability::BlockRead, SourceCapability::BlockEdit, SourceCapability::List],
			[LoadCapability::Both],
			[EditCapability::BlockOperations, EditCapability::TextFormatting],
			[SearchCapability::TextSearch],
		);
		assert!(caps.supports(SourceCapability::BlockEdit));
		assert!(!caps.supports(SourceCapability::Write));
		assert!(caps.supports_edit(EditCapability::BlockOperations));
		assert!(!caps.supports_search(SearchCapability::RegexSearch));
	}

	#[test]
	fn test_capabilities_serde_round_trip() {
		let caps = Capabilities::new(
			[SourceCapability::Read, SourceCapability::List],
			[LoadCapability::PlainText],
			[],
			[SearchCapability::TextSearch, SearchCapability::RegexSearch],
		);
		let json = serde_json::to_string(&caps).unwrap();
		let back: Capabilities = serde_json::from_str(&json).unwrap();
		assert_eq!(caps, back);
	}
}
