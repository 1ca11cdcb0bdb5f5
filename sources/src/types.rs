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

//! Request and reply shapes shared by every accessor.

use std::{collections::BTreeMap, ops::Range};

use chrono::{DateTime, Utc};
use portabletext::{Block, OperationResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default)]
pub struct ExistsOptions {
	/// When set, existence additionally requires the resource to be (or
	/// not be) a leaf resource.
	pub is_file: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
	pub range: Option<Range<u64>>,
	pub encoding: Option<String>,
}

/// What a load or write carries. Block backends speak `Blocks`; the
/// filesystem speaks `Text`/`Bytes`.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceContent {
	Text(String),
	Bytes(Vec<u8>),
	Blocks(Vec<Block>),
}

impl ResourceContent {
	pub fn byte_len(&self) -> u64 {
		match self {
			ResourceContent::Text(text) => text.len() as u64,
			ResourceContent::Bytes(bytes) => bytes.len() as u64,
			ResourceContent::Blocks(blocks) => blocks
				.iter()
				.map(|block| block.visible_text().len() as u64)
				.sum(),
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			ResourceContent::Text(text) => Some(text),
			_ => None,
		}
	}
}

/// Per-resource metadata. `note` carries the `(metadata unavailable)`
/// placeholder when collection failed for an individual entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
	pub uri: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
	#[serde(default)]
	pub is_directory: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub modified_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoadedResource {
	pub content: ResourceContent,
	pub metadata: ResourceMetadata,
	/// True iff a byte range was requested.
	pub is_partial: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListOptions {
	pub path: Option<String>,
	pub depth: Option<usize>,
	pub page_size: Option<usize>,
	pub page_token: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
	/// Opaque continuation token. Servers may invalidate it at will;
	/// callers treat a rejected token as a start-over signal.
	pub next_page_token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListing {
	pub resources: Vec<ResourceMetadata>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pagination: Option<Pagination>,
}

#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
	/// Regex applied to resource contents.
	pub content_pattern: Option<String>,
	/// Glob restricting which resources are considered.
	pub resource_pattern: Option<String>,
	pub case_sensitive: bool,
	pub date_after: Option<DateTime<Utc>>,
	pub date_before: Option<DateTime<Utc>>,
	pub page_size: Option<usize>,
	/// When set, snippets carry whole lines of context instead of the
	/// default character window.
	pub context_lines: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
	pub uri: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Matched text with surrounding context; leading/trailing ellipses
	/// mark truncation.
	#[serde(default)]
	pub snippets: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReply {
	pub matches: Vec<SearchMatch>,
	pub total_matches: usize,
	/// Populated when individual resources failed during the search; the
	/// reply is then a partial result.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
	pub overwrite: bool,
	pub create_missing_directories: bool,
}

#[derive(Clone, Debug)]
pub struct WriteReply {
	pub success: bool,
	pub uri: String,
	pub metadata: ResourceMetadata,
	pub bytes_written: u64,
}

#[derive(Clone, Debug, Default)]
pub struct EditOptions {
	pub create_if_missing: bool,
}

#[derive(Clone, Debug)]
pub struct EditReply {
	pub operation_results: Vec<OperationResult>,
	pub metadata: ResourceMetadata,
}

#[derive(Clone, Debug, Default)]
pub struct MoveOptions {
	pub overwrite: bool,
	pub create_missing_directories: bool,
}

#[derive(Clone, Debug)]
pub struct MoveReply {
	pub success: bool,
	pub source_uri: String,
	pub destination_uri: String,
	pub metadata: ResourceMetadata,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {
	pub recursive: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
	File,
	Directory,
	Page,
	Database,
	Document,
	Folder,
	Block,
	User,
	Comment,
	Opaque,
}

#[derive(Clone, Debug)]
pub struct DeleteReply {
	pub success: bool,
	pub uri: String,
	pub resource_kind: ResourceKind,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
	pub text_files: u64,
	pub binary_files: u64,
	pub empty_files: u64,
	/// Count of files at or above the very-large threshold (10 MB).
	pub very_large_files: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringSummary {
	pub gitignore_applied: bool,
	pub bbignore_applied: bool,
}

/// Best-effort description of the whole data source. Backends fill what
/// they can and leave the rest unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_count: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub directory_count: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_depth: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub largest_resource_size: Option<u64>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extension_histogram: BTreeMap<String, u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oldest_modified: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub newest_modified: Option<DateTime<Utc>>,
	/// Outcome of the create-and-delete write probe, when attempted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub write_probe_ok: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<ContentSummary>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filtering: Option<FilteringSummary>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub notes: Vec<String>,
}
