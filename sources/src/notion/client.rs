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

//! Thin typed client over the public Notion REST API v1. Carries the
//! pinned `Notion-Version` header, bearer auth, and transparent retry on
//! transient failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{retry, RetryParams};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{SourceError, SourceErrorKind, SourceResult, REQUEST_SEMAPHORE};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const PAGE_CHUNK: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionAnnotations {
	#[serde(default)]
	pub bold: bool,
	#[serde(default)]
	pub italic: bool,
	#[serde(default)]
	pub strikethrough: bool,
	#[serde(default)]
	pub underline: bool,
	#[serde(default)]
	pub code: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionRichText {
	#[serde(default)]
	pub plain_text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub href: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub annotations: Option<NotionAnnotations>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<Value>,
}

/// One block as the API returns it. The type-specific payload stays a raw
/// JSON map keyed by the type name, which is what lets unsupported block
/// types round-trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionBlock {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "type")]
	pub block_type: String,
	#[serde(default)]
	pub has_children: bool,
	#[serde(flatten)]
	pub payload: serde_json::Map<String, Value>,
}

impl NotionBlock {
	/// The `rich_text` array of this block's typed payload, if any.
	pub fn rich_text(&self) -> Vec<NotionRichText> {
		self.payload
			.get(&self.block_type)
			.and_then(|typed| typed.get("rich_text"))
			.and_then(|value| serde_json::from_value(value.clone()).ok())
			.unwrap_or_default()
	}

	pub fn typed_payload(&self) -> Option<&Value> {
		self.payload.get(&self.block_type)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionPage {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_time: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_edited_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub archived: bool,
	#[serde(default)]
	pub properties: Value,
	#[serde(default)]
	pub parent: Value,
}

impl NotionPage {
	/// Concatenated plain text of the page's title property.
	pub fn title(&self) -> String {
		let Some(properties) = self.properties.as_object() else {
			return String::new();
		};
		for property in properties.values() {
			if property.get("type").and_then(Value::as_str) == Some("title") {
				if let Some(parts) = property.get("title").and_then(Value::as_array) {
					return parts
						.iter()
						.filter_map(|part| part.get("plain_text").and_then(Value::as_str))
						.collect();
				}
			}
		}
		String::new()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionDatabase {
	pub id: String,
	#[serde(default)]
	pub title: Vec<NotionRichText>,
	#[serde(default)]
	pub properties: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_edited_time: Option<DateTime<Utc>>,
}

impl NotionDatabase {
	pub fn title_text(&self) -> String {
		self.title.iter().map(|part| part.plain_text.as_str()).collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionUser {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub user_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub person: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bot: Option<Value>,
}

/// A paginated list reply: search results, query results, block children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionObjectList {
	#[serde(default)]
	pub results: Vec<Value>,
	#[serde(default)]
	pub has_more: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct NotionApiClient {
	client: reqwest::Client,
	base_url: String,
	api_key: String,
	retry_params: RetryParams,
}

impl std::fmt::Debug for NotionApiClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NotionApiClient").field("base_url", &self.base_url).finish()
	}
}

impl NotionApiClient {
	pub fn new(api_key: String) -> Self {
		Self::with_base_url(api_key, NOTION_API_BASE.to_string())
	}

	/// Test seam: point the client at a mock server.
	pub fn with_base_url(api_key: String, base_url: String) -> Self {
		NotionApiClient {
			client: reqwest::Client::new(),
			base_url,
			api_key,
			retry_params: RetryParams::aggressive(),
		}
	}

	async fn execute(&self, request: reqwest::RequestBuilder) -> SourceResult<Value> {
		let _permit = REQUEST_SEMAPHORE.acquire().await.map_err(|_| SourceError::cancelled())?;
		let response = request
			.bearer_auth(&self.api_key)
			.header("Notion-Version", NOTION_VERSION)
			.send()
			.await
			.map_err(SourceError::from)?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			let kind = match status.as_u16() {
				401 | 403 => SourceErrorKind::AuthRequired,
				404 => SourceErrorKind::NotFound,
				400 => SourceErrorKind::InvalidQuery,
				_ => SourceErrorKind::Upstream,
			};
			return Err(SourceError::new(
				kind,
				Arc::new(anyhow::anyhow!("notion api returned {status}: {body}")),
			));
		}
		if status.as_u16() == 204 {
			return Ok(Value::Null);
		}
		response.json::<Value>().await.map_err(SourceError::from)
	}

	async fn get(&self, path: &str) -> SourceResult<Value> {
		let url = format!("{}{}", self.base_url, path);
		retry(&self.retry_params, || async {
			debug!(path = path, "notion GET");
			self.execute(self.client.get(&url)).await
		})
		.await
	}

	async fn post(&self, path: &str, body: &Value) -> SourceResult<Value> {
		let url = format!("{}{}", self.base_url, path);
		retry(&self.retry_params, || async {
			debug!(path = path, "notion POST");
			self.execute(self.client.post(&url).json(body)).await
		})
		.await
	}

	async fn patch(&self, path: &str, body: &Value) -> SourceResult<Value> {
		let url = format!("{}{}", self.base_url, path);
		// Not retried: appends are not idempotent.
		debug!(path = path, "notion PATCH");
		self.execute(self.client.patch(&url).json(body)).await
	}

	async fn delete(&self, path: &str) -> SourceResult<Value> {
		let url = format!("{}{}", self.base_url, path);
		debug!(path = path, "notion DELETE");
		self.execute(self.client.delete(&url)).await
	}

	pub async fn get_self_user(&self) -> SourceResult<NotionUser> {
		let value = self.get("/users/me").await?;
		Ok(serde_json::from_value(value)?)
	}

	pub async fn get_page(&self, page_id: &str) -> SourceResult<NotionPage> {
		let value = self.get(&format!("/pages/{page_id}")).await?;
		Ok(serde_json::from_value(value)?)
	}

	pub async fn get_database(&self, database_id: &str) -> SourceResult<NotionDatabase> {
		let value = self.get(&format!("/databases/{database_id}")).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Queries all pages of a database, following cursors to the end.
	/// Filter and sort clauses pass through to the API unchanged.
	pub async fn query_database(
		&self,
		database_id: &str,
		filter: Option<Value>,
		sorts: Option<Value>,
	) -> SourceResult<Vec<NotionPage>> {
		let mut pages = Vec::new();
		let mut cursor: Option<String> = None;
		loop {
			let mut body = json!({ "page_size": PAGE_CHUNK });
			if let Some(cursor) = &cursor {
				body["start_cursor"] = json!(cursor);
			}
			if let Some(filter) = &filter {
				body["filter"] = filter.clone();
			}
			if let Some(sorts) = &sorts {
				body["sorts"] = sorts.clone();
			}
			let value = self.post(&format!("/databases/{database_id}/query"), &body).await?;
			let list: NotionObjectList = serde_json::from_value(value)?;
			for result in list.results {
				if let Ok(page) = serde_json::from_value::<NotionPage>(result) {
					pages.push(page);
				}
			}
			if !list.has_more {
				break;
			}
			cursor = list.next_cursor;
			if cursor.is_none() {
				break;
			}
		}
		Ok(pages)
	}

	pub async fn get_block(&self, block_id: &str) -> SourceResult<NotionBlock> {
		let value = self.get(&format!("/blocks/{block_id}")).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Fetches every child block of a page or block, following cursors.
	pub async fn list_block_children(&self, block_id: &str) -> SourceResult<Vec<NotionBlock>> {
		let mut blocks = Vec::new();
		let mut cursor: Option<String> = None;
		loop {
			let mut path = format!("/blocks/{block_id}/children?page_size={PAGE_CHUNK}");
			if let Some(cursor) = &cursor {
				path.push_str(&format!("&start_cursor={cursor}"));
			}
			let value = self.get(&path).await?;
			let list: NotionObjectList = serde_json::from_value(value)?;
			for result in list.results {
				if let Ok(block) = serde_json::from_value::<NotionBlock>(result) {
					blocks.push(block);
				}
			}
			if !list.has_more {
				break;
			}
			cursor = list.next_cursor;
			if cursor.is_none() {
				break;
			}
		}
		Ok(blocks)
	}

	pub async fn append_block_children(
		&self,
		block_id: &str,
		children: Vec<Value>,
	) -> SourceResult<()> {
		self.patch(&format!("/blocks/{block_id}/children"), &json!({ "children": children }))
			.await?;
		Ok(())
	}

	pub async fn delete_block(&self, block_id: &str) -> SourceResult<()> {
		self.delete(&format!("/blocks/{block_id}")).await?;
		Ok(())
	}

	/// Pages are never hard-deleted over the API; archiving is the delete
	/// operation.
	pub async fn archive_page(&self, page_id: &str) -> SourceResult<()> {
		self.patch(&format!("/pages/{page_id}"), &json!({ "archived": true })).await?;
		Ok(())
	}

	pub async fn get_user(&self, user_id: &str) -> SourceResult<NotionUser> {
		let value = self.get(&format!("/users/{user_id}")).await?;
		Ok(serde_json::from_value(value)?)
	}

	pub async fn list_comments(&self, block_id: &str) -> SourceResult<Vec<Value>> {
		let value = self.get(&format!("/comments?block_id={block_id}")).await?;
		let list: NotionObjectList = serde_json::from_value(value)?;
		Ok(list.results)
	}

	/// One page of workspace search. `query` may be empty, which lists
	/// everything the integration can see.
	pub async fn search(
		&self,
		query: &str,
		cursor: Option<&str>,
		page_size: usize,
	) -> SourceResult<NotionObjectList> {
		let mut body = json!({ "page_size": page_size });
		if !query.is_empty() {
			body["query"] = json!(query);
		}
		if let Some(cursor) = cursor {
			body["start_cursor"] = json!(cursor);
		}
		let value = self.post("/search", &body).await?;
		Ok(serde_json::from_value(value)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_page_title_extraction() {
		let page: NotionPage = serde_json::from_value(json!({
			"id": "p1",
			"properties": {
				"Name": {
					"type": "title",
					"title": [
						{"plain_text": "My "},
						{"plain_text": "Page"}
					]
				},
				"Status": {"type": "select", "select": {"name": "Done"}}
			}
		}))
		.unwrap();
		assert_eq!(page.title(), "My Page");
	}

	#[test]
	fn test_block_rich_text_accessor() {
		let block: NotionBlock = serde_json::from_value(json!({
			"id": "b1",
			"type": "paragraph",
			"paragraph": {
				"rich_text": [{"plain_text": "hello", "annotations": {"bold": true}}]
			}
		}))
		.unwrap();
		let rich_text = block.rich_text();
		assert_eq!(rich_text.len(), 1);
		assert_eq!(rich_text[0].plain_text, "hello");
		assert!(rich_text[0].annotations.as_ref().unwrap().bold);
	}

	#[test]
	fn test_unknown_block_payload_survives_serde() {
		let raw = json!({
			"id": "b2",
			"type": "synced_block",
			"synced_block": {"synced_from": {"block_id": "b9"}}
		});
		let block: NotionBlock = serde_json::from_value(raw).unwrap();
		assert_eq!(block.block_type, "synced_block");
		let back = serde_json::to_value(&block).unwrap();
		assert_eq!(back["synced_block"]["synced_from"]["block_id"], "b9");
	}
}
