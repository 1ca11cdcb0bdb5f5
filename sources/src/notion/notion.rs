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
use chrono::{DateTime, Utc};
use common::{
	Capabilities, EditCapability, LoadCapability, NotionConfig, SearchCapability, SourceCapability,
	SourceUri, TerminateSignal,
};
use portabletext::{apply, markdown, BlockOperation};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
	client::{NotionApiClient, NotionBlock, NotionPage},
	convert,
};
use crate::{
	filesystem::scan::snippet_around, DataSourceMetadata, DeleteOptions, DeleteReply, EditOptions,
	EditReply, ExistsOptions, ListOptions, LoadOptions, LoadedResource, Pagination,
	ResourceAccessor, ResourceContent, ResourceKind, ResourceListing, ResourceMetadata,
	SearchMatch, SearchOptions, SearchReply, SourceError, SourceErrorKind, SourceResult,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const SNIPPET_CONTEXT_CHARS: usize = 40;

/// Notion connections service block-level reads and edits; coarse `write`
/// is deliberately not advertised, the block edit pipeline is the write
/// path.
pub fn notion_capabilities() -> Capabilities {
	Capabilities::new(
		[
			SourceCapability::BlockRead,
			SourceCapability::BlockEdit,
			SourceCapability::List,
			SourceCapability::Search,
			SourceCapability::Delete,
		],
		[LoadCapability::PlainText, LoadCapability::Structured, LoadCapability::Both],
		[
			EditCapability::BlockOperations,
			EditCapability::SearchReplaceOperations,
			EditCapability::TextFormatting,
		],
		[SearchCapability::TextSearch, SearchCapability::RegexSearch],
	)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum NotionResourceKind {
	Page,
	Database,
	Workspace,
	Block,
	User,
	Comment,
}

impl NotionResourceKind {
	fn parse(value: &str) -> Option<Self> {
		match value {
			"page" => Some(NotionResourceKind::Page),
			"database" => Some(NotionResourceKind::Database),
			"workspace" => Some(NotionResourceKind::Workspace),
			"block" => Some(NotionResourceKind::Block),
			"user" => Some(NotionResourceKind::User),
			"comment" => Some(NotionResourceKind::Comment),
			_ => None,
		}
	}
}

/// Accessor for one Notion workspace integration.
#[derive(Clone, Debug)]
pub struct NotionSource {
	client: NotionApiClient,
	uri_prefix: String,
	capabilities: Capabilities,
	workspace_id: String,
	terminate_sig: TerminateSignal,
}

impl NotionSource {
	pub fn new(
		config: NotionConfig,
		api_key: String,
		uri_prefix: String,
		terminate_sig: TerminateSignal,
	) -> Self {
		Self::with_client(NotionApiClient::new(api_key), config, uri_prefix, terminate_sig)
	}

	/// Test seam: inject a client pointed at a mock server.
	pub fn with_client(
		client: NotionApiClient,
		config: NotionConfig,
		uri_prefix: String,
		terminate_sig: TerminateSignal,
	) -> Self {
		NotionSource {
			client,
			uri_prefix,
			capabilities: notion_capabilities(),
			workspace_id: config.workspace_id,
			terminate_sig,
		}
	}

	fn ensure_alive(&self) -> SourceResult<()> {
		if self.terminate_sig.is_dead() {
			return Err(SourceError::cancelled());
		}
		Ok(())
	}

	/// Resource paths have the form `<kind>/<id>`.
	fn parse_path(&self, uri_or_path: &str) -> SourceResult<(NotionResourceKind, String)> {
		let resource_path = if SourceUri::is_prefixed(uri_or_path) {
			SourceUri::resource_path_for(&self.uri_prefix, uri_or_path)?
		} else {
			uri_or_path.to_string()
		};
		let (kind, id) = resource_path.split_once('/').ok_or_else(|| {
			SourceError::new(
				SourceErrorKind::InvalidUri,
				Arc::new(anyhow::anyhow!(
					"notion resource path must be `<kind>/<id>`, got `{resource_path}`"
				)),
			)
		})?;
		let kind = NotionResourceKind::parse(kind).ok_or_else(|| {
			SourceError::new(
				SourceErrorKind::InvalidUri,
				Arc::new(anyhow::anyhow!("unknown notion resource kind `{kind}`")),
			)
		})?;
		Ok((kind, id.to_string()))
	}

	fn uri_for(&self, kind: &str, id: &str) -> String {
		format!("{}{kind}/{id}", self.uri_prefix)
	}

	async fn page_markdown(&self, page_id: &str) -> SourceResult<(String, NotionPage, Vec<NotionBlock>)> {
		let page = self.client.get_page(page_id).await?;
		let blocks = self.client.list_block_children(page_id).await?;
		let portable = convert::notion_blocks_to_portable(&blocks);
		let mut rendered = String::new();
		let title = page.title();
		if !title.is_empty() {
			rendered.push_str(&format!("# {title}\n\n"));
		}
		if let Some(last_edited) = &page.last_edited_time {
			rendered.push_str(&format!("*Last edited: {last_edited}*\n\n"));
		}
		rendered.push_str(&markdown::render(&portable));
		Ok((rendered, page, blocks))
	}

	async fn database_markdown(&self, database_id: &str) -> SourceResult<String> {
		let database = self.client.get_database(database_id).await?;
		let pages = self.client.query_database(database_id, None, None).await?;
		let mut rendered = format!("# {}\n\n## Properties\n\n", database.title_text());
		if let Some(properties) = database.properties.as_object() {
			for (name, property) in properties {
				let property_type =
					property.get("type").and_then(Value::as_str).unwrap_or("unknown");
				rendered.push_str(&format!("- {name}: {property_type}\n"));
			}
		}
		rendered.push_str("\n## Pages\n\n");
		for page in &pages {
			rendered.push_str(&format!("- {} ({})\n", page.title(), page.id));
		}
		Ok(rendered)
	}

	async fn workspace_markdown(&self) -> SourceResult<String> {
		let list = self.client.search("", None, DEFAULT_PAGE_SIZE).await?;
		let mut pages = Vec::new();
		let mut databases = Vec::new();
		for result in &list.results {
			match result.get("object").and_then(Value::as_str) {
				Some("page") =>
					if let Ok(page) = serde_json::from_value::<NotionPage>(result.clone()) {
						pages.push(format!("- {} ({})", page.title(), page.id));
					},
				Some("database") => {
					let title = result
						.get("title")
						.and_then(Value::as_array)
						.map(|parts| {
							parts
								.iter()
								.filter_map(|part| {
									part.get("plain_text").and_then(Value::as_str)
								})
								.collect::<String>()
						})
						.unwrap_or_default();
					let id = result.get("id").and_then(Value::as_str).unwrap_or_default();
					databases.push(format!("- {title} ({id})"));
				},
				_ => {},
			}
		}
		let mut rendered = String::from("# Workspace\n\n## Pages\n\n");
		rendered.push_str(&pages.join("\n"));
		rendered.push_str("\n\n## Databases\n\n");
		rendered.push_str(&databases.join("\n"));
		rendered.push('\n');
		Ok(rendered)
	}

	async fn block_markdown(&self, block_id: &str) -> SourceResult<String> {
		let block = self.client.get_block(block_id).await?;
		let mut blocks = vec![convert::notion_block_to_portable(&block)];
		if block.has_children {
			let children = self.client.list_block_children(block_id).await?;
			blocks.extend(convert::notion_blocks_to_portable(&children));
		}
		Ok(markdown::render(&blocks))
	}

	async fn user_markdown(&self, user_id: &str) -> SourceResult<String> {
		let user = self.client.get_user(user_id).await?;
		let mut rendered = format!("# {}\n\n", user.name.as_deref().unwrap_or("(unnamed user)"));
		match user.user_type.as_deref() {
			Some("person") => {
				let email = user
					.person
					.as_ref()
					.and_then(|person| person.get("email"))
					.and_then(Value::as_str)
					.unwrap_or("(no email)");
				rendered.push_str(&format!("- type: person\n- email: {email}\n"));
			},
			Some("bot") => rendered.push_str("- type: bot\n"),
			_ => rendered.push_str("- type: unknown\n"),
		}
		Ok(rendered)
	}

	async fn comments_markdown(&self, block_id: &str) -> SourceResult<String> {
		let comments = self.client.list_comments(block_id).await?;
		let mut rendered = String::from("# Comments\n\n");
		for comment in &comments {
			let text = comment
				.get("rich_text")
				.and_then(Value::as_array)
				.map(|parts| {
					parts
						.iter()
						.filter_map(|part| part.get("plain_text").and_then(Value::as_str))
						.collect::<String>()
				})
				.unwrap_or_default();
			rendered.push_str(&format!("- {text}\n"));
		}
		Ok(rendered)
	}

	/// Replace-all page write: the new children are fully built before any
	/// delete is issued, then existing blocks are deleted and the new set
	/// appended. Not atomic; a crash in between loses block identity and
	/// can leave the page partially written.
	async fn replace_page_content(
		&self,
		page_id: &str,
		existing: &[NotionBlock],
		children: Vec<Value>,
	) -> SourceResult<()> {
		for block in existing {
			if let Some(id) = &block.id {
				self.client.delete_block(id).await?;
			}
		}
		if !children.is_empty() {
			self.client.append_block_children(page_id, children).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl ResourceAccessor for NotionSource {
	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn uri_prefix(&self) -> &str {
		&self.uri_prefix
	}

	async fn check_connectivity(&self) -> anyhow::Result<()> {
		self.client.get_self_user().await?;
		Ok(())
	}

	fn is_resource_within_data_source(&self, uri: &str) -> bool {
		self.parse_path(uri).is_ok()
	}

	async fn resource_exists(&self, uri: &str, _options: ExistsOptions) -> bool {
		let Ok((kind, id)) = self.parse_path(uri) else {
			return false;
		};
		match kind {
			NotionResourceKind::Page => self.client.get_page(&id).await.is_ok(),
			NotionResourceKind::Database => self.client.get_database(&id).await.is_ok(),
			NotionResourceKind::Workspace => true,
			NotionResourceKind::Block => self.client.get_block(&id).await.is_ok(),
			NotionResourceKind::User => self.client.get_user(&id).await.is_ok(),
			NotionResourceKind::Comment => self.client.list_comments(&id).await.is_ok(),
		}
	}

	async fn load_resource(&self, uri: &str, _options: LoadOptions) -> SourceResult<LoadedResource> {
		self.ensure_alive()?;
		let (kind, id) = self.parse_path(uri)?;
		let mut metadata = ResourceMetadata { uri: uri.to_string(), ..Default::default() };

		let rendered = match kind {
			NotionResourceKind::Page => {
				let (rendered, page, _) = self.page_markdown(&id).await?;
				metadata.name = Some(page.title());
				metadata.modified_at = page.last_edited_time;
				metadata.created_at = page.created_time;
				rendered
			},
			NotionResourceKind::Database => self.database_markdown(&id).await?,
			NotionResourceKind::Workspace => self.workspace_markdown().await?,
			NotionResourceKind::Block => self.block_markdown(&id).await?,
			NotionResourceKind::User => self.user_markdown(&id).await?,
			NotionResourceKind::Comment => self.comments_markdown(&id).await?,
		};
		metadata.size = Some(rendered.len() as u64);
		metadata.mime_type = Some("text/markdown".to_string());

		Ok(LoadedResource { content: ResourceContent::Text(rendered), metadata, is_partial: false })
	}

	async fn list_resources(&self, options: ListOptions) -> SourceResult<ResourceListing> {
		self.ensure_alive()?;
		let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		let mut resources = Vec::with_capacity(page_size);

		// The synthetic workspace entry is interleaved at offset 0 of the
		// first page and counts against the page size.
		let fetch_size = if options.page_token.is_none() {
			resources.push(ResourceMetadata {
				uri: self.uri_for("workspace", &self.workspace_id),
				name: Some("Workspace".to_string()),
				is_directory: true,
				..Default::default()
			});
			page_size.saturating_sub(1)
		} else {
			page_size
		};

		let list = self.client.search("", options.page_token.as_deref(), fetch_size).await?;
		for result in &list.results {
			if let Some(entry) = search_result_to_metadata(result, &self.uri_prefix) {
				resources.push(entry);
			}
		}
		let pagination = list
			.has_more
			.then_some(list.next_cursor)
			.flatten()
			.map(|cursor| Pagination { next_page_token: cursor });
		Ok(ResourceListing { resources, pagination })
	}

	async fn search_resources(
		&self,
		query: &str,
		options: SearchOptions,
	) -> SourceResult<SearchReply> {
		self.ensure_alive()?;
		let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		let content_pattern = match &options.content_pattern {
			Some(pattern) => Some(Regex::new(pattern).map_err(|err| {
				SourceError::new(
					SourceErrorKind::InvalidQuery,
					Arc::new(anyhow::anyhow!("bad content pattern `{pattern}`: {err}")),
				)
			})?),
			None => None,
		};

		let mut matches = Vec::new();
		let mut errors: Vec<String> = Vec::new();
		let mut cursor: Option<String> = None;
		'pages: loop {
			self.ensure_alive()?;
			let list = self.client.search(query, cursor.as_deref(), DEFAULT_PAGE_SIZE).await?;
			for result in &list.results {
				if matches.len() >= page_size {
					break 'pages;
				}
				let Some(entry) = search_result_to_metadata(result, &self.uri_prefix) else {
					continue;
				};
				if let (Some(after), Some(modified)) = (options.date_after, entry.modified_at) {
					if modified < after {
						continue;
					}
				}
				if let (Some(before), Some(modified)) = (options.date_before, entry.modified_at) {
					if modified > before {
						continue;
					}
				}

				let mut snippets = Vec::new();
				if let Some(pattern) = &content_pattern {
					// Content filtering loads every candidate page; used
					// sparingly because it multiplies API calls.
					if !entry.uri.contains("page/") {
						continue;
					}
					let page_id = entry.uri.rsplit('/').next().unwrap_or_default().to_string();
					match self.page_markdown(&page_id).await {
						Ok((rendered, _, _)) => {
							let Some(found) = pattern.find(&rendered) else {
								continue;
							};
							snippets.push(snippet_around(
								&rendered,
								found.start(),
								found.end(),
								SNIPPET_CONTEXT_CHARS,
							));
						},
						Err(err) => {
							warn!(page_id = page_id, error = ?err, "skipping page during content search");
							errors.push(format!("{page_id}: {err}"));
							continue;
						},
					}
				}
				matches.push(SearchMatch {
					uri: entry.uri,
					title: entry.name,
					snippets,
					modified_at: entry.modified_at,
				});
			}
			if !list.has_more {
				break;
			}
			cursor = list.next_cursor;
			if cursor.is_none() {
				break;
			}
		}

		let total_matches = matches.len();
		let error_message = if errors.is_empty() {
			None
		} else {
			Some(format!("search skipped unreadable pages: {}", errors.join("; ")))
		};
		Ok(SearchReply { matches, total_matches, error_message })
	}

	async fn edit_resource(
		&self,
		resource_path: &str,
		operations: &[BlockOperation],
		_options: EditOptions,
	) -> SourceResult<EditReply> {
		self.ensure_alive()?;
		let (kind, page_id) = self.parse_path(resource_path)?;
		if kind != NotionResourceKind::Page {
			return Err(SourceError::unsupported("editResource on non-page notion resources"));
		}

		let page = self.client.get_page(&page_id).await?;
		let existing = self.client.list_block_children(&page_id).await?;
		let portable = convert::notion_blocks_to_portable(&existing);
		let (edited, operation_results) = apply(portable, operations);

		if operation_results.iter().any(|result| result.success) {
			let children = convert::portable_to_notion_blocks(&edited);
			debug!(page_id = %page_id, blocks = children.len(), "replacing notion page content");
			self.replace_page_content(&page_id, &existing, children).await?;
		}

		Ok(EditReply {
			operation_results,
			metadata: ResourceMetadata {
				uri: self.uri_for("page", &page_id),
				name: Some(page.title()),
				modified_at: page.last_edited_time,
				..Default::default()
			},
		})
	}

	async fn delete_resource(
		&self,
		uri: &str,
		_options: DeleteOptions,
	) -> SourceResult<DeleteReply> {
		self.ensure_alive()?;
		let (kind, id) = self.parse_path(uri)?;
		let resource_kind = match kind {
			NotionResourceKind::Page => {
				// The API has no hard delete for pages; archiving is it.
				self.client.archive_page(&id).await?;
				ResourceKind::Page
			},
			NotionResourceKind::Block => {
				self.client.delete_block(&id).await?;
				ResourceKind::Block
			},
			_ => return Err(SourceError::unsupported("deleteResource on this notion resource kind")),
		};
		Ok(DeleteReply { success: true, uri: uri.to_string(), resource_kind })
	}

	async fn get_metadata(&self) -> DataSourceMetadata {
		let mut metadata = DataSourceMetadata::default();
		match self.client.search("", None, DEFAULT_PAGE_SIZE).await {
			Ok(list) => {
				let pages = list
					.results
					.iter()
					.filter(|result| result.get("object").and_then(Value::as_str) == Some("page"))
					.count() as u64;
				let databases = list.results.len() as u64 - pages;
				metadata.resource_count = Some(pages);
				metadata.directory_count = Some(databases);
				if list.has_more {
					metadata.notes.push("workspace listing truncated at first page".to_string());
				}
			},
			Err(err) => {
				warn!(error = ?err, "notion metadata collection failed");
				metadata.notes.push("(metadata unavailable)".to_string());
			},
		}
		metadata
	}
}

fn search_result_to_metadata(result: &Value, uri_prefix: &str) -> Option<ResourceMetadata> {
	let object = result.get("object").and_then(Value::as_str)?;
	let id = result.get("id").and_then(Value::as_str)?;
	let modified_at = result
		.get("last_edited_time")
		.and_then(Value::as_str)
		.and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
	match object {
		"page" => {
			let page: NotionPage = serde_json::from_value(result.clone()).ok()?;
			Some(ResourceMetadata {
				uri: format!("{uri_prefix}page/{id}"),
				name: Some(page.title()),
				modified_at,
				..Default::default()
			})
		},
		"database" => {
			let title = result
				.get("title")
				.and_then(Value::as_array)
				.map(|parts| {
					parts
						.iter()
						.filter_map(|part| part.get("plain_text").and_then(Value::as_str))
						.collect::<String>()
				})
				.unwrap_or_default();
			Some(ResourceMetadata {
				uri: format!("{uri_prefix}database/{id}"),
				name: Some(title),
				is_directory: true,
				modified_at,
				..Default::default()
			})
		},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::WriteOptions;
	use serde_json::json;
	use wiremock::{
		matchers::{method, path},
		Mock, MockServer, ResponseTemplate,
	};

	const PREFIX: &str = "bb+notion+team-wiki://";

	fn source_for(server: &MockServer) -> NotionSource {
		NotionSource::with_client(
			NotionApiClient::with_base_url("secret-key".to_string(), server.uri()),
			NotionConfig { workspace_id: "ws-1".to_string() },
			PREFIX.to_string(),
			TerminateSignal::default(),
		)
	}

	fn page_payload() -> Value {
		json!({
			"object": "page",
			"id": "p1",
			"last_edited_time": "2024-03-01T10:00:00Z",
			"properties": {
				"Name": { "type": "title", "title": [{ "plain_text": "My Page" }] }
			}
		})
	}

	fn children_payload() -> Value {
		json!({
			"results": [
				{
					"object": "block",
					"id": "b1",
					"type": "heading_1",
					"heading_1": { "rich_text": [{ "plain_text": "Title" }] }
				},
				{
					"object": "block",
					"id": "b2",
					"type": "paragraph",
					"paragraph": { "rich_text": [{ "plain_text": "hello" }] }
				}
			],
			"has_more": false
		})
	}

	#[tokio::test]
	async fn test_load_page_renders_markdown() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/pages/p1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(page_payload()))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/blocks/p1/children"))
			.respond_with(ResponseTemplate::new(200).set_body_json(children_payload()))
			.mount(&server)
			.await;

		let source = source_for(&server);
		let loaded =
			source.load_resource(&format!("{PREFIX}page/p1"), LoadOptions::default()).await.unwrap();
		let text = loaded.content.as_text().unwrap();
		assert!(text.contains("# My Page"));
		assert!(text.contains("# Title"));
		assert!(text.contains("hello"));
		assert_eq!(loaded.metadata.name.as_deref(), Some("My Page"));
		assert!(!loaded.is_partial);
	}

	#[tokio::test]
	async fn test_load_unknown_kind_is_invalid_uri() {
		let server = MockServer::start().await;
		let source = source_for(&server);
		let err = source
			.load_resource(&format!("{PREFIX}widget/x1"), LoadOptions::default())
			.await
			.unwrap_err();
		assert_eq!(err.kind(), SourceErrorKind::InvalidUri);
	}

	#[tokio::test]
	async fn test_edit_replaces_span_text_and_rewrites_page() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/pages/p1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(page_payload()))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/blocks/p1/children"))
			.respond_with(ResponseTemplate::new(200).set_body_json(children_payload()))
			.mount(&server)
			.await;
		Mock::given(method("DELETE"))
			.and(path("/blocks/b1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("DELETE"))
			.and(path("/blocks/b2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("PATCH"))
			.and(path("/blocks/p1/children"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
			.expect(1)
			.mount(&server)
			.await;

		let source = source_for(&server);
		let reply = source
			.edit_resource(
				"page/p1",
				&[BlockOperation::ReplaceSpanText {
					block_key: "b2".to_string(),
					span_key: "b2-s0".to_string(),
					search: "hello".to_string(),
					replace: "world".to_string(),
					regex: false,
				}],
				EditOptions::default(),
			)
			.await
			.unwrap();
		assert_eq!(reply.operation_results.len(), 1);
		assert!(reply.operation_results[0].success);

		let requests = server.received_requests().await.unwrap();
		let append = requests
			.iter()
			.find(|request| request.method.as_str() == "PATCH")
			.expect("append request issued");
		let body: Value = serde_json::from_slice(&append.body).unwrap();
		let rendered = body.to_string();
		assert!(rendered.contains("world"));
		assert!(!rendered.contains("hello"));
	}

	#[tokio::test]
	async fn test_failed_operations_do_not_rewrite_page() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/pages/p1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(page_payload()))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/blocks/p1/children"))
			.respond_with(ResponseTemplate::new(200).set_body_json(children_payload()))
			.mount(&server)
			.await;

		let source = source_for(&server);
		let reply = source
			.edit_resource(
				"page/p1",
				&[BlockOperation::Delete { index: 99 }],
				EditOptions::default(),
			)
			.await
			.unwrap();
		assert!(!reply.operation_results[0].success);
		// No DELETE or PATCH issued.
		let requests = server.received_requests().await.unwrap();
		assert!(requests.iter().all(|request| request.method.as_str() == "GET"));
	}

	#[tokio::test]
	async fn test_write_is_capability_unsupported() {
		let server = MockServer::start().await;
		let source = source_for(&server);
		let err = source
			.write_resource(
				&format!("{PREFIX}page/p1"),
				ResourceContent::Text("raw".into()),
				WriteOptions::default(),
			)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), SourceErrorKind::CapabilityUnsupported);
		assert!(!source.has_capability(SourceCapability::Write));
	}

	#[tokio::test]
	async fn test_delete_archives_page() {
		let server = MockServer::start().await;
		Mock::given(method("PATCH"))
			.and(path("/pages/p1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
			.expect(1)
			.mount(&server)
			.await;
		let source = source_for(&server);
		let reply = source
			.delete_resource(&format!("{PREFIX}page/p1"), DeleteOptions::default())
			.await
			.unwrap();
		assert_eq!(reply.resource_kind, ResourceKind::Page);

		let requests = server.received_requests().await.unwrap();
		let archive = &requests[0];
		let body: Value = serde_json::from_slice(&archive.body).unwrap();
		assert_eq!(body["archived"], true);
	}

	#[tokio::test]
	async fn test_list_interleaves_workspace_entry() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/search"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"results": [page_payload()],
				"has_more": false
			})))
			.mount(&server)
			.await;

		let source = source_for(&server);
		let listing = source
			.list_resources(ListOptions { page_size: Some(2), ..Default::default() })
			.await
			.unwrap();
		assert_eq!(listing.resources.len(), 2);
		assert_eq!(listing.resources[0].uri, format!("{PREFIX}workspace/ws-1"));
		assert!(listing.resources[0].is_directory);
		assert_eq!(listing.resources[1].uri, format!("{PREFIX}page/p1"));

		// The synthetic entry counted against the page size: only one real
		// result was requested.
		let requests = server.received_requests().await.unwrap();
		let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert_eq!(body["page_size"], 1);
	}

	#[tokio::test]
	async fn test_search_applies_date_filter() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/search"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"results": [
					{
						"object": "page",
						"id": "old",
						"last_edited_time": "2020-01-01T00:00:00Z",
						"properties": {}
					},
					{
						"object": "page",
						"id": "new",
						"last_edited_time": "2024-06-01T00:00:00Z",
						"properties": {}
					}
				],
				"has_more": false
			})))
			.mount(&server)
			.await;

		let source = source_for(&server);
		let reply = source
			.search_resources(
				"anything",
				SearchOptions {
					date_after: Some("2023-01-01T00:00:00Z".parse().unwrap()),
					..Default::default()
				},
			)
			.await
			.unwrap();
		assert_eq!(reply.total_matches, 1);
		assert!(reply.matches[0].uri.ends_with("page/new"));
	}
}
