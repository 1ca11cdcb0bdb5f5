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
	Capabilities, EditCapability, GoogleDocsConfig, LoadCapability, SearchCapability,
	SourceCapability, SourceUri, TerminateSignal,
};
use portabletext::{apply, markdown, BlockOperation};
use serde_json::{json, Value};
use tracing::debug;

use super::{
	client::GoogleApiClient,
	convert::{self, GoogleDoc},
};
use crate::{
	DataSourceMetadata, DeleteOptions, DeleteReply, EditOptions, EditReply, ExistsOptions,
	ListOptions, LoadOptions, LoadedResource, Pagination, ResourceAccessor, ResourceContent,
	ResourceKind, ResourceListing, ResourceMetadata, SearchMatch, SearchOptions, SearchReply,
	SourceError, SourceErrorKind, SourceResult, WriteOptions, WriteReply,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";
const DRIVE_FILE_FIELDS: &str =
	"files(id,name,mimeType,modifiedTime,createdTime,size),nextPageToken";

pub fn googledocs_capabilities() -> Capabilities {
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
			EditCapability::ParagraphFormatting,
			EditCapability::Tables,
		],
		[SearchCapability::TextSearch, SearchCapability::StructuredQuerySearch],
	)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DocsResourceKind {
	Document,
	Folder,
	Search,
	Drive,
}

impl DocsResourceKind {
	fn parse(value: &str) -> Option<Self> {
		match value {
			"document" => Some(DocsResourceKind::Document),
			"folder" => Some(DocsResourceKind::Folder),
			"search" => Some(DocsResourceKind::Search),
			"drive" => Some(DocsResourceKind::Drive),
			_ => None,
		}
	}
}

/// Accessor for one Google Docs connection: Docs v1 for document bodies,
/// Drive v3 for listing, search and delete.
#[derive(Debug)]
pub struct GoogleDocsSource {
	client: Arc<GoogleApiClient>,
	uri_prefix: String,
	capabilities: Capabilities,
	folder_id: Option<String>,
	drive_id: Option<String>,
	terminate_sig: TerminateSignal,
}

impl GoogleDocsSource {
	pub fn new(
		config: GoogleDocsConfig,
		client: Arc<GoogleApiClient>,
		uri_prefix: String,
		terminate_sig: TerminateSignal,
	) -> Self {
		GoogleDocsSource {
			client,
			uri_prefix,
			capabilities: googledocs_capabilities(),
			folder_id: config.folder_id,
			drive_id: config.drive_id,
			terminate_sig,
		}
	}

	fn ensure_alive(&self) -> SourceResult<()> {
		if self.terminate_sig.is_dead() {
			return Err(SourceError::cancelled());
		}
		Ok(())
	}

	fn parse_path(&self, uri_or_path: &str) -> SourceResult<(DocsResourceKind, String)> {
		let resource_path = if SourceUri::is_prefixed(uri_or_path) {
			SourceUri::resource_path_for(&self.uri_prefix, uri_or_path)?
		} else {
			uri_or_path.to_string()
		};
		let (kind, id) = resource_path.split_once('/').ok_or_else(|| {
			SourceError::new(
				SourceErrorKind::InvalidUri,
				Arc::new(anyhow::anyhow!(
					"googledocs resource path must be `<kind>/<id>`, got `{resource_path}`"
				)),
			)
		})?;
		let kind = DocsResourceKind::parse(kind).ok_or_else(|| {
			SourceError::new(
				SourceErrorKind::InvalidUri,
				Arc::new(anyhow::anyhow!("unknown googledocs resource kind `{kind}`")),
			)
		})?;
		Ok((kind, id.to_string()))
	}

	async fn fetch_document(&self, document_id: &str) -> SourceResult<GoogleDoc> {
		let value = self.client.get_json(&self.client.docs_url(&format!("/documents/{document_id}"))).await?;
		Ok(serde_json::from_value(value)?)
	}

	async fn fetch_drive_metadata(&self, file_id: &str) -> SourceResult<Value> {
		self.client
			.get_json(&self.client.drive_url(&format!(
				"/files/{file_id}?fields=id,name,mimeType,modifiedTime,createdTime,size"
			)))
			.await
	}

	/// One page of a Drive file query.
	async fn drive_query(
		&self,
		query: &str,
		page_size: usize,
		page_token: Option<&str>,
	) -> SourceResult<Value> {
		let mut url = format!(
			"{}?q={}&pageSize={}&fields={}",
			self.client.drive_url("/files"),
			urlencoding::encode(query),
			page_size,
			urlencoding::encode(DRIVE_FILE_FIELDS),
		);
		if let Some(drive_id) = &self.drive_id {
			url.push_str(&format!(
				"&driveId={drive_id}&corpora=drive&includeItemsFromAllDrives=true&supportsAllDrives=true"
			));
		}
		if let Some(token) = page_token {
			url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
		}
		self.client.get_json(&url).await
	}

	fn documents_query(&self, extra: Option<&str>) -> String {
		let mut query = format!("mimeType='{DOCUMENT_MIME_TYPE}' and trashed=false");
		if let Some(folder_id) = &self.folder_id {
			query.push_str(&format!(" and '{folder_id}' in parents"));
		}
		if let Some(extra) = extra {
			query.push_str(&format!(" and {extra}"));
		}
		query
	}

	async fn document_markdown(&self, document_id: &str) -> SourceResult<(String, GoogleDoc, Value)> {
		let doc = self.fetch_document(document_id).await?;
		let drive_metadata = self.fetch_drive_metadata(document_id).await.unwrap_or(Value::Null);
		let portable = convert::doc_to_portable(&doc);
		let mut rendered = String::new();
		if !doc.title.is_empty() {
			rendered.push_str(&format!("# {}\n\n", doc.title));
		}
		if let Some(modified) = drive_metadata.get("modifiedTime").and_then(Value::as_str) {
			rendered.push_str(&format!("*Last modified: {modified}*\n\n"));
		}
		rendered.push_str(&markdown::render(&portable));
		Ok((rendered, doc, drive_metadata))
	}

	async fn folder_markdown(&self, folder_id: &str) -> SourceResult<String> {
		let query =
			format!("mimeType='{DOCUMENT_MIME_TYPE}' and '{folder_id}' in parents and trashed=false");
		let reply = self.drive_query(&query, DEFAULT_PAGE_SIZE, None).await?;
		let mut rendered = String::from("# Folder contents\n\n");
		for file in reply.get("files").and_then(Value::as_array).into_iter().flatten() {
			rendered.push_str(&format!(
				"- {} ({})\n",
				file.get("name").and_then(Value::as_str).unwrap_or("(unnamed)"),
				file.get("id").and_then(Value::as_str).unwrap_or_default(),
			));
		}
		Ok(rendered)
	}

	async fn drive_overview_markdown(&self) -> SourceResult<String> {
		let reply = self.drive_query(&self.documents_query(None), 20, None).await?;
		let mut rendered = String::from("# Drive overview\n\n## Recent documents\n\n");
		for file in reply.get("files").and_then(Value::as_array).into_iter().flatten() {
			rendered.push_str(&format!(
				"- {} (modified {})\n",
				file.get("name").and_then(Value::as_str).unwrap_or("(unnamed)"),
				file.get("modifiedTime").and_then(Value::as_str).unwrap_or("unknown"),
			));
		}
		Ok(rendered)
	}

	async fn batch_update(&self, document_id: &str, requests: Vec<Value>) -> SourceResult<()> {
		if requests.is_empty() {
			return Ok(());
		}
		debug!(document_id = document_id, requests = requests.len(), "docs batchUpdate");
		self.client
			.post_json(
				&self.client.docs_url(&format!("/documents/{document_id}:batchUpdate")),
				&json!({ "requests": requests }),
			)
			.await?;
		Ok(())
	}

	fn file_to_metadata(&self, file: &Value) -> ResourceMetadata {
		let id = file.get("id").and_then(Value::as_str).unwrap_or_default();
		ResourceMetadata {
			uri: format!("{}document/{id}", self.uri_prefix),
			name: file.get("name").and_then(Value::as_str).map(str::to_string),
			mime_type: file.get("mimeType").and_then(Value::as_str).map(str::to_string),
			size: file
				.get("size")
				.and_then(Value::as_str)
				.and_then(|size| size.parse::<u64>().ok()),
			is_directory: false,
			created_at: parse_rfc3339(file.get("createdTime")),
			modified_at: parse_rfc3339(file.get("modifiedTime")),
			note: None,
		}
	}
}

fn parse_rfc3339(value: Option<&Value>) -> Option<DateTime<Utc>> {
	value.and_then(Value::as_str).and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
}

#[async_trait]
impl ResourceAccessor for GoogleDocsSource {
	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn uri_prefix(&self) -> &str {
		&self.uri_prefix
	}

	async fn check_connectivity(&self) -> anyhow::Result<()> {
		self.drive_query(&self.documents_query(None), 1, None).await?;
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
			DocsResourceKind::Document => self.fetch_drive_metadata(&id).await.is_ok(),
			DocsResourceKind::Folder => self
				.client
				.get_json(&self.client.drive_url(&format!("/files/{id}?fields=id,mimeType")))
				.await
				.is_ok(),
			DocsResourceKind::Search | DocsResourceKind::Drive => true,
		}
	}

	async fn load_resource(&self, uri: &str, _options: LoadOptions) -> SourceResult<LoadedResource> {
		self.ensure_alive()?;
		let (kind, id) = self.parse_path(uri)?;
		let mut metadata = ResourceMetadata { uri: uri.to_string(), ..Default::default() };

		let rendered = match kind {
			DocsResourceKind::Document => {
				let (rendered, doc, drive_metadata) = self.document_markdown(&id).await?;
				metadata.name = Some(doc.title.clone());
				metadata.modified_at = parse_rfc3339(drive_metadata.get("modifiedTime"));
				metadata.created_at = parse_rfc3339(drive_metadata.get("createdTime"));
				rendered
			},
			DocsResourceKind::Folder => self.folder_markdown(&id).await?,
			DocsResourceKind::Search => {
				let query = urlencoding::decode(&id)
					.map_err(|err| {
						SourceError::new(
							SourceErrorKind::InvalidUri,
							Arc::new(anyhow::anyhow!("bad urlencoded search query: {err}")),
						)
					})?
					.into_owned();
				let reply = self
					.drive_query(
						&self.documents_query(Some(&format!(
							"fullText contains '{}'",
							query.replace('\'', "\\'")
						))),
						DEFAULT_PAGE_SIZE,
						None,
					)
					.await?;
				let mut rendered = format!("# Search results for `{query}`\n\n");
				for file in reply.get("files").and_then(Value::as_array).into_iter().flatten() {
					rendered.push_str(&format!(
						"- {} ({})\n",
						file.get("name").and_then(Value::as_str).unwrap_or("(unnamed)"),
						file.get("id").and_then(Value::as_str).unwrap_or_default(),
					));
				}
				rendered
			},
			DocsResourceKind::Drive => self.drive_overview_markdown().await?,
		};
		metadata.size = Some(rendered.len() as u64);
		metadata.mime_type = Some("text/markdown".to_string());

		Ok(LoadedResource { content: ResourceContent::Text(rendered), metadata, is_partial: false })
	}

	async fn list_resources(&self, options: ListOptions) -> SourceResult<ResourceListing> {
		self.ensure_alive()?;
		let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		let reply = self
			.drive_query(&self.documents_query(None), page_size, options.page_token.as_deref())
			.await?;
		let resources = reply
			.get("files")
			.and_then(Value::as_array)
			.into_iter()
			.flatten()
			.map(|file| self.file_to_metadata(file))
			.collect();
		let pagination = reply
			.get("nextPageToken")
			.and_then(Value::as_str)
			.map(|token| Pagination { next_page_token: token.to_string() });
		Ok(ResourceListing { resources, pagination })
	}

	async fn search_resources(
		&self,
		query: &str,
		options: SearchOptions,
	) -> SourceResult<SearchReply> {
		self.ensure_alive()?;
		let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		let drive_query = if query.is_empty() {
			self.documents_query(None)
		} else {
			self.documents_query(Some(&format!(
				"fullText contains '{}'",
				query.replace('\'', "\\'")
			)))
		};
		let reply = self.drive_query(&drive_query, page_size, None).await?;

		let mut matches = Vec::new();
		for file in reply.get("files").and_then(Value::as_array).into_iter().flatten() {
			let entry = self.file_to_metadata(file);
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
			matches.push(SearchMatch {
				uri: entry.uri,
				title: entry.name,
				snippets: Vec::new(),
				modified_at: entry.modified_at,
			});
		}
		let total_matches = matches.len();
		Ok(SearchReply { matches, total_matches, error_message: None })
	}

	async fn write_resource(
		&self,
		uri: &str,
		content: ResourceContent,
		_options: WriteOptions,
	) -> SourceResult<WriteReply> {
		self.ensure_alive()?;
		if !self.has_capability(SourceCapability::Write) {
			return Err(SourceError::unsupported("writeResource"));
		}
		let (kind, document_id) = self.parse_path(uri)?;
		if kind != DocsResourceKind::Document {
			return Err(SourceError::unsupported("writeResource on non-document resources"));
		}
		let doc = self.fetch_document(&document_id).await?;
		let requests = match &content {
			ResourceContent::Text(text) => convert::text_to_batch_requests(text, doc.end_index()),
			ResourceContent::Blocks(blocks) =>
				convert::portable_to_batch_requests(blocks, doc.end_index()),
			ResourceContent::Bytes(_) =>
				return Err(SourceError::unsupported("writeResource with binary content")),
		};
		let bytes_written = content.byte_len();
		self.batch_update(&document_id, requests).await?;
		Ok(WriteReply {
			success: true,
			uri: uri.to_string(),
			metadata: ResourceMetadata { uri: uri.to_string(), ..Default::default() },
			bytes_written,
		})
	}

	async fn edit_resource(
		&self,
		resource_path: &str,
		operations: &[BlockOperation],
		_options: EditOptions,
	) -> SourceResult<EditReply> {
		self.ensure_alive()?;
		let (kind, document_id) = self.parse_path(resource_path)?;
		if kind != DocsResourceKind::Document {
			return Err(SourceError::unsupported("editResource on non-document resources"));
		}

		let doc = self.fetch_document(&document_id).await?;
		let portable = convert::doc_to_portable(&doc);
		let (edited, operation_results) = apply(portable, operations);

		if operation_results.iter().any(|result| result.success) {
			let requests = convert::portable_to_batch_requests(&edited, doc.end_index());
			self.batch_update(&document_id, requests).await?;
		}

		Ok(EditReply {
			operation_results,
			metadata: ResourceMetadata {
				uri: format!("{}document/{document_id}", self.uri_prefix),
				name: Some(doc.title.clone()),
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
		if kind != DocsResourceKind::Document {
			return Err(SourceError::unsupported("deleteResource on non-document resources"));
		}
		self.client.delete(&self.client.drive_url(&format!("/files/{id}"))).await?;
		Ok(DeleteReply { success: true, uri: uri.to_string(), resource_kind: ResourceKind::Document })
	}

	async fn get_metadata(&self) -> DataSourceMetadata {
		let mut metadata = DataSourceMetadata::default();
		match self.drive_query(&self.documents_query(None), DEFAULT_PAGE_SIZE, None).await {
			Ok(reply) => {
				let files = reply.get("files").and_then(Value::as_array).cloned().unwrap_or_default();
				metadata.resource_count = Some(files.len() as u64);
				metadata.newest_modified = files
					.iter()
					.filter_map(|file| parse_rfc3339(file.get("modifiedTime")))
					.max();
				metadata.oldest_modified = files
					.iter()
					.filter_map(|file| parse_rfc3339(file.get("modifiedTime")))
					.min();
				if reply.get("nextPageToken").is_some() {
					metadata.notes.push("drive listing truncated at first page".to_string());
				}
			},
			Err(err) => {
				metadata.notes.push(format!("(metadata unavailable): {err}"));
			},
		}
		metadata
	}
}
