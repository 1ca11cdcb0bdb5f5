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

use std::{
	io::SeekFrom,
	path::{Component, Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
	validate_relative_path, Capabilities, EditCapability, FilesystemConfig, LoadCapability,
	SearchCapability, SourceCapability, SourceUri, TerminateSignal,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use portabletext::{apply, Block, BlockOperation, BlockStyle, Span, TextBlock};
use regex::RegexBuilder;
use tokio::{
	fs,
	io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::warn;

use super::scan;
use crate::{
	DataSourceMetadata, DeleteOptions, DeleteReply, EditOptions, EditReply, ExistsOptions,
	ListOptions, LoadOptions, LoadedResource, MoveOptions, MoveReply, Pagination, ResourceAccessor,
	ResourceContent, ResourceKind, ResourceListing, ResourceMetadata, SearchMatch, SearchOptions,
	SearchReply, SourceError, SourceErrorKind, SourceResult, WriteOptions, WriteReply,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_SEARCH_PAGE_SIZE: usize = 50;
const DEFAULT_LIST_DEPTH: usize = 10;
const MAX_SNIPPETS_PER_FILE: usize = 5;
const SNIPPET_CONTEXT_CHARS: usize = 40;

/// Stable keys for the single-block view of a plain text file, so edit
/// operations can address file content without a prior load.
const FILE_BLOCK_KEY: &str = "content";
const FILE_SPAN_KEY: &str = "content";

/// The capability surface every filesystem connection advertises.
pub fn filesystem_capabilities() -> Capabilities {
	Capabilities::new(
		[
			SourceCapability::Read,
			SourceCapability::Write,
			SourceCapability::List,
			SourceCapability::Search,
			SourceCapability::Move,
			SourceCapability::Delete,
		],
		[LoadCapability::PlainText, LoadCapability::Both],
		[EditCapability::SearchReplaceOperations, EditCapability::RangeOperations],
		[SearchCapability::TextSearch, SearchCapability::RegexSearch],
	)
}

/// Accessor for one local directory tree. All resource paths are relative
/// to the configured root; anything that would escape it is refused.
#[derive(Clone)]
pub struct FileSystemSource {
	root: PathBuf,
	uri_prefix: String,
	capabilities: Capabilities,
	strict_root: bool,
	follow_symlinks: bool,
	terminate_sig: TerminateSignal,
}

impl std::fmt::Debug for FileSystemSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FileSystemSource")
			.field("root", &self.root)
			.field("uri_prefix", &self.uri_prefix)
			.finish()
	}
}

impl FileSystemSource {
	pub fn new(
		config: FilesystemConfig,
		uri_prefix: String,
		terminate_sig: TerminateSignal,
	) -> anyhow::Result<Self> {
		let root = config.data_source_root.canonicalize().map_err(|err| {
			anyhow::anyhow!(
				"data source root `{}` is not accessible: {err}",
				config.data_source_root.display()
			)
		})?;
		if !root.is_dir() {
			return Err(anyhow::anyhow!("data source root `{}` is not a directory", root.display()));
		}
		Ok(FileSystemSource {
			root,
			uri_prefix,
			capabilities: filesystem_capabilities(),
			strict_root: config.strict_root,
			follow_symlinks: config.follow_symlinks,
			terminate_sig,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn ensure_alive(&self) -> SourceResult<()> {
		if self.terminate_sig.is_dead() {
			return Err(SourceError::cancelled());
		}
		Ok(())
	}

	/// Resolves a URI or bare resource path to an absolute path confined
	/// to the root. Rejects mis-prefixed URIs, absolute paths, `..`
	/// segments, and (under `strict_root`) symlink escapes.
	fn resolve(&self, uri_or_path: &str) -> SourceResult<PathBuf> {
		let resource_path = if SourceUri::is_prefixed(uri_or_path) {
			SourceUri::resource_path_for(&self.uri_prefix, uri_or_path)?
		} else {
			uri_or_path.to_string()
		};
		validate_relative_path(&resource_path)?;

		let mut resolved = self.root.clone();
		for component in Path::new(&resource_path).components() {
			match component {
				Component::Normal(part) => resolved.push(part),
				Component::CurDir => {},
				// `..` and absolute components were rejected above.
				_ =>
					return Err(SourceError::new(
						SourceErrorKind::InvalidUri,
						Arc::new(anyhow::anyhow!("unexpected component in `{resource_path}`")),
					)),
			}
		}

		if self.strict_root {
			// Re-check against the real path once the target (or its parent)
			// exists, so symlinks cannot smuggle operations outside the root.
			let check_target = if resolved.exists() {
				Some(resolved.clone())
			} else {
				resolved.parent().filter(|parent| parent.exists()).map(Path::to_path_buf)
			};
			if let Some(target) = check_target {
				let canonical = target.canonicalize().map_err(SourceError::from)?;
				if !canonical.starts_with(&self.root) {
					return Err(SourceError::new(
						SourceErrorKind::InvalidUri,
						Arc::new(anyhow::anyhow!(
							"resource path `{resource_path}` escapes the data source root"
						)),
					));
				}
			}
		}
		Ok(resolved)
	}

	fn uri_for(&self, path: &Path) -> String {
		let relative = path.strip_prefix(&self.root).unwrap_or(path);
		format!("{}{}", self.uri_prefix, relative.to_string_lossy())
	}

	async fn metadata_for(&self, path: &Path) -> ResourceMetadata {
		let uri = self.uri_for(path);
		let name = path.file_name().map(|name| name.to_string_lossy().to_string());
		match fs::metadata(path).await {
			Ok(stat) => ResourceMetadata {
				uri,
				name,
				mime_type: None,
				size: Some(stat.len()),
				is_directory: stat.is_dir(),
				created_at: stat.created().ok().map(DateTime::<Utc>::from),
				modified_at: stat.modified().ok().map(DateTime::<Utc>::from),
				note: None,
			},
			Err(err) => {
				warn!(path = %path.display(), error = ?err, "cannot stat resource");
				ResourceMetadata {
					uri,
					name,
					note: Some("(metadata unavailable)".to_string()),
					..Default::default()
				}
			},
		}
	}

	fn content_bytes(content: &ResourceContent) -> Vec<u8> {
		match content {
			ResourceContent::Text(text) => text.as_bytes().to_vec(),
			ResourceContent::Bytes(bytes) => bytes.clone(),
			// Block content lands on disk as its Markdown rendering.
			ResourceContent::Blocks(blocks) => portabletext::markdown::render(blocks).into_bytes(),
		}
	}

	fn file_blocks(text: String) -> Vec<Block> {
		let mut block = TextBlock::new(BlockStyle::Normal, Vec::new());
		block.key = FILE_BLOCK_KEY.to_string();
		let mut span = Span::new(text);
		span.key = FILE_SPAN_KEY.to_string();
		block.children.push(span);
		vec![Block::Text(block)]
	}
}

#[async_trait]
impl ResourceAccessor for FileSystemSource {
	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	fn uri_prefix(&self) -> &str {
		&self.uri_prefix
	}

	async fn check_connectivity(&self) -> anyhow::Result<()> {
		let mut entries = fs::read_dir(&self.root).await?;
		entries.next_entry().await?;
		Ok(())
	}

	fn is_resource_within_data_source(&self, uri: &str) -> bool {
		self.resolve(uri).is_ok()
	}

	async fn resource_exists(&self, uri: &str, options: ExistsOptions) -> bool {
		let Ok(path) = self.resolve(uri) else {
			return false;
		};
		match fs::metadata(&path).await {
			Ok(stat) => match options.is_file {
				Some(true) => stat.is_file(),
				Some(false) => stat.is_dir(),
				None => true,
			},
			Err(_) => false,
		}
	}

	async fn ensure_resource_path_exists(&self, uri: &str) -> SourceResult<()> {
		self.ensure_alive()?;
		let path = self.resolve(uri)?;
		let directory = if uri.ends_with('/') { path.as_path() } else {
			path.parent().unwrap_or(self.root.as_path())
		};
		fs::create_dir_all(directory).await.map_err(SourceError::from)?;
		Ok(())
	}

	async fn load_resource(&self, uri: &str, options: LoadOptions) -> SourceResult<LoadedResource> {
		self.ensure_alive()?;
		let path = self.resolve(uri)?;
		let stat = fs::metadata(&path).await.map_err(SourceError::from)?;
		if stat.is_dir() {
			return Err(SourceError::new(
				SourceErrorKind::Io,
				Arc::new(anyhow::anyhow!("`{uri}` is a directory; use listResources")),
			));
		}

		let is_partial = options.range.is_some();
		let bytes = match &options.range {
			Some(range) => {
				let mut file = fs::File::open(&path).await.map_err(SourceError::from)?;
				file.seek(SeekFrom::Start(range.start)).await.map_err(SourceError::from)?;
				let capacity = range.end.saturating_sub(range.start);
				let mut buffer = Vec::with_capacity(capacity as usize);
				file.take(capacity).read_to_end(&mut buffer).await.map_err(SourceError::from)?;
				buffer
			},
			None => fs::read(&path).await.map_err(SourceError::from)?,
		};

		let content = if scan::is_binary_path(&path) {
			ResourceContent::Bytes(bytes)
		} else {
			match options.encoding.as_deref() {
				None | Some("utf-8") | Some("utf8") => match String::from_utf8(bytes) {
					Ok(text) => ResourceContent::Text(text),
					Err(err) => ResourceContent::Bytes(err.into_bytes()),
				},
				Some(_) => ResourceContent::Text(String::from_utf8_lossy(&bytes).into_owned()),
			}
		};

		Ok(LoadedResource { content, metadata: self.metadata_for(&path).await, is_partial })
	}

	async fn list_resources(&self, options: ListOptions) -> SourceResult<ResourceListing> {
		self.ensure_alive()?;
		let start_path = match &options.path {
			Some(path) => self.resolve(path)?,
			None => self.root.clone(),
		};
		let depth = options.depth.unwrap_or(DEFAULT_LIST_DEPTH);
		let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		let start_index = match options.page_token.as_deref() {
			Some(token) => token.parse::<usize>().unwrap_or_else(|_| {
				warn!(token = token, "unparseable page token, restarting listing");
				0
			}),
			None => 0,
		};

		let root = self.root.clone();
		let follow_symlinks = self.follow_symlinks;
		let (paths, has_more) = tokio::task::spawn_blocking(move || {
			let mut paths: Vec<PathBuf> = Vec::with_capacity(page_size);
			let mut has_more = false;
			let walk = scan::build_walk(&root, &start_path, Some(depth), follow_symlinks);
			let mut index = 0usize;
			for entry in walk.flatten() {
				if entry.path() == start_path {
					continue;
				}
				if index >= start_index {
					if paths.len() == page_size {
						has_more = true;
						break;
					}
					paths.push(entry.into_path());
				}
				index += 1;
			}
			(paths, has_more)
		})
		.await
		.map_err(|err| SourceError::new(SourceErrorKind::Io, Arc::new(err.into())))?;

		let mut resources = Vec::with_capacity(paths.len());
		for path in &paths {
			resources.push(self.metadata_for(path).await);
		}
		let pagination = has_more
			.then(|| Pagination { next_page_token: (start_index + page_size).to_string() });
		Ok(ResourceListing { resources, pagination })
	}

	async fn search_resources(
		&self,
		query: &str,
		options: SearchOptions,
	) -> SourceResult<SearchReply> {
		self.ensure_alive()?;
		let pattern_text = options.content_pattern.clone().unwrap_or_else(|| query.to_string());
		if pattern_text.is_empty() {
			return Err(SourceError::new(
				SourceErrorKind::InvalidQuery,
				Arc::new(anyhow::anyhow!("empty search query")),
			));
		}
		let pattern = RegexBuilder::new(&pattern_text)
			.case_insensitive(!options.case_sensitive)
			.build()
			.map_err(|err| {
				SourceError::new(
					SourceErrorKind::InvalidQuery,
					Arc::new(anyhow::anyhow!("bad search pattern `{pattern_text}`: {err}")),
				)
			})?;
		let glob = build_glob_set(options.resource_pattern.as_deref())?;

		let root = self.root.clone();
		let uri_prefix = self.uri_prefix.clone();
		let follow_symlinks = self.follow_symlinks;
		let page_size = options.page_size.unwrap_or(DEFAULT_SEARCH_PAGE_SIZE);
		let date_after = options.date_after;
		let date_before = options.date_before;
		let context_lines = options.context_lines;
		let terminate_sig = self.terminate_sig.clone();

		let reply = tokio::task::spawn_blocking(move || {
			let mut matches: Vec<SearchMatch> = Vec::new();
			let mut total_matches = 0usize;
			let mut file_errors: Vec<String> = Vec::new();

			for entry in scan::build_walk(&root, &root, None, follow_symlinks).flatten() {
				if terminate_sig.is_dead() {
					return Err(SourceError::cancelled());
				}
				if matches.len() >= page_size {
					break;
				}
				if !entry.file_type().map(|file_type| file_type.is_file()).unwrap_or(false) {
					continue;
				}
				let path = entry.path();
				let relative = path.strip_prefix(&root).unwrap_or(path);
				if !glob_matches(&glob, relative) {
					continue;
				}
				if scan::is_binary_path(path) {
					continue;
				}

				let modified_at: Option<DateTime<Utc>> = entry
					.metadata()
					.ok()
					.and_then(|stat| stat.modified().ok())
					.map(DateTime::<Utc>::from);
				if let (Some(after), Some(modified)) = (date_after, modified_at) {
					if modified < after {
						continue;
					}
				}
				if let (Some(before), Some(modified)) = (date_before, modified_at) {
					if modified > before {
						continue;
					}
				}

				let text = match std::fs::read_to_string(path) {
					Ok(text) => text,
					Err(err) => {
						warn!(path = %path.display(), error = ?err, "skipping unreadable file during search");
						file_errors.push(format!("{}: {err}", relative.display()));
						continue;
					},
				};

				let mut snippets = Vec::new();
				let mut occurrences = 0usize;
				for found in pattern.find_iter(&text) {
					occurrences += 1;
					if snippets.len() < MAX_SNIPPETS_PER_FILE {
						let snippet = match context_lines {
							Some(lines) => line_snippet(&text, found.start(), lines),
							None => scan::snippet_around(
								&text,
								found.start(),
								found.end(),
								SNIPPET_CONTEXT_CHARS,
							),
						};
						snippets.push(snippet);
					}
				}
				if occurrences == 0 {
					continue;
				}
				total_matches += occurrences;
				matches.push(SearchMatch {
					uri: format!("{uri_prefix}{}", relative.to_string_lossy()),
					title: path.file_name().map(|name| name.to_string_lossy().to_string()),
					snippets,
					modified_at,
				});
			}

			let error_message = if file_errors.is_empty() {
				None
			} else {
				Some(format!("search skipped unreadable files: {}", file_errors.join("; ")))
			};
			Ok(SearchReply { matches, total_matches, error_message })
		})
		.await
		.map_err(|err| SourceError::new(SourceErrorKind::Io, Arc::new(err.into())))??;

		Ok(reply)
	}

	async fn write_resource(
		&self,
		uri: &str,
		content: ResourceContent,
		options: WriteOptions,
	) -> SourceResult<WriteReply> {
		self.ensure_alive()?;
		let path = self.resolve(uri)?;
		if path.exists() && !options.overwrite {
			return Err(SourceError::new(
				SourceErrorKind::AlreadyExists,
				Arc::new(anyhow::anyhow!("`{uri}` already exists and overwrite is not set")),
			));
		}
		if options.create_missing_directories {
			if let Some(parent) = path.parent() {
				fs::create_dir_all(parent).await.map_err(SourceError::from)?;
			}
		}
		let bytes = Self::content_bytes(&content);
		let bytes_written = bytes.len() as u64;
		fs::write(&path, bytes).await.map_err(SourceError::from)?;

		Ok(WriteReply {
			success: true,
			uri: self.uri_for(&path),
			metadata: self.metadata_for(&path).await,
			bytes_written,
		})
	}

	async fn edit_resource(
		&self,
		resource_path: &str,
		operations: &[BlockOperation],
		options: EditOptions,
	) -> SourceResult<EditReply> {
		self.ensure_alive()?;
		let path = self.resolve(resource_path)?;
		let text = match fs::read_to_string(&path).await {
			Ok(text) => text,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound && options.create_if_missing => {
				if let Some(parent) = path.parent() {
					fs::create_dir_all(parent).await.map_err(SourceError::from)?;
				}
				String::new()
			},
			Err(err) => return Err(SourceError::from(err)),
		};

		let (blocks, operation_results) = apply(Self::file_blocks(text), operations);
		if operation_results.iter().any(|result| result.success) {
			let new_text = blocks
				.first()
				.and_then(|block| block.as_text())
				.map(|block| block.plain_text())
				.unwrap_or_else(|| portabletext::markdown::render(&blocks));
			fs::write(&path, new_text).await.map_err(SourceError::from)?;
		}

		Ok(EditReply { operation_results, metadata: self.metadata_for(&path).await })
	}

	async fn move_resource(
		&self,
		source_uri: &str,
		destination_uri: &str,
		options: MoveOptions,
	) -> SourceResult<MoveReply> {
		self.ensure_alive()?;
		let source = self.resolve(source_uri)?;
		let destination = self.resolve(destination_uri)?;
		if !source.exists() {
			return Err(SourceError::not_found(format!("`{source_uri}`")));
		}
		if destination.exists() && !options.overwrite {
			return Err(SourceError::new(
				SourceErrorKind::AlreadyExists,
				Arc::new(anyhow::anyhow!(
					"`{destination_uri}` already exists and overwrite is not set"
				)),
			));
		}
		if options.create_missing_directories {
			if let Some(parent) = destination.parent() {
				fs::create_dir_all(parent).await.map_err(SourceError::from)?;
			}
		}
		fs::rename(&source, &destination).await.map_err(SourceError::from)?;

		Ok(MoveReply {
			success: true,
			source_uri: source_uri.to_string(),
			destination_uri: self.uri_for(&destination),
			metadata: self.metadata_for(&destination).await,
		})
	}

	async fn delete_resource(
		&self,
		uri: &str,
		options: DeleteOptions,
	) -> SourceResult<DeleteReply> {
		self.ensure_alive()?;
		let path = self.resolve(uri)?;
		let stat = fs::metadata(&path).await.map_err(SourceError::from)?;

		let resource_kind = if stat.is_dir() {
			let mut entries = fs::read_dir(&path).await.map_err(SourceError::from)?;
			let is_empty = entries.next_entry().await.map_err(SourceError::from)?.is_none();
			if is_empty {
				fs::remove_dir(&path).await.map_err(SourceError::from)?;
			} else if options.recursive {
				fs::remove_dir_all(&path).await.map_err(SourceError::from)?;
			} else {
				return Err(SourceError::new(
					SourceErrorKind::NotEmpty,
					Arc::new(anyhow::anyhow!("`{uri}` is not empty; pass recursive to delete")),
				));
			}
			ResourceKind::Directory
		} else {
			fs::remove_file(&path).await.map_err(SourceError::from)?;
			ResourceKind::File
		};

		Ok(DeleteReply { success: true, uri: uri.to_string(), resource_kind })
	}

	async fn get_metadata(&self) -> DataSourceMetadata {
		let root = self.root.clone();
		let follow_symlinks = self.follow_symlinks;
		tokio::task::spawn_blocking(move || {
			let mut metadata = scan::collect_metadata(&root, follow_symlinks);
			metadata.write_probe_ok = Some(scan::write_probe(&root));
			metadata
		})
		.await
		.unwrap_or_default()
	}
}

fn build_glob_set(resource_pattern: Option<&str>) -> SourceResult<Option<GlobSet>> {
	let Some(pattern) = resource_pattern else {
		return Ok(None);
	};
	let glob = Glob::new(pattern).map_err(|err| {
		SourceError::new(
			SourceErrorKind::InvalidQuery,
			Arc::new(anyhow::anyhow!("bad resource pattern `{pattern}`: {err}")),
		)
	})?;
	let set = GlobSetBuilder::new().add(glob).build().map_err(|err| {
		SourceError::new(SourceErrorKind::InvalidQuery, Arc::new(err.into()))
	})?;
	Ok(Some(set))
}

fn glob_matches(glob: &Option<GlobSet>, relative: &Path) -> bool {
	match glob {
		Some(set) => set.is_match(relative),
		None => true,
	}
}

fn line_snippet(text: &str, match_start: usize, context_lines: usize) -> String {
	let lines: Vec<&str> = text.lines().collect();
	let mut offset = 0usize;
	let mut match_line = 0usize;
	for (index, line) in lines.iter().enumerate() {
		let line_end = offset + line.len();
		if match_start <= line_end {
			match_line = index;
			break;
		}
		offset = line_end + 1;
	}
	let start = match_line.saturating_sub(context_lines);
	let end = (match_line + context_lines + 1).min(lines.len());
	lines[start..end].join("\n")
}
