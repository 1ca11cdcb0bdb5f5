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

//! Directory walking, ignore handling, binary detection and data source
//! wide metadata collection for the filesystem accessor. Everything here
//! is synchronous; the accessor runs it on the blocking pool.

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tracing::warn;

use crate::types::{ContentSummary, DataSourceMetadata, FilteringSummary};

/// Directory names skipped regardless of ignore files.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] =
	&[".git", "node_modules", "target", "dist", "build", ".trash"];

/// Project-local ignore file honoured on top of `.gitignore`.
pub const BB_IGNORE_FILE: &str = ".bb-ignore";

/// Files at or above this size are flagged as very large in metadata.
pub const VERY_LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;

const BINARY_EXTENSIONS: &[&str] = &[
	// images
	"png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "heic",
	// audio
	"mp3", "wav", "ogg", "flac", "m4a", "aac",
	// video
	"mp4", "mkv", "avi", "mov", "webm",
	// archives
	"zip", "tar", "gz", "bz2", "xz", "zst", "7z", "rar", "jar",
	// executables and libraries
	"exe", "dll", "so", "dylib", "bin", "wasm", "class", "o", "a",
	// fonts
	"ttf", "otf", "woff", "woff2", "eot",
	// documents and data
	"pdf", "sqlite", "db", "parquet", "pb",
];

/// Binary content is detected by extension; extensionless files are
/// treated as text.
pub fn is_binary_path(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| {
			let ext = ext.to_ascii_lowercase();
			BINARY_EXTENSIONS.contains(&ext.as_str())
		})
		.unwrap_or(false)
}

fn is_default_excluded(path: &Path, root: &Path) -> bool {
	let Ok(relative) = path.strip_prefix(root) else {
		return false;
	};
	relative.components().any(|component| {
		component
			.as_os_str()
			.to_str()
			.map(|name| DEFAULT_EXCLUDED_DIRS.contains(&name))
			.unwrap_or(false)
	})
}

/// Builds the filtered walk every listing, search and metadata pass uses:
/// `.gitignore` + `.bb-ignore` + the built-in default excludes, sorted for
/// deterministic pagination.
pub fn build_walk(
	root: &Path,
	start: &Path,
	max_depth: Option<usize>,
	follow_symlinks: bool,
) -> ignore::Walk {
	let root = root.to_path_buf();
	WalkBuilder::new(start)
		.max_depth(max_depth)
		.follow_links(follow_symlinks)
		.hidden(false)
		.git_ignore(true)
		.git_global(false)
		.git_exclude(false)
		.require_git(false)
		.add_custom_ignore_filename(BB_IGNORE_FILE)
		.filter_entry(move |entry| !is_default_excluded(entry.path(), &root))
		.sort_by_file_path(|left, right| left.cmp(right))
		.build()
}

/// Which ignore files are present at the root, for the metadata report.
pub fn filtering_summary(root: &Path) -> FilteringSummary {
	FilteringSummary {
		gitignore_applied: root.join(".gitignore").is_file(),
		bbignore_applied: root.join(BB_IGNORE_FILE).is_file(),
	}
}

/// Walks the whole data source and aggregates totals, depth, sizes, the
/// extension histogram, modification bounds and the content analysis.
/// Per-entry stat failures are logged and elided; the walk keeps going.
pub fn collect_metadata(root: &Path, follow_symlinks: bool) -> DataSourceMetadata {
	let mut metadata = DataSourceMetadata::default();
	let mut file_count: u64 = 0;
	let mut directory_count: u64 = 0;
	let mut max_depth: u64 = 0;
	let mut largest: u64 = 0;
	let mut histogram: BTreeMap<String, u64> = BTreeMap::new();
	let mut oldest: Option<DateTime<Utc>> = None;
	let mut newest: Option<DateTime<Utc>> = None;
	let mut content = ContentSummary::default();
	let mut stat_failures: u64 = 0;

	for entry in build_walk(root, root, None, follow_symlinks) {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				warn!(error = ?err, "skipping unreadable entry during metadata walk");
				stat_failures += 1;
				continue;
			},
		};
		if entry.path() == root {
			continue;
		}
		max_depth = max_depth.max(entry.depth() as u64);

		let file_type = match entry.file_type() {
			Some(file_type) => file_type,
			None => {
				stat_failures += 1;
				continue;
			},
		};
		if file_type.is_dir() {
			directory_count += 1;
			continue;
		}
		file_count += 1;

		let stat = match entry.metadata() {
			Ok(stat) => stat,
			Err(err) => {
				warn!(path = %entry.path().display(), error = ?err, "cannot stat file during metadata walk");
				stat_failures += 1;
				continue;
			},
		};
		let size = stat.len();
		largest = largest.max(size);
		if size == 0 {
			content.empty_files += 1;
		} else if is_binary_path(entry.path()) {
			content.binary_files += 1;
		} else {
			content.text_files += 1;
		}
		if size >= VERY_LARGE_FILE_BYTES {
			content.very_large_files += 1;
		}

		if let Some(extension) = entry.path().extension().and_then(|ext| ext.to_str()) {
			*histogram.entry(extension.to_ascii_lowercase()).or_insert(0) += 1;
		}

		if let Ok(modified) = stat.modified() {
			let modified: DateTime<Utc> = modified.into();
			oldest = Some(oldest.map_or(modified, |current| current.min(modified)));
			newest = Some(newest.map_or(modified, |current| current.max(modified)));
		}
	}

	metadata.resource_count = Some(file_count);
	metadata.directory_count = Some(directory_count);
	metadata.max_depth = Some(max_depth);
	metadata.largest_resource_size = Some(largest);
	metadata.extension_histogram = histogram;
	metadata.oldest_modified = oldest;
	metadata.newest_modified = newest;
	metadata.content = Some(content);
	metadata.filtering = Some(filtering_summary(root));
	if stat_failures > 0 {
		metadata.notes.push(format!("{stat_failures} entries elided (metadata unavailable)"));
	}
	metadata
}

/// Attempts to create and delete a small probe file in the root. The
/// outcome feeds the metadata capabilities report.
pub fn write_probe(root: &Path) -> bool {
	let probe_path: PathBuf = root.join(".bb-write-probe.tmp");
	match std::fs::write(&probe_path, b"probe") {
		Ok(()) => {
			if let Err(err) = std::fs::remove_file(&probe_path) {
				warn!(path = %probe_path.display(), error = ?err, "failed to remove write probe");
			}
			true
		},
		Err(_) => false,
	}
}

/// Cuts a match snippet: the matched text plus up to `window` characters
/// of leading and trailing context, with ellipses marking truncation.
/// Boundaries are snapped to char boundaries.
pub fn snippet_around(text: &str, match_start: usize, match_end: usize, window: usize) -> String {
	let mut start = match_start.saturating_sub(window);
	while start > 0 && !text.is_char_boundary(start) {
		start -= 1;
	}
	let mut end = (match_end + window).min(text.len());
	while end < text.len() && !text.is_char_boundary(end) {
		end += 1;
	}

	let mut snippet = String::new();
	if start > 0 {
		snippet.push('…');
	}
	snippet.push_str(&text[start..end]);
	if end < text.len() {
		snippet.push('…');
	}
	snippet
}
