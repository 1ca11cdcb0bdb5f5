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

pub mod capability;
pub use capability::*;
pub mod uri;
pub use uri::*;
pub mod auth;
pub use auth::*;
pub mod terminate_sig;
pub use terminate_sig::TerminateSignal;
pub mod retry;
pub use retry::*;
pub mod schemas;
pub use schemas::*;

use rand::Rng;

/// Lowercases a connection name and collapses anything outside `[a-z0-9]`
/// into single dashes. The result is the `connectionName` segment of a
/// resource URI, so it must stay stable for the lifetime of a connection.
pub fn slugify(name: &str) -> String {
	let mut slug = String::with_capacity(name.len());
	let mut last_dash = true;
	for ch in name.chars() {
		let ch = ch.to_ascii_lowercase();
		if ch.is_ascii_alphanumeric() {
			slug.push(ch);
			last_dash = false;
		} else if !last_dash {
			slug.push('-');
			last_dash = true;
		}
	}
	while slug.ends_with('-') {
		slug.pop();
	}
	slug
}

const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a short opaque identifier. Used for connection ids and
/// portable text block/span keys; uniqueness matters, ordering does not.
pub fn new_opaque_key(prefix: &str) -> String {
	let mut rng = rand::thread_rng();
	let suffix: String = (0..12)
		.map(|_| {
			let idx = rng.gen_range(0..KEY_ALPHABET.len());
			KEY_ALPHABET[idx] as char
		})
		.collect();
	if prefix.is_empty() {
		suffix
	} else {
		format!("{}-{}", prefix, suffix)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_slugify() {
		assert_eq!(slugify("My Local Files"), "my-local-files");
		assert_eq!(slugify("notes (2024)"), "notes-2024");
		assert_eq!(slugify("--weird__name--"), "weird-name");
		assert_eq!(slugify("simple"), "simple");
	}

	#[test]
	fn test_opaque_keys_are_unique() {
		let mut seen = std::collections::HashSet::new();
		for _ in 0..1000 {
			assert!(seen.insert(new_opaque_key("ds")));
		}
	}

	#[test]
	fn test_opaque_key_prefix() {
		let key = new_opaque_key("conn");
		assert!(key.starts_with("conn-"));
		let bare = new_opaque_key("");
		assert_eq!(bare.len(), 12);
	}
}
