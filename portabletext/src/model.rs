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

use common::new_opaque_key;
use serde::{Deserialize, Serialize};

/// Paragraph-level style of a text block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStyle {
	#[default]
	Normal,
	H1,
	H2,
	H3,
	H4,
	H5,
	H6,
	Quote,
	Code,
}

impl BlockStyle {
	pub fn heading_level(&self) -> Option<u8> {
		match self {
			BlockStyle::H1 => Some(1),
			BlockStyle::H2 => Some(2),
			BlockStyle::H3 => Some(3),
			BlockStyle::H4 => Some(4),
			BlockStyle::H5 => Some(5),
			BlockStyle::H6 => Some(6),
			_ => None,
		}
	}

	pub fn heading(level: u8) -> BlockStyle {
		match level {
			1 => BlockStyle::H1,
			2 => BlockStyle::H2,
			3 => BlockStyle::H3,
			4 => BlockStyle::H4,
			5 => BlockStyle::H5,
			_ => BlockStyle::H6,
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListItemKind {
	Bullet,
	Number,
	Todo { checked: bool },
}

/// Inline decoration on a span. `Link` carries its URL directly instead of
/// an out-of-band mark definition table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mark {
	Strong,
	Em,
	Underline,
	#[serde(rename = "strike-through")]
	StrikeThrough,
	Code,
	Link { href: String },
}

/// An inline run of text. `text` is always a string, never null.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
	#[serde(rename = "_key")]
	pub key: String,
	pub text: String,
	#[serde(default)]
	pub marks: Vec<Mark>,
}

impl Span {
	pub fn new(text: impl Into<String>) -> Self {
		Span { key: new_opaque_key("sp"), text: text.into(), marks: Vec::new() }
	}

	pub fn with_marks(text: impl Into<String>, marks: Vec<Mark>) -> Self {
		Span { key: new_opaque_key("sp"), text: text.into(), marks }
	}

	pub fn has_mark(&self, mark: &Mark) -> bool {
		self.marks.contains(mark)
	}
}

/// A `block`-typed block: styled text made of spans. `children` is always
/// present, possibly empty.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
	#[serde(rename = "_key")]
	pub key: String,
	#[serde(default)]
	pub style: BlockStyle,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub list_item: Option<ListItemKind>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub level: Option<u32>,
	/// Language tag for `code`-styled blocks.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	#[serde(default)]
	pub children: Vec<Span>,
}

impl TextBlock {
	pub fn new(style: BlockStyle, children: Vec<Span>) -> Self {
		TextBlock {
			key: new_opaque_key("blk"),
			style,
			list_item: None,
			level: None,
			language: None,
			children,
		}
	}

	pub fn paragraph(text: impl Into<String>) -> Self {
		TextBlock::new(BlockStyle::Normal, vec![Span::new(text)])
	}

	pub fn heading(level: u8, text: impl Into<String>) -> Self {
		TextBlock::new(BlockStyle::heading(level), vec![Span::new(text)])
	}

	pub fn list_item(kind: ListItemKind, level: u32, children: Vec<Span>) -> Self {
		TextBlock {
			key: new_opaque_key("blk"),
			style: BlockStyle::Normal,
			list_item: Some(kind),
			level: Some(level),
			language: None,
			children,
		}
	}

	pub fn plain_text(&self) -> String {
		self.children.iter().map(|span| span.text.as_str()).collect()
	}
}

/// A table carried through as a custom block: cell text only, but row and
/// column counts are preserved exactly.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
	#[serde(rename = "_key")]
	pub key: String,
	pub rows: Vec<Vec<String>>,
	pub row_count: usize,
	pub column_count: usize,
}

impl TableBlock {
	pub fn new(rows: Vec<Vec<String>>) -> Self {
		let row_count = rows.len();
		let column_count = rows.iter().map(|row| row.len()).max().unwrap_or(0);
		TableBlock { key: new_opaque_key("tbl"), rows, row_count, column_count }
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakKind {
	Divider,
	Page,
	Section,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BreakBlock {
	#[serde(rename = "_key")]
	pub key: String,
	pub kind: BreakKind,
}

impl BreakBlock {
	pub fn new(kind: BreakKind) -> Self {
		BreakBlock { key: new_opaque_key("brk"), kind }
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TocBlock {
	#[serde(rename = "_key")]
	pub key: String,
}

impl TocBlock {
	pub fn new() -> Self {
		TocBlock { key: new_opaque_key("toc") }
	}
}

impl Default for TocBlock {
	fn default() -> Self {
		TocBlock::new()
	}
}

/// A backend block type this model cannot represent. The original payload
/// rides along opaquely so a later conversion can hand it back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnknownBlock {
	#[serde(rename = "_key")]
	pub key: String,
	pub original_type: String,
	pub payload: serde_json::Value,
}

impl UnknownBlock {
	pub fn new(original_type: impl Into<String>, payload: serde_json::Value) -> Self {
		UnknownBlock { key: new_opaque_key("unk"), original_type: original_type.into(), payload }
	}
}

/// One unit of a Portable Text document. Keys are unique within a document
/// but carry no ordering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "camelCase")]
pub enum Block {
	#[serde(rename = "block")]
	Text(TextBlock),
	Table(TableBlock),
	Break(BreakBlock),
	Toc(TocBlock),
	Unknown(UnknownBlock),
}

impl Block {
	pub fn key(&self) -> &str {
		match self {
			Block::Text(block) => &block.key,
			Block::Table(block) => &block.key,
			Block::Break(block) => &block.key,
			Block::Toc(block) => &block.key,
			Block::Unknown(block) => &block.key,
		}
	}

	/// The text a reader would see, marks and structure stripped.
	pub fn visible_text(&self) -> String {
		match self {
			Block::Text(block) => block.plain_text(),
			Block::Table(block) =>
				block.rows.iter().map(|row| row.join(" ")).collect::<Vec<_>>().join("\n"),
			Block::Break(_) | Block::Toc(_) | Block::Unknown(_) => String::new(),
		}
	}

	pub fn as_text(&self) -> Option<&TextBlock> {
		match self {
			Block::Text(block) => Some(block),
			_ => None,
		}
	}

	pub fn as_text_mut(&mut self) -> Option<&mut TextBlock> {
		match self {
			Block::Text(block) => Some(block),
			_ => None,
		}
	}
}
