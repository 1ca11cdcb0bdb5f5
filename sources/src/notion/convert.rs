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

//! Notion blocks to Portable Text and back. Supported block types map to
//! styled text blocks; anything else is carried through an opaque
//! `Unknown` block so a later write-back can hand the original payload to
//! the API unchanged.

use portabletext::{
	Block, BlockStyle, BreakBlock, BreakKind, ListItemKind, Mark, Span, TextBlock, TocBlock,
	UnknownBlock,
};
use serde_json::{json, Map, Value};

use super::client::{NotionBlock, NotionRichText};

pub fn rich_text_to_spans(rich_text: &[NotionRichText]) -> Vec<Span> {
	rich_text
		.iter()
		.map(|part| {
			let mut marks = Vec::new();
			if let Some(annotations) = &part.annotations {
				if annotations.bold {
					marks.push(Mark::Strong);
				}
				if annotations.italic {
					marks.push(Mark::Em);
				}
				if annotations.underline {
					marks.push(Mark::Underline);
				}
				if annotations.strikethrough {
					marks.push(Mark::StrikeThrough);
				}
				if annotations.code {
					marks.push(Mark::Code);
				}
			}
			let link = part.href.clone().or_else(|| {
				part.text
					.as_ref()
					.and_then(|text| text.get("link"))
					.and_then(|link| link.get("url"))
					.and_then(serde_json::Value::as_str)
					.map(str::to_string)
			});
			if let Some(href) = link {
				marks.push(Mark::Link { href });
			}
			// Replies carry `plain_text`; creation payloads only carry
			// `text.content`.
			let text = if part.plain_text.is_empty() {
				part.text
					.as_ref()
					.and_then(|text| text.get("content"))
					.and_then(serde_json::Value::as_str)
					.unwrap_or_default()
					.to_string()
			} else {
				part.plain_text.clone()
			};
			Span::with_marks(text, marks)
		})
		.collect()
}

pub fn spans_to_rich_text(spans: &[Span]) -> Value {
	let parts: Vec<Value> = spans
		.iter()
		.map(|span| {
			let mut annotations = Map::new();
			let mut link: Option<&str> = None;
			for mark in &span.marks {
				match mark {
					Mark::Strong => {
						annotations.insert("bold".into(), json!(true));
					},
					Mark::Em => {
						annotations.insert("italic".into(), json!(true));
					},
					Mark::Underline => {
						annotations.insert("underline".into(), json!(true));
					},
					Mark::StrikeThrough => {
						annotations.insert("strikethrough".into(), json!(true));
					},
					Mark::Code => {
						annotations.insert("code".into(), json!(true));
					},
					Mark::Link { href } => link = Some(href),
				}
			}
			let mut text = json!({ "content": span.text });
			if let Some(href) = link {
				text["link"] = json!({ "url": href });
			}
			let mut part = json!({ "type": "text", "text": text });
			if !annotations.is_empty() {
				part["annotations"] = Value::Object(annotations);
			}
			part
		})
		.collect();
	Value::Array(parts)
}

fn text_block_from(block: &NotionBlock, style: BlockStyle) -> TextBlock {
	let mut text_block = TextBlock::new(style, rich_text_to_spans(&block.rich_text()));
	if let Some(id) = &block.id {
		// Keep backend identity addressable: the block id becomes the block
		// key and span keys derive from it, so edit operations can target
		// spans straight after a load.
		text_block.key = id.clone();
		for (index, span) in text_block.children.iter_mut().enumerate() {
			span.key = format!("{id}-s{index}");
		}
	}
	text_block
}

/// One Notion block to one Portable Text block.
pub fn notion_block_to_portable(block: &NotionBlock) -> Block {
	match block.block_type.as_str() {
		"paragraph" => Block::Text(text_block_from(block, BlockStyle::Normal)),
		"heading_1" => Block::Text(text_block_from(block, BlockStyle::H1)),
		"heading_2" => Block::Text(text_block_from(block, BlockStyle::H2)),
		"heading_3" => Block::Text(text_block_from(block, BlockStyle::H3)),
		"bulleted_list_item" => {
			let mut text_block = text_block_from(block, BlockStyle::Normal);
			text_block.list_item = Some(ListItemKind::Bullet);
			text_block.level = Some(1);
			Block::Text(text_block)
		},
		"numbered_list_item" => {
			let mut text_block = text_block_from(block, BlockStyle::Normal);
			text_block.list_item = Some(ListItemKind::Number);
			text_block.level = Some(1);
			Block::Text(text_block)
		},
		"to_do" => {
			let checked = block
				.typed_payload()
				.and_then(|payload| payload.get("checked"))
				.and_then(Value::as_bool)
				.unwrap_or(false);
			let mut text_block = text_block_from(block, BlockStyle::Normal);
			text_block.list_item = Some(ListItemKind::Todo { checked });
			text_block.level = Some(1);
			Block::Text(text_block)
		},
		"code" => {
			let mut text_block = text_block_from(block, BlockStyle::Code);
			text_block.language = block
				.typed_payload()
				.and_then(|payload| payload.get("language"))
				.and_then(Value::as_str)
				.map(str::to_string);
			Block::Text(text_block)
		},
		"quote" | "callout" => Block::Text(text_block_from(block, BlockStyle::Quote)),
		"divider" => Block::Break(BreakBlock::new(BreakKind::Divider)),
		"table_of_contents" => Block::Toc(TocBlock::new()),
		"image" => {
			let url = block
				.typed_payload()
				.and_then(|payload| {
					payload
						.get("external")
						.and_then(|external| external.get("url"))
						.or_else(|| payload.get("file").and_then(|file| file.get("url")))
				})
				.and_then(Value::as_str)
				.unwrap_or_default();
			let caption = block
				.typed_payload()
				.and_then(|payload| payload.get("caption"))
				.and_then(|caption| {
					serde_json::from_value::<Vec<NotionRichText>>(caption.clone()).ok()
				})
				.map(|parts| parts.iter().map(|part| part.plain_text.clone()).collect::<String>())
				.filter(|caption| !caption.is_empty())
				.unwrap_or_else(|| "image".to_string());
			Block::Text(TextBlock::new(
				BlockStyle::Normal,
				vec![Span::with_marks(caption, vec![Mark::Link { href: url.to_string() }])],
			))
		},
		"bookmark" => {
			let url = block
				.typed_payload()
				.and_then(|payload| payload.get("url"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			Block::Text(TextBlock::new(
				BlockStyle::Normal,
				vec![Span::with_marks(
					url.to_string(),
					vec![Mark::Link { href: url.to_string() }],
				)],
			))
		},
		"equation" => {
			let expression = block
				.typed_payload()
				.and_then(|payload| payload.get("expression"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			Block::Text(TextBlock::new(
				BlockStyle::Normal,
				vec![Span::with_marks(expression.to_string(), vec![Mark::Code])],
			))
		},
		other => Block::Unknown(UnknownBlock::new(
			other,
			serde_json::to_value(block).unwrap_or(Value::Null),
		)),
	}
}

pub fn notion_blocks_to_portable(blocks: &[NotionBlock]) -> Vec<Block> {
	blocks.iter().map(notion_block_to_portable).collect()
}

fn wrap(block_type: &str, typed_payload: Value) -> Value {
	json!({
		"object": "block",
		"type": block_type,
		block_type: typed_payload,
	})
}

/// One Portable Text block back to a Notion block creation payload.
///
/// Heading levels beyond 3 collapse to `heading_3` (the deepest Notion
/// supports); tables flatten to one paragraph per row.
pub fn portable_block_to_notion(block: &Block) -> Vec<Value> {
	match block {
		Block::Text(text_block) => {
			let rich_text = spans_to_rich_text(&text_block.children);
			if let Some(list_item) = &text_block.list_item {
				return match list_item {
					ListItemKind::Bullet =>
						vec![wrap("bulleted_list_item", json!({ "rich_text": rich_text }))],
					ListItemKind::Number =>
						vec![wrap("numbered_list_item", json!({ "rich_text": rich_text }))],
					ListItemKind::Todo { checked } => vec![wrap(
						"to_do",
						json!({ "rich_text": rich_text, "checked": checked }),
					)],
				};
			}
			match text_block.style {
				BlockStyle::Normal =>
					vec![wrap("paragraph", json!({ "rich_text": rich_text }))],
				BlockStyle::H1 => vec![wrap("heading_1", json!({ "rich_text": rich_text }))],
				BlockStyle::H2 => vec![wrap("heading_2", json!({ "rich_text": rich_text }))],
				BlockStyle::H3 |
				BlockStyle::H4 |
				BlockStyle::H5 |
				BlockStyle::H6 => vec![wrap("heading_3", json!({ "rich_text": rich_text }))],
				BlockStyle::Quote => vec![wrap("quote", json!({ "rich_text": rich_text }))],
				BlockStyle::Code => vec![wrap(
					"code",
					json!({
						"rich_text": rich_text,
						"language": text_block.language.clone().unwrap_or_else(|| "plain text".to_string()),
					}),
				)],
			}
		},
		Block::Table(table) => table
			.rows
			.iter()
			.map(|row| {
				let rich_text = spans_to_rich_text(&[Span::new(row.join(" | "))]);
				wrap("paragraph", json!({ "rich_text": rich_text }))
			})
			.collect(),
		Block::Break(_) => vec![wrap("divider", json!({}))],
		Block::Toc(_) => vec![wrap("table_of_contents", json!({}))],
		Block::Unknown(unknown) => {
			// Hand the original payload back, minus identity fields the API
			// refuses on create.
			let mut payload = unknown.payload.clone();
			if let Some(object) = payload.as_object_mut() {
				object.remove("id");
				object.remove("has_children");
			}
			vec![payload]
		},
	}
}

pub fn portable_to_notion_blocks(blocks: &[Block]) -> Vec<Value> {
	blocks.iter().flat_map(portable_block_to_notion).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn paragraph_block(text: &str) -> NotionBlock {
		serde_json::from_value(json!({
			"id": "b1",
			"type": "paragraph",
			"paragraph": { "rich_text": [{ "plain_text": text }] }
		}))
		.unwrap()
	}

	#[test]
	fn test_paragraph_and_heading_mapping() {
		let heading: NotionBlock = serde_json::from_value(json!({
			"id": "h1",
			"type": "heading_1",
			"heading_1": { "rich_text": [{ "plain_text": "Title" }] }
		}))
		.unwrap();
		let blocks = notion_blocks_to_portable(&[heading, paragraph_block("hello")]);
		assert_eq!(blocks[0].as_text().unwrap().style, BlockStyle::H1);
		assert_eq!(blocks[0].visible_text(), "Title");
		assert_eq!(blocks[1].as_text().unwrap().style, BlockStyle::Normal);
		assert_eq!(blocks[1].visible_text(), "hello");
		// Block identity carries into the portable key.
		assert_eq!(blocks[0].key(), "h1");
	}

	#[test]
	fn test_annotations_become_marks() {
		let block: NotionBlock = serde_json::from_value(json!({
			"type": "paragraph",
			"paragraph": { "rich_text": [
				{ "plain_text": "strong", "annotations": { "bold": true } },
				{ "plain_text": "linked", "href": "https://example.com" }
			]}
		}))
		.unwrap();
		let portable = notion_block_to_portable(&block);
		let spans = &portable.as_text().unwrap().children;
		assert!(spans[0].has_mark(&Mark::Strong));
		assert!(spans[1].has_mark(&Mark::Link { href: "https://example.com".into() }));
	}

	#[test]
	fn test_todo_round_trip() {
		let block: NotionBlock = serde_json::from_value(json!({
			"type": "to_do",
			"to_do": { "rich_text": [{ "plain_text": "ship it" }], "checked": true }
		}))
		.unwrap();
		let portable = notion_block_to_portable(&block);
		assert_eq!(
			portable.as_text().unwrap().list_item,
			Some(ListItemKind::Todo { checked: true })
		);
		let back = portable_block_to_notion(&portable);
		assert_eq!(back[0]["type"], "to_do");
		assert_eq!(back[0]["to_do"]["checked"], true);
		assert_eq!(back[0]["to_do"]["rich_text"][0]["text"]["content"], "ship it");
	}

	#[test]
	fn test_unknown_type_round_trips_payload() {
		let raw = json!({
			"id": "b7",
			"type": "synced_block",
			"synced_block": { "synced_from": { "block_id": "b9" } }
		});
		let block: NotionBlock = serde_json::from_value(raw).unwrap();
		let portable = notion_block_to_portable(&block);
		match &portable {
			Block::Unknown(unknown) => assert_eq!(unknown.original_type, "synced_block"),
			other => panic!("expected unknown block, got {other:?}"),
		}
		let back = portable_block_to_notion(&portable);
		assert_eq!(back[0]["type"], "synced_block");
		assert_eq!(back[0]["synced_block"]["synced_from"]["block_id"], "b9");
		// Identity fields are stripped for re-creation.
		assert!(back[0].get("id").is_none());
	}

	#[test]
	fn test_deep_headings_collapse_on_write() {
		let block = Block::Text(portabletext::TextBlock::heading(5, "deep"));
		let back = portable_block_to_notion(&block);
		assert_eq!(back[0]["type"], "heading_3");
	}

	#[test]
	fn test_visible_text_preserved_through_round_trip() {
		let originals = vec![
			serde_json::from_value::<NotionBlock>(json!({
				"type": "heading_2",
				"heading_2": { "rich_text": [{ "plain_text": "Section" }] }
			}))
			.unwrap(),
			paragraph_block("body text"),
			serde_json::from_value::<NotionBlock>(json!({
				"type": "bulleted_list_item",
				"bulleted_list_item": { "rich_text": [{ "plain_text": "item" }] }
			}))
			.unwrap(),
		];
		let portable = notion_blocks_to_portable(&originals);
		let payloads = portable_to_notion_blocks(&portable);
		let reparsed: Vec<NotionBlock> = payloads
			.iter()
			.map(|payload| serde_json::from_value(payload.clone()).unwrap())
			.collect();
		let round_tripped = notion_blocks_to_portable(&reparsed);
		for (before, after) in portable.iter().zip(round_tripped.iter()) {
			assert_eq!(before.visible_text(), after.visible_text());
		}
		assert_eq!(
			round_tripped[2].as_text().unwrap().list_item,
			Some(ListItemKind::Bullet)
		);
	}
}
