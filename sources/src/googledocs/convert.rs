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

//! Google Docs documents to Portable Text and back.
//!
//! The write direction emits a batch-update script: delete the existing
//! body range, insert the serialized text at index 1, then apply named
//! paragraph styles to heading ranges and text styles to marked span
//! ranges. All indices are UTF-16 code units, which is what the Docs API
//! counts.

use portabletext::{
	Block, BlockStyle, BreakBlock, BreakKind, ListItemKind, Mark, Span, TableBlock, TextBlock,
	TocBlock,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleDoc {
	#[serde(default)]
	pub document_id: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub body: DocBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocBody {
	#[serde(default)]
	pub content: Vec<StructuralElement>,
}

impl GoogleDoc {
	/// End index of the body, i.e. one past the last content character.
	pub fn end_index(&self) -> u64 {
		self.body.content.iter().filter_map(|element| element.end_index).max().unwrap_or(1)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_index: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_index: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paragraph: Option<Paragraph>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table: Option<Table>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub section_break: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table_of_contents: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
	#[serde(default)]
	pub elements: Vec<ParagraphElement>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paragraph_style: Option<ParagraphStyle>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bullet: Option<Bullet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text_run: Option<TextRun>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_break: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
	#[serde(default)]
	pub content: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text_style: Option<TextStyle>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
	#[serde(default)]
	pub bold: bool,
	#[serde(default)]
	pub italic: bool,
	#[serde(default)]
	pub underline: bool,
	#[serde(default)]
	pub strikethrough: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub link: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub named_style_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub list_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nesting_level: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
	#[serde(default)]
	pub rows: u64,
	#[serde(default)]
	pub columns: u64,
	#[serde(default)]
	pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
	#[serde(default)]
	pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
	#[serde(default)]
	pub content: Vec<StructuralElement>,
}

fn style_from_named(named_style_type: Option<&str>) -> BlockStyle {
	match named_style_type {
		Some("HEADING_1") => BlockStyle::H1,
		Some("HEADING_2") => BlockStyle::H2,
		Some("HEADING_3") => BlockStyle::H3,
		Some("HEADING_4") => BlockStyle::H4,
		Some("HEADING_5") => BlockStyle::H5,
		Some("HEADING_6") => BlockStyle::H6,
		Some("TITLE") => BlockStyle::H1,
		Some("SUBTITLE") => BlockStyle::H2,
		_ => BlockStyle::Normal,
	}
}

fn named_from_style(style: BlockStyle) -> Option<&'static str> {
	match style {
		BlockStyle::H1 => Some("HEADING_1"),
		BlockStyle::H2 => Some("HEADING_2"),
		BlockStyle::H3 => Some("HEADING_3"),
		BlockStyle::H4 => Some("HEADING_4"),
		BlockStyle::H5 => Some("HEADING_5"),
		BlockStyle::H6 => Some("HEADING_6"),
		_ => None,
	}
}

fn spans_from_paragraph(paragraph: &Paragraph, element_key: &str) -> Vec<Span> {
	let mut spans = Vec::new();
	for (index, element) in paragraph.elements.iter().enumerate() {
		let Some(text_run) = &element.text_run else {
			continue;
		};
		let text = text_run.content.trim_end_matches('\n').to_string();
		if text.is_empty() {
			continue;
		}
		let mut marks = Vec::new();
		if let Some(style) = &text_run.text_style {
			if style.bold {
				marks.push(Mark::Strong);
			}
			if style.italic {
				marks.push(Mark::Em);
			}
			if style.underline {
				marks.push(Mark::Underline);
			}
			if style.strikethrough {
				marks.push(Mark::StrikeThrough);
			}
			if let Some(url) = style
				.link
				.as_ref()
				.and_then(|link| link.get("url"))
				.and_then(Value::as_str)
			{
				marks.push(Mark::Link { href: url.to_string() });
			}
		}
		let mut span = Span::with_marks(text, marks);
		span.key = format!("{element_key}-s{index}");
		spans.push(span);
	}
	spans
}

fn cell_text(cell: &TableCell) -> String {
	let mut text = String::new();
	for element in &cell.content {
		if let Some(paragraph) = &element.paragraph {
			for paragraph_element in &paragraph.elements {
				if let Some(text_run) = &paragraph_element.text_run {
					text.push_str(text_run.content.trim_end_matches('\n'));
				}
			}
		}
	}
	text
}

/// Structural elements to Portable Text. Block keys derive from element
/// start indices so a subsequent edit can address them.
pub fn doc_to_portable(doc: &GoogleDoc) -> Vec<Block> {
	let mut blocks = Vec::new();
	for element in &doc.body.content {
		let element_key = format!("g{}", element.start_index.unwrap_or(0));
		if let Some(paragraph) = &element.paragraph {
			if paragraph.elements.iter().any(|part| part.page_break.is_some()) &&
				paragraph
					.elements
					.iter()
					.all(|part| part.text_run.as_ref().map(|run| run.content.trim().is_empty()).unwrap_or(true))
			{
				let mut break_block = BreakBlock::new(BreakKind::Page);
				break_block.key = element_key;
				blocks.push(Block::Break(break_block));
				continue;
			}
			let style = style_from_named(
				paragraph
					.paragraph_style
					.as_ref()
					.and_then(|style| style.named_style_type.as_deref()),
			);
			let mut text_block = TextBlock::new(style, spans_from_paragraph(paragraph, &element_key));
			text_block.key = element_key;
			if let Some(bullet) = &paragraph.bullet {
				// The glyph kind lives in the document's list map; bullets are
				// the neutral rendering.
				text_block.list_item = Some(ListItemKind::Bullet);
				text_block.level = Some(bullet.nesting_level.unwrap_or(0) + 1);
			}
			blocks.push(Block::Text(text_block));
		} else if let Some(table) = &element.table {
			let rows: Vec<Vec<String>> = table
				.table_rows
				.iter()
				.map(|row| row.table_cells.iter().map(cell_text).collect())
				.collect();
			let mut table_block = TableBlock::new(rows);
			table_block.key = element_key.clone();
			table_block.row_count = table.rows as usize;
			table_block.column_count = table.columns as usize;
			blocks.push(Block::Table(table_block));
		} else if element.section_break.is_some() {
			// The document-leading section break is structural noise.
			if element.start_index.unwrap_or(0) > 0 {
				let mut break_block = BreakBlock::new(BreakKind::Section);
				break_block.key = element_key;
				blocks.push(Block::Break(break_block));
			}
		} else if element.table_of_contents.is_some() {
			let mut toc = TocBlock::new();
			toc.key = element_key;
			blocks.push(Block::Toc(toc));
		}
	}
	blocks
}

fn utf16_len(text: &str) -> u64 {
	text.encode_utf16().count() as u64
}

struct StyleRange {
	start: u64,
	end: u64,
	named_style: &'static str,
}

struct TextStyleRange {
	start: u64,
	end: u64,
	bold: bool,
	italic: bool,
	underline: bool,
	strikethrough: bool,
}

/// Serializes Portable Text into the batch-update script described by the
/// write contract: one delete of the existing body, one insert of the
/// concatenated text, then paragraph-style updates for headings and
/// text-style updates for marked spans, at computed UTF-16 ranges.
pub fn portable_to_batch_requests(blocks: &[Block], current_end_index: u64) -> Vec<Value> {
	let mut text = String::new();
	let mut cursor: u64 = 1;
	let mut paragraph_styles: Vec<StyleRange> = Vec::new();
	let mut text_styles: Vec<TextStyleRange> = Vec::new();

	for block in blocks {
		match block {
			Block::Text(text_block) => {
				let start = cursor;
				for span in &text_block.children {
					let span_start = cursor;
					text.push_str(&span.text);
					cursor += utf16_len(&span.text);
					let bold = span.has_mark(&Mark::Strong);
					let italic = span.has_mark(&Mark::Em);
					let underline = span.has_mark(&Mark::Underline);
					let strikethrough = span.has_mark(&Mark::StrikeThrough);
					if (bold || italic || underline || strikethrough) && cursor > span_start {
						text_styles.push(TextStyleRange {
							start: span_start,
							end: cursor,
							bold,
							italic,
							underline,
							strikethrough,
						});
					}
				}
				text.push('\n');
				cursor += 1;
				if let Some(named_style) = named_from_style(text_block.style) {
					paragraph_styles.push(StyleRange { start, end: cursor, named_style });
				}
			},
			Block::Table(table) => {
				for row in &table.rows {
					text.push_str(&row.join(" | "));
					text.push('\n');
					cursor += utf16_len(&row.join(" | ")) + 1;
				}
			},
			Block::Break(_) | Block::Toc(_) => {
				text.push('\n');
				cursor += 1;
			},
			Block::Unknown(_) => {},
		}
	}

	let mut requests = Vec::new();
	if current_end_index > 2 {
		requests.push(json!({
			"deleteContentRange": {
				"range": { "startIndex": 1, "endIndex": current_end_index - 1 }
			}
		}));
	}
	if !text.is_empty() {
		requests.push(json!({
			"insertText": {
				"location": { "index": 1 },
				"text": text
			}
		}));
	}
	for style in &paragraph_styles {
		requests.push(json!({
			"updateParagraphStyle": {
				"range": { "startIndex": style.start, "endIndex": style.end },
				"paragraphStyle": { "namedStyleType": style.named_style },
				"fields": "namedStyleType"
			}
		}));
	}
	for style in &text_styles {
		let mut text_style = serde_json::Map::new();
		let mut fields = Vec::new();
		if style.bold {
			text_style.insert("bold".into(), json!(true));
			fields.push("bold");
		}
		if style.italic {
			text_style.insert("italic".into(), json!(true));
			fields.push("italic");
		}
		if style.underline {
			text_style.insert("underline".into(), json!(true));
			fields.push("underline");
		}
		if style.strikethrough {
			text_style.insert("strikethrough".into(), json!(true));
			fields.push("strikethrough");
		}
		requests.push(json!({
			"updateTextStyle": {
				"range": { "startIndex": style.start, "endIndex": style.end },
				"textStyle": Value::Object(text_style),
				"fields": fields.join(",")
			}
		}));
	}
	requests
}

/// The raw-text write path: delete the body, insert the new text at 1.
pub fn text_to_batch_requests(text: &str, current_end_index: u64) -> Vec<Value> {
	let mut requests = Vec::new();
	if current_end_index > 2 {
		requests.push(json!({
			"deleteContentRange": {
				"range": { "startIndex": 1, "endIndex": current_end_index - 1 }
			}
		}));
	}
	if !text.is_empty() {
		requests.push(json!({
			"insertText": {
				"location": { "index": 1 },
				"text": text
			}
		}));
	}
	requests
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc_from_json(value: Value) -> GoogleDoc {
		serde_json::from_value(value).unwrap()
	}

	fn sample_doc() -> GoogleDoc {
		doc_from_json(json!({
			"documentId": "d1",
			"title": "Spec",
			"body": { "content": [
				{ "sectionBreak": {} },
				{
					"startIndex": 1, "endIndex": 7,
					"paragraph": {
						"paragraphStyle": { "namedStyleType": "HEADING_1" },
						"elements": [ { "textRun": { "content": "Title\n" } } ]
					}
				},
				{
					"startIndex": 7, "endIndex": 18,
					"paragraph": {
						"elements": [
							{ "textRun": { "content": "plain " } },
							{ "textRun": { "content": "bold\n", "textStyle": { "bold": true } } }
						]
					}
				},
				{
					"startIndex": 18, "endIndex": 30,
					"table": {
						"rows": 1, "columns": 2,
						"tableRows": [ { "tableCells": [
							{ "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "a\n" } } ] } } ] },
							{ "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "b\n" } } ] } } ] }
						] } ]
					}
				},
				{
					"startIndex": 30, "endIndex": 31,
					"paragraph": { "elements": [ { "pageBreak": {}, "textRun": { "content": "\n" } } ] }
				}
			]}
		}))
	}

	#[test]
	fn test_doc_to_portable_structure() {
		let blocks = doc_to_portable(&sample_doc());
		assert_eq!(blocks.len(), 4);
		assert_eq!(blocks[0].as_text().unwrap().style, BlockStyle::H1);
		assert_eq!(blocks[0].visible_text(), "Title");
		let spans = &blocks[1].as_text().unwrap().children;
		assert_eq!(spans.len(), 2);
		assert!(spans[1].has_mark(&Mark::Strong));
		match &blocks[2] {
			Block::Table(table) => {
				assert_eq!(table.row_count, 1);
				assert_eq!(table.column_count, 2);
				assert_eq!(table.rows[0], vec!["a".to_string(), "b".to_string()]);
			},
			other => panic!("expected table, got {other:?}"),
		}
		assert!(matches!(blocks[3], Block::Break(_)));
	}

	#[test]
	fn test_leading_section_break_is_dropped() {
		let blocks = doc_to_portable(&sample_doc());
		assert!(!blocks.iter().any(|block| matches!(
			block,
			Block::Break(break_block) if break_block.kind == BreakKind::Section
		)));
	}

	#[test]
	fn test_end_index() {
		assert_eq!(sample_doc().end_index(), 31);
		assert_eq!(GoogleDoc::default().end_index(), 1);
	}

	#[test]
	fn test_batch_requests_delete_insert_and_style() {
		let blocks = vec![
			Block::Text(TextBlock::heading(1, "Title")),
			Block::Text(TextBlock::new(
				BlockStyle::Normal,
				vec![Span::new("plain "), Span::with_marks("bold", vec![Mark::Strong])],
			)),
		];
		let requests = portable_to_batch_requests(&blocks, 31);

		assert_eq!(requests[0]["deleteContentRange"]["range"]["startIndex"], 1);
		assert_eq!(requests[0]["deleteContentRange"]["range"]["endIndex"], 30);
		assert_eq!(requests[1]["insertText"]["location"]["index"], 1);
		assert_eq!(requests[1]["insertText"]["text"], "Title\nplain bold\n");

		// "Title\n" occupies [1, 7).
		assert_eq!(requests[2]["updateParagraphStyle"]["range"]["startIndex"], 1);
		assert_eq!(requests[2]["updateParagraphStyle"]["range"]["endIndex"], 7);
		assert_eq!(
			requests[2]["updateParagraphStyle"]["paragraphStyle"]["namedStyleType"],
			"HEADING_1"
		);

		// "bold" starts after "Title\nplain " (12 chars) at index 13.
		assert_eq!(requests[3]["updateTextStyle"]["range"]["startIndex"], 13);
		assert_eq!(requests[3]["updateTextStyle"]["range"]["endIndex"], 17);
		assert_eq!(requests[3]["updateTextStyle"]["textStyle"]["bold"], true);
		assert_eq!(requests[3]["updateTextStyle"]["fields"], "bold");
	}

	#[test]
	fn test_batch_requests_skip_delete_for_empty_doc() {
		let blocks = vec![Block::Text(TextBlock::paragraph("fresh"))];
		let requests = portable_to_batch_requests(&blocks, 2);
		assert!(requests[0].get("deleteContentRange").is_none());
		assert_eq!(requests[0]["insertText"]["text"], "fresh\n");
	}

	#[test]
	fn test_utf16_indices_for_non_bmp_text() {
		// "𝄞" is two UTF-16 code units.
		let blocks = vec![Block::Text(TextBlock::new(
			BlockStyle::Normal,
			vec![Span::new("𝄞"), Span::with_marks("x", vec![Mark::Em])],
		))];
		let requests = portable_to_batch_requests(&blocks, 1);
		// Insert, then the italic span at [3, 4).
		assert_eq!(requests[1]["updateTextStyle"]["range"]["startIndex"], 3);
		assert_eq!(requests[1]["updateTextStyle"]["range"]["endIndex"], 4);
	}

	#[test]
	fn test_round_trip_preserves_visible_text_and_style() {
		let original = sample_doc();
		let portable = doc_to_portable(&original);
		// Emit and re-parse the inserted text to confirm nothing visible is
		// lost in the write direction.
		let requests = portable_to_batch_requests(&portable, original.end_index());
		let inserted = requests
			.iter()
			.find_map(|request| request.get("insertText"))
			.and_then(|insert| insert.get("text"))
			.and_then(Value::as_str)
			.unwrap();
		assert!(inserted.contains("Title"));
		assert!(inserted.contains("plain bold"));
		assert!(inserted.contains("a | b"));
	}
}
