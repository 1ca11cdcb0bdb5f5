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

//! Stable Portable Text to Markdown rendering. The output format is part
//! of the external contract: headings as `#`..`######`, emphasis as
//! `**`/`*`/`~~`, bullets as `- `, numbered items with their running
//! sequence number, fenced code with a language tag, quotes as `> `,
//! dividers as `---`, and tables as pipe rows with a header separator.

use crate::{Block, BlockStyle, ListItemKind, Mark, Span, TextBlock};

/// Renders a document to Markdown.
pub fn render(blocks: &[Block]) -> String {
	let mut out: Vec<String> = Vec::new();
	let mut numbered_counter: u64 = 0;

	for block in blocks {
		match block {
			Block::Text(text_block) => {
				if !matches!(text_block.list_item, Some(ListItemKind::Number)) {
					numbered_counter = 0;
				}
				out.push(render_text_block(text_block, &mut numbered_counter));
			},
			Block::Table(table) => {
				numbered_counter = 0;
				out.push(render_table(&table.rows));
			},
			Block::Break(_) => {
				numbered_counter = 0;
				out.push("---".to_string());
			},
			Block::Toc(_) => {
				numbered_counter = 0;
				out.push("[TOC]".to_string());
			},
			Block::Unknown(unknown) => {
				// Unrepresentable content renders as a placeholder; the payload
				// still round-trips through conversions untouched.
				numbered_counter = 0;
				out.push(format!("<!-- unsupported block: {} -->", unknown.original_type));
			},
		}
	}

	let mut rendered = out.join("\n\n");
	if !rendered.is_empty() {
		rendered.push('\n');
	}
	rendered
}

fn render_text_block(block: &TextBlock, numbered_counter: &mut u64) -> String {
	let body: String = block.children.iter().map(render_span).collect();

	if let Some(list_item) = &block.list_item {
		let indent = "  ".repeat(block.level.unwrap_or(1).saturating_sub(1) as usize);
		return match list_item {
			ListItemKind::Bullet => format!("{indent}- {body}"),
			ListItemKind::Number => {
				*numbered_counter += 1;
				format!("{indent}{}. {body}", numbered_counter)
			},
			ListItemKind::Todo { checked } => {
				let check = if *checked { "x" } else { " " };
				format!("{indent}- [{check}] {body}")
			},
		};
	}

	match block.style {
		BlockStyle::Normal => body,
		BlockStyle::H1 => format!("# {body}"),
		BlockStyle::H2 => format!("## {body}"),
		BlockStyle::H3 => format!("### {body}"),
		BlockStyle::H4 => format!("#### {body}"),
		BlockStyle::H5 => format!("##### {body}"),
		BlockStyle::H6 => format!("###### {body}"),
		BlockStyle::Quote => body
			.lines()
			.map(|line| format!("> {line}"))
			.collect::<Vec<_>>()
			.join("\n"),
		BlockStyle::Code => {
			let language = block.language.as_deref().unwrap_or("");
			// Raw span text inside fences, no inline mark rendering.
			let raw: String = block.children.iter().map(|span| span.text.as_str()).collect();
			format!("```{language}\n{raw}\n```")
		},
	}
}

fn render_span(span: &Span) -> String {
	let mut text = span.text.clone();
	if span.has_mark(&Mark::Code) {
		text = format!("`{text}`");
	}
	if span.has_mark(&Mark::Strong) {
		text = format!("**{text}**");
	}
	if span.has_mark(&Mark::Em) {
		text = format!("*{text}*");
	}
	if span.has_mark(&Mark::StrikeThrough) {
		text = format!("~~{text}~~");
	}
	if let Some(href) = span.marks.iter().find_map(|mark| match mark {
		Mark::Link { href } => Some(href),
		_ => None,
	}) {
		text = format!("[{text}]({href})");
	}
	text
}

fn render_table(rows: &[Vec<String>]) -> String {
	if rows.is_empty() {
		return String::new();
	}
	let column_count = rows.iter().map(|row| row.len()).max().unwrap_or(0);
	let mut lines = Vec::with_capacity(rows.len() + 1);
	for (row_index, row) in rows.iter().enumerate() {
		let mut cells: Vec<String> = row.iter().map(|cell| escape_cell(cell)).collect();
		cells.resize(column_count, String::new());
		lines.push(format!("| {} |", cells.join(" | ")));
		if row_index == 0 {
			let separator = vec!["---"; column_count];
			lines.push(format!("| {} |", separator.join(" | ")));
		}
	}
	lines.join("\n")
}

fn escape_cell(cell: &str) -> String {
	cell.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{BreakBlock, BreakKind, TableBlock};

	#[test]
	fn test_headings_and_paragraphs() {
		let blocks = vec![
			Block::Text(TextBlock::heading(1, "Title")),
			Block::Text(TextBlock::paragraph("Intro text.")),
			Block::Text(TextBlock::heading(3, "Section")),
		];
		assert_eq!(render(&blocks), "# Title\n\nIntro text.\n\n### Section\n");
	}

	#[test]
	fn test_marks() {
		let blocks = vec![Block::Text(TextBlock::new(
			BlockStyle::Normal,
			vec![
				Span::with_marks("bold", vec![Mark::Strong]),
				Span::new(" and "),
				Span::with_marks("slanted", vec![Mark::Em]),
				Span::new(" and "),
				Span::with_marks("gone", vec![Mark::StrikeThrough]),
				Span::new(" and "),
				Span::with_marks("docs", vec![Mark::Link { href: "https://example.com".into() }]),
			],
		))];
		assert_eq!(
			render(&blocks),
			"**bold** and *slanted* and ~~gone~~ and [docs](https://example.com)\n"
		);
	}

	#[test]
	fn test_lists_keep_running_numbers() {
		let blocks = vec![
			Block::Text(TextBlock::list_item(ListItemKind::Number, 1, vec![Span::new("first")])),
			Block::Text(TextBlock::list_item(ListItemKind::Number, 1, vec![Span::new("second")])),
			Block::Text(TextBlock::list_item(ListItemKind::Bullet, 1, vec![Span::new("loose")])),
			Block::Text(TextBlock::list_item(ListItemKind::Number, 1, vec![Span::new("restarts")])),
		];
		assert_eq!(render(&blocks), "1. first\n\n2. second\n\n- loose\n\n1. restarts\n");
	}

	#[test]
	fn test_todo_items() {
		let blocks = vec![
			Block::Text(TextBlock::list_item(
				ListItemKind::Todo { checked: true },
				1,
				vec![Span::new("done")],
			)),
			Block::Text(TextBlock::list_item(
				ListItemKind::Todo { checked: false },
				2,
				vec![Span::new("nested")],
			)),
		];
		assert_eq!(render(&blocks), "- [x] done\n\n  - [ ] nested\n");
	}

	#[test]
	fn test_code_block_with_language() {
		let mut code = TextBlock::new(BlockStyle::Code, vec![Span::new("fn main() {}")]);
		code.language = Some("rust".to_string());
		assert_eq!(render(&[Block::Text(code)]), "```rust\nfn main() {}\n```\n");
	}

	#[test]
	fn test_quote_and_divider() {
		let blocks = vec![
			Block::Text(TextBlock::new(BlockStyle::Quote, vec![Span::new("wise words")])),
			Block::Break(BreakBlock::new(BreakKind::Divider)),
		];
		assert_eq!(render(&blocks), "> wise words\n\n---\n");
	}

	#[test]
	fn test_table_with_pipe_escapes() {
		let table = TableBlock::new(vec![
			vec!["Name".into(), "Notes".into()],
			vec!["a|b".into(), "plain".into()],
		]);
		assert_eq!(
			render(&[Block::Table(table)]),
			"| Name | Notes |\n| --- | --- |\n| a\\|b | plain |\n"
		);
	}

	#[test]
	fn test_empty_document() {
		assert_eq!(render(&[]), "");
	}
}
