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

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Block;

/// One edit step against a block sequence. Indices address the working
/// sequence at the time the operation runs, so earlier operations shift
/// what later indices mean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockOperation {
	Insert {
		index: usize,
		block: Block,
	},
	Update {
		index: usize,
		block: Block,
	},
	Delete {
		index: usize,
	},
	Move {
		from: usize,
		to: usize,
	},
	ReplaceSpanText {
		block_key: String,
		span_key: String,
		search: String,
		replace: String,
		#[serde(default)]
		regex: bool,
	},
}

/// Outcome of one operation, reported in input order. A failed operation
/// leaves the working sequence untouched and the batch keeps going.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub operation_index: usize,
}

impl OperationResult {
	fn ok(operation_index: usize) -> Self {
		OperationResult { success: true, message: None, operation_index }
	}

	fn failed(operation_index: usize, message: impl Into<String>) -> Self {
		OperationResult { success: false, message: Some(message.into()), operation_index }
	}
}

/// Applies `operations` to `blocks` in order. Pure: never panics and never
/// errors; every operation yields exactly one [`OperationResult`], so the
/// result vector always has `operations.len()` entries in input order.
pub fn apply(
	blocks: Vec<Block>,
	operations: &[BlockOperation],
) -> (Vec<Block>, Vec<OperationResult>) {
	let mut working = blocks;
	let mut results = Vec::with_capacity(operations.len());

	for (operation_index, operation) in operations.iter().enumerate() {
		let result = apply_one(&mut working, operation, operation_index);
		results.push(result);
	}

	(working, results)
}

fn apply_one(
	working: &mut Vec<Block>,
	operation: &BlockOperation,
	operation_index: usize,
) -> OperationResult {
	match operation {
		BlockOperation::Insert { index, block } => {
			if *index > working.len() {
				return OperationResult::failed(
					operation_index,
					format!("insert index {index} out of bounds (len {})", working.len()),
				);
			}
			working.insert(*index, block.clone());
			OperationResult::ok(operation_index)
		},
		BlockOperation::Update { index, block } => match working.get_mut(*index) {
			Some(slot) => {
				*slot = block.clone();
				OperationResult::ok(operation_index)
			},
			None => OperationResult::failed(
				operation_index,
				format!("update index {index} out of bounds (len {})", working.len()),
			),
		},
		BlockOperation::Delete { index } => {
			if *index >= working.len() {
				return OperationResult::failed(
					operation_index,
					format!("delete index {index} out of bounds (len {})", working.len()),
				);
			}
			working.remove(*index);
			OperationResult::ok(operation_index)
		},
		BlockOperation::Move { from, to } => {
			if *from >= working.len() || *to >= working.len() {
				return OperationResult::failed(
					operation_index,
					format!(
						"move {from} -> {to} out of bounds (len {})",
						working.len()
					),
				);
			}
			let block = working.remove(*from);
			working.insert(*to, block);
			OperationResult::ok(operation_index)
		},
		BlockOperation::ReplaceSpanText { block_key, span_key, search, replace, regex } =>
			replace_span_text(working, operation_index, block_key, span_key, search, replace, *regex),
	}
}

fn replace_span_text(
	working: &mut [Block],
	operation_index: usize,
	block_key: &str,
	span_key: &str,
	search: &str,
	replace: &str,
	use_regex: bool,
) -> OperationResult {
	let Some(block) = working.iter_mut().find(|block| block.key() == block_key) else {
		return OperationResult::failed(operation_index, format!("no block with key `{block_key}`"));
	};
	let Some(text_block) = block.as_text_mut() else {
		return OperationResult::failed(
			operation_index,
			format!("block `{block_key}` has no spans"),
		);
	};
	let Some(span) = text_block.children.iter_mut().find(|span| span.key == span_key) else {
		return OperationResult::failed(
			operation_index,
			format!("no span with key `{span_key}` in block `{block_key}`"),
		);
	};

	if use_regex {
		let pattern = match Regex::new(search) {
			Ok(pattern) => pattern,
			Err(err) =>
				return OperationResult::failed(operation_index, format!("bad regex: {err}")),
		};
		if !pattern.is_match(&span.text) {
			return OperationResult::failed(
				operation_index,
				format!("pattern `{search}` not found in span `{span_key}`"),
			);
		}
		span.text = pattern.replace_all(&span.text, replace).into_owned();
	} else {
		if !span.text.contains(search) {
			return OperationResult::failed(
				operation_index,
				format!("text `{search}` not found in span `{span_key}`"),
			);
		}
		span.text = span.text.replace(search, replace);
	}
	OperationResult::ok(operation_index)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{BlockStyle, Span, TextBlock};

	fn doc() -> Vec<Block> {
		vec![
			Block::Text(TextBlock::heading(1, "Title")),
			Block::Text(TextBlock::paragraph("hello")),
			Block::Text(TextBlock::paragraph("tail")),
		]
	}

	#[test]
	fn test_results_match_input_order_and_length() {
		let operations = vec![
			BlockOperation::Delete { index: 99 },
			BlockOperation::Insert { index: 0, block: Block::Text(TextBlock::paragraph("head")) },
			BlockOperation::Delete { index: 99 },
		];
		let (blocks, results) = apply(doc(), &operations);
		assert_eq!(results.len(), operations.len());
		assert_eq!(
			results.iter().map(|result| result.operation_index).collect::<Vec<_>>(),
			vec![0, 1, 2]
		);
		assert!(!results[0].success);
		assert!(results[1].success);
		assert!(!results[2].success);
		assert_eq!(blocks.len(), 4);
	}

	#[test]
	fn test_insert_update_delete_move() {
		let (blocks, results) = apply(
			doc(),
			&[
				BlockOperation::Insert {
					index: 1,
					block: Block::Text(TextBlock::paragraph("inserted")),
				},
				BlockOperation::Update {
					index: 0,
					block: Block::Text(TextBlock::heading(2, "Retitled")),
				},
				BlockOperation::Move { from: 1, to: 3 },
				BlockOperation::Delete { index: 0 },
			],
		);
		assert!(results.iter().all(|result| result.success));
		let texts: Vec<String> = blocks.iter().map(|block| block.visible_text()).collect();
		assert_eq!(texts, vec!["hello", "tail", "inserted"]);
	}

	#[test]
	fn test_failed_operation_leaves_sequence_untouched() {
		let before = doc();
		let (blocks, results) = apply(
			before.clone(),
			&[BlockOperation::Move { from: 0, to: 7 }, BlockOperation::Update {
				index: 9,
				block: Block::Text(TextBlock::paragraph("x")),
			}],
		);
		assert!(results.iter().all(|result| !result.success));
		assert_eq!(blocks, before);
	}

	#[test]
	fn test_replace_span_text_literal() {
		let blocks = doc();
		let block_key = blocks[1].key().to_string();
		let span_key = blocks[1].as_text().unwrap().children[0].key.clone();
		let (blocks, results) = apply(
			blocks,
			&[BlockOperation::ReplaceSpanText {
				block_key,
				span_key,
				search: "hello".into(),
				replace: "world".into(),
				regex: false,
			}],
		);
		assert!(results[0].success);
		assert_eq!(blocks[1].visible_text(), "world");
	}

	#[test]
	fn test_replace_span_text_regex() {
		let blocks = vec![Block::Text(TextBlock::new(
			BlockStyle::Normal,
			vec![Span::new("version 1.2 and version 1.9")],
		))];
		let block_key = blocks[0].key().to_string();
		let span_key = blocks[0].as_text().unwrap().children[0].key.clone();
		let (blocks, results) = apply(
			blocks,
			&[BlockOperation::ReplaceSpanText {
				block_key,
				span_key,
				search: r"version 1\.\d".into(),
				replace: "version 2.0".into(),
				regex: true,
			}],
		);
		assert!(results[0].success);
		assert_eq!(blocks[0].visible_text(), "version 2.0 and version 2.0");
	}

	#[test]
	fn test_replace_span_text_failures() {
		let blocks = doc();
		let block_key = blocks[1].key().to_string();
		let span_key = blocks[1].as_text().unwrap().children[0].key.clone();
		let (_, results) = apply(
			blocks,
			&[
				BlockOperation::ReplaceSpanText {
					block_key: "missing".into(),
					span_key: span_key.clone(),
					search: "hello".into(),
					replace: "x".into(),
					regex: false,
				},
				BlockOperation::ReplaceSpanText {
					block_key: block_key.clone(),
					span_key: "missing".into(),
					search: "hello".into(),
					replace: "x".into(),
					regex: false,
				},
				BlockOperation::ReplaceSpanText {
					block_key: block_key.clone(),
					span_key: span_key.clone(),
					search: "absent".into(),
					replace: "x".into(),
					regex: false,
				},
				BlockOperation::ReplaceSpanText {
					block_key,
					span_key,
					search: "[unclosed".into(),
					replace: "x".into(),
					regex: true,
				},
			],
		);
		assert_eq!(results.len(), 4);
		assert!(results.iter().all(|result| !result.success));
		assert!(results[3].message.as_deref().unwrap().contains("bad regex"));
	}

	#[test]
	fn test_empty_operation_list() {
		let before = doc();
		let (blocks, results) = apply(before.clone(), &[]);
		assert_eq!(blocks, before);
		assert!(results.is_empty());
	}
}
