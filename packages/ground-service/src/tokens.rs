use std::sync::Arc;

use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

const CHARS_PER_TOKEN: usize = 4;

/// Counts and trims text in rerank-model tokens, or in an estimate when no tokenizer is loaded.
#[derive(Clone)]
pub(crate) enum TokenCounter {
	Tokenizer(Arc<Tokenizer>),
	Heuristic,
}
impl TokenCounter {
	pub(crate) fn label(&self) -> &'static str {
		match self {
			Self::Tokenizer(_) => "tokenizer",
			Self::Heuristic => "estimate",
		}
	}

	pub(crate) fn count(&self, text: &str) -> usize {
		if let Self::Tokenizer(tokenizer) = self
			&& let Ok(encoding) = tokenizer.encode(text, false)
		{
			return encoding.len();
		}

		text.split_word_bounds().map(estimate_segment).sum()
	}

	/// Cuts `text` to at most `max_tokens`. Returns the kept prefix and whether it was cut.
	pub(crate) fn trim<'a>(&self, text: &'a str, max_tokens: usize) -> (&'a str, bool) {
		if let Self::Tokenizer(tokenizer) = self
			&& let Ok(encoding) = tokenizer.encode(text, false)
		{
			let offsets = encoding.get_offsets();

			if offsets.len() <= max_tokens {
				return (text, false);
			}
			if max_tokens == 0 {
				return ("", true);
			}

			let (_, end) = offsets[max_tokens - 1];

			if let Some(kept) = text.get(..end) {
				return (kept, true);
			}
		}

		let mut used = 0;

		for (offset, segment) in text.split_word_bound_indices() {
			used += estimate_segment(segment);

			if used > max_tokens {
				return (text[..offset].trim_end(), true);
			}
		}

		(text, false)
	}
}

fn estimate_segment(segment: &str) -> usize {
	if segment.trim().is_empty() {
		return 0;
	}

	segment.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn estimate_counts_words_and_ignores_whitespace() {
		let counter = TokenCounter::Heuristic;

		assert_eq!(counter.count("add a tool"), 3);
		assert_eq!(counter.count("registration   "), 3);
		assert_eq!(counter.count(""), 0);
	}

	#[test]
	fn trim_keeps_whole_segments_within_budget() {
		let counter = TokenCounter::Heuristic;
		let (kept, trimmed) = counter.trim("def add(a, b): return a + b", 5);

		assert!(trimmed);
		assert_eq!(kept, "def add(a,");
		assert!(counter.count(kept) <= 5);
	}

	#[test]
	fn short_text_is_untouched() {
		let (kept, trimmed) = TokenCounter::Heuristic.trim("short", 10);

		assert_eq!(kept, "short");
		assert!(!trimmed);
	}
}
