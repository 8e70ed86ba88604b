use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, ContentType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
	pub doc: usize,
	pub code: usize,
}
impl TypeCounts {
	pub fn of<I>(types: I) -> Self
	where
		I: IntoIterator<Item = ContentType>,
	{
		let mut counts = Self::default();

		for content_type in types {
			*counts.slot(content_type) += 1;
		}

		counts
	}

	pub fn get(&self, content_type: ContentType) -> usize {
		match content_type {
			ContentType::Doc => self.doc,
			ContentType::Code => self.code,
		}
	}

	fn slot(&mut self, content_type: ContentType) -> &mut usize {
		match content_type {
			ContentType::Doc => &mut self.doc,
			ContentType::Code => &mut self.code,
		}
	}
}

/// Minimum number of items of each type a mixed-grounding result must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRule {
	pub min_doc: usize,
	pub min_code: usize,
}
impl CoverageRule {
	pub fn minimum(&self, content_type: ContentType) -> usize {
		match content_type {
			ContentType::Doc => self.min_doc,
			ContentType::Code => self.min_code,
		}
	}

	/// Types whose count falls below the minimum, in `ContentType::ALL` order.
	pub fn deficits(&self, counts: TypeCounts) -> Vec<ContentType> {
		ContentType::ALL
			.into_iter()
			.filter(|content_type| counts.get(*content_type) < self.minimum(*content_type))
			.collect()
	}

	pub fn is_met(&self, counts: TypeCounts) -> bool {
		self.deficits(counts).is_empty()
	}
}

/// Caps the rerank pool without letting one type crowd out the other.
///
/// Each type first gets up to half the pool, the remainder is filled in input order, and
/// the chosen candidates keep their relative order.
pub fn select_pool(candidates: Vec<Candidate>, max: usize) -> Vec<Candidate> {
	if candidates.len() <= max {
		return candidates;
	}

	let quota = max / 2;
	let mut taken = vec![false; candidates.len()];
	let mut total = 0;

	for content_type in ContentType::ALL {
		let mut count = 0;

		for (idx, candidate) in candidates.iter().enumerate() {
			if count == quota {
				break;
			}
			if candidate.content_type == content_type {
				taken[idx] = true;
				count += 1;
			}
		}

		total += count;
	}
	for flag in taken.iter_mut() {
		if total == max {
			break;
		}
		if !*flag {
			*flag = true;
			total += 1;
		}
	}

	candidates.into_iter().zip(taken).filter_map(|(candidate, keep)| keep.then_some(candidate)).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSelection {
	/// Positions into the ranked list, ascending.
	pub indices: Vec<usize>,
	/// How many items were pulled up past the top-k cut to satisfy coverage.
	pub promoted: usize,
	/// Whether any promoted item sat outside the buffer window.
	pub promoted_beyond_buffer: bool,
}

/// Takes the top `top_k` of an already ranked list and, when a rule applies, swaps in the
/// best-ranked items of an under-represented type for the lowest-ranked surplus items of the
/// other type. Promotion scans the buffer window first and then the rest of the list.
pub fn select_final<T, F>(
	ranked: &[T],
	type_of: F,
	top_k: usize,
	buffer_k: usize,
	rule: Option<&CoverageRule>,
) -> FinalSelection
where
	F: Fn(&T) -> ContentType,
{
	let cut = top_k.min(ranked.len());
	let mut selection = FinalSelection { indices: (0..cut).collect(), ..Default::default() };
	let Some(rule) = rule else {
		return selection;
	};

	for content_type in ContentType::ALL {
		let other = content_type.other();
		let mut have =
			selection.indices.iter().filter(|idx| type_of(&ranked[**idx]) == content_type).count();
		let mut other_count = selection.indices.len() - have;
		let need = rule.minimum(content_type);

		for idx in cut..ranked.len() {
			if have >= need {
				break;
			}
			if type_of(&ranked[idx]) != content_type {
				continue;
			}
			if other_count <= rule.minimum(other) {
				break;
			}

			let Some(victim) =
				selection.indices.iter().rposition(|pos| type_of(&ranked[*pos]) == other)
			else {
				break;
			};

			selection.indices.remove(victim);
			selection.indices.push(idx);

			other_count -= 1;
			have += 1;
			selection.promoted += 1;

			if idx >= buffer_k {
				selection.promoted_beyond_buffer = true;
			}
		}
	}

	selection.indices.sort_unstable();

	selection
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::candidate::ContentType::{Code, Doc};

	const RULE: CoverageRule = CoverageRule { min_doc: 3, min_code: 3 };

	fn pick(ranked: &[ContentType], top_k: usize, buffer_k: usize) -> FinalSelection {
		select_final(ranked, |content_type| *content_type, top_k, buffer_k, Some(&RULE))
	}

	#[test]
	fn deficits_report_each_short_type() {
		assert_eq!(RULE.deficits(TypeCounts { doc: 1, code: 5 }), vec![Doc]);
		assert!(RULE.is_met(TypeCounts { doc: 3, code: 3 }));
	}

	#[test]
	fn satisfied_top_k_is_untouched() {
		let ranked = [Doc, Code, Doc, Code, Doc, Code, Doc];
		let selection = pick(&ranked, 6, 7);

		assert_eq!(selection.indices, vec![0, 1, 2, 3, 4, 5]);
		assert_eq!(selection.promoted, 0);
	}

	#[test]
	fn under_represented_type_is_promoted_from_buffer() {
		let mut ranked = vec![Doc; 12];

		ranked.extend([Doc, Code, Doc, Code, Code, Code]);

		let selection = pick(&ranked, 12, 20);
		let counts = TypeCounts::of(selection.indices.iter().map(|idx| ranked[*idx]));

		assert_eq!(selection.indices.len(), 12);
		assert_eq!(counts, TypeCounts { doc: 9, code: 3 });
		assert_eq!(selection.indices[9..], [13, 15, 16]);
		assert!(!selection.promoted_beyond_buffer);
	}

	#[test]
	fn promotion_reaches_past_the_buffer_when_needed() {
		let mut ranked = vec![Code; 20];

		ranked.extend([Doc, Doc, Doc]);

		let selection = pick(&ranked, 12, 20);

		assert_eq!(selection.promoted, 3);
		assert!(selection.promoted_beyond_buffer);
	}

	#[test]
	fn promotion_never_breaks_the_other_minimum() {
		let ranked = [Code, Code, Code, Doc, Doc, Doc, Doc];
		let selection = pick(&ranked, 3, 5);

		assert_eq!(selection.indices, vec![0, 1, 2]);
	}

	#[test]
	fn no_rule_means_plain_top_k() {
		let ranked = [Doc; 5];
		let selection = select_final(&ranked, |content_type| *content_type, 3, 4, None);

		assert_eq!(selection.indices, vec![0, 1, 2]);
	}

	#[test]
	fn pool_cap_keeps_both_types_in_order() {
		let candidates = (0..10)
			.map(|n| Candidate {
				candidate_id: n.to_string(),
				content_type: if n < 8 { Doc } else { Code },
				collection: "c".to_string(),
				point_id: n.to_string(),
				chunk_id: None,
				text: String::new(),
				text_hash: String::new(),
				provenance: Default::default(),
				store_score: 0.0,
			})
			.collect::<Vec<_>>();
		let pool = select_pool(candidates, 4);
		let ids = pool.iter().map(|c| c.candidate_id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["0", "1", "8", "9"]);
	}
}
