use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, ContentType, RawHit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedHit {
	pub collection: String,
	pub point_id: String,
	pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
	/// Unique candidates in first-seen order.
	pub candidates: Vec<Candidate>,
	pub duplicates: usize,
	pub rejected: Vec<RejectedHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
	Id(String),
	Span { repo: String, git_ref: String, path: String, start: u32, end: u32 },
	Text(ContentType, String),
}

/// Collapses hits from every collection into unique candidates.
///
/// Duplicates are detected by candidate ID, by code location and by normalized text. A hit
/// that matches several kept groups joins them into the earliest one, so no two results
/// share any of these keys. The more complete record wins and ties keep the first one seen.
/// The kept record carries the best store score of the group. Order is never changed.
pub fn merge_hits<I>(hits: I) -> MergeOutcome
where
	I: IntoIterator<Item = RawHit>,
{
	let mut outcome = MergeOutcome::default();
	let mut groups: Vec<Option<Group>> = Vec::new();
	let mut index: HashMap<DedupKey, usize> = HashMap::new();

	for hit in hits {
		let collection = hit.collection.clone();
		let point_id = hit.point_id.clone();
		let Some(candidate) = Candidate::from_hit(hit) else {
			outcome.rejected.push(RejectedHit {
				collection,
				point_id,
				reason: "missing both path and url".to_string(),
			});

			continue;
		};
		let keys = dedup_keys(&candidate);
		let mut matched = keys.iter().filter_map(|key| index.get(key).copied()).collect::<Vec<_>>();

		matched.sort_unstable();
		matched.dedup();

		let Some((&slot, later)) = matched.split_first() else {
			let slot = groups.len();

			for key in &keys {
				index.insert(key.clone(), slot);
			}

			groups.push(Some(Group { best: candidate, keys }));

			continue;
		};

		outcome.duplicates += 1;

		let mut absorbed = Vec::with_capacity(later.len() + 1);

		for &other in later {
			if let Some(group) = groups[other].take() {
				outcome.duplicates += 1;

				absorbed.push(group);
			}
		}

		absorbed.push(Group { best: candidate, keys });

		let Some(kept) = groups[slot].as_mut() else {
			continue;
		};

		for group in absorbed {
			for key in &group.keys {
				index.insert(key.clone(), slot);
			}

			kept.absorb(group);
		}
	}

	outcome.candidates = groups.into_iter().flatten().map(|group| group.best).collect();

	outcome
}

/// Hits known to be one candidate, represented by the most complete record.
struct Group {
	best: Candidate,
	keys: Vec<DedupKey>,
}
impl Group {
	fn absorb(&mut self, other: Group) {
		let best_score = self.best.store_score.max(other.best.store_score);

		if other.best.provenance.completeness() > self.best.provenance.completeness() {
			self.best = other.best;
		}

		self.best.store_score = best_score;

		for key in other.keys {
			if !self.keys.contains(&key) {
				self.keys.push(key);
			}
		}
	}
}

fn dedup_keys(candidate: &Candidate) -> Vec<DedupKey> {
	let mut keys = vec![DedupKey::Id(candidate.candidate_id.clone())];

	if candidate.content_type == ContentType::Code
		&& let (Some(path), Some(span)) =
			(candidate.provenance.path.as_deref(), candidate.provenance.line_span())
	{
		keys.push(DedupKey::Span {
			repo: candidate.provenance.repo.clone().unwrap_or_default(),
			git_ref: candidate.provenance.git_ref.clone().unwrap_or_default(),
			path: path.to_string(),
			start: span.start,
			end: span.end,
		});
	}

	keys.push(DedupKey::Text(candidate.content_type, candidate.text_hash.clone()));

	keys
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::candidate::{HitPayload, Provenance};

	fn hit(collection: &str, point_id: &str, score: f32, text: &str, provenance: Provenance) -> RawHit {
		RawHit {
			collection: collection.to_string(),
			collection_type: ContentType::Code,
			point_id: point_id.to_string(),
			score,
			payload: HitPayload { content_type: None, chunk_id: None, text: text.to_string(), provenance },
		}
	}

	fn located(path: &str, span: Option<(u32, u32)>) -> Provenance {
		Provenance {
			repo: Some("adk-python".to_string()),
			git_ref: Some("main".to_string()),
			path: Some(path.to_string()),
			url: None,
			start_line: span.map(|(start, _)| start),
			end_line: span.map(|(_, end)| end),
		}
	}

	#[test]
	fn same_location_collapses_to_one_candidate() {
		let outcome = merge_hits(vec![
			hit("code_a", "1", 0.4, "def add(a, b): return a + b", located("tools.py", Some((1, 3)))),
			hit("code_b", "7", 0.9, "def add(a, b):\n    return a + b", located("tools.py", Some((1, 3)))),
		]);

		assert_eq!(outcome.candidates.len(), 1);
		assert_eq!(outcome.duplicates, 1);
		assert_eq!(outcome.candidates[0].collection, "code_a");
		assert_eq!(outcome.candidates[0].store_score, 0.9);
	}

	#[test]
	fn identical_text_under_different_paths_collapses() {
		let outcome = merge_hits(vec![
			hit("code", "1", 0.5, "class FunctionTool:", located("a/tool.py", None)),
			hit("code", "2", 0.5, "CLASS  FunctionTool:", located("b/tool.py", None)),
		]);

		assert_eq!(outcome.candidates.len(), 1);
		assert_eq!(outcome.candidates[0].provenance.path.as_deref(), Some("a/tool.py"));
	}

	#[test]
	fn more_complete_duplicate_replaces_in_place() {
		let outcome = merge_hits(vec![
			hit("code", "1", 0.8, "first", located("x.py", None)),
			hit("code", "2", 0.3, "shared body", located("tools.py", None)),
			hit("code", "3", 0.1, "shared body", located("tools.py", Some((5, 9)))),
		]);

		assert_eq!(outcome.candidates.len(), 2);
		assert_eq!(outcome.candidates[1].point_id, "3");
		assert_eq!(outcome.candidates[1].store_score, 0.3);
		assert_eq!(outcome.candidates[0].point_id, "1");
	}

	#[test]
	fn a_hit_matching_two_groups_joins_them() {
		let mut documented = located("a.py", Some((1, 3)));

		documented.url = Some("https://github.com/google/adk-python/blob/main/a.py".to_string());

		let outcome = merge_hits(vec![
			hit("code", "1", 0.2, "alpha", located("a.py", Some((1, 3)))),
			hit("code", "2", 0.7, "beta", located("b.py", Some((5, 9)))),
			hit("code", "3", 0.4, "beta", documented),
		]);
		let mut hashes =
			outcome.candidates.iter().map(|c| c.text_hash.clone()).collect::<Vec<_>>();

		hashes.sort();
		hashes.dedup();

		assert_eq!(hashes.len(), outcome.candidates.len());
		assert_eq!(outcome.candidates.len(), 1);
		assert_eq!(outcome.duplicates, 2);
		assert_eq!(outcome.candidates[0].point_id, "3");
		assert_eq!(outcome.candidates[0].store_score, 0.7);
	}

	#[test]
	fn unlocatable_hits_are_rejected_with_a_reason() {
		let outcome = merge_hits(vec![hit("code", "5", 0.5, "orphan", Provenance::default())]);

		assert!(outcome.candidates.is_empty());
		assert_eq!(outcome.rejected.len(), 1);
		assert_eq!(outcome.rejected[0].point_id, "5");
	}

	#[test]
	fn candidate_ids_are_unique_after_merge() {
		let outcome = merge_hits((0..20).map(|n| {
			hit("code", &n.to_string(), 0.5, &format!("body {}", n % 5), located("m.py", Some((n % 5, n % 5 + 1))))
		}));
		let mut ids = outcome.candidates.iter().map(|c| c.candidate_id.clone()).collect::<Vec<_>>();

		ids.sort();
		ids.dedup();

		assert_eq!(ids.len(), outcome.candidates.len());
		assert_eq!(outcome.candidates.len(), 5);
	}
}
