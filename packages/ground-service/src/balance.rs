use ground_config::Collection;
use ground_domain::{
	ContentType, CoverageRule, RawHit, TypeCounts,
	coverage,
	merge::{self, MergeOutcome},
};

use crate::{
	GroundService,
	embed::QueryEntry,
	pack::{CollectionRequest, Stage, WarningKind, WideningDiagnostics},
	retrieve::Call,
	search::{self, CollectionResult, SearchPass},
};

/// Latest hits per configured collection, kept in configuration order so merging is stable.
pub(crate) struct HitBoard<'a> {
	slots: Vec<Slot<'a>>,
}

struct Slot<'a> {
	collection: &'a Collection,
	hits: Vec<RawHit>,
	failed: bool,
}

impl<'a> HitBoard<'a> {
	pub(crate) fn new(collections: &'a [Collection]) -> Self {
		Self {
			slots: collections
				.iter()
				.map(|collection| Slot { collection, hits: Vec::new(), failed: false })
				.collect(),
		}
	}

	/// Replaces a collection's hits with a newer successful result. A failed collection keeps
	/// whatever it returned before and is not queried again in this call.
	pub(crate) fn absorb(&mut self, results: Vec<CollectionResult>, log: &mut Vec<CollectionRequest>) {
		for result in results {
			if let Some(slot) =
				self.slots.iter_mut().find(|slot| slot.collection.name == result.request.collection)
			{
				match result.hits {
					Some(hits) => slot.hits = hits,
					None => slot.failed = true,
				}
			}

			log.push(result.request);
		}
	}

	pub(crate) fn healthy(&self) -> Vec<&'a Collection> {
		self.slots.iter().filter(|slot| !slot.failed).map(|slot| slot.collection).collect()
	}

	pub(crate) fn healthy_of_types(&self, types: &[ContentType]) -> Vec<&'a Collection> {
		self.healthy()
			.into_iter()
			.filter(|collection| types.contains(&search::collection_type(collection)))
			.collect()
	}

	pub(crate) fn raw_hits(&self) -> usize {
		self.slots.iter().map(|slot| slot.hits.len()).sum()
	}

	pub(crate) fn merge(&self) -> MergeOutcome {
		merge::merge_hits(self.slots.iter().flat_map(|slot| slot.hits.iter().cloned()))
	}
}

/// Query texts available to the balancer: the entries searched so far and the variants that
/// may still be added.
pub(crate) struct Expansion<'a> {
	pub(crate) entries: &'a mut Vec<QueryEntry>,
	pub(crate) variants: &'a [String],
	pub(crate) variants_searched: &'a mut bool,
}

/// Type counts inside the pool that would be handed to the reranker.
pub(crate) fn pool_counts(merged: &MergeOutcome, pool_max: usize) -> TypeCounts {
	let pool = coverage::select_pool(merged.candidates.clone(), pool_max);

	TypeCounts::of(pool.iter().map(|candidate| candidate.content_type))
}

impl GroundService {
	/// Checks the pre-rerank pool against `rule` and, if a type is short, re-queries the
	/// collections of that type once at the widened limit. Never widens twice.
	///
	/// Query variants that were not searched yet are embedded first and ride along in the
	/// widened request.
	pub(crate) async fn balance(
		&self,
		board: &mut HitBoard<'_>,
		expansion: Expansion<'_>,
		rule: &CoverageRule,
		merged: MergeOutcome,
		call: &mut Call<'_>,
	) -> (MergeOutcome, WideningDiagnostics) {
		let Expansion { entries, variants, variants_searched } = expansion;
		let pool_max = self.cfg.coverage.rerank_pool_max as usize;
		let deficits = rule.deficits(pool_counts(&merged, pool_max));
		let mut widening = WideningDiagnostics { deficits: deficits.clone(), ..Default::default() };

		if deficits.is_empty() {
			return (merged, widening);
		}

		let targets = board.healthy_of_types(&deficits);
		let mut merged = merged;

		if call.deadline.expired() {
			call.warn(
				Stage::Balance,
				WarningKind::BudgetExceeded,
				None,
				"Time budget spent before coverage widening. Skipped widening.".to_string(),
			);
		} else if !targets.is_empty() {
			widening.triggered = true;
			widening.collections = targets.iter().map(|collection| collection.name.clone()).collect();

			if !*variants_searched && !variants.is_empty() {
				let embedded =
					self.embed_queries(variants, &call.deadline, &mut call.warnings).await;

				entries.extend(embedded);

				*variants_searched = true;
			}

			let pass = SearchPass {
				collections: targets,
				entries: entries.as_slice(),
				limit: self.cfg.search.widened_collection_limit,
				widened: true,
				filters: call.filters,
				deadline: &call.deadline,
			};
			let results = self.search_collections(&pass, &mut call.warnings).await;

			board.absorb(results, &mut call.requests);

			merged = board.merge();
		}

		let counts = pool_counts(&merged, pool_max);

		for content_type in rule.deficits(counts) {
			call.warn_coverage(Stage::Balance, content_type, counts.get(content_type), rule);
		}

		(merged, widening)
	}
}
