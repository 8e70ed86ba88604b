use serde::{Deserialize, Serialize};

use crate::{
	citation::{self, Citation},
	text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
	Doc,
	Code,
}
impl ContentType {
	pub const ALL: [Self; 2] = [Self::Doc, Self::Code];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Doc => "doc",
			Self::Code => "code",
		}
	}

	/// Accepts the canonical names plus the plural corpus labels used by ingestion.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"doc" | "docs" | "documentation" => Some(Self::Doc),
			"code" | "source" => Some(Self::Code),
			_ => None,
		}
	}

	pub fn other(self) -> Self {
		match self {
			Self::Doc => Self::Code,
			Self::Code => Self::Doc,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSpan {
	pub start: u32,
	pub end: u32,
}

/// Where a chunk came from. Every field is optional because ingestion quality varies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
	pub repo: Option<String>,
	#[serde(rename = "ref")]
	pub git_ref: Option<String>,
	pub path: Option<String>,
	pub url: Option<String>,
	pub start_line: Option<u32>,
	pub end_line: Option<u32>,
}
impl Provenance {
	pub fn line_span(&self) -> Option<LineSpan> {
		match (self.start_line, self.end_line) {
			(Some(start), Some(end)) if start <= end => Some(LineSpan { start, end }),
			_ => None,
		}
	}

	/// Path for code, URL for docs, whichever exists otherwise.
	pub fn locator(&self, content_type: ContentType) -> Option<&str> {
		let path = self.path.as_deref().filter(|value| !value.is_empty());
		let url = self.url.as_deref().filter(|value| !value.is_empty());

		match content_type {
			ContentType::Code => path.or(url),
			ContentType::Doc => url.or(path),
		}
	}

	/// Heuristic used to choose between duplicate hits. A line span weighs the most.
	pub fn completeness(&self) -> u32 {
		let mut score = 0;

		for field in [&self.repo, &self.git_ref, &self.path, &self.url] {
			if field.as_deref().is_some_and(|value| !value.is_empty()) {
				score += 1;
			}
		}
		if self.line_span().is_some() {
			score += 3;
		}

		score
	}
}

/// Payload fields decoded from a stored point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitPayload {
	pub content_type: Option<ContentType>,
	pub chunk_id: Option<String>,
	pub text: String,
	pub provenance: Provenance,
}

/// One result row returned by a collection search, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
	pub collection: String,
	/// Type declared for the collection; the payload's own type wins when present.
	pub collection_type: ContentType,
	pub point_id: String,
	pub score: f32,
	pub payload: HitPayload,
}
impl RawHit {
	pub fn content_type(&self) -> ContentType {
		self.payload.content_type.unwrap_or(self.collection_type)
	}
}

/// A deduplicated retrieval unit carrying its best known provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub candidate_id: String,
	pub content_type: ContentType,
	pub collection: String,
	pub point_id: String,
	pub chunk_id: Option<String>,
	pub text: String,
	pub text_hash: String,
	pub provenance: Provenance,
	/// Fused store score; the fallback order when reranking is unavailable.
	pub store_score: f32,
}
impl Candidate {
	/// Returns `None` when the hit has neither a path nor a URL to identify it by.
	pub fn from_hit(hit: RawHit) -> Option<Self> {
		let content_type = hit.content_type();
		let locator = hit.payload.provenance.locator(content_type)?.to_string();
		let text_hash = text::text_hash(&hit.payload.text);
		let chunk_identity = match (&hit.payload.chunk_id, hit.payload.provenance.line_span()) {
			(Some(chunk_id), _) if !chunk_id.is_empty() => format!("chunk:{chunk_id}"),
			(_, Some(span)) => format!("lines:{}-{}", span.start, span.end),
			_ => format!("text:{text_hash}"),
		};
		let provenance = &hit.payload.provenance;
		let candidate_id = text::fields_hash(&[
			content_type.as_str(),
			provenance.repo.as_deref().unwrap_or_default(),
			provenance.git_ref.as_deref().unwrap_or_default(),
			&locator,
			&chunk_identity,
		]);

		Some(Self {
			candidate_id,
			content_type,
			collection: hit.collection,
			point_id: hit.point_id,
			chunk_id: hit.payload.chunk_id,
			text: hit.payload.text,
			text_hash,
			provenance: hit.payload.provenance,
			store_score: hit.score,
		})
	}

	pub fn citation(&self) -> Option<Citation> {
		citation::cite(self.content_type, &self.provenance)
	}
}

/// Where a ranked candidate's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
	Rerank,
	Store,
}

/// A candidate placed in final order, with the citation it would be presented under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
	pub candidate: Candidate,
	pub rerank_score: f32,
	pub score_source: ScoreSource,
	pub citation: Option<Citation>,
}
impl RankedCandidate {
	pub fn new(candidate: Candidate, rerank_score: f32, score_source: ScoreSource) -> Self {
		let citation = candidate.citation();

		Self { candidate, rerank_score, score_source, citation }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn code_hit(path: Option<&str>, chunk_id: Option<&str>) -> RawHit {
		RawHit {
			collection: "grounding_code".to_string(),
			collection_type: ContentType::Code,
			point_id: "1".to_string(),
			score: 0.5,
			payload: HitPayload {
				content_type: None,
				chunk_id: chunk_id.map(str::to_string),
				text: "class FunctionTool(BaseTool):".to_string(),
				provenance: Provenance {
					repo: Some("adk-python".to_string()),
					git_ref: Some("v1.2.0".to_string()),
					path: path.map(str::to_string),
					url: None,
					start_line: Some(10),
					end_line: Some(42),
				},
			},
		}
	}

	#[test]
	fn candidate_identity_is_stable_and_provenance_based() {
		let first = Candidate::from_hit(code_hit(Some("src/tools/function_tool.py"), Some("c1")))
			.expect("Hit with a path must become a candidate.");
		let mut moved = code_hit(Some("src/tools/function_tool.py"), Some("c1"));

		moved.collection = "other".to_string();
		moved.point_id = "99".to_string();
		moved.score = 0.1;

		let second = Candidate::from_hit(moved).expect("Hit with a path must become a candidate.");

		assert_eq!(first.candidate_id, second.candidate_id);

		let other_chunk = Candidate::from_hit(code_hit(Some("src/tools/function_tool.py"), Some("c2")))
			.expect("Hit with a path must become a candidate.");

		assert_ne!(first.candidate_id, other_chunk.candidate_id);
	}

	#[test]
	fn hits_without_locator_are_rejected() {
		assert!(Candidate::from_hit(code_hit(None, Some("c1"))).is_none());
	}

	#[test]
	fn payload_type_overrides_collection_type() {
		let mut hit = code_hit(Some("docs/tools.md"), None);

		hit.payload.content_type = Some(ContentType::Doc);

		assert_eq!(hit.content_type(), ContentType::Doc);
	}

	#[test]
	fn line_span_requires_ordered_bounds() {
		let provenance = Provenance { start_line: Some(9), end_line: Some(3), ..Default::default() };

		assert!(provenance.line_span().is_none());
		assert_eq!(provenance.completeness(), 0);
	}

	#[test]
	fn content_type_parses_corpus_labels() {
		assert_eq!(ContentType::parse("Docs"), Some(ContentType::Doc));
		assert_eq!(ContentType::parse("code"), Some(ContentType::Code));
		assert_eq!(ContentType::parse("notes"), None);
	}
}
