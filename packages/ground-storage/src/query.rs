use ground_domain::{ContentType, PayloadFilter, SparseVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
	/// Reciprocal rank fusion.
	Rrf,
	/// Distribution-based score fusion.
	Dbsf,
}
impl FusionMethod {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"rrf" => Some(Self::Rrf),
			"dbsf" => Some(Self::Dbsf),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Rrf => "rrf",
			Self::Dbsf => "dbsf",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum LaneInput {
	Dense(Vec<f32>),
	Sparse(SparseVector),
	/// Raw text embedded by the store itself with the named model.
	Document { text: String, model: String },
}

/// One prefetch: a query vector against one named vector of the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
	pub vector_name: String,
	pub input: LaneInput,
	pub limit: u32,
}

/// A single fused query against one collection. All lanes are fused server side.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
	pub collection: String,
	pub content_type: ContentType,
	pub lanes: Vec<Lane>,
	pub fusion: FusionMethod,
	pub limit: u32,
	pub hnsw_ef: u64,
	pub exact: bool,
	/// ANDed across filters, applied to every lane.
	pub filters: Vec<PayloadFilter>,
}
impl HybridQuery {
	pub fn active_filters(&self) -> impl Iterator<Item = &PayloadFilter> {
		self.filters.iter().filter(|filter| !filter.is_empty())
	}
}
