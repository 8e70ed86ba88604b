use serde::{Deserialize, Serialize};

/// Keyword constraint on a payload field; a hit passes when the field equals any listed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFilter {
	pub field: String,
	pub any_of: Vec<String>,
}
impl PayloadFilter {
	pub fn new(field: impl Into<String>, any_of: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self { field: field.into(), any_of: any_of.into_iter().map(Into::into).collect() }
	}

	pub fn is_empty(&self) -> bool {
		self.field.trim().is_empty() || self.any_of.is_empty()
	}

	pub fn matches(&self, value: Option<&str>) -> bool {
		value.map(|value| self.any_of.iter().any(|allowed| allowed == value)).unwrap_or(false)
	}
}
