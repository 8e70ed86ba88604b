use serde::{Deserialize, Serialize};

/// What the calling agent is doing; steers rerank wording and the coverage requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
	#[default]
	Build,
	Debug,
	Explain,
	Refactor,
}
impl TaskMode {
	pub const ALL: [Self; 4] = [Self::Build, Self::Debug, Self::Explain, Self::Refactor];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Build => "build",
			Self::Debug => "debug",
			Self::Explain => "explain",
			Self::Refactor => "refactor",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|mode| mode.as_str().eq_ignore_ascii_case(raw.trim()))
	}

	/// Implementation-shaped work needs both prose and source in the evidence.
	pub fn requires_mixed_grounding(self) -> bool {
		!matches!(self, Self::Explain)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn modes_round_trip_through_their_wire_names() {
		for mode in TaskMode::ALL {
			let encoded = serde_json::to_string(&mode).expect("Mode must serialize.");

			assert_eq!(encoded, format!("\"{}\"", mode.as_str()));
			assert_eq!(TaskMode::parse(mode.as_str()), Some(mode));
		}
	}

	#[test]
	fn only_explain_skips_mixed_grounding() {
		assert!(!TaskMode::Explain.requires_mixed_grounding());
		assert!(TaskMode::Refactor.requires_mixed_grounding());
		assert_eq!(TaskMode::parse(" DEBUG "), Some(TaskMode::Debug));
		assert_eq!(TaskMode::parse("deploy"), None);
	}
}
