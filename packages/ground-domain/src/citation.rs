use serde::{Deserialize, Serialize};

use crate::candidate::{ContentType, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationConfidence {
	/// Points at an exact location: a line span in code or a page URL for docs.
	Full,
	/// Points at a file but not a location inside it.
	Reduced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
	pub text: String,
	pub confidence: CitationConfidence,
}

/// Formats a stable citation from provenance alone.
///
/// Code is cited by path and docs by URL. Missing identity fields are omitted rather than
/// invented, and `None` means the item cannot be cited at all.
pub fn cite(content_type: ContentType, provenance: &Provenance) -> Option<Citation> {
	let repo = provenance.repo.as_deref().filter(|value| !value.is_empty());
	let git_ref = provenance.git_ref.as_deref().filter(|value| !value.is_empty());
	let prefix = match (repo, git_ref) {
		(Some(repo), Some(git_ref)) => format!("{repo}@{git_ref}:"),
		(Some(repo), None) => format!("{repo}:"),
		(None, Some(git_ref)) => format!("@{git_ref}:"),
		(None, None) => String::new(),
	};

	match content_type {
		ContentType::Code => {
			let path = provenance.path.as_deref().filter(|value| !value.is_empty())?;

			match provenance.line_span() {
				Some(span) => Some(Citation {
					text: format!("{prefix}{path}#L{}-L{}", span.start, span.end),
					confidence: CitationConfidence::Full,
				}),
				None => Some(Citation {
					text: format!("{prefix}{path}"),
					confidence: CitationConfidence::Reduced,
				}),
			}
		},
		ContentType::Doc => {
			let url = provenance.url.as_deref().filter(|value| !value.is_empty())?;

			Some(Citation { text: format!("{prefix}{url}"), confidence: CitationConfidence::Full })
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn provenance() -> Provenance {
		Provenance {
			repo: Some("adk-python".to_string()),
			git_ref: Some("v1.2.0".to_string()),
			path: Some("src/google/adk/tools/function_tool.py".to_string()),
			url: None,
			start_line: Some(18),
			end_line: Some(64),
		}
	}

	#[test]
	fn code_with_span_gets_full_citation() {
		let citation = cite(ContentType::Code, &provenance()).expect("Code with a path is citable.");

		assert_eq!(citation.text, "adk-python@v1.2.0:src/google/adk/tools/function_tool.py#L18-L64");
		assert_eq!(citation.confidence, CitationConfidence::Full);
	}

	#[test]
	fn code_without_span_is_reduced() {
		let mut provenance = provenance();

		provenance.end_line = None;

		let citation = cite(ContentType::Code, &provenance).expect("Code with a path is citable.");

		assert_eq!(citation.text, "adk-python@v1.2.0:src/google/adk/tools/function_tool.py");
		assert_eq!(citation.confidence, CitationConfidence::Reduced);
	}

	#[test]
	fn missing_ref_is_omitted_not_invented() {
		let mut provenance = provenance();

		provenance.git_ref = None;

		let citation = cite(ContentType::Code, &provenance).expect("Code with a path is citable.");

		assert_eq!(citation.text, "adk-python:src/google/adk/tools/function_tool.py#L18-L64");
	}

	#[test]
	fn docs_need_a_url() {
		let mut provenance = provenance();

		assert!(cite(ContentType::Doc, &provenance).is_none());

		provenance.url = Some("https://google.github.io/adk-docs/tools/function-tools/".to_string());

		let citation = cite(ContentType::Doc, &provenance).expect("Doc with a URL is citable.");

		assert_eq!(citation.text, "adk-python@v1.2.0:https://google.github.io/adk-docs/tools/function-tools/");
	}

	#[test]
	fn code_needs_a_path() {
		let mut provenance = provenance();

		provenance.path = None;
		provenance.url = Some("https://github.com/google/adk-python".to_string());

		assert!(cite(ContentType::Code, &provenance).is_none());
	}
}
