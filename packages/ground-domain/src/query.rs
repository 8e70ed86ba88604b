use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text;

/// Wording used to build deterministic query variants.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionTemplates<'a> {
	pub domain_phrase: &'a str,
	pub max_variants: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuery {
	pub primary: String,
	pub variants: Vec<String>,
	pub identifiers: Vec<String>,
}
impl NormalizedQuery {
	/// Primary first, then variants in their fixed order.
	pub fn all(&self) -> impl Iterator<Item = &str> {
		std::iter::once(self.primary.as_str()).chain(self.variants.iter().map(String::as_str))
	}
}

/// Whitespace-collapsed form of the raw question. Empty when the question is blank.
pub fn normalize_query(raw: &str) -> String {
	text::collapse_whitespace(raw)
}

/// Builds the primary query and its variants. Same input, same output, no network.
pub fn expand(raw: &str, templates: ExpansionTemplates<'_>) -> NormalizedQuery {
	let primary = normalize_query(raw);
	let identifiers = extract_identifiers(&primary);
	let mut variants = Vec::new();
	let mut seen = HashSet::new();

	seen.insert(primary.to_lowercase());

	if !identifiers.is_empty() {
		let words = identifiers.iter().flat_map(|ident| split_identifier(ident)).collect::<Vec<_>>();

		push_variant(&mut variants, &mut seen, &format!("{primary} {}", words.join(" ")));
	}

	let domain_phrase = templates.domain_phrase.trim();

	if !domain_phrase.is_empty() {
		push_variant(&mut variants, &mut seen, &format!("{domain_phrase}: {primary}"));
	}

	push_variant(&mut variants, &mut seen, &format!("source code implementation: {primary}"));

	variants.truncate(templates.max_variants);

	NormalizedQuery { primary, variants, identifiers }
}

/// Tokens that look like code: snake_case, camelCase, calls, and dotted or `::` paths.
pub fn extract_identifiers(query: &str) -> Vec<String> {
	let Ok(pattern) = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*") else {
		return Vec::new();
	};
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for found in pattern.find_iter(query) {
		if is_code_shaped(query, found.start(), found.end()) && seen.insert(found.as_str()) {
			out.push(found.as_str().to_string());
		}
	}

	out
}

fn is_code_shaped(query: &str, start: usize, end: usize) -> bool {
	let token = &query[start..end];

	if token.trim_matches('_').is_empty() {
		return false;
	}

	let snake = token.trim_matches('_').contains('_');
	let camel = token
		.chars()
		.zip(token.chars().skip(1))
		.any(|(left, right)| left.is_ascii_lowercase() && right.is_ascii_uppercase());
	let mut before = query[..start].chars().rev();
	let mut after = query[end..].chars();
	let (b1, b2) = (before.next(), before.next());
	let (a1, a2) = (after.next(), after.next());
	let call = a1 == Some('(');
	let path_after = (a1 == Some('.') && a2.is_some_and(is_ident_start))
		|| (a1 == Some(':') && a2 == Some(':'));
	let path_before = (b1 == Some('.') && b2.is_some_and(is_ident_char))
		|| (b1 == Some(':') && b2 == Some(':'));

	snake || camel || call || path_after || path_before
}

fn is_ident_start(ch: char) -> bool {
	ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || ch == '_'
}

/// `FunctionTool` becomes `function tool`, `add_tool` becomes `add tool`.
fn split_identifier(ident: &str) -> Vec<String> {
	let mut words = Vec::new();
	let mut current = String::new();
	let mut prev_lower = false;

	for ch in ident.chars() {
		if ch == '_' {
			if !current.is_empty() {
				words.push(std::mem::take(&mut current));
			}

			prev_lower = false;

			continue;
		}
		if ch.is_ascii_uppercase() && prev_lower && !current.is_empty() {
			words.push(std::mem::take(&mut current));
		}

		prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();

		current.push(ch.to_ascii_lowercase());
	}

	if !current.is_empty() {
		words.push(current);
	}

	words
}

fn push_variant(out: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return;
	}
	if seen.insert(trimmed.to_lowercase()) {
		out.push(trimmed.to_string());
	}
}
