use unicode_normalization::UnicodeNormalization;

const FIELD_SEPARATOR: u8 = 0x1f;

pub fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// NFKC, lowercase, single-spaced. Used for content hashing, never for display.
pub fn normalize_text(text: &str) -> String {
	let folded = text.nfkc().collect::<String>().to_lowercase();

	collapse_whitespace(&folded)
}

pub fn text_hash(text: &str) -> String {
	blake3::hash(normalize_text(text).as_bytes()).to_hex().to_string()
}

/// Hashes ordered fields so that `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn fields_hash(fields: &[&str]) -> String {
	let mut hasher = blake3::Hasher::new();

	for field in fields {
		hasher.update(field.as_bytes());
		hasher.update(&[FIELD_SEPARATOR]);
	}

	hasher.finalize().to_hex().to_string()
}
