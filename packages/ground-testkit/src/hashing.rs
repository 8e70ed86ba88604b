//! Feature-hashed stand-ins for learned embeddings. Texts sharing words score close together.

use std::collections::BTreeMap;

use ground_domain::SparseVector;

const SPARSE_VOCABULARY: u32 = 1 << 20;

/// Lowercased alphanumeric runs; `snake_case` identifiers split into their parts.
pub fn words(text: &str) -> Vec<String> {
	text.split(|ch: char| !ch.is_alphanumeric())
		.filter(|word| !word.is_empty())
		.map(str::to_lowercase)
		.collect()
}

/// L2-normalized signed bag of words. `salt` separates embedding spaces.
pub fn dense_vector(salt: &str, dimensions: usize, text: &str) -> Vec<f32> {
	let dimensions = dimensions.max(1);
	let mut vector = vec![0.0_f32; dimensions];

	for word in words(text) {
		let digest = blake3::hash(format!("{salt}\u{1f}{word}").as_bytes());
		let bytes = digest.as_bytes();
		let slot = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize % dimensions;
		let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };

		vector[slot] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		vector.iter_mut().for_each(|value| *value /= norm);
	}

	vector
}

/// Term frequencies keyed by hashed word, indices ascending.
pub fn sparse_vector(text: &str) -> SparseVector {
	let mut terms = BTreeMap::new();

	for word in words(text) {
		let digest = blake3::hash(word.as_bytes());
		let bytes = digest.as_bytes();
		let index = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % SPARSE_VOCABULARY;

		*terms.entry(index).or_insert(0.0_f32) += 1.0;
	}

	SparseVector { indices: terms.keys().copied().collect(), values: terms.values().copied().collect() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shared_words_raise_similarity() {
		let query = dense_vector("docs", 64, "add a function tool");
		let related = dense_vector("docs", 64, "Function tools wrap a Python function.");
		let unrelated = dense_vector("docs", 64, "Session state persists between turns.");

		assert!(
			ground_domain::vector::cosine(&query, &related)
				> ground_domain::vector::cosine(&query, &unrelated)
		);
	}

	#[test]
	fn sparse_vectors_count_repeated_terms() {
		let vector = sparse_vector("tool tool agent");

		assert_eq!(vector.indices.len(), 2);
		assert_eq!(vector.values.iter().sum::<f32>(), 3.0);
		assert!(vector.dot(&sparse_vector("tool")) >= 2.0);
	}
}
