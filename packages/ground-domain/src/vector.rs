use serde::{Deserialize, Serialize};

/// Lexical term weights keyed by vocabulary index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
	pub indices: Vec<u32>,
	pub values: Vec<f32>,
}
impl SparseVector {
	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	pub fn dot(&self, other: &Self) -> f32 {
		let mut total = 0.0;

		for (index, value) in self.indices.iter().zip(&self.values) {
			if let Some(pos) = other.indices.iter().position(|candidate| candidate == index) {
				total += value * other.values[pos];
			}
		}

		total
	}
}

pub fn cosine(left: &[f32], right: &[f32]) -> f32 {
	if left.len() != right.len() || left.is_empty() {
		return 0.0;
	}

	let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
	let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
	let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sparse_dot_matches_shared_terms_only() {
		let left = SparseVector { indices: vec![1, 4, 9], values: vec![0.5, 2.0, 1.0] };
		let right = SparseVector { indices: vec![9, 4], values: vec![3.0, 0.25] };

		assert_eq!(left.dot(&right), 3.5);
	}

	#[test]
	fn cosine_handles_degenerate_input() {
		assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
		assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
		assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
	}
}
