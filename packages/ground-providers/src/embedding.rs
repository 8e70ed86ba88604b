use serde_json::Value;

use crate::{Error, Result};

/// Embeds texts in one dense space. Vectors come back in input order.
pub async fn embed(
	cfg: &ground_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"input_type": cfg.input_type,
		"dimensions": cfg.dimensions,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(url, cfg.timeout_ms, headers, &body).await?;
	let vectors = parse_embedding_response(json)?;

	check_shape(&vectors, texts.len(), cfg.dimensions as usize)?;

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn check_shape(vectors: &[Vec<f32>], expected_count: usize, dimensions: usize) -> Result<()> {
	if vectors.len() != expected_count {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response returned {} vectors for {expected_count} inputs.",
				vectors.len()
			),
		});
	}
	if let Some(bad) = vectors.iter().find(|vec| vec.len() != dimensions) {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding dimension mismatch: expected {dimensions}, got {}.",
				bad.len()
			),
		});
	}

	Ok(())
}
