use serde_json::Value;

use ground_domain::SparseVector;

use crate::{Error, Result};

/// Computes lexical query vectors with the same method the collections were ingested with.
pub async fn embed_sparse(
	cfg: &ground_config::ProviderConfig,
	texts: &[String],
) -> Result<Vec<SparseVector>> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({ "model": cfg.model, "input": texts, "inputs": texts });
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(url, cfg.timeout_ms, headers, &body).await?;
	let vectors = parse_sparse_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Sparse response returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

/// Accepts `{"data": [{"index", "indices", "values"}]}` or the bare
/// `[[{"index", "value"}]]` shape served by text-embeddings-inference.
fn parse_sparse_response(json: Value) -> Result<Vec<SparseVector>> {
	if let Some(rows) = json.as_array() {
		return rows.iter().map(parse_pairs).collect();
	}

	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Sparse response is missing data array.".to_string() }
	})?;
	let mut indexed = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let body = item.get("sparse_embedding").unwrap_or(item);
		let indices = numbers(body.get("indices"), "indices")?
			.into_iter()
			.map(|value| value as u32)
			.collect::<Vec<_>>();
		let values =
			numbers(body.get("values"), "values")?.into_iter().map(|value| value as f32).collect();

		indexed.push((index, build(indices, values)?));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn parse_pairs(row: &Value) -> Result<SparseVector> {
	let pairs = row.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Sparse row must be an array of index/value pairs.".to_string(),
	})?;
	let mut indices = Vec::with_capacity(pairs.len());
	let mut values = Vec::with_capacity(pairs.len());

	for pair in pairs {
		let (Some(index), Some(value)) =
			(pair.get("index").and_then(|v| v.as_u64()), pair.get("value").and_then(|v| v.as_f64()))
		else {
			return Err(Error::InvalidResponse {
				message: "Sparse pair must carry numeric index and value.".to_string(),
			});
		};

		indices.push(index as u32);
		values.push(value as f32);
	}

	build(indices, values)
}

fn numbers(value: Option<&Value>, field: &str) -> Result<Vec<f64>> {
	let items = value.and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: format!("Sparse item missing {field} array."),
	})?;

	items
		.iter()
		.map(|item| {
			item.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: format!("Sparse {field} must be numeric."),
			})
		})
		.collect()
}

fn build(indices: Vec<u32>, values: Vec<f32>) -> Result<SparseVector> {
	if indices.len() != values.len() {
		return Err(Error::InvalidResponse {
			message: "Sparse indices and values must have the same length.".to_string(),
		});
	}

	Ok(SparseVector { indices, values })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_data_items_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "indices": [7], "values": [0.5] },
				{ "index": 0, "sparse_embedding": { "indices": [3, 11], "values": [1.0, 0.25] } }
			]
		});
		let parsed = parse_sparse_response(json).expect("parse failed");

		assert_eq!(parsed[0], SparseVector { indices: vec![3, 11], values: vec![1.0, 0.25] });
		assert_eq!(parsed[1], SparseVector { indices: vec![7], values: vec![0.5] });
	}

	#[test]
	fn parses_pair_rows() {
		let json = serde_json::json!([[{ "index": 2, "value": 0.75 }], []]);
		let parsed = parse_sparse_response(json).expect("parse failed");

		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0].indices, vec![2]);
		assert!(parsed[1].is_empty());
	}

	#[test]
	fn mismatched_lengths_are_rejected() {
		let json = serde_json::json!({ "data": [{ "indices": [1, 2], "values": [0.5] }] });

		assert!(parse_sparse_response(json).is_err());
	}
}
