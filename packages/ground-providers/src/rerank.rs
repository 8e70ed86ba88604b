use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct RerankOptions<'a> {
	/// Task-specific instruction placed ahead of the query.
	pub instruction: Option<&'a str>,
	/// Lets the provider cut over-long documents instead of rejecting the call.
	pub truncation: bool,
}

/// Scores every document against the query. Scores are aligned with `docs`.
pub async fn rerank(
	cfg: &ground_config::RerankProviderConfig,
	query: &str,
	docs: &[String],
	options: RerankOptions<'_>,
) -> Result<Vec<f32>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"query": compose_query(options.instruction, query),
		"documents": docs,
		"top_k": docs.len(),
		"truncation": options.truncation,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let json = crate::post_json(url, cfg.timeout_ms, headers, &body).await?;

	parse_rerank_response(json, docs.len())
}

pub fn compose_query(instruction: Option<&str>, query: &str) -> String {
	match instruction.map(str::trim).filter(|text| !text.is_empty()) {
		Some(instruction) => format!("{instruction}\nQUERY: {query}"),
		None => query.to_string(),
	}
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores = vec![None; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Rerank response is missing results array.".to_string(),
		})?;

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})? as f32;

		if let Some(slot) = scores.get_mut(index) {
			*slot = Some(score);
		}
	}

	let scored = scores.iter().filter(|score| score.is_some()).count();

	if scored != doc_count {
		return Err(Error::InvalidResponse {
			message: format!("Rerank response scored {scored} of {doc_count} documents."),
		});
	}

	Ok(scores.into_iter().map(|score| score.unwrap_or_default()).collect())
}
