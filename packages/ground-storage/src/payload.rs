use std::collections::HashMap;

use qdrant_client::qdrant::{ScoredPoint, Value, point_id::PointIdOptions, value::Kind};

use ground_domain::{ContentType, HitPayload, Provenance, RawHit};

const TEXT_KEYS: [&str; 3] = ["text", "chunk_text", "content"];
const TYPE_KEYS: [&str; 3] = ["content_type", "kind", "corpus"];
const REF_KEYS: [&str; 3] = ["ref", "git_ref", "commit"];
const URL_KEYS: [&str; 2] = ["url", "source_url"];

/// Turns a scored point into a hit. Missing fields stay missing.
pub fn decode_point(collection: &str, collection_type: ContentType, point: ScoredPoint) -> RawHit {
	let payload = &point.payload;
	let point_id = match point.id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
		Some(PointIdOptions::Uuid(id)) => id.clone(),
		Some(PointIdOptions::Num(id)) => id.to_string(),
		None => String::new(),
	};
	let content_type = first_string(payload, &TYPE_KEYS).and_then(|raw| ContentType::parse(&raw));
	let chunk_id = payload_string(payload, "chunk_id")
		.or_else(|| payload_u32(payload, "chunk_id").map(|id| id.to_string()));
	let provenance = Provenance {
		repo: payload_string(payload, "repo"),
		git_ref: first_string(payload, &REF_KEYS),
		path: payload_string(payload, "path"),
		url: first_string(payload, &URL_KEYS),
		start_line: payload_u32(payload, "start_line"),
		end_line: payload_u32(payload, "end_line"),
	};

	RawHit {
		collection: collection.to_string(),
		collection_type,
		point_id,
		score: point.score,
		payload: HitPayload {
			content_type,
			chunk_id,
			text: first_string(payload, &TEXT_KEYS).unwrap_or_default(),
			provenance,
		},
	}
}

fn first_string(payload: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
	keys.iter().find_map(|key| payload_string(payload, key))
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) if !text.trim().is_empty() => Some(text.clone()),
		_ => None,
	}
}

fn payload_u32(payload: &HashMap<String, Value>, key: &str) -> Option<u32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => u32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 && *value >= 0.0 {
				u32::try_from(*value as i64).ok()
			} else {
				None
			},
		Some(Kind::StringValue(text)) => text.trim().parse().ok(),
		_ => None,
	}
}
