use serde_json::Value;

use ground_config::Config;

const REDACTED: &str = "***";
const SECRET_KEYS: [&str; 2] = ["api_key", "authorization"];

/// Effective configuration as JSON with every credential replaced.
pub fn redacted_config(cfg: &Config) -> Value {
	let mut value = match serde_json::to_value(cfg) {
		Ok(value) => value,
		Err(err) => {
			tracing::warn!(error = %err, "Failed to snapshot configuration.");

			return Value::Null;
		},
	};

	redact(&mut value);

	value
}

fn redact(value: &mut Value) {
	match value {
		Value::Object(map) =>
			for (key, field) in map.iter_mut() {
				let secret = SECRET_KEYS.iter().any(|name| key.eq_ignore_ascii_case(name));

				if secret && !field.is_null() {
					*field = Value::String(REDACTED.to_string());
				} else {
					redact(field);
				}
			},
		Value::Array(items) => items.iter_mut().for_each(redact),
		_ => {},
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn secrets_are_replaced_at_any_depth() {
		let mut value = json!({
			"storage": { "qdrant": { "api_key": null, "url": "http://127.0.0.1:6334" } },
			"providers": {
				"rerank": {
					"api_key": "sk-live",
					"default_headers": { "Authorization": "Bearer sk-live", "X-Team": "core" },
				},
			},
		});

		redact(&mut value);

		assert_eq!(value["storage"]["qdrant"]["api_key"], Value::Null);
		assert_eq!(value["storage"]["qdrant"]["url"], "http://127.0.0.1:6334");
		assert_eq!(value["providers"]["rerank"]["api_key"], REDACTED);
		assert_eq!(value["providers"]["rerank"]["default_headers"]["Authorization"], REDACTED);
		assert_eq!(value["providers"]["rerank"]["default_headers"]["X-Team"], "core");
	}
}
