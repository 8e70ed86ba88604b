pub mod embedding;
pub mod rate_limit;
pub mod rerank;
pub mod retry;
pub mod sparse;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

async fn post_json(url: String, timeout_ms: u64, headers: HeaderMap, body: &Value) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client.post(url).headers(headers).json(body).send().await?;
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Status {
			status: status.as_u16(),
			body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
		});
	}

	Ok(res.json().await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_headers_include_bearer_and_defaults() {
		let mut defaults = Map::new();

		defaults.insert("x-trace".to_string(), Value::String("on".to_string()));

		let headers = auth_headers("secret", &defaults).expect("Headers must build.");

		assert_eq!(headers.get(AUTHORIZATION).map(|v| v.as_bytes()), Some(&b"Bearer secret"[..]));
		assert_eq!(headers.get("x-trace").map(|v| v.as_bytes()), Some(&b"on"[..]));
	}

	#[test]
	fn non_string_default_headers_are_rejected() {
		let mut defaults = Map::new();

		defaults.insert("x-count".to_string(), Value::from(3));

		assert!(matches!(auth_headers("secret", &defaults), Err(Error::InvalidConfig { .. })));
	}
}
