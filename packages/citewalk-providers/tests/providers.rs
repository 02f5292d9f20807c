use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};

use citewalk_providers::Error;

#[test]
fn builds_bearer_auth_header() {
	let headers =
		citewalk_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn empty_api_key_sends_no_authorization() {
	let headers =
		citewalk_providers::auth_headers("  ", &Map::new()).expect("Failed to build headers.");

	assert!(headers.get(AUTHORIZATION).is_none());
}

#[test]
fn copies_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("X-Client".to_string(), Value::String("citewalk".to_string()));

	let headers = citewalk_providers::auth_headers("", &defaults).expect("Failed to build headers.");

	assert_eq!(headers.get("x-client").expect("Missing default header."), "citewalk");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("X-Retries".to_string(), Value::from(3));

	let err = citewalk_providers::auth_headers("", &defaults).expect_err("Expected invalid header.");

	assert!(matches!(err, Error::InvalidConfig { .. }));
	assert!(!err.is_transient());
}
