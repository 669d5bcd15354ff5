//! Integration tests for the REST surface contract
//!
//! These tests pin down the externally visible rules of the /api endpoints:
//! - Recognized query parameter keys
//! - Offset cursor format
//! - Error envelope shape and status codes
//! - nextLink composition
//! - Role selection from the client role header

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

// ============================================================================
// Query Parameter Rules
// ============================================================================

const RECOGNIZED_KEYS: &[&str] = &["$select", "$filter", "$orderby", "$first", "$after"];

fn is_recognized_key(key: &str) -> bool {
    RECOGNIZED_KEYS.contains(&key)
}

#[test]
fn test_recognized_keys_are_closed_set() {
    for key in RECOGNIZED_KEYS {
        assert!(is_recognized_key(key));
    }
    // Close OData relatives are not silently accepted
    for key in ["$top", "$skip", "$expand", "$count", "filter", "$Filter"] {
        assert!(!is_recognized_key(key), "{} must be rejected", key);
    }
}

#[test]
fn test_keys_are_case_sensitive() {
    assert!(is_recognized_key("$select"));
    assert!(!is_recognized_key("$SELECT"));
}

// ============================================================================
// Cursor Format
// ============================================================================

fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("cursor:{}", offset))
}

fn decode_cursor(cursor: &str) -> Option<i64> {
    let bytes = BASE64.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix("cursor:")?.parse().ok()
}

#[test]
fn test_cursor_round_trip() {
    for offset in [0, 1, 24, 99, 1_000_000] {
        assert_eq!(decode_cursor(&encode_cursor(offset)), Some(offset));
    }
}

#[test]
fn test_cursor_rejects_garbage() {
    assert_eq!(decode_cursor("not-base64!!"), None);
    assert_eq!(decode_cursor(&BASE64.encode("offset:3")), None);
    assert_eq!(decode_cursor(&BASE64.encode("cursor:abc")), None);
}

#[test]
fn test_cursor_is_opaque_base64() {
    // Clients must not be able to read the offset without decoding
    let cursor = encode_cursor(42);
    assert!(!cursor.contains("42"));
    assert!(!cursor.contains("cursor"));
}

// ============================================================================
// Pagination Rules
// ============================================================================

const DEFAULT_PAGE_SIZE: i64 = 25;
const MAX_PAGE_SIZE: i64 = 100;

fn effective_limit(first: Option<i64>) -> Option<i64> {
    match first {
        None => Some(DEFAULT_PAGE_SIZE),
        Some(n) if n > 0 => Some(n.min(MAX_PAGE_SIZE)),
        Some(_) => None, // invalid
    }
}

#[test]
fn test_default_and_capped_page_size() {
    assert_eq!(effective_limit(None), Some(25));
    assert_eq!(effective_limit(Some(10)), Some(10));
    assert_eq!(effective_limit(Some(100)), Some(100));
    assert_eq!(effective_limit(Some(500)), Some(100));
}

#[test]
fn test_nonpositive_first_is_invalid() {
    assert_eq!(effective_limit(Some(0)), None);
    assert_eq!(effective_limit(Some(-5)), None);
}

#[test]
fn test_cursor_resumes_after_returned_row() {
    // A page ending at offset N hands out cursor(N); the next page starts
    // at N + 1.
    let last_row_offset = 24;
    let cursor = encode_cursor(last_row_offset);
    let next_start = decode_cursor(&cursor).unwrap() + 1;
    assert_eq!(next_start, 25);
}

// ============================================================================
// Error Envelope
// ============================================================================

fn error_envelope(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

#[test]
fn test_error_envelope_shape() {
    let body = error_envelope("INVALID_QUERY_PARAMETER", "'$top' is not recognized");
    assert!(body["error"]["code"].is_string());
    assert!(body["error"]["message"].is_string());
    assert!(body.get("value").is_none());
}

/// Status code per error class, as served by the gateway
fn status_for(code: &str) -> u16 {
    match code {
        "ENTITY_NOT_FOUND" => 404,
        "UNAUTHORIZED" => 401,
        "FORBIDDEN" => 403,
        "DATABASE_ERROR" => 500,
        _ => 400,
    }
}

#[test]
fn test_status_codes_by_error_class() {
    assert_eq!(status_for("INVALID_QUERY_PARAMETER"), 400);
    assert_eq!(status_for("INVALID_FILTER"), 400);
    assert_eq!(status_for("UNKNOWN_FIELD"), 400);
    assert_eq!(status_for("ENTITY_NOT_FOUND"), 404);
    assert_eq!(status_for("UNAUTHORIZED"), 401);
    assert_eq!(status_for("FORBIDDEN"), 403);
    assert_eq!(status_for("DATABASE_ERROR"), 500);
}

// ============================================================================
// Response Envelope and nextLink
// ============================================================================

fn list_envelope(rows: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut body = json!({ "value": rows });
    if let Some(link) = next_link {
        body["nextLink"] = Value::String(link.to_string());
    }
    body
}

#[test]
fn test_list_envelope_without_further_page() {
    let body = list_envelope(vec![json!({"id": 1})], None);
    assert_eq!(body["value"].as_array().unwrap().len(), 1);
    assert!(body.get("nextLink").is_none());
}

#[test]
fn test_list_envelope_with_next_link() {
    let link = format!("/api/Book?$first=25&$after={}", encode_cursor(24));
    let body = list_envelope(vec![], Some(&link));
    let next = body["nextLink"].as_str().unwrap();
    assert!(next.starts_with("/api/Book?"));
    assert!(next.contains("$after="));
}

#[test]
fn test_single_row_envelope_is_a_one_element_list() {
    // /api/{entity}/{field}/{value} wraps the row the same way lists do
    let body = list_envelope(vec![json!({"id": 7, "title": "Dune"})], None);
    assert_eq!(body["value"].as_array().unwrap().len(), 1);
    assert_eq!(body["value"][0]["id"], 7);
}

// ============================================================================
// Role Selection
// ============================================================================

/// System roles every request can fall back to
const ROLE_ANONYMOUS: &str = "anonymous";
const ROLE_AUTHENTICATED: &str = "authenticated";

fn select_role(
    authenticated: bool,
    held_roles: &[&str],
    requested: Option<&str>,
) -> Option<String> {
    match requested {
        None => Some(if authenticated {
            ROLE_AUTHENTICATED.to_string()
        } else {
            ROLE_ANONYMOUS.to_string()
        }),
        Some(r) if r.eq_ignore_ascii_case(ROLE_ANONYMOUS) => Some(ROLE_ANONYMOUS.to_string()),
        Some(r) if r.eq_ignore_ascii_case(ROLE_AUTHENTICATED) && authenticated => {
            Some(ROLE_AUTHENTICATED.to_string())
        }
        Some(r) if held_roles.iter().any(|h| h.eq_ignore_ascii_case(r)) => {
            Some(r.to_lowercase())
        }
        Some(_) => None, // forbidden
    }
}

#[test]
fn test_default_role_tracks_authentication() {
    assert_eq!(select_role(false, &[], None).as_deref(), Some("anonymous"));
    assert_eq!(
        select_role(true, &[], None).as_deref(),
        Some("authenticated")
    );
}

#[test]
fn test_anyone_may_downgrade_to_anonymous() {
    assert_eq!(
        select_role(true, &["editor"], Some("anonymous")).as_deref(),
        Some("anonymous")
    );
}

#[test]
fn test_authenticated_role_requires_a_token() {
    assert_eq!(select_role(false, &[], Some("authenticated")), None);
    assert_eq!(
        select_role(true, &[], Some("authenticated")).as_deref(),
        Some("authenticated")
    );
}

#[test]
fn test_custom_role_must_be_held() {
    assert_eq!(
        select_role(true, &["editor"], Some("Editor")).as_deref(),
        Some("editor")
    );
    assert_eq!(select_role(true, &["editor"], Some("admin")), None);
}

#[test]
fn test_anonymous_caller_cannot_claim_custom_roles() {
    assert_eq!(select_role(false, &[], Some("editor")), None);
}
