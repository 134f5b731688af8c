//! Error message extraction from backend responses

use serde_json::Value;

/// Pull a human readable message out of an error body
///
/// Understands `{"detail": "..."}`, FastAPI validation errors
/// (`{"detail": [{"msg": "..."}]}`), `{"message": "..."}` and
/// `{"error": "..."}`. Non-JSON bodies yield nothing.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    if let Some(detail) = value.get("detail") {
        match detail {
            Value::String(message) => return non_empty(message),
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .filter(|msg| !msg.trim().is_empty())
                    .collect();
                if !messages.is_empty() {
                    return Some(messages.join("; "));
                }
            }
            _ => {}
        }
    }

    ["message", "error"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .find_map(non_empty)
}

fn non_empty(message: &str) -> Option<String> {
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

/// Read the body of a failed response and extract its message
pub(crate) async fn read_error_message(response: reqwest::Response) -> Option<String> {
    let body = response.text().await.ok()?;
    extract_error_message(&body)
}

pub(crate) async fn read_error_message_or(response: reqwest::Response, fallback: &str) -> String {
    read_error_message(response)
        .await
        .unwrap_or_else(|| fallback.to_string())
}
