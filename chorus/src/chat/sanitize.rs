use crate::providers::ProviderError;

/// Shown in production for any error outside the safe categories.
pub const GENERIC_ERROR: &str = "Request failed";

const PRODUCTION_MAX_CHARS: usize = 220;
const DEVELOPMENT_MAX_CHARS: usize = 1000;

/// Lower-cased markers of errors that are safe and useful to show users:
/// billing, quota, rate limiting and authentication.
const SAFE_MARKERS: &[&str] = &[
    "402",
    "payment required",
    "insufficient",
    "credit",
    "quota",
    "429",
    "rate limit",
    "401",
    "invalid api key",
    "authentication",
];

/// Turn a provider error into the message placed under `errors[provider]`.
///
/// Production mode only passes through text matching [`SAFE_MARKERS`];
/// everything else becomes [`GENERIC_ERROR`]. Timeouts and media rejections
/// are server-authored and always shown.
pub fn sanitize(error: &ProviderError, is_production: bool) -> String {
    match error {
        ProviderError::Timeout { .. } | ProviderError::UnsupportedMedia { .. } => {
            truncate(&normalize_whitespace(&error.to_string()), PRODUCTION_MAX_CHARS)
        }
        ProviderError::Api { status, message } => {
            let raw = normalize_whitespace(message);
            let msg = match status {
                Some(status) if !raw.contains(&status.to_string()) => {
                    format!("{status} {raw}").trim_end().to_string()
                }
                _ => raw,
            };

            if !is_production {
                return truncate(&msg, DEVELOPMENT_MAX_CHARS);
            }

            let lower = msg.to_lowercase();
            if SAFE_MARKERS.iter().any(|marker| lower.contains(marker)) {
                truncate(&msg, PRODUCTION_MAX_CHARS)
            } else {
                GENERIC_ERROR.to_string()
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to `max` characters, marking the cut with `...`.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
