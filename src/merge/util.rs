use anyhow::Result;
use std::fs;
use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

/// Archive-relative paths from a manifest must stay inside the archive.
pub fn is_safe_relative(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return false;
    }
    Path::new(trimmed)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Strip `window.X = ` / `var x = ` / `Grailbird.data.x = ` style prefixes and a trailing
/// semicolon, returning the assigned literal.
pub fn assignment_payload(raw: &str) -> Option<&str> {
    let raw = raw.trim_start_matches('\u{feff}');
    let eq = raw.find('=')?;
    let payload = raw[eq + 1..].trim();
    let payload = payload.strip_suffix(';').unwrap_or(payload).trim_end();
    let starts_ok = payload.starts_with('[') || payload.starts_with('{');
    if !starts_ok {
        return None;
    }
    Some(payload)
}

/// The left-hand side of the assignment, trimmed, with any `var ` keyword removed.
pub fn assignment_target(raw: &str) -> Option<&str> {
    let raw = raw.trim_start_matches('\u{feff}');
    let eq = raw.find('=')?;
    let lhs = raw[..eq].trim();
    Some(lhs.strip_prefix("var ").map(str::trim).unwrap_or(lhs))
}

/// Parse a script-embedded JSON literal, falling back to JSON5 for hand-edited payloads.
pub fn parse_payload<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T> {
    match serde_json::from_str(payload) {
        Ok(v) => Ok(v),
        Err(strict_err) => json5::from_str(payload)
            .map_err(|_| anyhow::anyhow!("invalid JSON payload: {strict_err}")),
    }
}

pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '_' {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_strips_window_assignment() {
        let raw = "window.YTD.tweets.part0 = [ {\"a\": 1} ];\n";
        assert_eq!(assignment_payload(raw), Some("[ {\"a\": 1} ]"));
        assert_eq!(assignment_target(raw), Some("window.YTD.tweets.part0"));
    }

    #[test]
    fn payload_rejects_non_literal() {
        assert_eq!(assignment_payload("window.x = foo();"), None);
        assert_eq!(assignment_payload("no assignment"), None);
    }

    #[test]
    fn var_prefix_is_dropped_from_target() {
        assert_eq!(
            assignment_target("var tweet_index = []"),
            Some("tweet_index")
        );
    }

    #[test]
    fn lenient_payload_accepts_trailing_commas() {
        let parsed: serde_json::Value = parse_payload("[1, 2, 3,]").expect("json5 fallback");
        assert_eq!(parsed, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn unsafe_relative_paths_are_rejected() {
        assert!(is_safe_relative("data/tweets_media"));
        assert!(!is_safe_relative("../elsewhere"));
        assert!(!is_safe_relative("/etc"));
        assert!(!is_safe_relative("  "));
    }

    #[test]
    fn kebab_case_file_names() {
        assert_eq!(camel_to_kebab("directMessages"), "direct-messages");
        assert_eq!(camel_to_kebab("accountCreationIp"), "account-creation-ip");
        assert_eq!(camel_to_kebab("tweets"), "tweets");
        assert_eq!(camel_to_kebab("ad_impressions"), "ad-impressions");
    }
}
