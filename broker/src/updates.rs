use anyhow::{Context, Result};
use log::warn;

const RELEASES_URL: &str = "https://api.github.com/repos/voltepatch/voltepatch/releases";

/// Latest release tag of this tool, or "0.0.0" when the check fails for
/// any reason (offline, rate limited, malformed response).
pub fn latest_release_tag() -> String {
    match fetch_latest_tag() {
        Ok(tag) => tag,
        Err(err) => {
            warn!("update check failed: {err:#}");
            String::from("0.0.0")
        }
    }
}

fn fetch_latest_tag() -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()?;
    let releases: serde_json::Value = client
        .get(RELEASES_URL)
        .header("X-GitHub-Api-Version", "2022-11-28")
        .send()?
        .error_for_status()?
        .json()
        .context("malformed releases response")?;
    parse_latest_tag(&releases).context("no release tag in response")
}

fn parse_latest_tag(releases: &serde_json::Value) -> Option<String> {
    Some(releases.get(0)?.get("tag_name")?.as_str()?.to_string())
}

/// Numeric major.minor.patch comparison, tolerating a leading 'v'.
/// Unparseable versions are never reported as newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => false,
    }
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().trim_start_matches('v').splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_latest_tag() {
        let releases = json!([
            { "tag_name": "v0.4.0", "name": "release 0.4.0" },
            { "tag_name": "v0.3.1" },
        ]);
        assert_eq!(parse_latest_tag(&releases), Some("v0.4.0".to_string()));
    }

    #[test]
    fn test_parse_latest_tag_of_malformed_response() {
        assert_eq!(parse_latest_tag(&json!([])), None);
        assert_eq!(parse_latest_tag(&json!({ "message": "rate limited" })), None);
        assert_eq!(parse_latest_tag(&json!([{ "name": "no tag" }])), None);
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("v0.4.0", "0.3.1"));
        assert!(is_newer("1.0.0", "0.9.9"));
        assert!(!is_newer("0.3.1", "0.3.1"));
        assert!(!is_newer("v0.3.0", "0.3.1"));
        // the fallback tag never trips the update notice
        assert!(!is_newer("0.0.0", "0.3.1"));
        assert!(!is_newer("garbage", "0.3.1"));
    }
}
