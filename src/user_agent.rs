//! Default User-Agent for download requests.
//!
//! Hosts normally pass the page's own User-Agent to `start_download`; this one is
//! only sent when they do not.

/// Project URL sent in the default User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/web-downloads";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("web-downloads/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_carries_version_and_project_url() {
        let ua = default_download_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("web-downloads/")
                .and_then(|s| s.split(' ').next()),
            "UA must contain crate version"
        );
    }
}
