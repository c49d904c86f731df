use std::time::Duration;

/// Everything the client needs to talk to one HIS instance.
///
/// Deliberately decoupled from the persisted `Instance` entity (owned by
/// `his-sync-store`) so this crate never depends on the storage layer.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: canonicalize_base_url(&base_url.into()),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Ensures exactly one trailing `/`, per spec.md §6.
pub fn canonicalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    format!("{trimmed}/")
}

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_trailing_slash() {
        assert_eq!(canonicalize_base_url("https://host/api"), "https://host/api/");
        assert_eq!(canonicalize_base_url("https://host/api/"), "https://host/api/");
        assert_eq!(canonicalize_base_url("https://host/api///"), "https://host/api/");
    }
}
