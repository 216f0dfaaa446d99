use super::maintenance::MaintenanceLock;

/// Per-request paths and flags computed during bootstrap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Filesystem directory the application is served from.
    pub server_root: String,
    /// URL path prefix the application is mounted under, `""` at the root.
    pub web_root: String,
    /// Scheme and host followed by `web_root`.
    pub web_uri: String,
    /// Entry script relative to `server_root`, e.g. `/index.php`.
    pub sub_uri: String,
    pub lock: MaintenanceLock,
    /// The configuration was upgraded during this request.
    pub updated: bool,
}

impl RequestContext {
    /// Derive the web paths from the request.
    ///
    /// `base_url` is scheme plus host (`https://vault.example.com`),
    /// `request_uri` is the raw path and query, `script_path` is the absolute
    /// path of the entry script and `server_root` the application directory.
    #[must_use]
    pub fn derive(base_url: &str, request_uri: &str, script_path: &str, server_root: &str) -> Self {
        let mut sub_uri = script_path
            .strip_prefix(server_root)
            .unwrap_or(script_path)
            .replace('\\', "/");

        let mut script_name = request_uri.to_string();
        if script_name.ends_with('/') {
            script_name.push_str("index.php");
            if !sub_uri.ends_with("index.php") {
                if !sub_uri.ends_with('/') {
                    sub_uri.push('/');
                }
                sub_uri.push_str("index.php");
            }
        }

        let pos = script_name
            .find(sub_uri.as_str())
            .filter(|_| !sub_uri.is_empty())
            .or_else(|| script_name.find('?'))
            .unwrap_or(0);

        let mut web_root = script_name[..pos].to_string();
        if !web_root.is_empty() && !web_root.starts_with('/') {
            web_root.insert(0, '/');
        }

        Self {
            server_root: server_root.to_string(),
            web_uri: format!("{}{web_root}", base_url.trim_end_matches('/')),
            web_root,
            sub_uri,
            lock: MaintenanceLock::default(),
            updated: false,
        }
    }

    #[must_use]
    pub fn with_lock(mut self, lock: MaintenanceLock) -> Self {
        self.lock = lock;
        self
    }

    #[must_use]
    pub fn with_updated(mut self, updated: bool) -> Self {
        self.updated = updated;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_at_document_root() {
        let ctx = RequestContext::derive(
            "https://vault.example.com",
            "/index.php?r=login",
            "/var/www/syspass/index.php",
            "/var/www/syspass",
        );
        assert_eq!(ctx.sub_uri, "/index.php");
        assert_eq!(ctx.web_root, "");
        assert_eq!(ctx.web_uri, "https://vault.example.com");
    }

    #[test]
    fn app_in_subdirectory() {
        let ctx = RequestContext::derive(
            "https://example.com",
            "/syspass/index.php?r=login",
            "/var/www/index.php",
            "/var/www",
        );
        assert_eq!(ctx.web_root, "/syspass");
        assert_eq!(ctx.web_uri, "https://example.com/syspass");
    }

    #[test]
    fn trailing_slash_implies_index() {
        let ctx = RequestContext::derive(
            "http://example.com/",
            "/syspass/",
            "/var/www",
            "/var/www",
        );
        assert_eq!(ctx.sub_uri, "/index.php");
        assert_eq!(ctx.web_root, "/syspass");
        assert_eq!(ctx.web_uri, "http://example.com/syspass");
    }

    #[test]
    fn windows_separators_are_normalized() {
        let ctx = RequestContext::derive(
            "http://example.com",
            "/index.php",
            "C:\\www\\index.php",
            "C:\\www",
        );
        assert_eq!(ctx.sub_uri, "/index.php");
    }
}
