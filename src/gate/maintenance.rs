use std::collections::HashMap;

/// Maintenance lock as read from configuration. Written only by admin actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceLock {
    /// User allowed through while the lock is active; 0 for nobody.
    pub locked_by_user_id: i64,
    pub is_active: bool,
}

impl MaintenanceLock {
    /// Whether a request may pass while maintenance is active.
    ///
    /// Allowed: AJAX requests, `nodbupgrade=1`, `a=upgrade` with a non-empty
    /// `type`, and the user holding the lock.
    #[must_use]
    pub fn allows(&self, is_ajax: bool, params: &HashMap<String, String>, user_id: i64) -> bool {
        if !self.is_active || is_ajax {
            return true;
        }

        let param = |name: &str| params.get(name).map(String::as_str);

        if param("nodbupgrade").and_then(|v| v.trim().parse::<i64>().ok()) == Some(1) {
            return true;
        }

        if param("a") == Some("upgrade") && param("type").is_some_and(|t| !t.is_empty()) {
            return true;
        }

        self.locked_by_user_id > 0 && user_id > 0 && self.locked_by_user_id == user_id
    }
}
