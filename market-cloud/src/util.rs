//! Shared utility functions for market-cloud

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Fresh opaque row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Treat empty metadata values the same as absent ones
pub fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        let blank = "  ".to_string();
        let value = "ord_1".to_string();
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(&blank)), None);
        assert_eq!(non_empty(Some(&value)), Some("ord_1"));
    }

    #[test]
    fn test_new_id_unique() {
        assert_ne!(new_id(), new_id());
    }
}
