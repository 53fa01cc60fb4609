//! Request identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user request, immutable for the duration of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Opaque identifier
    pub id: Uuid,
    /// Free-text prompt
    pub text: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Create a request with a fresh id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new("What's the weather in Mumbai?");
        let b = Request::new("What's the weather in Mumbai?");
        assert_ne!(a.id, b.id);
        assert_eq!(a.text, b.text);
        assert_eq!(a.id.get_version_num(), 4);
    }
}
