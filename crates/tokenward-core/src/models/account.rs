use serde::{Deserialize, Serialize};

/// The `user` object returned with a freshly issued credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl AccountSummary {
    /// Name for display, falling back to username then email.
    pub fn display_name(&self) -> &str {
        [&self.name, &self.username, &self.email]
            .into_iter()
            .find(|s| !s.is_empty())
            .map_or("", String::as_str)
    }
}

/// Profile of the logged-in user from the `users/me` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub login_count: Option<i64>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        let mut account = AccountSummary {
            id: 3,
            username: "jdoe".into(),
            email: "jdoe@example.com".into(),
            name: String::new(),
        };
        assert_eq!(account.display_name(), "jdoe");
        account.username.clear();
        assert_eq!(account.display_name(), "jdoe@example.com");
        account.name = "Jane".into();
        assert_eq!(account.display_name(), "Jane");
    }

    #[test]
    fn test_parse_profile() {
        let json = r#"{"id": 7, "username": "jdoe", "email": "jdoe@example.com", "first_name": "Jane", "last_name": "Doe", "login_count": 12, "dark_mode": false}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.full_name(), "Jane Doe");
        assert_eq!(profile.login_count, Some(12));
        assert_eq!(profile.last_activity, None);
    }
}
