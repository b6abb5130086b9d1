use serde::Serialize;
use sqlx::FromRow;

/// Application owning tenants, users and service accounts.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Application {
    pub id: i32,
    pub description: String,
    pub uri: String,
    pub website: Option<String>,
    pub is_admin: bool,
    pub signup_enabled: bool,
    pub signup_password_enabled: bool,
}

impl Application {
    /// Token audiences: the application URI plus its public website.
    pub fn audiences(&self) -> Vec<String> {
        let mut audiences = vec![self.uri.clone()];
        if let Some(website) = self.website.as_deref().filter(|w| !w.is_empty()) {
            audiences.push(website.to_string());
        }
        audiences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(website: Option<&str>) -> Application {
        Application {
            id: 1,
            description: "Shop".to_string(),
            uri: "https://api.shop.test".to_string(),
            website: website.map(str::to_string),
            is_admin: false,
            signup_enabled: false,
            signup_password_enabled: false,
        }
    }

    #[test]
    fn test_audiences_include_website() {
        assert_eq!(
            application(Some("https://shop.test")).audiences(),
            vec!["https://api.shop.test", "https://shop.test"]
        );
    }

    #[test]
    fn test_blank_website_is_ignored() {
        assert_eq!(application(Some("")).audiences(), vec!["https://api.shop.test"]);
        assert_eq!(application(None).audiences(), vec!["https://api.shop.test"]);
    }
}
