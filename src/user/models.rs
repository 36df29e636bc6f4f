use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Email used for uniqueness, `None` when absent or blank.
    #[must_use]
    pub fn unique_email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|email| !email.is_empty())
    }
}

/// Link to an external identity provider account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthRecord {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
    pub last_active: DateTime<Utc>,
}

/// Stored user document. Never rendered directly; see [`UserView`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub person_info: Option<PersonInfo>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub version: i64,
    #[serde(default)]
    pub role_ids: Vec<String>,
    pub oauth: Option<OAuthRecord>,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthView {
    pub provider: String,
    pub email: String,
    pub last_active: DateTime<Utc>,
}

/// Public projection of a user: no password hash, no provider token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub person_info: Option<PersonInfo>,
    pub contact_info: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub version: i64,
    pub role_ids: Vec<String>,
    pub oauth: Option<OAuthView>,
    pub avatar: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            person_info: user.person_info,
            contact_info: user.contact_info,
            created_at: user.created_at,
            version: user.version,
            role_ids: user.role_ids,
            oauth: user.oauth.map(|oauth| OAuthView {
                provider: oauth.provider,
                email: oauth.email,
                last_active: oauth.last_active,
            }),
            avatar: user.avatar,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserCommand {
    pub username: String,
    /// Absent for accounts created through an external provider.
    pub password: Option<String>,
    pub person_info: Option<PersonInfo>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub role_ids: Vec<String>,
    pub avatar: Option<String>,
}

/// Fields left as `None` keep their stored value.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserCommand {
    pub password: Option<String>,
    pub person_info: Option<PersonInfo>,
    pub contact_info: Option<ContactInfo>,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleCommand {
    pub user_id: String,
    pub role_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_drops_secrets() -> anyhow::Result<()> {
        let user = User {
            id: "0123456789abcdef01234567".into(),
            username: "alice".into(),
            password_hash: Some("$argon2id$v=19$secret".into()),
            person_info: None,
            contact_info: ContactInfo::default(),
            created_at: Utc::now(),
            version: 1,
            role_ids: Vec::new(),
            oauth: Some(OAuthRecord {
                provider: "google".into(),
                provider_id: "42".into(),
                email: "a@x".into(),
                access_token: "ya29.provider-token".into(),
                expiry: None,
                last_active: Utc::now(),
            }),
            avatar: None,
        };
        let rendered = serde_json::to_string(&UserView::from(user))?;
        assert!(!rendered.contains("argon2id"));
        assert!(!rendered.contains("ya29"));
        assert!(rendered.contains("\"username\":\"alice\""));
        Ok(())
    }

    #[test]
    fn blank_email_is_not_unique_key() {
        let contact = ContactInfo {
            email: Some("  ".into()),
            phone: None,
        };
        assert_eq!(contact.unique_email(), None);
    }
}
