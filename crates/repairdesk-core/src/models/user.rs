use serde::{Deserialize, Serialize};

/// Role stored on the user's profile (`Profile.type` server-side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum ProfileType {
    Admin,
    Manager,
    Technician,
    Client,
    #[serde(other)]
    Other,
}

impl ProfileType {
    /// Value of the `role_name` filter on `/users/`
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Admin => "admin",
            ProfileType::Manager => "manager",
            ProfileType::Technician => "technician",
            ProfileType::Client => "client",
            ProfileType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Profile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub profile_type: Option<ProfileType>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// An account. Shop clients are users with the `client` profile type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct User {
    #[serde(alias = "pk")]
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl User {
    /// "First Last", falling back to the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn phone(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.phone_number.as_deref())
            .filter(|p| !p.is_empty())
    }
}
