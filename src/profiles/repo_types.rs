use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Registered helper, as persisted and as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,                  // assigned by the store, never by callers
    pub name: String,
    pub email: String,
    pub phone: String,
    pub profession: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub skills: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,     // years
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Everything a caller supplies when registering; the store adds `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub profession: String,
    #[serde(default)]
    pub organization: Option<String>,
    pub skills: String,
    #[serde(default)]
    pub experience: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Profile {
    pub fn from_input(id: String, input: ProfileInput, created_at: OffsetDateTime) -> Self {
        let ProfileInput {
            name,
            email,
            phone,
            profession,
            organization,
            skills,
            experience,
            bio,
        } = input;
        Self {
            id,
            name,
            email,
            phone,
            profession,
            organization,
            skills,
            experience,
            bio,
            created_at,
        }
    }
}
