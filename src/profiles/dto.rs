use serde::Deserialize;

/// Registration form as posted by the local UI. Strings are raw and untrimmed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub profession: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub experience: Option<i64>,
    #[serde(default)]
    pub bio: Option<String>,
}
