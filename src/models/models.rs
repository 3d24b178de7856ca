use serde::{Deserialize, Deserializer, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "username", alias = "user_name")]
    pub name: String,
    #[serde(rename = "isAdmin", default, deserialize_with = "flag")]
    pub is_admin: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(rename = "user_isAdmin", default, deserialize_with = "flag")]
    pub user_is_admin: bool,
    #[serde(default, deserialize_with = "flag")]
    pub validated: bool,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Review {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub post_id: String,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: String,
}

/// Body accepted by the review create and update endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Credentials {
    #[serde(default)]
    pub usuario: String,
    #[serde(default)]
    pub password: String,
}

/// Image picked in the post edit form, forwarded as the `image` multipart part.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PostUpdate {
    pub title: String,
    pub body: String,
    pub image: Option<ImageUpload>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Text(String),
}

// The API sends admin and validation flags as 0/1 integers.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        Some(RawFlag::Bool(b)) => b,
        Some(RawFlag::Int(n)) => n != 0,
        Some(RawFlag::Text(s)) => matches!(s.as_str(), "1" | "true"),
        None => false,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}
