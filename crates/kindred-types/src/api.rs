use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{UserId, Viewer};

// -- Session --

/// Body of `GET /profile/view`. Only the identity fields are read; the
/// profile carries more (photo, about, skills) that the conversation ignores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl From<ProfileResponse> for Viewer {
    fn from(profile: ProfileResponse) -> Self {
        Viewer {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
        }
    }
}

// -- Chat history --

/// Body of `GET /chat/{target_user_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub messages: Vec<ChatEntry>,
}

/// One persisted message. The sender is populated server-side into an
/// embedded object under the `senderId` key.
///
/// Each entry decodes on its own: an unpopulated string id keeps the id
/// without names, and a sender or timestamp of any other shape becomes
/// `None` instead of failing the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    #[serde(rename = "senderId", default, deserialize_with = "sender_of_any_shape")]
    pub sender: Option<SenderRef>,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderRef {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Invalid(IgnoredAny),
}

/// `Some` when the value has the expected shape, `None` for anything else.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Valid(value) => Some(value),
        Lenient::Invalid(_) => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SenderShape {
    Populated(SenderRef),
    Bare(UserId),
}

fn sender_of_any_shape<'de, D>(deserializer: D) -> Result<Option<SenderRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::<D, SenderShape>(deserializer)?.map(|shape| match shape {
        SenderShape::Populated(sender) => sender,
        SenderShape::Bare(id) => SenderRef {
            id,
            first_name: String::new(),
            last_name: String::new(),
        },
    }))
}
