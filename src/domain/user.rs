use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub favorites: Vec<Uuid>,
    #[serde(default)]
    pub online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Profile as seen by other users; never carries the email address.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub favorites: Vec<Uuid>,
    pub online: bool,
    pub recipes_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PublicProfile {
    pub fn from_user(user: User, recipes_count: i64) -> Self {
        Self {
            id: user.id,
            name: user.name,
            avatar: user.avatar,
            bio: user.bio,
            followers: user.followers,
            following: user.following,
            favorites: user.favorites,
            online: user.online,
            recipes_count,
            created_at: user.created_at,
        }
    }
}

/// Name and avatar of a user as they are at a given moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}
