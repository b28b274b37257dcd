use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::user::{PublicProfile, User, UserSummary};
use crate::infra::db::Db;
use crate::realtime::PresenceTracker;

/// Follower, following and favorite sets are read from their edge tables.
pub(crate) const USER_SELECT: &str = "\
    SELECT u.id, u.name, u.email, u.avatar, u.bio, u.created_at, \
           ARRAY(SELECT f.follower_id FROM follows f \
                 WHERE f.followee_id = u.id ORDER BY f.created_at, f.follower_id) AS followers, \
           ARRAY(SELECT f.followee_id FROM follows f \
                 WHERE f.follower_id = u.id ORDER BY f.created_at, f.followee_id) AS following, \
           ARRAY(SELECT uf.recipe_id FROM user_favorites uf \
                 WHERE uf.user_id = u.id ORDER BY uf.created_at, uf.recipe_id) AS favorites \
    FROM users u";

pub(crate) fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        avatar: row.get("avatar"),
        bio: row.get("bio"),
        followers: row.get("followers"),
        following: row.get("following"),
        favorites: row.get("favorites"),
        online: false,
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
    presence: PresenceTracker,
}

impl UserService {
    pub fn new(db: Db, presence: PresenceTracker) -> Self {
        Self { db, presence }
    }

    pub async fn get_user(&self, user_id: Uuid) -> ServiceResult<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE u.id = $1", USER_SELECT))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        let mut user = match row {
            Some(row) => user_from_row(&row),
            None => return Ok(None),
        };
        user.online = self.presence.is_online(user.id).await;
        Ok(Some(user))
    }

    pub async fn get_profile(&self, user_id: Uuid) -> ServiceResult<PublicProfile> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;

        let recipes_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
                .bind(user_id)
                .fetch_one(self.db.pool())
                .await?;

        Ok(PublicProfile::from_user(user, recipes_count))
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        name: Option<String>,
        bio: Option<String>,
        avatar: Option<String>,
    ) -> ServiceResult<User> {
        let updated = sqlx::query(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 bio = COALESCE($3, bio), \
                 avatar = COALESCE($4, avatar), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(name.map(|name| name.trim().to_string()))
        .bind(bio)
        .bind(avatar)
        .execute(self.db.pool())
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::not_found("user not found"));
        }

        self.get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))
    }
}

/// Name and avatar as they are right now, for copying into notifications.
pub(crate) async fn load_summary<'e, E>(executor: E, user_id: Uuid) -> ServiceResult<UserSummary>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query("SELECT id, name, avatar FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| ServiceError::not_found("user not found"))?;

    Ok(UserSummary {
        id: row.get("id"),
        name: row.get("name"),
        avatar: row.get("avatar"),
    })
}
