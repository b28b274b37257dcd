use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::infra::db::Db;

/// Follow edges. One `follows` row is both `target.followers ∋ actor` and
/// `actor.following ∋ target`, so each mutation is a single atomic write.
#[derive(Clone)]
pub struct SocialService {
    db: Db,
}

impl SocialService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn follow(&self, actor_id: Uuid, target_id: Uuid) -> ServiceResult<()> {
        if actor_id == target_id {
            return Err(ServiceError::validation("cannot follow yourself"));
        }

        let mut tx = self.db.pool().begin().await?;

        let target: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR SHARE")
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?;
        if target.is_none() {
            tx.rollback().await?;
            return Err(ServiceError::not_found("user not found"));
        }

        let result = sqlx::query(
            "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(actor_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServiceError::conflict("you are already following this user"));
        }

        tx.commit().await?;
        tracing::debug!(follower_id = %actor_id, followee_id = %target_id, "follow edge created");
        Ok(())
    }

    pub async fn unfollow(&self, actor_id: Uuid, target_id: Uuid) -> ServiceResult<()> {
        if actor_id == target_id {
            return Err(ServiceError::validation("cannot unfollow yourself"));
        }

        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(actor_id)
            .bind(target_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(follower_id = %actor_id, followee_id = %target_id, "follow edge removed");
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(target_id)
            .fetch_one(self.db.pool())
            .await?;
        if exists {
            Err(ServiceError::conflict("you are not following this user"))
        } else {
            Err(ServiceError::not_found("user not found"))
        }
    }
}
