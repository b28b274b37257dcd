use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::notifications::{NotificationDraft, NotificationService};
use crate::app::ownership::ensure_owner;
use crate::app::recipes::load_recipe;
use crate::app::users::load_summary;
use crate::domain::comment::Comment;
use crate::domain::notification::{NotificationEvent, SenderSnapshot};
use crate::domain::recipe::{LikeState, Recipe};
use crate::domain::user::UserSummary;
use crate::infra::db::Db;

const MAX_COMMENT_LEN: usize = 2000;

const COMMENT_SELECT: &str = "\
    SELECT c.id, c.recipe_id, c.content, c.created_at, c.updated_at, \
           u.id AS author_id, u.name AS author_name, u.avatar AS author_avatar \
    FROM comments c \
    JOIN users u ON u.id = c.author_id";

/// Likes, favorites and comments. Likes and comments notify the recipe author
/// once the change is committed.
#[derive(Clone)]
pub struct EngagementService {
    db: Db,
    notifier: NotificationService,
}

impl EngagementService {
    pub fn new(db: Db, notifier: NotificationService) -> Self {
        Self { db, notifier }
    }

    /// Adds the like if it is absent, removes it otherwise. Only the
    /// transition to liked notifies.
    pub async fn toggle_like(&self, actor_id: Uuid, recipe_id: Uuid) -> ServiceResult<(LikeState, Recipe)> {
        let mut tx = self.db.pool().begin().await?;
        let target = lock_recipe(&mut tx, recipe_id).await?;

        let removed = sqlx::query("DELETE FROM recipe_likes WHERE recipe_id = $1 AND user_id = $2")
            .bind(recipe_id)
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;

        // The sender snapshot is read before commit so nothing after the
        // commit can fail the request.
        let (state, actor) = if removed.rows_affected() > 0 {
            (LikeState::Unliked, None)
        } else {
            sqlx::query("INSERT INTO recipe_likes (recipe_id, user_id) VALUES ($1, $2)")
                .bind(recipe_id)
                .bind(actor_id)
                .execute(&mut *tx)
                .await?;
            let actor = load_summary(&mut *tx, actor_id).await?;
            (LikeState::Liked, Some(actor))
        };
        tx.commit().await?;

        tracing::debug!(recipe_id = %recipe_id, user_id = %actor_id, state = ?state, "like toggled");

        if let Some(actor) = actor {
            self.notifier
                .notify_best_effort(draft(&target, actor, NotificationEvent::Liked))
                .await;
        }

        let recipe = load_recipe(&self.db, recipe_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no recipe with this id"))?;
        Ok((state, recipe))
    }

    /// Returns whether the recipe is now a favorite, with the updated set.
    pub async fn toggle_favorite(&self, actor_id: Uuid, recipe_id: Uuid) -> ServiceResult<(bool, Vec<Uuid>)> {
        let mut tx = self.db.pool().begin().await?;
        lock_recipe(&mut tx, recipe_id).await?;

        let removed = sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND recipe_id = $2")
            .bind(actor_id)
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;

        let favorited = removed.rows_affected() == 0;
        if favorited {
            sqlx::query("INSERT INTO user_favorites (user_id, recipe_id) VALUES ($1, $2)")
                .bind(actor_id)
                .bind(recipe_id)
                .execute(&mut *tx)
                .await?;
        }

        let favorites: Vec<Uuid> = sqlx::query_scalar(
            "SELECT recipe_id FROM user_favorites WHERE user_id = $1 ORDER BY created_at, recipe_id",
        )
        .bind(actor_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((favorited, favorites))
    }

    pub async fn list_comments(
        &self,
        recipe_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> ServiceResult<Vec<Comment>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM recipes WHERE id = $1)")
            .bind(recipe_id)
            .fetch_one(self.db.pool())
            .await?;
        if !exists {
            return Err(ServiceError::not_found("no recipe with this id"));
        }

        let (cursor_created_at, cursor_id) = match cursor {
            Some((created_at, id)) => (Some(created_at), Some(id)),
            None => (None, None),
        };

        let rows = sqlx::query(&format!(
            "{} \
             WHERE c.recipe_id = $1 \
               AND ($2::timestamptz IS NULL \
                    OR c.created_at < $2 OR (c.created_at = $2 AND c.id < $3)) \
             ORDER BY c.created_at DESC, c.id DESC \
             LIMIT $4",
            COMMENT_SELECT
        ))
        .bind(recipe_id)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn create_comment(&self, actor_id: Uuid, recipe_id: Uuid, content: &str) -> ServiceResult<Comment> {
        let content = validate_content(content)?;

        let target = sqlx::query("SELECT author_id, slug FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(self.db.pool())
            .await?
            .map(|row| TargetRecipe::from_row(&row))
            .ok_or_else(|| ServiceError::not_found("no recipe with this id"))?;

        let row = sqlx::query(
            "WITH inserted AS ( \
                INSERT INTO comments (recipe_id, author_id, content) \
                VALUES ($1, $2, $3) \
                RETURNING id, recipe_id, author_id, content, created_at, updated_at \
             ) \
             SELECT c.id, c.recipe_id, c.content, c.created_at, c.updated_at, \
                    u.id AS author_id, u.name AS author_name, u.avatar AS author_avatar \
             FROM inserted c \
             JOIN users u ON u.id = c.author_id",
        )
        .bind(recipe_id)
        .bind(actor_id)
        .bind(content)
        .fetch_one(self.db.pool())
        .await?;

        let comment = comment_from_row(&row);
        tracing::debug!(comment_id = %comment.id, recipe_id = %recipe_id, author_id = %actor_id, "comment created");

        self.notifier
            .notify_best_effort(draft(&target, comment.author.clone(), NotificationEvent::Commented))
            .await;

        Ok(comment)
    }

    pub async fn update_comment(&self, actor_id: Uuid, comment_id: Uuid, content: &str) -> ServiceResult<Comment> {
        let content = validate_content(content)?;

        let mut tx = self.db.pool().begin().await?;
        let author_id = lock_comment_author(&mut tx, comment_id).await?;
        ensure_owner(actor_id, author_id, "comment")?;

        sqlx::query("UPDATE comments SET content = $2, updated_at = now() WHERE id = $1")
            .bind(comment_id)
            .bind(content)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!("{} WHERE c.id = $1", COMMENT_SELECT))
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(comment_from_row(&row))
    }

    pub async fn delete_comment(&self, actor_id: Uuid, comment_id: Uuid) -> ServiceResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let author_id = lock_comment_author(&mut tx, comment_id).await?;
        ensure_owner(actor_id, author_id, "comment")?;

        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }
}

struct TargetRecipe {
    author_id: Uuid,
    slug: String,
}

impl TargetRecipe {
    fn from_row(row: &PgRow) -> Self {
        Self {
            author_id: row.get("author_id"),
            slug: row.get("slug"),
        }
    }
}

fn draft(target: &TargetRecipe, actor: UserSummary, event: NotificationEvent) -> NotificationDraft {
    NotificationDraft {
        receiver_id: target.author_id,
        actor_id: actor.id,
        sender: SenderSnapshot {
            name: actor.name,
            avatar: actor.avatar,
        },
        event,
        recipe_slug: Some(target.slug.clone()),
    }
}

async fn lock_recipe(tx: &mut Transaction<'_, Postgres>, recipe_id: Uuid) -> ServiceResult<TargetRecipe> {
    sqlx::query("SELECT author_id, slug FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(recipe_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|row| TargetRecipe::from_row(&row))
        .ok_or_else(|| ServiceError::not_found("no recipe with this id"))
}

async fn lock_comment_author(tx: &mut Transaction<'_, Postgres>, comment_id: Uuid) -> ServiceResult<Uuid> {
    let author_id: Option<Uuid> =
        sqlx::query_scalar("SELECT author_id FROM comments WHERE id = $1 FOR UPDATE")
            .bind(comment_id)
            .fetch_optional(&mut **tx)
            .await?;
    author_id.ok_or_else(|| ServiceError::not_found("comment not found"))
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        recipe_id: row.get("recipe_id"),
        author: UserSummary {
            id: row.get("author_id"),
            name: row.get("author_name"),
            avatar: row.get("author_avatar"),
        },
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn validate_content(content: &str) -> ServiceResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ServiceError::validation("comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(ServiceError::validation("comment must be at most 2000 characters"));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_content_is_trimmed() {
        assert_eq!(validate_content("  tasty  ").unwrap(), "tasty");
    }

    #[test]
    fn blank_comment_is_rejected() {
        assert!(matches!(validate_content("   "), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn oversized_comment_is_rejected() {
        let content = "a".repeat(MAX_COMMENT_LEN + 1);
        assert!(matches!(validate_content(&content), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn draft_targets_recipe_author() {
        let target = TargetRecipe {
            author_id: Uuid::new_v4(),
            slug: "tomato-soup".to_string(),
        };
        let actor = UserSummary {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            avatar: None,
        };

        let draft = draft(&target, actor.clone(), NotificationEvent::Liked);
        assert_eq!(draft.receiver_id, target.author_id);
        assert_eq!(draft.actor_id, actor.id);
        assert_eq!(draft.sender.name, "Ada");
        assert_eq!(draft.recipe_slug.as_deref(), Some("tomato-soup"));
    }
}
