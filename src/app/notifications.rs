use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::ownership::ensure_owner;
use crate::domain::notification::{Notification, NotificationEvent, SenderSnapshot};
use crate::infra::db::Db;
use crate::realtime::{PresenceTracker, ServerEvent};

const NOTIFICATION_COLUMNS: &str =
    "id, receiver_id, sender_name, sender_avatar, event, message, recipe_slug, read, created_at";

/// Everything the dispatcher needs to know about one action.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub receiver_id: Uuid,
    pub actor_id: Uuid,
    pub sender: SenderSnapshot,
    pub event: NotificationEvent,
    pub recipe_slug: Option<String>,
}

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
    presence: PresenceTracker,
}

impl NotificationService {
    pub fn new(db: Db, presence: PresenceTracker) -> Self {
        Self { db, presence }
    }

    /// Persists the notification, then pushes it to the receiver if they are
    /// online. Acting on your own recipe produces nothing.
    pub async fn notify(&self, draft: NotificationDraft) -> ServiceResult<Option<Notification>> {
        if !should_notify(draft.receiver_id, draft.actor_id) {
            return Ok(None);
        }

        let message = draft.event.message(&draft.sender.name);
        let row = sqlx::query(&format!(
            "INSERT INTO notifications \
                (receiver_id, sender_name, sender_avatar, event, message, recipe_slug) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(draft.receiver_id)
        .bind(&draft.sender.name)
        .bind(&draft.sender.avatar)
        .bind(draft.event.as_db())
        .bind(message)
        .bind(&draft.recipe_slug)
        .fetch_one(self.db.pool())
        .await?;

        let notification = notification_from_row(&row)?;

        let delivered = self
            .presence
            .push(
                notification.receiver_id,
                ServerEvent::GetNotification(notification.clone()),
            )
            .await;
        if delivered {
            debug!(notification_id = %notification.id, receiver_id = %notification.receiver_id, "notification pushed");
        } else {
            debug!(notification_id = %notification.id, receiver_id = %notification.receiver_id, "receiver offline, notification stored");
        }

        Ok(Some(notification))
    }

    /// Like [`notify`](Self::notify), but a failure is logged instead of returned.
    /// Used after the triggering mutation has already been committed.
    pub async fn notify_best_effort(&self, draft: NotificationDraft) {
        let receiver_id = draft.receiver_id;
        let event = draft.event;
        if let Err(err) = self.notify(draft).await {
            warn!(error = ?err, receiver_id = %receiver_id, event = event.as_db(), "failed to dispatch notification");
        }
    }

    pub async fn list(
        &self,
        receiver_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> ServiceResult<Vec<Notification>> {
        let rows = match cursor {
            Some((created_at, notification_id)) => {
                sqlx::query(&format!(
                    "SELECT {} FROM notifications \
                     WHERE receiver_id = $1 \
                       AND (created_at < $2 OR (created_at = $2 AND id < $3)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                    NOTIFICATION_COLUMNS
                ))
                .bind(receiver_id)
                .bind(created_at)
                .bind(notification_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM notifications \
                     WHERE receiver_id = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2",
                    NOTIFICATION_COLUMNS
                ))
                .bind(receiver_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn mark_all_read(&self, receiver_id: Uuid) -> ServiceResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = true WHERE receiver_id = $1 AND read = false",
        )
        .bind(receiver_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_read(&self, notification_id: Uuid, actor_id: Uuid) -> ServiceResult<Notification> {
        self.ensure_receiver(notification_id, actor_id).await?;

        let row = sqlx::query(&format!(
            "UPDATE notifications SET read = true WHERE id = $1 RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| ServiceError::not_found("notification not found"))?;

        notification_from_row(&row)
    }

    pub async fn delete(&self, notification_id: Uuid, actor_id: Uuid) -> ServiceResult<()> {
        self.ensure_receiver(notification_id, actor_id).await?;

        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND receiver_id = $2")
            .bind(notification_id)
            .bind(actor_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("notification not found"));
        }
        Ok(())
    }

    pub async fn delete_all(&self, receiver_id: Uuid) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE receiver_id = $1")
            .bind(receiver_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }

    async fn ensure_receiver(&self, notification_id: Uuid, actor_id: Uuid) -> ServiceResult<()> {
        let receiver_id: Option<Uuid> =
            sqlx::query_scalar("SELECT receiver_id FROM notifications WHERE id = $1")
                .bind(notification_id)
                .fetch_optional(self.db.pool())
                .await?;

        let receiver_id =
            receiver_id.ok_or_else(|| ServiceError::not_found("notification not found"))?;
        ensure_owner(actor_id, receiver_id, "notification")
    }
}

/// Users are never notified about their own actions.
pub fn should_notify(receiver_id: Uuid, actor_id: Uuid) -> bool {
    receiver_id != actor_id
}

fn notification_from_row(row: &PgRow) -> ServiceResult<Notification> {
    let event: String = row.get("event");
    let event = NotificationEvent::from_db(&event)
        .ok_or_else(|| anyhow::anyhow!("unknown notification event: {}", event))?;

    Ok(Notification {
        id: row.get("id"),
        receiver_id: row.get("receiver_id"),
        sender: SenderSnapshot {
            name: row.get("sender_name"),
            avatar: row.get("sender_avatar"),
        },
        event,
        message: row.get("message"),
        recipe_slug: row.get("recipe_slug"),
        read: row.get("read"),
        created_at: row.get("created_at"),
    })
}
