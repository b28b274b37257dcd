use serde::{Deserialize, Serialize};

use crate::domain::notification::Notification;

/// Frames the server writes to a live connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "getNotification")]
    GetNotification(Notification),
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    Online,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::{NotificationEvent, SenderSnapshot};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn notification_frame_shape() {
        let notification = Notification {
            id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            sender: SenderSnapshot {
                name: "Ana".to_string(),
                avatar: None,
            },
            event: NotificationEvent::Liked,
            message: NotificationEvent::Liked.message("Ana"),
            recipe_slug: Some("pie".to_string()),
            read: false,
            created_at: OffsetDateTime::now_utc(),
        };

        let frame = serde_json::to_value(ServerEvent::GetNotification(notification)).unwrap();
        assert_eq!(frame["event"], "getNotification");
        assert_eq!(frame["data"]["event"], "liked");
        assert_eq!(frame["data"]["sender"]["name"], "Ana");
        assert_eq!(frame["data"]["read"], false);
    }

    #[test]
    fn parses_online_event() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"online"}"#).unwrap();
        assert_eq!(event, ClientEvent::Online);
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"dance"}"#).is_err());
    }
}
