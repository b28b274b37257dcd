use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub receiver_id: Uuid,
    /// Copied when the notification is created; later profile edits do not show up here.
    pub sender: SenderSnapshot,
    pub event: NotificationEvent,
    pub message: String,
    pub recipe_slug: Option<String>,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSnapshot {
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Commented,
    Liked,
}

impl NotificationEvent {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "commented" => Some(Self::Commented),
            "liked" => Some(Self::Liked),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Commented => "commented",
            Self::Liked => "liked",
        }
    }

    pub fn message(&self, sender_name: &str) -> String {
        let sender_name = escape_html(sender_name);
        match self {
            Self::Commented => format!("<strong>{}</strong> commented on your recipe", sender_name),
            Self::Liked => format!("<strong>{}</strong> liked your recipe", sender_name),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
