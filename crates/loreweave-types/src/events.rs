use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// A notification addressed to the receiving user
    Notification {
        id: Uuid,
        message: String,
        from_username: Option<String>,
        link: Option<String>,
        created_at: DateTime<Utc>,
    },

    /// Unpersisted chat line relayed to everyone
    ChatBroadcast {
        text: String,
        from_username: String,
        created_at: DateTime<Utc>,
    },

    /// A new part was appended to a story
    StoryPartCreate {
        story_id: Uuid,
        part_id: Uuid,
        part_order: i64,
        contributor_name: String,
        author_username: String,
        content: String,
        created_at: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Returns the story_id if this event is scoped to a specific story.
    /// Events that return `None` are global.
    pub fn story_id(&self) -> Option<Uuid> {
        match self {
            Self::StoryPartCreate { story_id, .. } => Some(*story_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Receive story-scoped events for these stories only.
    Subscribe { story_ids: Vec<Uuid> },

    /// Chat line for every connected client; not stored.
    Broadcast { text: String },

    /// Direct message, stored as a notification for the recipient.
    SendPrivate { to: String, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_event_wire_shape() {
        let event = GatewayEvent::Notification {
            id: Uuid::nil(),
            message: "hello".into(),
            from_username: Some("mira".into()),
            link: None,
            created_at: DateTime::default(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Notification");
        assert_eq!(value["data"]["from_username"], "mira");
        assert_eq!(value["data"]["created_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn only_story_events_are_scoped() {
        let story_id = Uuid::new_v4();
        let part = GatewayEvent::StoryPartCreate {
            story_id,
            part_id: Uuid::new_v4(),
            part_order: 1,
            contributor_name: "Arin".into(),
            author_username: "arin".into(),
            content: "Once".into(),
            created_at: Utc::now(),
        };
        assert_eq!(part.story_id(), Some(story_id));

        let chat = GatewayEvent::ChatBroadcast {
            text: "hi".into(),
            from_username: "arin".into(),
            created_at: Utc::now(),
        };
        assert_eq!(chat.story_id(), None);
    }

    #[test]
    fn parses_send_private_command() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"SendPrivate","data":{"to":"bo","text":"hey"}}"#)
                .unwrap();
        match cmd {
            GatewayCommand::SendPrivate { to, text } => {
                assert_eq!(to, "bo");
                assert_eq!(text, "hey");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
