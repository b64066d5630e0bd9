//! Database row types. These map directly to SQLite rows and are kept
//! apart from the loreweave-types wire models so the DB layer stays
//! independent. Ids and timestamps are the stored strings.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CharacterRow {
    pub id: String,
    pub user_id: String,
    pub owner_username: String,
    pub name: String,
    pub description: String,
    pub lore_points: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StoryRow {
    pub id: String,
    pub title: String,
    pub creator_id: String,
    pub creator_name: String,
    pub creator_user_id: String,
    pub part_count: i64,
    pub created_at: String,
    pub last_updated_at: String,
}

#[derive(Debug, Clone)]
pub struct StoryPartRow {
    pub id: String,
    pub story_id: String,
    pub contributor_id: String,
    pub contributor_name: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub part_order: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LoreVoteRow {
    pub id: String,
    pub story_part_id: String,
    pub voter_id: String,
    pub vote_type: String,
    pub delta: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub recipient_username: String,
    pub sender_id: Option<String>,
    pub sender_username: Option<String>,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub partner_username: String,
    pub last_message_at: String,
    pub unread_count: i64,
}

/// What produced a notification. Only `Message` rows form conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Message,
    Vote,
    Contribution,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Vote => "VOTE",
            Self::Contribution => "CONTRIBUTION",
        }
    }
}
