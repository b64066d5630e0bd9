//! Stored rows to wire models.
//!
//! Ids and timestamps are stored as text. A single row that fails to parse is
//! an internal error; in lists the bad row is logged and skipped so one
//! corrupt record does not hide the rest.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use loreweave_db::models::{
    CharacterRow, ConversationRow, LoreVoteRow, NotificationRow, StoryPartRow, StoryRow, UserRow,
};
use loreweave_types::api::{Conversation, DirectMessage};
use loreweave_types::models::{Character, LoreVote, Notification, Story, StoryPart, User, VoteType};

fn uuid(raw: &str, field: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} '{}'", field, raw))
}

fn timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt {} '{}'", field, raw))?
        .with_timezone(&Utc))
}

/// Convert every row, dropping the ones that fail with a warning.
pub fn collect_valid<R, T>(rows: Vec<R>, convert: impl Fn(&R) -> Result<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match convert(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping corrupt row: {:#}", e);
                None
            }
        })
        .collect()
}

pub fn user(row: &UserRow) -> Result<User> {
    Ok(User {
        id: uuid(&row.id, "user id")?,
        username: row.username.clone(),
        email: row.email.clone(),
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        enabled: row.enabled,
        created_at: timestamp(&row.created_at, "user created_at")?,
    })
}

pub fn character(row: &CharacterRow) -> Result<Character> {
    Ok(Character {
        id: uuid(&row.id, "character id")?,
        user_id: uuid(&row.user_id, "character user_id")?,
        owner_username: row.owner_username.clone(),
        name: row.name.clone(),
        description: row.description.clone(),
        lore_points: row.lore_points,
        created_at: timestamp(&row.created_at, "character created_at")?,
    })
}

pub fn story(row: &StoryRow) -> Result<Story> {
    Ok(Story {
        id: uuid(&row.id, "story id")?,
        title: row.title.clone(),
        creator_id: uuid(&row.creator_id, "story creator_id")?,
        creator_name: row.creator_name.clone(),
        part_count: row.part_count,
        created_at: timestamp(&row.created_at, "story created_at")?,
        last_updated_at: timestamp(&row.last_updated_at, "story last_updated_at")?,
    })
}

pub fn story_part(row: &StoryPartRow) -> Result<StoryPart> {
    Ok(StoryPart {
        id: uuid(&row.id, "story part id")?,
        story_id: uuid(&row.story_id, "story part story_id")?,
        contributor_id: uuid(&row.contributor_id, "story part contributor_id")?,
        contributor_name: row.contributor_name.clone(),
        author_id: uuid(&row.author_id, "story part author_id")?,
        author_username: row.author_username.clone(),
        content: row.content.clone(),
        part_order: row.part_order,
        created_at: timestamp(&row.created_at, "story part created_at")?,
    })
}

pub fn lore_vote(row: &LoreVoteRow) -> Result<LoreVote> {
    let vote_type: VoteType = row
        .vote_type
        .parse()
        .with_context(|| format!("corrupt vote_type '{}'", row.vote_type))?;
    Ok(LoreVote {
        id: uuid(&row.id, "vote id")?,
        story_part_id: uuid(&row.story_part_id, "vote story_part_id")?,
        voter_id: uuid(&row.voter_id, "vote voter_id")?,
        vote_type,
        delta: row.delta,
        created_at: timestamp(&row.created_at, "vote created_at")?,
    })
}

pub fn notification(row: &NotificationRow) -> Result<Notification> {
    Ok(Notification {
        id: uuid(&row.id, "notification id")?,
        message: row.message.clone(),
        link: row.link.clone(),
        from_username: row.sender_username.clone(),
        read: row.is_read,
        created_at: timestamp(&row.created_at, "notification created_at")?,
    })
}

pub fn conversation(row: &ConversationRow) -> Result<Conversation> {
    Ok(Conversation {
        other_party_username: row.partner_username.clone(),
        last_message_at: timestamp(&row.last_message_at, "conversation last_message_at")?,
        unread_count: row.unread_count,
    })
}

/// A direct message whose sender account is gone shows as `[deleted]`.
pub fn direct_message(row: &NotificationRow) -> Result<DirectMessage> {
    Ok(DirectMessage {
        id: uuid(&row.id, "message id")?,
        from_username: row
            .sender_username
            .clone()
            .unwrap_or_else(|| "[deleted]".to_string()),
        to_username: row.recipient_username.clone(),
        text: row.message.clone(),
        read: row.is_read,
        created_at: timestamp(&row.created_at, "message created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_row(id: &str) -> StoryRow {
        StoryRow {
            id: id.to_string(),
            title: "The Long Road".into(),
            creator_id: Uuid::new_v4().to_string(),
            creator_name: "Mira".into(),
            creator_user_id: Uuid::new_v4().to_string(),
            part_count: 2,
            created_at: "2026-03-01T10:00:00.000000Z".into(),
            last_updated_at: "2026-03-02T10:00:00.000000Z".into(),
        }
    }

    #[test]
    fn corrupt_rows_are_skipped_in_lists() {
        let good = Uuid::new_v4().to_string();
        let rows = vec![story_row(&good), story_row("not-a-uuid")];
        let stories = collect_valid(rows, story);
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].id.to_string(), good);
    }

    #[test]
    fn single_corrupt_row_is_an_error() {
        let mut row = story_row(&Uuid::new_v4().to_string());
        row.created_at = "yesterday".into();
        let err = story(&row).unwrap_err();
        assert!(format!("{:#}", err).contains("story created_at"));
    }

    #[test]
    fn vote_type_is_parsed() {
        let row = LoreVoteRow {
            id: Uuid::new_v4().to_string(),
            story_part_id: Uuid::new_v4().to_string(),
            voter_id: Uuid::new_v4().to_string(),
            vote_type: "NEGATIVE".into(),
            delta: -1,
            created_at: "2026-03-01T10:00:00Z".into(),
        };
        assert_eq!(lore_vote(&row).unwrap().vote_type, VoteType::Negative);
    }
}
