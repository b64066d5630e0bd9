//! Turn order: nobody appends two consecutive parts to the same story.
//!
//! The turn is keyed on the author (user) of the part with the highest
//! `part_order`. With one character per user this is the same person as the
//! contributor, and it is the identity the self-vote guard uses as well.
//! `part_order` decides which part is last, never `created_at`.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Rejection, StoreResult};
use crate::models::StoryPartRow;
use crate::queries::{query_character, query_story, query_story_part};
use crate::{Database, new_id, now};

/// Author of the latest part and the order it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPart {
    pub author_id: String,
    pub part_order: i64,
}

/// Pure turn rule: a story with no parts is open to anyone, otherwise the
/// author of the last part has to wait.
pub fn check_turn(last: Option<&LastPart>, candidate_user_id: &str) -> Result<(), Rejection> {
    match last {
        Some(last) if last.author_id == candidate_user_id => Err(Rejection::NotYourTurn),
        _ => Ok(()),
    }
}

/// Order the next part of a story receives.
pub fn next_part_order(last: Option<&LastPart>) -> i64 {
    last.map_or(1, |l| l.part_order + 1)
}

pub(crate) fn last_part(conn: &Connection, story_id: &str) -> rusqlite::Result<Option<LastPart>> {
    conn.query_row(
        "SELECT author_id, part_order FROM story_parts
         WHERE story_id = ?1
         ORDER BY part_order DESC
         LIMIT 1",
        [story_id],
        |r| {
            Ok(LastPart {
                author_id: r.get(0)?,
                part_order: r.get(1)?,
            })
        },
    )
    .optional()
}

impl Database {
    /// Read-only turn check. A missing story is `NotFound`.
    pub fn can_contribute(&self, story_id: &str, user_id: &str) -> StoreResult<bool> {
        self.with_tx(|tx| {
            if query_story(tx, story_id)?.is_none() {
                return Err(Rejection::NotFound("story").into());
            }
            let last = last_part(tx, story_id)?;
            Ok(check_turn(last.as_ref(), user_id).is_ok())
        })
    }

    /// Validate the turn and append a part in one transaction. The author's
    /// character is credited as contributor.
    pub fn append_story_part(
        &self,
        story_id: &str,
        author_user_id: &str,
        content: &str,
    ) -> StoreResult<StoryPartRow> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Rejection::InvalidInput("story part content is required").into());
        }

        self.with_tx(|tx| {
            if query_story(tx, story_id)?.is_none() {
                return Err(Rejection::NotFound("story").into());
            }
            let character = query_character(tx, "c.user_id = ?1", author_user_id)?
                .ok_or(Rejection::NoCharacter)?;

            let last = last_part(tx, story_id)?;
            if let Err(rejection) = check_turn(last.as_ref(), author_user_id) {
                debug!(story_id, author_user_id, "contribution out of turn");
                return Err(rejection.into());
            }
            let part_order = next_part_order(last.as_ref());

            let id = new_id();
            let ts = now();
            tx.execute(
                "INSERT INTO story_parts
                    (id, story_id, contributor_id, author_id, content, part_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, story_id, character.id, author_user_id, content, part_order, ts],
            )?;
            tx.execute(
                "UPDATE stories SET last_updated_at = ?2 WHERE id = ?1",
                (story_id, &ts),
            )?;

            query_story_part(tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("story part {} vanished after insert", id).into())
        })
    }
}
