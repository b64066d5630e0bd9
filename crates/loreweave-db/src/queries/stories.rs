use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{Rejection, StoreResult};
use crate::ledger;
use crate::models::{StoryPartRow, StoryRow};
use crate::queries::query_character;
use crate::{Database, new_id, now};

const STORY_SELECT: &str = "
    SELECT s.id, s.title, s.creator_id, c.name, c.user_id,
           (SELECT COUNT(*) FROM story_parts sp WHERE sp.story_id = s.id),
           s.created_at, s.last_updated_at
    FROM stories s
    JOIN characters c ON c.id = s.creator_id";

const PART_SELECT: &str = "
    SELECT p.id, p.story_id, p.contributor_id, c.name, p.author_id, u.username,
           p.content, p.part_order, p.created_at
    FROM story_parts p
    JOIN characters c ON c.id = p.contributor_id
    JOIN users u ON u.id = p.author_id";

impl Database {
    /// The creator is the acting user's character, so one is required.
    pub fn create_story(&self, user_id: &str, title: &str) -> StoreResult<StoryRow> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Rejection::InvalidInput("story title is required").into());
        }

        self.with_tx(|tx| {
            let character =
                query_character(tx, "c.user_id = ?1", user_id)?.ok_or(Rejection::NoCharacter)?;

            let id = new_id();
            let ts = now();
            tx.execute(
                "INSERT INTO stories (id, title, creator_id, created_at, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (&id, title, &character.id, &ts),
            )?;

            query_story(tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("story {} vanished after insert", id).into())
        })
    }

    pub fn get_story(&self, id: &str) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| Ok(query_story(conn, id)?))
    }

    /// Most recently updated first.
    pub fn list_stories(&self) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY s.last_updated_at DESC", STORY_SELECT);
            Ok(collect_stories(conn, &sql, [])?)
        })
    }

    pub fn stories_created_by_user(&self, user_id: &str) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE c.user_id = ?1 ORDER BY s.last_updated_at DESC",
                STORY_SELECT
            );
            Ok(collect_stories(conn, &sql, [user_id])?)
        })
    }

    /// Stories the user wrote at least one part of.
    pub fn stories_contributed_by_user(&self, user_id: &str) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE s.id IN (SELECT story_id FROM story_parts WHERE author_id = ?1)
                 ORDER BY s.last_updated_at DESC",
                STORY_SELECT
            );
            Ok(collect_stories(conn, &sql, [user_id])?)
        })
    }

    /// Parts in `part_order`.
    pub fn get_story_parts(&self, story_id: &str) -> Result<Vec<StoryPartRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.story_id = ?1 ORDER BY p.part_order ASC", PART_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([story_id], map_part)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_story_part(&self, id: &str) -> Result<Option<StoryPartRow>> {
        self.with_conn(|conn| Ok(query_story_part(conn, id)?))
    }

    /// Delete a story with its parts and their votes. Only the owner of the
    /// creating character may do this. Deltas of the removed votes are taken
    /// back off the contributors first so cached lore points stay exact.
    pub fn delete_story(&self, story_id: &str, requester_user_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            let story = query_story(tx, story_id)?.ok_or(Rejection::NotFound("story"))?;
            if story.creator_user_id != requester_user_id {
                return Err(Rejection::Forbidden.into());
            }

            let mut stmt = tx.prepare(
                "SELECT p.contributor_id, COALESCE(SUM(v.delta), 0)
                 FROM story_parts p
                 JOIN lore_votes v ON v.story_part_id = p.id
                 WHERE p.story_id = ?1
                 GROUP BY p.contributor_id",
            )?;
            let reversals = stmt
                .query_map([story_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            for (character_id, total) in &reversals {
                ledger::apply_delta(tx, character_id, -total)?;
            }

            tx.execute("DELETE FROM stories WHERE id = ?1", [story_id])?;
            debug!(story_id, reversed = reversals.len(), "story deleted");
            Ok(())
        })
    }
}

pub(crate) fn query_story(conn: &Connection, id: &str) -> rusqlite::Result<Option<StoryRow>> {
    let sql = format!("{} WHERE s.id = ?1", STORY_SELECT);
    conn.query_row(&sql, [id], map_story).optional()
}

pub(crate) fn query_story_part(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<StoryPartRow>> {
    let sql = format!("{} WHERE p.id = ?1", PART_SELECT);
    conn.query_row(&sql, [id], map_part).optional()
}

fn collect_stories<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<StoryRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_story)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn map_story(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        creator_id: row.get(2)?,
        creator_name: row.get(3)?,
        creator_user_id: row.get(4)?,
        part_count: row.get(5)?,
        created_at: row.get(6)?,
        last_updated_at: row.get(7)?,
    })
}

pub(crate) fn map_part(row: &Row<'_>) -> rusqlite::Result<StoryPartRow> {
    Ok(StoryPartRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        contributor_id: row.get(2)?,
        contributor_name: row.get(3)?,
        author_id: row.get(4)?,
        author_username: row.get(5)?,
        content: row.get(6)?,
        part_order: row.get(7)?,
        created_at: row.get(8)?,
    })
}
