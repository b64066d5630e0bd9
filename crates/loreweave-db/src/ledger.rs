//! Lore-point ledger.
//!
//! `characters.lore_points` is written incrementally, in the same transaction
//! as the vote that causes it. Recomputing from the vote history is the
//! repair path for reads; it never runs outside a transaction of its own.

use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use crate::error::{Rejection, StoreResult};
use crate::models::CharacterRow;
use crate::Database;
use crate::queries::{query_all_characters, query_character};

/// Add `delta` to a character's stored points. Returns the new total.
pub fn apply_delta(conn: &Connection, character_id: &str, delta: i64) -> StoreResult<i64> {
    let changed = conn.execute(
        "UPDATE characters SET lore_points = lore_points + ?2 WHERE id = ?1",
        (character_id, delta),
    )?;
    if changed == 0 {
        return Err(Rejection::NotFound("character").into());
    }
    let total = conn.query_row(
        "SELECT lore_points FROM characters WHERE id = ?1",
        [character_id],
        |r| r.get(0),
    )?;
    Ok(total)
}

/// Sum of vote deltas across every part the character contributed.
pub fn recompute_from_votes(conn: &Connection, character_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(v.delta), 0)
         FROM lore_votes v
         JOIN story_parts p ON p.id = v.story_part_id
         WHERE p.contributor_id = ?1",
        [character_id],
        |r| r.get(0),
    )
}

/// Compare stored and recomputed points, rewriting the stored value on drift.
fn repair(conn: &Connection, character: &mut CharacterRow) -> rusqlite::Result<()> {
    let total = recompute_from_votes(conn, &character.id)?;
    if total != character.lore_points {
        warn!(
            character_id = %character.id,
            stored = character.lore_points,
            recomputed = total,
            "lore points drifted from vote history, repairing"
        );
        conn.execute(
            "UPDATE characters SET lore_points = ?2 WHERE id = ?1",
            (&character.id, total),
        )?;
        character.lore_points = total;
    }
    Ok(())
}

impl Database {
    pub fn recompute_lore_points(&self, character_id: &str) -> Result<i64> {
        self.with_conn(|conn| Ok(recompute_from_votes(conn, character_id)?))
    }

    /// Verify one character's cached points and return the character.
    pub fn refresh_lore_points(&self, character_id: &str) -> StoreResult<CharacterRow> {
        self.with_tx(|tx| {
            let mut character = query_character(tx, "c.id = ?1", character_id)?
                .ok_or(Rejection::NotFound("character"))?;
            repair(tx, &mut character)?;
            Ok(character)
        })
    }

    /// Every character with verified points, oldest first.
    pub fn list_characters_refreshed(&self) -> StoreResult<Vec<CharacterRow>> {
        self.with_tx(|tx| {
            let mut characters = query_all_characters(tx)?;
            for character in &mut characters {
                repair(tx, character)?;
            }
            Ok(characters)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, player, story};

    #[test]
    fn apply_delta_accumulates() {
        let db = test_support::db();
        let p = player(&db, "mira");

        let total = db
            .with_tx(|tx| {
                apply_delta(tx, &p.character_id, 3)?;
                apply_delta(tx, &p.character_id, -1)
            })
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn apply_delta_on_missing_character() {
        let db = test_support::db();
        let err = db.with_tx(|tx| apply_delta(tx, "ghost", 1)).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("character")));
    }

    #[test]
    fn failed_transaction_leaves_no_vote_behind() {
        let db = test_support::db();
        let a = player(&db, "a");
        let b = player(&db, "b");
        let story_id = story(&db, &a);
        let part = db.append_story_part(&story_id, &a.user_id, "x").unwrap();

        let result: StoreResult<()> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO lore_votes (id, story_part_id, voter_id, vote_type, delta, created_at)
                 VALUES ('v1', ?1, ?2, 'POSITIVE', 1, '2026-01-01T00:00:00Z')",
                (&part.id, &b.user_id),
            )?;
            // Ledger write fails: nothing may survive.
            apply_delta(tx, "ghost", 1)?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!db.has_voted(&part.id, &b.user_id).unwrap());
    }

    #[test]
    fn refresh_repairs_drift() {
        let db = test_support::db();
        let a = player(&db, "a");
        let b = player(&db, "b");
        let story_id = story(&db, &a);
        let part = db.append_story_part(&story_id, &a.user_id, "x").unwrap();
        db.cast_vote(&part.id, &b.user_id, Some("POSITIVE")).unwrap();

        // Corrupt the cache behind the ledger's back.
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE characters SET lore_points = 40 WHERE id = ?1",
                [&a.character_id],
            )?;
            Ok(())
        })
        .unwrap();

        let repaired = db.refresh_lore_points(&a.character_id).unwrap();
        assert_eq!(repaired.lore_points, 1);
        assert_eq!(db.get_character(&a.character_id).unwrap().unwrap().lore_points, 1);
    }

    #[test]
    fn listing_refreshes_every_character() {
        let db = test_support::db();
        let a = player(&db, "a");
        player(&db, "b");

        db.with_conn(|conn| {
            conn.execute("UPDATE characters SET lore_points = 7", [])?;
            Ok(())
        })
        .unwrap();

        let all = db.list_characters_refreshed().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.lore_points == 0));
        assert_eq!(all[0].id, a.character_id);
    }
}
