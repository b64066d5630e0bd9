//! Lore votes on story parts.
//!
//! Checks run in a fixed order and stop at the first failure: part exists,
//! contributor resolves, voter is not the contributor's owner, vote type is
//! valid, no earlier vote from this voter. The vote row and the ledger update
//! are committed together.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use loreweave_types::models::VoteType;

use crate::error::{Rejection, StoreError, StoreResult, is_constraint_violation};
use crate::ledger;
use crate::models::LoreVoteRow;
use crate::{Database, new_id, now};

/// Everything the caller needs after a committed vote, including who to
/// notify.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub vote: LoreVoteRow,
    pub vote_type: VoteType,
    pub story_id: String,
    pub story_title: String,
    pub contributor_id: String,
    pub contributor_user_id: String,
    pub contributor_lore_points: i64,
}

struct VoteTarget {
    story_id: String,
    story_title: String,
    contributor_id: String,
    contributor_user_id: Option<String>,
}

impl Database {
    /// Cast a vote. `raw_type` is the value as the client sent it; a missing
    /// or unknown value is only reported after the ownership checks.
    pub fn cast_vote(
        &self,
        story_part_id: &str,
        voter_id: &str,
        raw_type: Option<&str>,
    ) -> StoreResult<VoteReceipt> {
        self.with_tx(|tx| {
            let target = load_target(tx, story_part_id)?.ok_or(Rejection::NotFound("story part"))?;
            let contributor_user_id = target
                .contributor_user_id
                .ok_or(Rejection::NotFound("contributor"))?;

            if contributor_user_id == voter_id {
                debug!(story_part_id, voter_id, "self vote refused");
                return Err(Rejection::SelfVote.into());
            }

            let vote_type = raw_type
                .and_then(|raw| raw.parse::<VoteType>().ok())
                .ok_or(Rejection::InvalidType)?;

            if has_voted(tx, story_part_id, voter_id)? {
                return Err(Rejection::Duplicate.into());
            }

            let vote = LoreVoteRow {
                id: new_id(),
                story_part_id: story_part_id.to_string(),
                voter_id: voter_id.to_string(),
                vote_type: vote_type.as_str().to_string(),
                delta: vote_type.delta(),
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO lore_votes (id, story_part_id, voter_id, vote_type, delta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    vote.id,
                    vote.story_part_id,
                    vote.voter_id,
                    vote.vote_type,
                    vote.delta,
                    vote.created_at
                ],
            )
            .map_err(|e| -> StoreError {
                if is_constraint_violation(&e) {
                    Rejection::Duplicate.into()
                } else {
                    e.into()
                }
            })?;

            let total = ledger::apply_delta(tx, &target.contributor_id, vote.delta)?;

            Ok(VoteReceipt {
                vote,
                vote_type,
                story_id: target.story_id,
                story_title: target.story_title,
                contributor_id: target.contributor_id,
                contributor_user_id,
                contributor_lore_points: total,
            })
        })
    }

    pub fn has_voted(&self, story_part_id: &str, voter_id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(has_voted(conn, story_part_id, voter_id)?))
    }

    pub fn count_positive_votes(&self, story_part_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM lore_votes WHERE story_part_id = ?1 AND vote_type = 'POSITIVE'",
                [story_part_id],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }

    /// (positives − negatives, total votes) for one part.
    pub fn part_score(&self, story_part_id: &str) -> Result<(i64, i64)> {
        self.with_conn(|conn| {
            let score = conn.query_row(
                "SELECT COALESCE(SUM(delta), 0), COUNT(*) FROM lore_votes WHERE story_part_id = ?1",
                [story_part_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(score)
        })
    }

    pub fn votes_by_voter(&self, voter_id: &str) -> Result<Vec<LoreVoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, story_part_id, voter_id, vote_type, delta, created_at
                 FROM lore_votes WHERE voter_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([voter_id], |row| {
                    Ok(LoreVoteRow {
                        id: row.get(0)?,
                        story_part_id: row.get(1)?,
                        voter_id: row.get(2)?,
                        vote_type: row.get(3)?,
                        delta: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

fn load_target(conn: &Connection, story_part_id: &str) -> rusqlite::Result<Option<VoteTarget>> {
    // LEFT JOINs so a dangling contributor surfaces as None rather than no row.
    conn.query_row(
        "SELECT p.story_id, s.title, p.contributor_id, u.id
         FROM story_parts p
         JOIN stories s ON s.id = p.story_id
         LEFT JOIN characters c ON c.id = p.contributor_id
         LEFT JOIN users u ON u.id = c.user_id
         WHERE p.id = ?1",
        [story_part_id],
        |r| {
            Ok(VoteTarget {
                story_id: r.get(0)?,
                story_title: r.get(1)?,
                contributor_id: r.get(2)?,
                contributor_user_id: r.get(3)?,
            })
        },
    )
    .optional()
}

fn has_voted(conn: &Connection, story_part_id: &str, voter_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM lore_votes WHERE story_part_id = ?1 AND voter_id = ?2)",
        (story_part_id, voter_id),
        |r| r.get(0),
    )
}
