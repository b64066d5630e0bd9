use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{Rejection, StoreResult, is_constraint_violation};
use crate::models::CharacterRow;
use crate::{Database, new_id, now};

const CHARACTER_SELECT: &str = "
    SELECT c.id, c.user_id, u.username, c.name, c.description, c.lore_points, c.created_at
    FROM characters c
    JOIN users u ON u.id = c.user_id";

impl Database {
    /// One character per user; a second attempt is `AlreadyExists`.
    pub fn create_character(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<CharacterRow> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Rejection::InvalidInput("character name is required").into());
        }
        let description = description.trim();

        self.with_tx(|tx| {
            let owned: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM characters WHERE user_id = ?1)",
                [user_id],
                |r| r.get(0),
            )?;
            if owned {
                return Err(Rejection::AlreadyExists("character").into());
            }

            let id = new_id();
            tx.execute(
                "INSERT INTO characters (id, user_id, name, description, lore_points, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                (&id, user_id, name, description, now()),
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Rejection::AlreadyExists("character").into()
                } else {
                    crate::StoreError::from(e)
                }
            })?;

            query_character(tx, "c.id = ?1", &id)?
                .ok_or_else(|| anyhow::anyhow!("character {} vanished after insert", id).into())
        })
    }

    pub fn get_character(&self, id: &str) -> Result<Option<CharacterRow>> {
        self.with_conn(|conn| Ok(query_character(conn, "c.id = ?1", id)?))
    }

    pub fn get_character_for_user(&self, user_id: &str) -> Result<Option<CharacterRow>> {
        self.with_conn(|conn| Ok(query_character(conn, "c.user_id = ?1", user_id)?))
    }
}

pub(crate) fn query_character(
    conn: &Connection,
    predicate: &str,
    value: &str,
) -> rusqlite::Result<Option<CharacterRow>> {
    let sql = format!("{} WHERE {}", CHARACTER_SELECT, predicate);
    conn.query_row(&sql, [value], map_character).optional()
}

pub(crate) fn query_all_characters(conn: &Connection) -> rusqlite::Result<Vec<CharacterRow>> {
    let sql = format!("{} ORDER BY c.created_at ASC, c.rowid ASC", CHARACTER_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_character)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn map_character(row: &Row<'_>) -> rusqlite::Result<CharacterRow> {
    Ok(CharacterRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        owner_username: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        lore_points: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Rejection;
    use crate::test_support;

    #[test]
    fn one_character_per_user() {
        let db = test_support::db();
        let user = test_support::user(&db, "mira");

        let first = db.create_character(&user, "  Mira Vale ", "A cartographer").unwrap();
        assert_eq!(first.name, "Mira Vale");
        assert_eq!(first.lore_points, 0);
        assert_eq!(first.owner_username, "mira");

        let err = db.create_character(&user, "Second", "").unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::AlreadyExists("character")));
    }

    #[test]
    fn blank_name_is_rejected() {
        let db = test_support::db();
        let user = test_support::user(&db, "mira");
        let err = db.create_character(&user, "   ", "").unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::InvalidInput(_))));
    }

    #[test]
    fn lookup_by_owner() {
        let db = test_support::db();
        let p = test_support::player(&db, "mira");
        let found = db.get_character_for_user(&p.user_id).unwrap().unwrap();
        assert_eq!(found.id, p.character_id);
        assert!(db.get_character_for_user("nobody").unwrap().is_none());
    }
}
