use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{Rejection, StoreResult};
use crate::models::UserRow;
use crate::{Database, now};

const USER_COLUMNS: &str =
    "id, username, email, password, first_name, last_name, enabled, created_at";

impl Database {
    /// Insert a new, not yet verified user. Username and email must be unused.
    pub fn register_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> StoreResult<()> {
        self.with_tx(|tx| {
            ensure_identity_free(tx, username, email, None)?;
            tx.execute(
                "INSERT INTO users (id, username, email, password, enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                (id, username, email, password_hash, now()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Flip the enabled flag after email verification. Returns false when no
    /// user has that email.
    pub fn enable_user_by_email(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE users SET enabled = 1 WHERE email = ?1", [email])?;
            Ok(changed > 0)
        })
    }

    /// Overwrite profile fields. `password_hash` of `None` keeps the current one.
    pub fn update_profile(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        password_hash: Option<&str>,
    ) -> StoreResult<()> {
        self.with_tx(|tx| {
            ensure_identity_free(tx, username, email, Some(user_id))?;
            let changed = tx.execute(
                "UPDATE users SET username = ?2, email = ?3, first_name = ?4, last_name = ?5,
                        password = COALESCE(?6, password)
                 WHERE id = ?1",
                rusqlite::params![user_id, username, email, first_name, last_name, password_hash],
            )?;
            if changed == 0 {
                return Err(Rejection::NotFound("user").into());
            }
            Ok(())
        })
    }
}

fn ensure_identity_free(
    conn: &Connection,
    username: &str,
    email: &str,
    except_user: Option<&str>,
) -> StoreResult<()> {
    let except = except_user.unwrap_or("");
    let username_taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 AND id <> ?2)",
        (username, except),
        |r| r.get(0),
    )?;
    if username_taken {
        return Err(Rejection::AlreadyExists("username").into());
    }

    let email_taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id <> ?2)",
        (email, except),
        |r| r.get(0),
    )?;
    if email_taken {
        return Err(Rejection::AlreadyExists("email").into());
    }
    Ok(())
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        enabled: row.get(6)?,
        created_at: row.get(7)?,
    })
}
