use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                first_name  TEXT,
                last_name   TEXT,
                enabled     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS characters (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                lore_points INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stories (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                creator_id      TEXT NOT NULL REFERENCES characters(id),
                created_at      TEXT NOT NULL,
                last_updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS story_parts (
                id              TEXT PRIMARY KEY,
                story_id        TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                contributor_id  TEXT NOT NULL REFERENCES characters(id),
                author_id       TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                part_order      INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(story_id, part_order)
            );

            CREATE INDEX IF NOT EXISTS idx_story_parts_contributor
                ON story_parts(contributor_id);

            CREATE TABLE IF NOT EXISTS lore_votes (
                id              TEXT PRIMARY KEY,
                story_part_id   TEXT NOT NULL REFERENCES story_parts(id) ON DELETE CASCADE,
                voter_id        TEXT NOT NULL REFERENCES users(id),
                vote_type       TEXT NOT NULL CHECK (vote_type IN ('POSITIVE', 'NEGATIVE')),
                delta           INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(story_part_id, voter_id)
            );

            CREATE INDEX IF NOT EXISTS idx_lore_votes_voter
                ON lore_votes(voter_id);

            CREATE TABLE IF NOT EXISTS notifications (
                id              TEXT PRIMARY KEY,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                sender_id       TEXT REFERENCES users(id) ON DELETE SET NULL,
                kind            TEXT NOT NULL,
                message         TEXT NOT NULL,
                link            TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_recipient
                ON notifications(recipient_id, is_read);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
