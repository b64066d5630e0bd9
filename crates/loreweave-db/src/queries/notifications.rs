use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{Rejection, StoreResult};
use crate::models::{ConversationRow, NotificationKind, NotificationRow};
use crate::{Database, new_id, now};

const NOTIFICATION_SELECT: &str = "
    SELECT n.id, n.recipient_id, r.username, n.sender_id, s.username, n.kind,
           n.message, n.link, n.is_read, n.created_at
    FROM notifications n
    JOIN users r ON r.id = n.recipient_id
    LEFT JOIN users s ON s.id = n.sender_id";

impl Database {
    pub fn insert_notification(
        &self,
        recipient_id: &str,
        sender_id: Option<&str>,
        kind: NotificationKind,
        message: &str,
        link: Option<&str>,
    ) -> Result<NotificationRow> {
        self.with_conn(|conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO notifications (id, recipient_id, sender_id, kind, message, link, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![id, recipient_id, sender_id, kind.as_str(), message, link, now()],
            )?;
            query_notification(conn, &id)?
                .ok_or_else(|| anyhow::anyhow!("notification {} vanished after insert", id))
        })
    }

    /// Unread notifications for a user, newest first.
    pub fn unread_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE n.recipient_id = ?1 AND n.is_read = 0
                 ORDER BY n.created_at DESC, n.rowid DESC",
                NOTIFICATION_SELECT
            );
            Ok(collect_notifications(conn, &sql, [user_id])?)
        })
    }

    pub fn unread_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }

    /// Mark one notification read. Only its recipient may do so. Returns the
    /// notification as it now stands.
    pub fn mark_notification_read(
        &self,
        id: &str,
        user_id: &str,
    ) -> StoreResult<NotificationRow> {
        self.with_tx(|tx| {
            let mut row = query_notification(tx, id)?.ok_or(Rejection::NotFound("notification"))?;
            if row.recipient_id != user_id {
                return Err(Rejection::Forbidden.into());
            }
            if !row.is_read {
                tx.execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])?;
                row.is_read = true;
            }
            Ok(row)
        })
    }

    /// Returns how many notifications changed.
    pub fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }

    /// One entry per direct-message partner, most recent conversation first.
    /// The unread count covers messages from the partner to `user_id`.
    pub fn conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT partner, MAX(created_at) AS last_at,
                        SUM(CASE WHEN recipient_id = ?1 AND is_read = 0 THEN 1 ELSE 0 END)
                 FROM (
                    SELECT CASE WHEN n.recipient_id = ?1 THEN s.username ELSE r.username END AS partner,
                           n.created_at, n.recipient_id, n.is_read, n.rowid AS seq
                    FROM notifications n
                    JOIN users r ON r.id = n.recipient_id
                    JOIN users s ON s.id = n.sender_id
                    WHERE n.kind = ?2 AND (n.recipient_id = ?1 OR n.sender_id = ?1)
                 )
                 GROUP BY partner
                 ORDER BY last_at DESC, MAX(seq) DESC",
            )?;
            let rows = stmt
                .query_map((user_id, NotificationKind::Message.as_str()), |r| {
                    Ok(ConversationRow {
                        partner_username: r.get(0)?,
                        last_message_at: r.get(1)?,
                        unread_count: r.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Mark every direct message from `partner_username` to `user_id` read.
    pub fn mark_thread_read(&self, user_id: &str, partner_username: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE recipient_id = ?1 AND kind = ?3 AND is_read = 0
                   AND sender_id = (SELECT id FROM users WHERE username = ?2)",
                (user_id, partner_username, NotificationKind::Message.as_str()),
            )?;
            Ok(changed)
        })
    }

    /// Direct messages between `user_id` and the named partner, oldest first.
    pub fn message_thread(
        &self,
        user_id: &str,
        partner_username: &str,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE n.kind = ?3
                   AND ((n.recipient_id = ?1 AND s.username = ?2)
                     OR (n.sender_id = ?1 AND r.username = ?2))
                 ORDER BY n.created_at ASC, n.rowid ASC",
                NOTIFICATION_SELECT
            );
            Ok(collect_notifications(
                conn,
                &sql,
                (user_id, partner_username, NotificationKind::Message.as_str()),
            )?)
        })
    }
}

fn query_notification(conn: &Connection, id: &str) -> rusqlite::Result<Option<NotificationRow>> {
    let sql = format!("{} WHERE n.id = ?1", NOTIFICATION_SELECT);
    conn.query_row(&sql, [id], map_notification).optional()
}

fn collect_notifications<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<NotificationRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_notification)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        recipient_username: row.get(2)?,
        sender_id: row.get(3)?,
        sender_username: row.get(4)?,
        kind: row.get(5)?,
        message: row.get(6)?,
        link: row.get(7)?,
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::models::NotificationKind;
    use crate::test_support;
    use crate::{Database, Rejection};

    fn dm(db: &Database, from: &str, to: &str, text: &str) {
        db.insert_notification(to, Some(from), NotificationKind::Message, text, Some("/messages"))
            .unwrap();
    }

    #[test]
    fn unread_lifecycle() {
        let db = test_support::db();
        let mira = test_support::user(&db, "mira");

        let n = db
            .insert_notification(&mira, None, NotificationKind::Vote, "hi", None)
            .unwrap();
        assert!(!n.is_read);
        assert_eq!(n.sender_username, None);
        assert_eq!(db.unread_count(&mira).unwrap(), 1);

        db.mark_notification_read(&n.id, &mira).unwrap();
        assert_eq!(db.unread_count(&mira).unwrap(), 0);
        assert!(db.unread_notifications(&mira).unwrap().is_empty());
    }

    #[test]
    fn only_recipient_marks_read() {
        let db = test_support::db();
        let mira = test_support::user(&db, "mira");
        let bo = test_support::user(&db, "bo");
        let n = db
            .insert_notification(&mira, Some(&bo), NotificationKind::Vote, "hi", None)
            .unwrap();

        let err = db.mark_notification_read(&n.id, &bo).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Forbidden));

        let err = db.mark_notification_read("missing", &mira).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("notification")));
    }

    #[test]
    fn mark_all_read_counts_changes() {
        let db = test_support::db();
        let mira = test_support::user(&db, "mira");
        for _ in 0..3 {
            db.insert_notification(&mira, None, NotificationKind::Contribution, "x", None)
                .unwrap();
        }
        assert_eq!(db.mark_all_read(&mira).unwrap(), 3);
        assert_eq!(db.mark_all_read(&mira).unwrap(), 0);
    }

    #[test]
    fn conversations_group_by_partner() {
        let db = test_support::db();
        let mira = test_support::user(&db, "mira");
        let bo = test_support::user(&db, "bo");
        let cy = test_support::user(&db, "cy");

        dm(&db, &bo, &mira, "hello mira");
        dm(&db, &mira, &bo, "hello bo");
        dm(&db, &bo, &mira, "are you there?");
        dm(&db, &mira, &cy, "hey cy");
        // Vote notifications never show up as conversations.
        db.insert_notification(&mira, Some(&cy), NotificationKind::Vote, "voted", None)
            .unwrap();

        let convs = db.conversations(&mira).unwrap();
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].partner_username, "cy");
        assert_eq!(convs[0].unread_count, 0);
        assert_eq!(convs[1].partner_username, "bo");
        assert_eq!(convs[1].unread_count, 2);

        let thread = db.message_thread(&mira, "bo").unwrap();
        let texts: Vec<&str> = thread.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(texts, vec!["hello mira", "hello bo", "are you there?"]);

        assert_eq!(db.mark_thread_read(&mira, "bo").unwrap(), 2);
        assert_eq!(db.conversations(&mira).unwrap()[1].unread_count, 0);
    }
}
