//! Notification emitter.
//!
//! A notification is stored first and pushed to the recipient's live
//! connection second. The stored row is the source of truth: a push that
//! cannot be delivered is logged and dropped, and the reader picks the
//! notification up from the unread list later.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use loreweave_db::models::{NotificationKind, NotificationRow};
use loreweave_db::{Database, Rejection, StoreError, StoreResult};
use loreweave_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// A notification waiting to be stored and pushed.
#[derive(Debug, Clone)]
pub struct OutgoingNotification {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
}

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Persist, then push. Only a failed persist is an error.
    pub async fn notify(&self, outgoing: OutgoingNotification) -> anyhow::Result<NotificationRow> {
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || {
            db.insert_notification(
                &outgoing.recipient_id,
                outgoing.sender_id.as_deref(),
                outgoing.kind,
                &outgoing.message,
                outgoing.link.as_deref(),
            )
        })
        .await
        .context("notification insert task failed")??;

        self.push(&row).await;
        Ok(row)
    }

    /// Like `notify`, but a persist failure is only logged. Used after a
    /// committed write whose outcome must not depend on the notification.
    pub async fn notify_best_effort(&self, outgoing: OutgoingNotification) {
        let recipient = outgoing.recipient_id.clone();
        if let Err(e) = self.notify(outgoing).await {
            warn!(recipient = %recipient, "notification dropped: {:#}", e);
        }
    }

    /// Store a direct message for `to_username` and push it. The sender's
    /// current username is read back so a renamed sender still links to a
    /// thread that resolves.
    pub async fn send_private(
        &self,
        sender_id: &str,
        to_username: &str,
        text: &str,
    ) -> StoreResult<NotificationRow> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::InvalidInput("message text is required").into());
        }

        let db = self.db.clone();
        let from = sender_id.to_string();
        let to = to_username.to_string();
        let (sender, recipient) = tokio::task::spawn_blocking(move || {
            let sender = db.get_user_by_id(&from)?.ok_or(Rejection::NotFound("user"))?;
            let recipient = db
                .get_user_by_username(&to)?
                .ok_or(Rejection::NotFound("user"))?;
            Ok::<_, StoreError>((sender, recipient))
        })
        .await
        .map_err(|e| StoreError::Internal(e.into()))??;

        if recipient.id == sender.id {
            return Err(Rejection::InvalidInput("cannot message yourself").into());
        }

        let row = self
            .notify(OutgoingNotification {
                recipient_id: recipient.id,
                sender_id: Some(sender.id),
                kind: NotificationKind::Message,
                message: text.to_string(),
                link: Some(format!("/messages/{}", sender.username)),
            })
            .await?;
        Ok(row)
    }

    async fn push(&self, row: &NotificationRow) {
        let (recipient, event) = match notification_event(row) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(notification_id = %row.id, "cannot push notification: {:#}", e);
                return;
            }
        };
        if !self.dispatcher.send_to_user(recipient, event).await {
            debug!(notification_id = %row.id, "recipient offline, notification left unread");
        }
    }
}

/// Recipient and gateway event for a stored notification.
pub fn notification_event(row: &NotificationRow) -> anyhow::Result<(Uuid, GatewayEvent)> {
    let recipient: Uuid = row
        .recipient_id
        .parse()
        .with_context(|| format!("corrupt recipient_id '{}'", row.recipient_id))?;
    let id: Uuid = row
        .id
        .parse()
        .with_context(|| format!("corrupt notification id '{}'", row.id))?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .with_context(|| format!("corrupt created_at '{}'", row.created_at))?
        .with_timezone(&Utc);

    Ok((
        recipient,
        GatewayEvent::Notification {
            id,
            message: row.message.clone(),
            from_username: row.sender_username.clone(),
            link: row.link.clone(),
            created_at,
        },
    ))
}
