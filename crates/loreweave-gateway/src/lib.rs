pub mod connection;
pub mod dispatcher;
pub mod notifier;

pub use dispatcher::Dispatcher;
pub use notifier::{Notifier, OutgoingNotification};
