mod handler;
mod model;

pub use handler::{
    get_my_notifications, get_unread_count, get_unread_notifications,
    mark_all_notifications_read, mark_notification_read,
};
pub use model::Inbox;
