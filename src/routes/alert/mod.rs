mod handler;
mod model;

pub use handler::{
    create_alert, get_active_alerts, get_my_alerts, get_nearby_alerts, mark_false_alarm,
    resolve_alert, respond_to_alert,
};
pub use model::Alert;
