mod handler;
mod model;

pub use handler::{add_contact, delete_contact, list_contacts, update_contact};
pub use model::EmergencyContact;
