mod handler;
mod model;

pub use handler::{login, profile, register, update_location};
pub use model::{NearbyUser, User};
