mod handler;
mod model;

pub use handler::{
    get_my_volunteer_profile, get_volunteers_by_skills, get_volunteers_near, register_volunteer,
    reject_volunteer, update_volunteer_availability, verify_volunteer,
};
pub use model::Volunteer;
