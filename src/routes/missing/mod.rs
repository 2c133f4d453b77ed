mod handler;
mod model;

pub use handler::{
    close_case, get_active_cases, get_case_sightings, get_nearby_cases, mark_case_found,
    report_case, report_sighting,
};
pub use model::{MissingPersonCase, Sighting};
