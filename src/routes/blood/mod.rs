mod handler;
mod model;

pub use handler::{
    create_blood_request, get_active_blood_requests, get_available_donors,
    get_critical_blood_requests, get_emergency_donors_near, get_my_donor_profile, register_donor,
    update_blood_request_status, update_donor_availability,
};
pub use model::{BloodRequest, Donor};
