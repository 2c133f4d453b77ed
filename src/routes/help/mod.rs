mod handler;
mod model;

pub use handler::{
    assign_help_request, create_help_request, get_my_assignments, get_my_help_requests,
    get_nearby_help_requests, get_open_help_requests, update_help_request_status,
};
pub use model::HelpRequest;
