pub mod alert;
pub mod blood;
pub mod contact;
pub mod help;
pub mod missing;
pub mod notification;
pub mod user;
pub mod volunteer;
