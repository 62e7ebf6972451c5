pub mod auth;
pub mod google;
pub mod system;
pub mod user;
