pub mod auth;
pub mod error;
pub mod experiences;
pub mod pagination;
pub mod profiles;
pub mod repos;
