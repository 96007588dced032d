pub mod error;
pub mod experiences;
pub mod profiles;
pub mod types;
