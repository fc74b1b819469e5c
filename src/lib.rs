pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use error::MentorError;
