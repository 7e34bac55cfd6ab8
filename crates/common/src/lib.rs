pub mod authority;
pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub const APP_ID: &str = "uvcd";

#[cfg(test)]
mod tests;
