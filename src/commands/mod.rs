//! Command handlers.
//!
//! Each command takes the shared `AppState` and returns `Result<T, AppError>`;
//! the CLI renders the value or the error's presentation.

pub mod auth;
pub mod history;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::*;
pub use history::*;
pub use upload::*;
