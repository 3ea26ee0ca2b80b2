// reading list tracker: accounts, credentials and per-user book lists

pub mod api;
pub mod config;
pub mod credentials;
pub mod demo;
pub mod error;
pub mod library;
pub mod sql;
pub mod types;

pub use credentials::CredentialStore;
pub use error::{AppError, StoreError, StoreResult};
pub use library::LibraryStore;
pub use sql::Database;
