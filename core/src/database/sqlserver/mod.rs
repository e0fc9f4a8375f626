pub mod client;
mod sql_type_wrapper;

pub use client::{DatabaseInfo, SqlServerClient, SqlServerConnectionError};
