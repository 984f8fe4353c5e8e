//! HTTP route handlers.

pub mod data;
pub mod databases;
pub mod execute;
pub mod health;
pub mod layout;
pub mod schema;
pub mod tables;
