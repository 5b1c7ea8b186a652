pub mod aggregate;
pub mod error;
pub mod memory;
pub mod mysql;
pub mod service;
pub mod store;
