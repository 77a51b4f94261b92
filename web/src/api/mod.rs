pub mod router;
pub mod service;
pub mod types;
