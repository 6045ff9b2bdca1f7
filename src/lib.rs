pub mod config;
pub mod errors;
pub mod notice;
pub mod remote;
pub mod store;
