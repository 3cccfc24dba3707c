pub mod auth;
pub mod config;
pub mod generate;
pub mod interp;
pub mod protocol;
pub mod server;
pub mod service;
pub mod store;
