pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod matching;
pub mod routes;
pub mod services;
