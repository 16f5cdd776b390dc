pub mod attendance;
pub mod auth;
pub mod config;
pub mod matching;
pub mod models;
pub mod output;
pub mod process;
pub mod providers;
