pub mod api;
pub mod config;
pub mod gate;
pub mod views;
