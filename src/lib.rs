pub mod api;
pub mod camera;
pub mod client;
pub mod config;
pub mod messages;
pub mod motor;
pub mod network;
pub mod runtime;
