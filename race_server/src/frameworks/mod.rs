// Frameworks: environment configuration, track loading and server bootstrap.

pub mod config;
pub mod server;
pub mod tracks;
