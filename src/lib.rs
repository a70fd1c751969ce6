pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod feed;
pub mod health;
pub mod index;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod persistence;
pub mod subscription;
pub mod warning;

#[cfg(test)]
mod testing;
