//! Crate for shelldiff, a differential tester for bash-compatible shells.

pub mod args;
mod config;
pub mod entry;
pub mod events;
mod productinfo;
