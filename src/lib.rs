pub mod config;
pub mod mods;
