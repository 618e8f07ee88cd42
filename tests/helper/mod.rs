#![allow(dead_code)]

pub mod portal;
pub mod transport;
