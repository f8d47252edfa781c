#![allow(dead_code)]

pub mod agent;
pub mod config;
pub mod server;
pub mod sse;
