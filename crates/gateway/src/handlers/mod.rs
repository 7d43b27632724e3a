//! API handlers module

pub mod admin;
pub mod health;
pub mod resolve;
