//! API route handlers

pub mod health;
pub mod quota;
pub mod search;
