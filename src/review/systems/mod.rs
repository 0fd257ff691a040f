// src/review/systems/mod.rs
pub mod apply;
pub mod dispatch;
