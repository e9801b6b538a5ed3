// src/handlers/mod.rs

pub mod auth;
pub mod cards;
pub mod checker;
pub mod results;
pub mod students;
