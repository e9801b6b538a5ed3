// src/models/mod.rs

pub mod access_card;
pub mod admin;
pub mod result;
pub mod student;
