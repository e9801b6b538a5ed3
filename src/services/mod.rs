// src/services/mod.rs

pub mod accounts;
pub mod cards;
pub mod ranking;
pub mod verification;
