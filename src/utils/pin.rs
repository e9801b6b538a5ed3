// src/utils/pin.rs

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};

/// Largest multiple of 10 below `u32::MAX`; draws at or above it are rejected
/// so every digit is equally likely.
const DIGIT_ZONE: u32 = u32::MAX - (u32::MAX % 10);

/// Uniformly random decimal digits from the OS RNG.
pub fn random_digits(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| loop {
            let draw = rng.next_u32();
            if draw < DIGIT_ZONE {
                break char::from(b'0' + (draw % 10) as u8);
            }
        })
        .collect()
}

/// A fresh scratch-card PIN.
pub fn generate_pin(len: usize) -> String {
    random_digits(len)
}

/// Serial numbers look like `SC2410` + 10 digits: prefix, issue year and month, random tail.
pub fn generate_serial(now: DateTime<Utc>) -> String {
    format!("SC{}{}", now.format("%y%m"), random_digits(10))
}
