//! Pure analysis: technical indicators over price series, fundamental
//! parameter derivation from provider info payloads, and stock scoring /
//! sector classification.

pub mod fundamental;
pub mod scoring;
pub mod technical;
