//! Pure helpers shared by instruction handlers and off-chain clients

pub mod allowlist;
pub mod ed25519;
pub mod period;
pub mod pop;
