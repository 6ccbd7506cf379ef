//! # Presence Module
//!
//! Tracks which chat participants are present across polling cycles.
//!
//! - **`membership`**: the set of identities considered present as of the last
//!   completed cycle.
//! - **`differ`**: classifies a fresh observation into joined / stayed / parted
//!   against that set and brings the set up to date.
//!
//! The store is owned by the differ; nothing else mutates it.

/// The rolling set of present identities.
pub mod membership;
/// The joined/stayed/parted diff over successive observations.
pub mod differ;

pub use differ::{DiffResult, PresenceDiffer};
pub use membership::{Identity, MembershipStore};
