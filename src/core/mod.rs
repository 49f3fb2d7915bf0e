//! # Core Module
//!
//! The `core` module contains the membership protocol itself: the fixed-width wire
//! codec, the membership directory, the heartbeat-based failure detector with its
//! Shortlist, the transport abstraction and the protocol dispatcher that ties them
//! together.
pub mod codec;
pub(crate) mod detection;
pub(crate) mod event;
pub(crate) mod member;
pub(crate) mod membership;
pub(crate) mod node;
mod shortlist;
pub(crate) mod transport;
mod utils;
