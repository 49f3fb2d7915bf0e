//! # API Module
//!
//! This module provides the primary API for running a node of the membership protocol.
//!
//! ## Modules
//!
//! - [`config`]: Contains the configuration structure and builder for tuning a node.
//! - [`cluster`]: Provides the `BoomCluster` handle for starting, observing and leaving a cluster.
pub mod cluster;
pub mod config;
