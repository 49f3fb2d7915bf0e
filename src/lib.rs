use lazy_static::lazy_static;
use tracing_subscriber::EnvFilter;

pub mod api;

mod core;
pub use core::{
    codec::{self, MessageKind},
    detection::MemberStatus,
    event::{MemberChange, MembershipEvent},
    member::{LocalIdentity, Member, DEFAULT_LISTEN_PORT},
    membership::{MembershipDirectory, Upsert},
    node::BoomNode,
    transport::{bind_multicast, TransportLayer},
};

mod error;
pub use error::{Error, Result};

#[cfg(any(test, feature = "test-util"))]
#[path = "./test-utils/mod.rs"]
#[doc(hidden)]
mod test_utils;

lazy_static! {
    static ref TRACING: () = {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    };
}

fn init_tracing() {
    lazy_static::initialize(&TRACING);
}
