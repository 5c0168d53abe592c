//! Simulator core: catalog, profiles, state store, and dispatcher.
//!
//! This crate is the pure logic of the Open Protocol torque-tool simulator.
//! It owns no sockets and spawns no tasks:
//!
//! - [`MidCatalog`] / [`ProfileStore`]: which MIDs exist, and which the
//!   active controller profile advertises at which revisions
//! - [`SimulatorState`]: the single-mutex store over the JSON domain tree,
//!   the traffic and event rings, and the session registry; every read is a
//!   deep copy
//! - [`SessionContext`]: per-connection protocol state with the link-layer
//!   acknowledge machine (9997/9998, duplicate replay, sequence stamping)
//! - [`Dispatcher`]: the ordered rule pipeline from inbound frame to replies
//!
//! The server crate wires these to Tokio listeners, the event publisher, the
//! HTTP control plane, and persistence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod dispatcher;
mod error;
mod events;
mod ids;
mod persist;
mod profiles;
mod session;
mod state;
mod traffic;

pub use catalog::{MidCatalog, MidCategory, MidDefinition};
pub use dispatcher::{
    ACK_MID, Dispatcher, ERROR_MID, ack_reply, build_communication_start_reply, error_reply,
};
pub use error::{CoreError, ErrorCode};
pub use events::{EVENT_CAP, SimulationEvent, default_event_mids, subscription_targets};
pub use ids::random_hex;
pub use persist::{DomainMap, PersistError, Persistence};
pub use profiles::{Profile, ProfileStore};
pub use session::{
    AckMode, LINK_ACK_MID, LINK_NACK_MID, LinkOutcome, SessionContext, SessionRole,
    SessionSnapshot,
};
pub use state::{CapabilityEntry, SimLimits, SimulatorState, initial_domains};
pub use traffic::{Direction, TRAFFIC_CAP, TrafficRecord};
