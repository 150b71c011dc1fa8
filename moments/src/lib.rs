//! Player-highlight vote clustering and demo resolution.
//!
//! Votes arriving from the game server are deduplicated per voter and
//! merged into timed clusters per target; a resolver then looks up a
//! downloadable replay for the cluster's map across independent sources.

pub mod cluster;
pub mod demofile;
pub mod mapname;
pub mod render;
pub mod resolver;
pub mod state;
pub mod vote;

pub use cluster::MomentCluster;
pub use demofile::{DemoFileEntry, DemoFileListing};
pub use resolver::{
    DemoResolveResult, DemoResolver, DemoResolverConfig, DemoSource, DemoSourceKind,
    ResolveReason,
};
pub use state::{MomentProcessResult, MomentState};
pub use vote::{parse_vote_payload, MomentKind, MomentVote};
