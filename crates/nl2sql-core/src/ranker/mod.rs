//! The GAT Schema Ranker and the Intelligent Fallback that augments its
//! output (spec §4.2, §4.3).

pub mod fallback;
pub mod features;
pub mod gat;

pub use fallback::{augment, RankedNode};
pub use gat::{GatWeights, RankerError, SchemaRanker};
