//! Turning the editable song into the compact form the synth runs.
//!
//! [`encode`] flattens a [`Patch`](crate::Patch) into command and value
//! bytes for a given [`FeatureSet`], and [`decode`] goes the other way.
//! [`compact`] merges per-track pattern tables into one shared table.

mod bytecode;
mod decode;
mod delay_table;
mod features;
mod patterns;

pub use bytecode::{encode, polyphony_bitmask, EncodedPatch, SendAddress};
pub use decode::decode;
pub use delay_table::{delay_times, DelayTable};
pub use features::{AllFeatures, FeatureSet, NecessaryFeatures};
pub use patterns::{compact, EncodedScore};
