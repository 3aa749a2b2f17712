//! Chat channel seam.
//!
//! Tasks that talk to a chat platform depend on [`ChannelOutbound`] rather
//! than on a concrete client, so they can be exercised without a network.

pub mod outbound;

pub use outbound::{ChannelOutbound, RecordingOutbound, SentMessage};
