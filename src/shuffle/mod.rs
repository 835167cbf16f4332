//! Moving sorted key ranges from map nodes to reduce nodes.
//!
//! Every map node sends, for each input chunk, exactly one range message to
//! every reduce node. The message of a map node's last chunk carries the
//! terminal flag; a reduce node stops listening to a map node after it.

pub mod receiver;
pub mod sender;

pub use receiver::{recv_range, Range, ShuffleReceiver};
pub use sender::{SendStats, ShuffleSender};
