//! Queue channel factory.

use super::types::Envelope;
use tokio::sync::mpsc;

/// Default buffer size of every queue.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type QueueSender = mpsc::Sender<Envelope>;
pub type QueueChannelReceiver = mpsc::Receiver<Envelope>;

/// Create the channel backing one named queue.
pub fn queue_channel() -> (QueueSender, QueueChannelReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
