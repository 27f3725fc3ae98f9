//! Channel substrate.
//!
//! A [`MessageChannel`] is one end of a bidirectional frame pipe. The host
//! grants the pair to exactly one application at connect time, which is what
//! makes correlation ids unguessable to anyone else: nobody off-channel can
//! observe or inject frames.

use tokio::sync::mpsc;

use crate::protocol::Frame;

pub struct MessageChannel {
    pub tx: mpsc::UnboundedSender<Frame>,
    pub rx: mpsc::UnboundedReceiver<Frame>,
}

/// An in-memory duplex pair: what one end sends, the other receives.
pub fn duplex_pair() -> (MessageChannel, MessageChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MessageChannel { tx: a_tx, rx: a_rx },
        MessageChannel { tx: b_tx, rx: b_rx },
    )
}
