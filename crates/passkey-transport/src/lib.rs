//! Isolation transport.
//!
//! The untrusted application frame talks to the trusted wallet frame over a
//! one-time bidirectional channel: `CONNECT` → `READY { protocol_version }`,
//! then correlation-id request/response frames with interleaved progress
//! events. The application never reaches the workers directly; credential and
//! key material stays on the wallet side of the channel.

pub mod channel;
pub mod client;
pub mod host;
pub mod protocol;


pub use channel::{duplex_pair, MessageChannel};
pub use client::{TransportConfig, WalletClient};
pub use host::{spawn_host, WalletService};
pub use protocol::{Frame, WalletRequest, WalletResponse, PROTOCOL_VERSION};
