//! TCP adapters: the wire codec, the relay server, and the client-side
//! transport.

pub mod client;
pub mod codec;
pub mod entry;
pub mod mixer;
pub mod server;
