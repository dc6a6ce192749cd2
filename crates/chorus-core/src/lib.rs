//! chorus-core — shared library for the chorus PCM voice-conferencing relay.
//!
//! # Architecture (Clean Architecture)
//!
//! - **domain**: frame format constants, PCM mixing, identifiers (no I/O).
//! - **application**: use cases + port traits.
//! - **adapters**: TCP (length-prefixed framing, relay server, client
//!   transport), audio (cpal capture/playback, test stubs).

pub mod adapters;
pub mod application;
pub mod domain;
