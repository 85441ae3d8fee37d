//! # Storage Module
//!
//! Disk serialization shared by the execution engine and the offload store.
//!
//! - [`codec`] - the encode/decode primitive and its file helpers
//! - [`offload_store`] - record-like store that keeps field values on disk

pub mod codec;
pub mod offload_store;

pub use codec::{Codec, CodecError, InvalidFileName};
pub use offload_store::{OffloadStore, SlotState, StorageAccessError};
