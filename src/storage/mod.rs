//! On-disk persistence for collections.
//!
//! Vector coordinates and payload images share one append-only data file per
//! collection, read through a memory mapping. A newline-delimited metadata
//! file records where each vector lives, and deletes are recorded by
//! tombstoning that record in place.

mod engine;
pub mod error;
mod mapped;
mod payload;
mod positions;

pub use engine::{BYTES_PER_F64, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use mapped::MappedRegion;
pub use payload::{Payload, PayloadValue, decode_payload, encode_payload, payload_from_json};
pub use positions::{PositionRecord, TOMBSTONE, decode_records, live_records};
