//! Sensor payload decoding
//!
//! Field devices are not consistent about how they encode a measurement set.
//! Most publish a JSON object, some publish a flat `key:value` list. This
//! module turns either form into a validated [`SensorReading`].

pub mod codec;
pub mod error;
pub mod parser;
pub mod reading;
mod timestamp;


pub use codec::{JsonCodec, KeyValueCodec, PayloadCodec};
pub use error::{FallbackError, ParseError, ReadingError, StructuredError};
pub use parser::{PayloadParser, parse_payload};
pub use reading::{Field, SensorReading};
