//! # MapKV Codec
//!
//! Typed value model and binary log record codec for MapKV.
//!
//! This crate provides:
//! - [`Value`], the four-variant value union stored under each key
//! - [`Buffer`], a zero-copy-capable byte view for blob values
//! - The record and frame encoding used by the append-only log
//!
//! ## Usage
//!
//! ```
//! use mapkv_codec::{decode_record, encode_record, Value};
//!
//! let body = encode_record("token", Some(&Value::from("abc"))).unwrap();
//! let record = decode_record(&body).unwrap();
//! assert_eq!(record.key, "token");
//! assert_eq!(record.value, Some(Value::from("abc")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod decoder;
mod encoder;
mod error;
mod value;

pub use buffer::Buffer;
pub use decoder::{decode_record, Frame, FrameReader, Record, RecordDecoder};
pub use encoder::{
    encode_frame, encode_record, record_len, RecordEncoder, FRAME_HEADER_SIZE, MAX_FIELD_SIZE,
    TOMBSTONE_TAG,
};
pub use error::{CodecError, CodecResult};
pub use value::{Value, ValueKind};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            ".*".prop_map(Value::String),
            any::<f64>()
                .prop_filter("NaN never compares equal", |n| !n.is_nan())
                .prop_map(Value::Number),
            any::<bool>().prop_map(Value::Boolean),
            proptest::collection::vec(any::<u8>(), 0..256).prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn framed_records_survive_the_log(
            entries in proptest::collection::vec((".{0,24}", proptest::option::of(value_strategy())), 1..16)
        ) {
            let mut log = Vec::new();
            for (key, value) in &entries {
                let body = encode_record(key, value.as_ref()).unwrap();
                log.extend(encode_frame(&body).unwrap());
            }

            let decoded: Vec<Record> = FrameReader::new(&log)
                .map(|frame| decode_record(frame.unwrap().body).unwrap())
                .collect();

            prop_assert_eq!(decoded.len(), entries.len());
            for (record, (key, value)) in decoded.iter().zip(&entries) {
                prop_assert_eq!(&record.key, key);
                prop_assert_eq!(&record.value, value);
            }
        }

        #[test]
        fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode_record(&data);
            for frame in FrameReader::new(&data).flatten() {
                let _ = decode_record(frame.body);
            }
        }
    }
}
