//! Incremental builder for VelocyPack, a compact, typed, position-indexed
//! binary representation for JSON-like trees.
//!
//! The central type is [`Builder`]: an append-only encoder that writes one
//! self-describing value into a single byte buffer. Containers are opened,
//! filled and closed; at close time the builder picks the smallest
//! consistent on-wire layout, sorts object index tables by attribute name
//! and optionally verifies key uniqueness. [`Slice`] provides the
//! read-only navigation needed to consume the result.

mod builder;
mod constants;
mod error;
mod iterator;
mod slice;
mod value;
mod value_type;
mod varint;

pub use builder::{Builder, BuilderOptions};
pub use error::{Result, VpackError};
pub use iterator::{ArrayIterator, ObjectIterator};
pub use slice::Slice;
pub use value::Value;
pub use value_type::ValueType;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_one(v: &Value) -> Vec<u8> {
        let mut b = Builder::new(64);
        b.add_value(v).expect("add");
        b.bytes().expect("closed").to_vec()
    }

    #[test]
    fn scalar_wire_bytes() {
        assert_eq!(build_one(&Value::Null), [0x18]);
        assert_eq!(build_one(&Value::Bool(false)), [0x19]);
        assert_eq!(build_one(&Value::Bool(true)), [0x1a]);
        assert_eq!(build_one(&Value::Illegal), [0x17]);
        assert_eq!(build_one(&Value::MinKey), [0x1e]);
        assert_eq!(build_one(&Value::MaxKey), [0x1f]);
    }

    #[test]
    fn double_wire_bytes() {
        assert_eq!(
            build_one(&Value::Double(1.5)),
            [0x1b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf8, 0x3f]
        );
    }

    #[test]
    fn utc_date_wire_bytes() {
        assert_eq!(
            build_one(&Value::UtcDate(1_000_000)),
            [0x1c, 0x40, 0x42, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        // Negative dates are stored as the unsigned reinterpretation.
        let bytes = build_one(&Value::UtcDate(-1));
        assert_eq!(bytes[0], 0x1c);
        assert_eq!(&bytes[1..], [0xff; 8]);
    }

    #[test]
    fn int_encodings_use_minimal_width() {
        assert_eq!(build_one(&Value::Int(5)), [0x35]);
        assert_eq!(build_one(&Value::Int(-3)), [0x3d]);
        assert_eq!(build_one(&Value::Int(100)), [0x20, 0x64]);
        assert_eq!(build_one(&Value::Int(-100)), [0x20, 0x9c]);
        assert_eq!(build_one(&Value::Int(1000)), [0x21, 0xe8, 0x03]);
        let bytes = build_one(&Value::Int(i64::MIN));
        assert_eq!(bytes[0], 0x27);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn uint_encodings() {
        assert_eq!(build_one(&Value::UInt(7)), [0x37]);
        assert_eq!(build_one(&Value::UInt(0xff)), [0x28, 0xff]);
        assert_eq!(build_one(&Value::UInt(0x100)), [0x29, 0x00, 0x01]);
        let bytes = build_one(&Value::UInt(u64::MAX));
        assert_eq!(bytes[0], 0x2f);
        assert_eq!(&bytes[1..], [0xff; 8]);
    }

    #[test]
    fn string_encodings() {
        assert_eq!(build_one(&Value::from("")), [0x40]);
        assert_eq!(build_one(&Value::from("abc")), [0x43, b'a', b'b', b'c']);
        // 126 bytes is the longest short string.
        let s = "x".repeat(126);
        let bytes = build_one(&Value::from(s.as_str()));
        assert_eq!(bytes[0], 0xbe);
        assert_eq!(bytes.len(), 127);
        // 127 bytes switches to the long form.
        let s = "x".repeat(127);
        let bytes = build_one(&Value::from(s.as_str()));
        assert_eq!(bytes[0], 0xbf);
        assert_eq!(bytes[1], 127);
        assert_eq!(&bytes[2..9], [0; 7]);
        assert_eq!(bytes.len(), 136);
    }

    #[test]
    fn binary_encodings() {
        assert_eq!(
            build_one(&Value::Binary(vec![0xde, 0xad])),
            [0xc0, 0x02, 0xde, 0xad]
        );
        assert_eq!(build_one(&Value::Binary(vec![])), [0xc0, 0x00]);
        let blob = vec![0xaa; 300];
        let bytes = build_one(&Value::Binary(blob));
        assert_eq!(bytes[0], 0xc1);
        assert_eq!(&bytes[1..3], [0x2c, 0x01]);
        assert_eq!(bytes.len(), 3 + 300);
    }

    #[test]
    fn empty_containers() {
        let mut b = Builder::new(16);
        b.open_array(false).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x01]);

        let mut b = Builder::new(16);
        b.open_object(false).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x0a]);

        // The unindexed hint makes no difference for empty containers.
        let mut b = Builder::new(16);
        b.open_array(true).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x01]);
    }

    #[test]
    fn equal_length_array_shortcut() {
        let mut b = Builder::new(16);
        b.open_array(false).unwrap();
        b.add(1i64).unwrap();
        b.add(2i64).unwrap();
        b.add(3i64).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x02, 0x05, 0x31, 0x32, 0x33]);
    }

    #[test]
    fn mixed_array_gets_index_table() {
        let mut b = Builder::new(16);
        b.open_array(false).unwrap();
        b.add(1i64).unwrap();
        b.add("ab").unwrap();
        b.close().unwrap();
        assert_eq!(
            b.bytes().unwrap(),
            [0x06, 0x09, 0x02, 0x31, 0x42, b'a', b'b', 0x03, 0x04]
        );
    }

    #[test]
    fn compact_array_wire_bytes() {
        let mut b = Builder::new(16);
        b.open_array(true).unwrap();
        b.add(1i64).unwrap();
        b.add(2i64).unwrap();
        b.add(3i64).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x13, 0x06, 0x31, 0x32, 0x33, 0x03]);
    }

    #[test]
    fn compact_object_for_single_entry() {
        let mut b = Builder::new(16);
        b.open_object(false).unwrap();
        b.add_key_value("k", &Value::from("v")).unwrap();
        b.close().unwrap();
        assert_eq!(
            b.bytes().unwrap(),
            [0x14, 0x07, 0x41, b'k', 0x41, b'v', 0x01]
        );
    }

    #[test]
    fn object_index_table_is_key_sorted() {
        let mut b = Builder::new(32);
        b.open_object(false).unwrap();
        b.add_key_value("b", &Value::UInt(12)).unwrap();
        b.add_key_value("a", &Value::Bool(true)).unwrap();
        b.close().unwrap();
        // Payload stays in insertion order; the index table is sorted, so
        // "a" (offset 7) comes before "b" (offset 3).
        assert_eq!(
            b.bytes().unwrap(),
            [0x0b, 0x0c, 0x02, 0x41, b'b', 0x28, 0x0c, 0x41, b'a', 0x1a, 0x07, 0x03]
        );
        let s = Slice::new(b.bytes().unwrap());
        assert!(s.is_sorted());
        assert_eq!(s.key_at(0).unwrap().get_string().unwrap(), "a");
        assert_eq!(s.key_at(1).unwrap().get_string().unwrap(), "b");
        assert!(s.value_at(0).unwrap().get_bool().unwrap());
        assert_eq!(s.value_at(1).unwrap().get_uint().unwrap(), 12);
    }

    #[test]
    fn nested_containers() {
        let mut b = Builder::new(32);
        b.open_array(false).unwrap();
        b.open_object(false).unwrap();
        b.add_key_value("k", &Value::from("v")).unwrap();
        b.close().unwrap();
        b.close().unwrap();
        assert_eq!(
            b.bytes().unwrap(),
            [0x02, 0x09, 0x14, 0x07, 0x41, b'k', 0x41, b'v', 0x01]
        );
        let s = Slice::new(b.bytes().unwrap());
        assert_eq!(s.length().unwrap(), 1);
        let obj = s.at(0).unwrap();
        assert!(obj.is_object());
        assert_eq!(obj.key_at(0).unwrap().get_string().unwrap(), "k");
        assert_eq!(obj.value_at(0).unwrap().get_string().unwrap(), "v");
    }

    #[test]
    fn recursive_value_composites() {
        let mut b = Builder::new(64);
        b.add_value(&Value::Object(vec![
            ("list".into(), Value::Array(vec![Value::Int(1), Value::Null])),
            ("flag".into(), Value::Bool(false)),
        ]))
        .unwrap();
        let s = b.slice().unwrap();
        assert!(s.is_object());
        assert_eq!(s.length().unwrap(), 2);
        // Sorted table: "flag" before "list".
        assert_eq!(s.key_at(0).unwrap().get_string().unwrap(), "flag");
        let list = s.value_at(1).unwrap();
        assert_eq!(list.length().unwrap(), 2);
        assert!(list.at(1).unwrap().is_null());
    }

    #[test]
    fn json_injection() {
        let mut b = Builder::new(64);
        b.add(json!({"a": [1, 2], "b": "x"})).unwrap();
        let s = b.slice().unwrap();
        assert_eq!(s.length().unwrap(), 2);
        assert_eq!(s.key_at(0).unwrap().get_string().unwrap(), "a");
        assert_eq!(
            s.value_at(0).unwrap().at(1).unwrap().get_int().unwrap(),
            2
        );
        assert_eq!(s.value_at(1).unwrap().get_string().unwrap(), "x");
    }

    #[test]
    fn state_queries() {
        let mut b = Builder::new(16);
        assert!(b.is_closed());
        assert!(b.is_empty());
        b.open_array(false).unwrap();
        assert!(b.is_open_array());
        assert!(!b.is_open_object());
        assert!(!b.is_closed());
        assert_eq!(b.bytes(), Err(VpackError::BuilderNotClosed));
        assert_eq!(b.size(), Err(VpackError::BuilderNotClosed));
        b.open_object(false).unwrap();
        assert!(b.is_open_object());
        b.close().unwrap();
        b.close().unwrap();
        assert!(b.is_closed());
        assert_eq!(b.size().unwrap(), b.bytes().unwrap().len());
    }

    #[test]
    fn mismatched_operations_fail() {
        let mut b = Builder::new(16);
        assert_eq!(b.close(), Err(VpackError::BuilderNeedOpenCompound));
        assert_eq!(b.remove_last(), Err(VpackError::BuilderNeedOpenCompound));
        assert_eq!(b.has_key("k"), Err(VpackError::BuilderNeedOpenObject));

        b.open_array(false).unwrap();
        assert_eq!(b.remove_last(), Err(VpackError::BuilderNeedSubValue));
        assert_eq!(b.has_key("k"), Err(VpackError::BuilderNeedOpenObject));
        assert_eq!(
            b.add_key_value("k", &Value::Null),
            Err(VpackError::BuilderNeedOpenObject)
        );

        // A scalar on top of a scalar slot needs an open array.
        let mut b = Builder::new(16);
        b.open_object(false).unwrap();
        assert_eq!(b.open_array(false), Err(VpackError::BuilderNeedOpenArray));
    }

    #[test]
    fn unsupported_types_fail_cleanly() {
        let mut b = Builder::new(16);
        assert!(matches!(
            b.add_value(&Value::None),
            Err(VpackError::BuilderUnexpectedType(_))
        ));
        assert!(matches!(
            b.add_value(&Value::External),
            Err(VpackError::BuilderUnexpectedType(_))
        ));
        assert!(matches!(
            b.add_value(&Value::Bcd),
            Err(VpackError::BuilderUnexpectedType(_))
        ));
        assert!(b.is_empty());
    }

    #[test]
    fn key_already_written_is_rejected() {
        let mut b = Builder::new(16);
        b.open_object(false).unwrap();
        b.add("k").unwrap();
        assert_eq!(
            b.add_key_value("l", &Value::Null),
            Err(VpackError::BuilderKeyAlreadyWritten)
        );
        b.add(1i64).unwrap();
        b.close().unwrap();
    }

    #[test]
    fn has_key_and_get_key_on_open_object() {
        let mut b = Builder::new(32);
        b.open_object(false).unwrap();
        b.add_key_value("a", &Value::Int(1)).unwrap();
        b.add_key_value("b", &Value::from("x")).unwrap();
        assert!(b.has_key("a").unwrap());
        assert!(b.has_key("b").unwrap());
        assert!(!b.has_key("c").unwrap());
        let v = b.get_key("b").unwrap().expect("present");
        assert_eq!(v.get_string().unwrap(), "x");
        assert!(b.get_key("zz").unwrap().is_none());
        b.close().unwrap();
    }

    #[test]
    fn remove_last_truncates() {
        let mut b = Builder::new(16);
        b.open_array(false).unwrap();
        b.add(1i64).unwrap();
        b.add("junk value").unwrap();
        b.remove_last().unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap(), [0x02, 0x03, 0x31]);
    }

    #[test]
    fn clear_resets_for_reuse() {
        let mut b = Builder::new(16);
        b.open_array(false).unwrap();
        b.add(1i64).unwrap();
        b.clear();
        assert!(b.is_closed());
        assert!(b.is_empty());
        b.add(2i64).unwrap();
        assert_eq!(b.bytes().unwrap(), [0x32]);
    }

    #[test]
    fn write_to_copies_bytes() {
        let mut b = Builder::new(16);
        b.add(7i64).unwrap();
        let mut out = Vec::new();
        let n = b.write_to(&mut out).unwrap();
        assert_eq!(n, 1);
        assert_eq!(out, [0x37]);

        let mut open = Builder::new(16);
        open.open_array(false).unwrap();
        assert!(open.write_to(&mut out).is_err());
    }

    #[test]
    fn duplicate_attribute_names_rejected() {
        let mut b = Builder::with_options(BuilderOptions {
            check_attribute_uniqueness: true,
            ..Default::default()
        });
        b.open_object(false).unwrap();
        b.add_key_value("x", &Value::Int(1)).unwrap();
        b.add_key_value("x", &Value::Int(2)).unwrap();
        assert_eq!(b.close(), Err(VpackError::DuplicateAttributeName));
        assert_eq!(b.bytes(), Err(VpackError::BuilderNotClosed));
    }

    #[test]
    fn duplicate_check_off_by_default() {
        let mut b = Builder::new(32);
        b.open_object(false).unwrap();
        b.add_key_value("x", &Value::Int(1)).unwrap();
        b.add_key_value("x", &Value::Int(2)).unwrap();
        b.close().unwrap();
        assert_eq!(b.slice().unwrap().length().unwrap(), 2);
    }

    #[test]
    fn unindexed_object_option() {
        let mut b = Builder::with_options(BuilderOptions {
            build_unindexed_objects: true,
            ..Default::default()
        });
        b.open_object(false).unwrap();
        b.add_key_value("a", &Value::Int(1)).unwrap();
        b.add_key_value("b", &Value::Int(2)).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes().unwrap()[0], 0x14);
    }

    #[test]
    fn width_two_array_with_padding() {
        let mut b = Builder::new(512);
        b.open_array(false).unwrap();
        for i in 0..300i64 {
            b.add(i % 10).unwrap();
        }
        b.close().unwrap();
        let bytes = b.bytes().unwrap();
        // 300 equal-size children: no index table, 2-byte length field,
        // reserved header bytes left as zero padding.
        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[1..3], [0x35, 0x01]);
        assert_eq!(&bytes[3..9], [0; 6]);
        assert_eq!(bytes.len(), 309);
        let s = Slice::new(bytes);
        assert_eq!(s.length().unwrap(), 300);
        assert_eq!(s.at(299).unwrap().get_int().unwrap(), 299 % 10);
    }

    #[test]
    fn width_two_array_with_index_table() {
        let mut b = Builder::new(2048);
        b.open_array(false).unwrap();
        for i in 0..150i64 {
            b.add(i % 10).unwrap();
            b.add("ab").unwrap();
        }
        b.close().unwrap();
        let bytes = b.bytes().unwrap();
        assert_eq!(bytes[0], 0x07);
        // 9 header + 150 * (1 + 3) payload + 300 * 2 table
        assert_eq!(bytes.len(), 9 + 600 + 600);
        let s = Slice::new(bytes);
        assert_eq!(s.length().unwrap(), 300);
        assert_eq!(s.at(0).unwrap().get_int().unwrap(), 0);
        assert_eq!(s.at(1).unwrap().get_string().unwrap(), "ab");
        assert_eq!(s.at(299).unwrap().get_string().unwrap(), "ab");
    }
}
