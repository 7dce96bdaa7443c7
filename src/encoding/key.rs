//! # Ordered Index Keys
//!
//! Secondary indexes do not store the raw field encoding. They store a
//! normalized, byte-comparable key so that one index store can hold values
//! of every tag and still scan them in a meaningful order:
//!
//! ```text
//! 0x02            false
//! 0x03            true
//! 0x10 <8 bytes>  any numeric value, widened to an ordered f64 image
//! 0x20 <content>  string
//! 0x21 <content>  bytes
//! ```
//!
//! The group byte keeps the kinds disjoint; within the numeric group every
//! integer and float tag shares one image, so `WHERE a = 2` finds records
//! whatever width `a` was inserted with. The f64 widening can merge integers
//! beyond 2^53 into one image; that only ever produces extra candidates,
//! which the residual WHERE filter discards. It never loses a match.
//!
//! Null values have no ordered key: only `IS NULL` could match them and it
//! never goes through an index.

use crate::value::{f64_ordered_bytes, Type, Value};
use eyre::Result;

pub const BOOL_FALSE: u8 = 0x02;
pub const BOOL_TRUE: u8 = 0x03;
pub const NUMBER: u8 = 0x10;
pub const TEXT: u8 = 0x20;
pub const BLOB: u8 = 0x21;

/// Builds the ordered index key for a value. Returns `None` for Null.
pub fn ordered_key(value: &Value) -> Result<Option<Vec<u8>>> {
    let key = match value.ty {
        Type::Null => return Ok(None),
        Type::Bool => {
            if value.decode_bool()? {
                vec![BOOL_TRUE]
            } else {
                vec![BOOL_FALSE]
            }
        }
        Type::String => {
            let mut buf = Vec::with_capacity(value.data.len() + 1);
            buf.push(TEXT);
            buf.extend_from_slice(&value.data);
            buf
        }
        Type::Bytes => {
            let mut buf = Vec::with_capacity(value.data.len() + 1);
            buf.push(BLOB);
            buf.extend_from_slice(&value.data);
            buf
        }
        _ => {
            let mut buf = Vec::with_capacity(9);
            buf.push(NUMBER);
            buf.extend_from_slice(&f64_ordered_bytes(value.to_f64()?));
            buf
        }
    };
    Ok(Some(key))
}

/// True if two ordered keys belong to the same type group, i.e. a range scan
/// crossing from one group byte to the next has left the candidate set.
pub fn same_group(a: &[u8], b: &[u8]) -> bool {
    match (a.first(), b.first()) {
        (Some(&x), Some(&y)) => {
            if x == BOOL_FALSE || x == BOOL_TRUE {
                y == BOOL_FALSE || y == BOOL_TRUE
            } else {
                x == y
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_ordered_key() {
        assert!(ordered_key(&Value::null()).unwrap().is_none());
    }

    #[test]
    fn numeric_tags_share_one_image() {
        let a = ordered_key(&Value::int8(2)).unwrap().unwrap();
        let b = ordered_key(&Value::int64(2)).unwrap().unwrap();
        let c = ordered_key(&Value::float64(2.0)).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn numeric_keys_order_across_widths() {
        let mut keys = vec![
            ordered_key(&Value::int64(-10)).unwrap().unwrap(),
            ordered_key(&Value::int8(-1)).unwrap().unwrap(),
            ordered_key(&Value::float64(0.5)).unwrap().unwrap(),
            ordered_key(&Value::int16(2)).unwrap().unwrap(),
            ordered_key(&Value::uint64(1 << 40)).unwrap().unwrap(),
        ];
        let sorted = keys.clone();
        keys.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn groups_are_disjoint_and_ordered() {
        let b = ordered_key(&Value::bool(true)).unwrap().unwrap();
        let n = ordered_key(&Value::int8(1)).unwrap().unwrap();
        let s = ordered_key(&Value::string("a")).unwrap().unwrap();
        let r = ordered_key(&Value::bytes(b"a".to_vec())).unwrap().unwrap();
        assert!(b < n && n < s && s < r);
        assert!(!same_group(&n, &s));
        assert!(same_group(&s, &s));
    }

    #[test]
    fn bool_keys_are_prefix_only() {
        assert_eq!(
            ordered_key(&Value::bool(false)).unwrap().unwrap(),
            vec![BOOL_FALSE]
        );
        assert!(same_group(&[BOOL_FALSE], &[BOOL_TRUE]));
    }

    #[test]
    fn string_keys_keep_raw_content_order() {
        let a = ordered_key(&Value::string("ab")).unwrap().unwrap();
        let b = ordered_key(&Value::string("b")).unwrap().unwrap();
        assert!(a < b);
    }
}
