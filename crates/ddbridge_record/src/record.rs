//! Dynamic record type.

use crate::error::{RecordError, RecordResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variant tag of a [`Record`], used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    I64,
    /// Arbitrary precision integer.
    Int,
    /// UTF-8 string.
    String,
    /// Tuple.
    Tuple,
    /// Vector.
    Vector,
    /// Set.
    Set,
    /// Map.
    Map,
    /// Struct (named constructor).
    Struct,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Bool => "bool",
            RecordKind::I64 => "i64",
            RecordKind::Int => "int",
            RecordKind::String => "string",
            RecordKind::Tuple => "tuple",
            RecordKind::Vector => "vector",
            RecordKind::Set => "set",
            RecordKind::Map => "map",
            RecordKind::Struct => "struct",
        };
        f.write_str(name)
    }
}

/// A dynamically typed value exchanged with the engine.
///
/// Composite constructors take their children by value, so a record that
/// has been placed inside a tuple, vector, set, map, struct or command can
/// no longer be used on its own. Handlers receive `&Record` borrows that
/// are only valid for the duration of the callback.
///
/// The derived ordering is a total order used for set and multiset
/// bookkeeping. It is not numeric order for [`Record::Int`].
///
/// Records built through the constructors are canonical: integers have
/// minimal length, set elements are sorted and unique, map entries are
/// sorted by key with unique keys. Equality is structural, so a record
/// assembled directly from the variants should go through
/// [`Record::normalize`] before it is compared. Decoding always yields
/// canonical records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawRecord")]
pub enum Record {
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    I64(i64),
    /// Arbitrary precision integer, big-endian two's complement, minimal length.
    Int(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Ordered, heterogeneous tuple.
    Tuple(Vec<Record>),
    /// Ordered vector.
    Vector(Vec<Record>),
    /// Set; elements are sorted and unique.
    Set(Vec<Record>),
    /// Key/value pairs sorted by key, keys unique.
    Map(Vec<(Record, Record)>),
    /// Named constructor applied to positional fields.
    Struct {
        /// Constructor name.
        constructor: String,
        /// Positional fields.
        fields: Vec<Record>,
    },
}

impl Record {
    // === Construction ===

    /// Creates a boolean record.
    pub fn bool(b: bool) -> Self {
        Record::Bool(b)
    }

    /// Creates a signed 64-bit integer record.
    pub fn i64(v: i64) -> Self {
        Record::I64(v)
    }

    /// Creates an arbitrary precision integer from big-endian two's
    /// complement bytes. An empty slice is zero.
    pub fn int(bytes: &[u8]) -> Self {
        Record::Int(normalize_int(bytes))
    }

    /// Creates a string record.
    pub fn string(s: impl Into<String>) -> Self {
        Record::String(s.into())
    }

    /// Creates a tuple, taking ownership of the fields.
    pub fn tuple(fields: Vec<Record>) -> Self {
        Record::Tuple(fields)
    }

    /// Creates a 2-tuple.
    pub fn pair(first: Record, second: Record) -> Self {
        Record::Tuple(vec![first, second])
    }

    /// Creates a vector, taking ownership of the elements.
    pub fn vector(elems: Vec<Record>) -> Self {
        Record::Vector(elems)
    }

    /// Creates a set. Elements are sorted and duplicates dropped.
    pub fn set(mut elems: Vec<Record>) -> Self {
        elems.sort();
        elems.dedup();
        Record::Set(elems)
    }

    /// Creates a map from key/value pairs, sorted by key.
    ///
    /// When a key appears more than once the last entry wins.
    pub fn map(mut entries: Vec<(Record, Record)>) -> Self {
        entries.reverse();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|later, kept| later.0 == kept.0);
        Record::Map(entries)
    }

    /// Creates a map from records that must each be a 2-tuple.
    pub fn map_from_pairs(pairs: Vec<Record>) -> RecordResult<Self> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (index, pair) in pairs.into_iter().enumerate() {
            match pair {
                Record::Tuple(mut fields) if fields.len() == 2 => {
                    let value = fields.pop();
                    let key = fields.pop();
                    if let (Some(key), Some(value)) = (key, value) {
                        entries.push((key, value));
                    }
                }
                _ => return Err(RecordError::NotAPair { index }),
            }
        }
        Ok(Record::map(entries))
    }

    /// Creates a struct record.
    pub fn structure(constructor: impl Into<String>, fields: Vec<Record>) -> Self {
        Record::Struct {
            constructor: constructor.into(),
            fields,
        }
    }

    /// Rebuilds the record bottom-up through the constructors.
    ///
    /// Canonical records come back unchanged.
    #[must_use]
    pub fn normalize(self) -> Self {
        let all = |elems: Vec<Record>| -> Vec<Record> {
            elems.into_iter().map(Record::normalize).collect()
        };
        match self {
            Record::Int(bytes) => Record::int(&bytes),
            Record::Tuple(fields) => Record::Tuple(all(fields)),
            Record::Vector(elems) => Record::Vector(all(elems)),
            Record::Set(elems) => Record::set(all(elems)),
            Record::Map(entries) => Record::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.normalize(), v.normalize()))
                    .collect(),
            ),
            Record::Struct {
                constructor,
                fields,
            } => Record::Struct {
                constructor,
                fields: all(fields),
            },
            scalar => scalar,
        }
    }

    /// Returns the variant tag.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Bool(_) => RecordKind::Bool,
            Record::I64(_) => RecordKind::I64,
            Record::Int(_) => RecordKind::Int,
            Record::String(_) => RecordKind::String,
            Record::Tuple(_) => RecordKind::Tuple,
            Record::Vector(_) => RecordKind::Vector,
            Record::Set(_) => RecordKind::Set,
            Record::Map(_) => RecordKind::Map,
            Record::Struct { .. } => RecordKind::Struct,
        }
    }

    fn mismatch(&self, expected: RecordKind) -> RecordError {
        RecordError::type_mismatch(expected, self.kind())
    }

    // === Scalars ===

    /// Returns true for boolean records.
    pub fn is_bool(&self) -> bool {
        matches!(self, Record::Bool(_))
    }

    /// Returns the boolean value.
    pub fn get_bool(&self) -> RecordResult<bool> {
        match self {
            Record::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(RecordKind::Bool)),
        }
    }

    /// Returns true for 64-bit integer records.
    pub fn is_i64(&self) -> bool {
        matches!(self, Record::I64(_))
    }

    /// Returns true for either integer variant.
    pub fn is_int(&self) -> bool {
        matches!(self, Record::I64(_) | Record::Int(_))
    }

    /// Returns the value as `i64`.
    ///
    /// Accepts arbitrary precision integers that fit in 64 bits.
    pub fn get_i64(&self) -> RecordResult<i64> {
        match self {
            Record::I64(v) => Ok(*v),
            Record::Int(bytes) if bytes.len() <= 8 => Ok(int_to_i64(bytes)),
            _ => Err(self.mismatch(RecordKind::I64)),
        }
    }

    /// Returns the minimal big-endian two's complement bytes of an integer.
    pub fn get_int(&self) -> RecordResult<Vec<u8>> {
        match self {
            Record::Int(bytes) => Ok(bytes.clone()),
            Record::I64(v) => Ok(normalize_int(&v.to_be_bytes())),
            _ => Err(self.mismatch(RecordKind::Int)),
        }
    }

    /// Returns true for string records.
    pub fn is_string(&self) -> bool {
        matches!(self, Record::String(_))
    }

    /// Returns the string contents.
    pub fn get_str(&self) -> RecordResult<&str> {
        match self {
            Record::String(s) => Ok(s),
            _ => Err(self.mismatch(RecordKind::String)),
        }
    }

    // === Tuples ===

    /// Returns true for tuples.
    pub fn is_tuple(&self) -> bool {
        matches!(self, Record::Tuple(_))
    }

    /// Returns the number of tuple fields.
    pub fn tuple_size(&self) -> RecordResult<usize> {
        match self {
            Record::Tuple(fields) => Ok(fields.len()),
            _ => Err(self.mismatch(RecordKind::Tuple)),
        }
    }

    /// Returns the `index`-th tuple field.
    pub fn tuple_field(&self, index: usize) -> RecordResult<&Record> {
        match self {
            Record::Tuple(fields) => element(fields, index),
            _ => Err(self.mismatch(RecordKind::Tuple)),
        }
    }

    // === Vectors ===

    /// Returns true for vectors.
    pub fn is_vector(&self) -> bool {
        matches!(self, Record::Vector(_))
    }

    /// Returns the number of vector elements.
    pub fn vector_size(&self) -> RecordResult<usize> {
        match self {
            Record::Vector(elems) => Ok(elems.len()),
            _ => Err(self.mismatch(RecordKind::Vector)),
        }
    }

    /// Returns the `index`-th vector element.
    pub fn vector_elem(&self, index: usize) -> RecordResult<&Record> {
        match self {
            Record::Vector(elems) => element(elems, index),
            _ => Err(self.mismatch(RecordKind::Vector)),
        }
    }

    // === Sets ===

    /// Returns true for sets.
    pub fn is_set(&self) -> bool {
        matches!(self, Record::Set(_))
    }

    /// Returns the number of set elements.
    pub fn set_size(&self) -> RecordResult<usize> {
        match self {
            Record::Set(elems) => Ok(elems.len()),
            _ => Err(self.mismatch(RecordKind::Set)),
        }
    }

    /// Returns the `index`-th set element.
    pub fn set_elem(&self, index: usize) -> RecordResult<&Record> {
        match self {
            Record::Set(elems) => element(elems, index),
            _ => Err(self.mismatch(RecordKind::Set)),
        }
    }

    // === Maps ===

    /// Returns true for maps.
    pub fn is_map(&self) -> bool {
        matches!(self, Record::Map(_))
    }

    /// Returns the number of map entries.
    pub fn map_size(&self) -> RecordResult<usize> {
        match self {
            Record::Map(entries) => Ok(entries.len()),
            _ => Err(self.mismatch(RecordKind::Map)),
        }
    }

    /// Returns the key of the `index`-th entry.
    pub fn map_key(&self, index: usize) -> RecordResult<&Record> {
        self.map_entry(index).map(|(k, _)| k)
    }

    /// Returns the value of the `index`-th entry.
    pub fn map_val(&self, index: usize) -> RecordResult<&Record> {
        self.map_entry(index).map(|(_, v)| v)
    }

    /// Looks up the value stored under `key`.
    pub fn map_get(&self, key: &Record) -> RecordResult<Option<&Record>> {
        match self {
            Record::Map(entries) => Ok(entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)),
            _ => Err(self.mismatch(RecordKind::Map)),
        }
    }

    fn map_entry(&self, index: usize) -> RecordResult<&(Record, Record)> {
        match self {
            Record::Map(entries) => entries
                .get(index)
                .ok_or_else(|| RecordError::index_out_of_range(index, entries.len())),
            _ => Err(self.mismatch(RecordKind::Map)),
        }
    }

    // === Structs ===

    /// Returns true for structs.
    pub fn is_struct(&self) -> bool {
        matches!(self, Record::Struct { .. })
    }

    /// Returns the constructor name of a struct.
    pub fn constructor(&self) -> RecordResult<&str> {
        match self {
            Record::Struct { constructor, .. } => Ok(constructor),
            _ => Err(self.mismatch(RecordKind::Struct)),
        }
    }

    /// Returns the number of struct fields.
    pub fn struct_size(&self) -> RecordResult<usize> {
        match self {
            Record::Struct { fields, .. } => Ok(fields.len()),
            _ => Err(self.mismatch(RecordKind::Struct)),
        }
    }

    /// Returns the `index`-th struct field.
    pub fn struct_field(&self, index: usize) -> RecordResult<&Record> {
        match self {
            Record::Struct { fields, .. } => element(fields, index),
            _ => Err(self.mismatch(RecordKind::Struct)),
        }
    }
}

/// Wire shape of [`Record`]. Decoding goes through here so that the
/// constructors re-establish canonical form.
#[derive(Deserialize)]
#[serde(rename = "Record")]
enum RawRecord {
    Bool(bool),
    I64(i64),
    Int(Vec<u8>),
    String(String),
    Tuple(Vec<Record>),
    Vector(Vec<Record>),
    Set(Vec<Record>),
    Map(Vec<(Record, Record)>),
    Struct {
        constructor: String,
        fields: Vec<Record>,
    },
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        match raw {
            RawRecord::Bool(b) => Record::Bool(b),
            RawRecord::I64(v) => Record::I64(v),
            RawRecord::Int(bytes) => Record::int(&bytes),
            RawRecord::String(s) => Record::String(s),
            RawRecord::Tuple(fields) => Record::Tuple(fields),
            RawRecord::Vector(elems) => Record::Vector(elems),
            RawRecord::Set(elems) => Record::set(elems),
            RawRecord::Map(entries) => Record::map(entries),
            RawRecord::Struct {
                constructor,
                fields,
            } => Record::Struct {
                constructor,
                fields,
            },
        }
    }
}

fn element(elems: &[Record], index: usize) -> RecordResult<&Record> {
    elems
        .get(index)
        .ok_or_else(|| RecordError::index_out_of_range(index, elems.len()))
}

/// Strips redundant sign-extension bytes so equal numbers compare equal.
fn normalize_int(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return vec![0];
    }
    let mut start = 0;
    while start + 1 < bytes.len() {
        let (head, next) = (bytes[start], bytes[start + 1]);
        let redundant = (head == 0x00 && next & 0x80 == 0) || (head == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Sign-extends at most 8 big-endian bytes into an `i64`.
fn int_to_i64(bytes: &[u8]) -> i64 {
    let fill = match bytes.first() {
        Some(b) if b & 0x80 != 0 => 0xFF,
        _ => 0x00,
    };
    let mut buf = [fill; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(buf)
}

fn write_seq(f: &mut fmt::Formatter<'_>, elems: &[Record]) -> fmt::Result {
    for (i, elem) in elems.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{elem}")?;
    }
    Ok(())
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Bool(b) => write!(f, "{b}"),
            Record::I64(v) => write!(f, "{v}"),
            Record::Int(bytes) if bytes.len() <= 8 => write!(f, "{}", int_to_i64(bytes)),
            Record::Int(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Record::String(s) => write!(f, "{s:?}"),
            Record::Tuple(fields) => {
                f.write_str("(")?;
                write_seq(f, fields)?;
                f.write_str(")")
            }
            Record::Vector(elems) => {
                f.write_str("[")?;
                write_seq(f, elems)?;
                f.write_str("]")
            }
            Record::Set(elems) => {
                f.write_str("{")?;
                write_seq(f, elems)?;
                f.write_str("}")
            }
            Record::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                f.write_str("}")
            }
            Record::Struct {
                constructor,
                fields,
            } => {
                write!(f, "{constructor}{{")?;
                write_seq(f, fields)?;
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Record {
    fn from(b: bool) -> Self {
        Record::Bool(b)
    }
}

impl From<i64> for Record {
    fn from(v: i64) -> Self {
        Record::I64(v)
    }
}

impl From<i32> for Record {
    fn from(v: i32) -> Self {
        Record::I64(i64::from(v))
    }
}

impl From<String> for Record {
    fn from(s: String) -> Self {
        Record::String(s)
    }
}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Record::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_round_trip() {
        let pair = Record::structure("Pair", vec![Record::i64(1), Record::i64(2)]);

        assert!(pair.is_struct());
        assert_eq!(pair.constructor().unwrap(), "Pair");
        assert_eq!(pair.struct_size().unwrap(), 2);
        assert_eq!(pair.struct_field(0).unwrap().get_i64().unwrap(), 1);
        assert_eq!(pair.struct_field(1).unwrap().get_i64().unwrap(), 2);
    }

    #[test]
    fn wrong_variant_is_type_mismatch() {
        let r = Record::string("hello");
        assert_eq!(
            r.get_bool(),
            Err(RecordError::type_mismatch(RecordKind::Bool, RecordKind::String))
        );
        assert!(matches!(
            r.tuple_size(),
            Err(RecordError::TypeMismatch {
                expected: RecordKind::Tuple,
                ..
            })
        ));
        assert!(r.constructor().is_err());
    }

    #[test]
    fn index_out_of_range() {
        let v = Record::vector(vec![Record::bool(true)]);
        assert!(v.vector_elem(0).is_ok());
        assert_eq!(
            v.vector_elem(1),
            Err(RecordError::IndexOutOfRange { index: 1, len: 1 })
        );

        let m = Record::map(vec![(Record::i64(1), Record::string("a"))]);
        assert_eq!(m.map_key(0).unwrap(), &Record::i64(1));
        assert_eq!(m.map_val(0).unwrap(), &Record::string("a"));
        assert!(matches!(
            m.map_val(3),
            Err(RecordError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn set_drops_duplicates() {
        let s = Record::set(vec![
            Record::i64(3),
            Record::i64(1),
            Record::i64(3),
            Record::i64(2),
        ]);
        assert_eq!(s.set_size().unwrap(), 3);
        assert_eq!(s.set_elem(0).unwrap(), &Record::i64(1));
        assert_eq!(s.set_elem(2).unwrap(), &Record::i64(3));
    }

    #[test]
    fn sets_ignore_element_order() {
        let a = Record::set(vec![Record::i64(1), Record::i64(2)]);
        let b = Record::set(vec![Record::i64(2), Record::i64(1)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{1, 2}");
    }

    #[test]
    fn maps_are_sorted_and_last_key_wins() {
        let m = Record::map(vec![
            (Record::i64(2), Record::string("b")),
            (Record::i64(1), Record::string("a")),
            (Record::i64(2), Record::string("c")),
        ]);
        assert_eq!(m.map_size().unwrap(), 2);
        assert_eq!(m.map_key(0).unwrap(), &Record::i64(1));
        assert_eq!(m.map_val(1).unwrap(), &Record::string("c"));
        assert_eq!(
            m,
            Record::map(vec![
                (Record::i64(1), Record::string("a")),
                (Record::i64(2), Record::string("c")),
            ])
        );
    }

    #[test]
    fn normalize_repairs_raw_variants() {
        let raw = Record::Tuple(vec![
            Record::Set(vec![Record::i64(1), Record::i64(1), Record::i64(0)]),
            Record::Int(vec![0, 0, 0, 5]),
        ]);
        let canonical = Record::pair(
            Record::set(vec![Record::i64(0), Record::i64(1)]),
            Record::int(&[5]),
        );
        assert_ne!(raw, canonical);
        assert_eq!(raw.normalize(), canonical);
        assert_eq!(canonical.clone().normalize(), canonical);
    }

    #[test]
    fn decoding_yields_canonical_records() {
        let raw = Record::Vector(vec![
            Record::Set(vec![Record::i64(1), Record::i64(1)]),
            Record::Int(vec![0, 0, 0, 0, 0, 0, 0, 0, 5]),
            Record::Map(vec![
                (Record::i64(9), Record::bool(true)),
                (Record::i64(3), Record::bool(false)),
            ]),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&raw, &mut buf).unwrap();
        let back: Record = ciborium::from_reader(buf.as_slice()).unwrap();

        assert_eq!(back.vector_elem(0).unwrap().set_size().unwrap(), 1);
        let int = back.vector_elem(1).unwrap();
        assert_eq!(int, &Record::int(&[5]));
        assert_eq!(int.get_i64().unwrap(), 5);
        assert_eq!(back.vector_elem(2).unwrap().map_key(0).unwrap(), &Record::i64(3));
        assert_eq!(back, raw.normalize());
    }

    #[test]
    fn map_lookup_by_key() {
        let m = Record::map(vec![
            (Record::string("x"), Record::i64(10)),
            (Record::string("y"), Record::i64(20)),
        ]);
        assert_eq!(
            m.map_get(&Record::string("y")).unwrap(),
            Some(&Record::i64(20))
        );
        assert_eq!(m.map_get(&Record::string("z")).unwrap(), None);
    }

    #[test]
    fn map_from_pairs_rejects_non_pairs() {
        let ok = Record::map_from_pairs(vec![Record::pair(Record::i64(1), Record::bool(false))])
            .unwrap();
        assert_eq!(ok.map_size().unwrap(), 1);

        let err = Record::map_from_pairs(vec![
            Record::pair(Record::i64(1), Record::i64(2)),
            Record::tuple(vec![Record::i64(1)]),
        ]);
        assert_eq!(err, Err(RecordError::NotAPair { index: 1 }));
    }

    #[test]
    fn int_is_normalized() {
        assert_eq!(Record::int(&[0x00, 0x00, 0x05]), Record::int(&[0x05]));
        assert_eq!(Record::int(&[0xFF, 0xFF, 0x80]), Record::int(&[0x80]));
        assert_eq!(Record::int(&[0x00, 0x80]).get_int().unwrap(), vec![0x00, 0x80]);
        assert_eq!(Record::int(&[]).get_i64().unwrap(), 0);
    }

    #[test]
    fn int_and_i64_interoperate() {
        assert_eq!(Record::int(&[0xFF]).get_i64().unwrap(), -1);
        assert_eq!(Record::i64(256).get_int().unwrap(), vec![0x01, 0x00]);
        assert!(Record::int(&[0x01; 9]).get_i64().is_err());
        assert!(Record::int(&[0x01]).is_int());
        assert!(!Record::int(&[0x01]).is_i64());
    }

    #[test]
    fn display_forms() {
        let r = Record::structure(
            "Edge",
            vec![
                Record::tuple(vec![Record::bool(true), Record::string("x")]),
                Record::vector(vec![Record::i64(1), Record::i64(2)]),
                Record::set(vec![Record::i64(7)]),
                Record::map(vec![(Record::i64(1), Record::string("a"))]),
            ],
        );
        assert_eq!(r.to_string(), r#"Edge{(true, "x"), [1, 2], {7}, {1 => "a"}}"#);
        assert_eq!(Record::int(&[0x01; 9]).to_string(), "0x010101010101010101");
    }
}
