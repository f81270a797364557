//! Read-only view over an encoded value.
//!
//! A [`Slice`] borrows finalized bytes and exposes just enough of the
//! format to navigate containers, resolve attribute keys and read scalar
//! payloads. Input is trusted to be well-formed output of the builder;
//! structural probes return errors rather than panicking when a view is
//! shorter than its header claims.

use crate::error::{Result, VpackError};
use crate::value_type::ValueType;
use crate::varint::read_variable_value_length;

/// A read-only view positioned at the head byte of one encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice<'a> {
    data: &'a [u8],
}

impl<'a> Slice<'a> {
    /// Creates a slice over `data`, positioned at its first byte.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The head (type) byte. An empty view reads as `None`.
    #[inline]
    pub fn head(&self) -> u8 {
        self.data.first().copied().unwrap_or(0x00)
    }

    /// The underlying bytes, from the head byte to the end of the view.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        ValueType::from_head(self.head())
    }

    pub fn is_none(&self) -> bool {
        self.value_type() == ValueType::None
    }

    pub fn is_null(&self) -> bool {
        self.value_type() == ValueType::Null
    }

    pub fn is_bool(&self) -> bool {
        self.value_type() == ValueType::Bool
    }

    pub fn is_array(&self) -> bool {
        self.value_type() == ValueType::Array
    }

    pub fn is_object(&self) -> bool {
        self.value_type() == ValueType::Object
    }

    pub fn is_double(&self) -> bool {
        self.value_type() == ValueType::Double
    }

    pub fn is_string(&self) -> bool {
        self.value_type() == ValueType::String
    }

    pub fn is_binary(&self) -> bool {
        self.value_type() == ValueType::Binary
    }

    pub fn is_small_int(&self) -> bool {
        self.value_type() == ValueType::SmallInt
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.value_type(),
            ValueType::Int | ValueType::UInt | ValueType::SmallInt
        )
    }

    /// True when this is an object layout whose index table is sorted by
    /// attribute name (tags 0x0b through 0x0e).
    pub fn is_sorted(&self) -> bool {
        matches!(self.head(), 0x0b..=0x0e)
    }

    /// Total number of bytes this value occupies on the wire.
    pub fn byte_size(&self) -> Result<usize> {
        let h = self.head();
        let size = match h {
            0x01 | 0x0a | 0x17..=0x1a | 0x1e | 0x1f | 0x30..=0x3f => 1,
            0x02..=0x05 => self.read_length_field(1usize << (h - 0x02))?,
            0x06..=0x09 => self.read_length_field(1usize << (h - 0x06))?,
            0x0b..=0x0e => self.read_length_field(1usize << (h - 0x0b))?,
            0x13 | 0x14 => {
                self.require(2)?;
                read_variable_value_length(self.data, 1, false)
            }
            0x1b | 0x1c => 9,
            0x20..=0x27 => 1 + (h - 0x1f) as usize,
            0x28..=0x2f => 1 + (h - 0x27) as usize,
            0x40..=0xbe => 1 + (h - 0x40) as usize,
            0xbf => {
                self.require(9)?;
                9 + read_integer(&self.data[1..9])? as usize
            }
            0xc0..=0xc7 => {
                let l = (h - 0xbf) as usize;
                self.require(1 + l)?;
                1 + l + read_integer(&self.data[1..1 + l])? as usize
            }
            _ => {
                return Err(VpackError::InvalidType(format!(
                    "no byte size for type {}",
                    self.value_type()
                )))
            }
        };
        Ok(size)
    }

    /// Number of items in an array, or key-value pairs in an object.
    pub fn length(&self) -> Result<usize> {
        let h = self.head();
        match h {
            0x01 | 0x0a => Ok(0),
            0x13 | 0x14 => {
                let bs = self.byte_size()?;
                self.require(bs)?;
                Ok(read_variable_value_length(self.data, bs - 1, true))
            }
            0x02..=0x05 => {
                let bs = self.byte_size()?;
                let data_offset = self.find_data_offset()?;
                let first = Slice::new(&self.data[data_offset..]);
                Ok((bs - data_offset) / first.byte_size()?)
            }
            0x06..=0x09 => self.read_count_field(1usize << (h - 0x06)),
            0x0b..=0x0e => self.read_count_field(1usize << (h - 0x0b)),
            _ => Err(VpackError::InvalidType(
                "expecting array or object".to_owned(),
            )),
        }
    }

    /// The `i`-th element of an array.
    pub fn at(&self, i: usize) -> Result<Slice<'a>> {
        let h = self.head();
        match h {
            0x01 => Err(VpackError::IndexOutOfBounds),
            0x13 => self.nth_compact(i),
            0x02..=0x05 => {
                if i >= self.length()? {
                    return Err(VpackError::IndexOutOfBounds);
                }
                let data_offset = self.find_data_offset()?;
                let first = Slice::new(&self.data[data_offset..]);
                let sub_size = first.byte_size()?;
                Ok(Slice::new(&self.data[data_offset + i * sub_size..]))
            }
            0x06..=0x09 => {
                let offset = self.indexed_offset(i, 1usize << (h - 0x06))?;
                Ok(Slice::new(&self.data[offset..]))
            }
            _ => Err(VpackError::InvalidType("expecting array".to_owned())),
        }
    }

    /// The `i`-th attribute key of an object, translated to its string
    /// form when integer-aliased. For sorted layouts `i` indexes the
    /// sorted table, for compact objects the stored order.
    pub fn key_at(&self, i: usize) -> Result<Slice<'a>> {
        self.raw_key_at(i)?.make_key()
    }

    /// The value belonging to the `i`-th attribute key.
    pub fn value_at(&self, i: usize) -> Result<Slice<'a>> {
        self.raw_key_at(i)?.next()
    }

    pub(crate) fn raw_key_at(&self, i: usize) -> Result<Slice<'a>> {
        let h = self.head();
        match h {
            0x0a => Err(VpackError::IndexOutOfBounds),
            0x14 => self.nth_compact(2 * i),
            0x0b..=0x0e => {
                let offset = self.indexed_offset(i, 1usize << (h - 0x0b))?;
                Ok(Slice::new(&self.data[offset..]))
            }
            _ => Err(VpackError::InvalidType("expecting object".to_owned())),
        }
    }

    /// The value that follows this one in the enclosing byte stream.
    pub fn next(&self) -> Result<Slice<'a>> {
        let bs = self.byte_size()?;
        self.require(bs)?;
        Ok(Slice::new(&self.data[bs..]))
    }

    /// Resolves this slice as an attribute key. String keys resolve to
    /// themselves; integer-aliased keys need the external attribute
    /// translator, which this crate does not ship.
    pub fn make_key(&self) -> Result<Slice<'a>> {
        if self.is_string() {
            return Ok(*self);
        }
        if self.is_integer() {
            return Err(VpackError::NeedAttributeTranslator);
        }
        Err(VpackError::InvalidType(format!(
            "cannot use {} as attribute key",
            self.value_type()
        )))
    }

    /// String payload of a short or long string value.
    pub fn get_string(&self) -> Result<&'a str> {
        let bytes = self.string_bytes()?;
        std::str::from_utf8(bytes)
            .map_err(|_| VpackError::InvalidType("invalid utf-8 in string".to_owned()))
    }

    /// Raw bytes of a string value without UTF-8 validation.
    pub fn string_bytes(&self) -> Result<&'a [u8]> {
        let h = self.head();
        match h {
            0x40..=0xbe => {
                let l = (h - 0x40) as usize;
                self.require(1 + l)?;
                Ok(&self.data[1..1 + l])
            }
            0xbf => {
                self.require(9)?;
                let l = read_integer(&self.data[1..9])? as usize;
                self.require(9 + l)?;
                Ok(&self.data[9..9 + l])
            }
            _ => Err(VpackError::InvalidType("expecting string".to_owned())),
        }
    }

    /// Signed integer payload of an int, uint or small-int value.
    pub fn get_int(&self) -> Result<i64> {
        let h = self.head();
        match h {
            0x20..=0x27 => {
                let l = (h - 0x1f) as usize;
                self.require(1 + l)?;
                let v = read_integer(&self.data[1..1 + l])?;
                if l == 8 {
                    return Ok(v as i64);
                }
                let shift = 1u64 << (l * 8 - 1);
                if v < shift {
                    Ok(v as i64)
                } else {
                    Ok((v - shift) as i64 - shift as i64)
                }
            }
            0x28..=0x2f => {
                let v = self.get_uint()?;
                i64::try_from(v).map_err(|_| VpackError::NumberOutOfRange)
            }
            0x30..=0x39 => Ok((h - 0x30) as i64),
            0x3a..=0x3f => Ok(h as i64 - 0x40),
            _ => Err(VpackError::InvalidType("expecting int".to_owned())),
        }
    }

    /// Unsigned integer payload.
    pub fn get_uint(&self) -> Result<u64> {
        let h = self.head();
        match h {
            0x28..=0x2f => {
                let l = (h - 0x27) as usize;
                self.require(1 + l)?;
                read_integer(&self.data[1..1 + l])
            }
            0x20..=0x27 => {
                let v = self.get_int()?;
                u64::try_from(v).map_err(|_| VpackError::NumberOutOfRange)
            }
            0x30..=0x39 => Ok((h - 0x30) as u64),
            0x3a..=0x3f => Err(VpackError::NumberOutOfRange),
            _ => Err(VpackError::InvalidType("expecting uint".to_owned())),
        }
    }

    /// Double payload.
    pub fn get_double(&self) -> Result<f64> {
        if self.head() != 0x1b {
            return Err(VpackError::InvalidType("expecting double".to_owned()));
        }
        self.require(9)?;
        let bits = read_integer(&self.data[1..9])?;
        Ok(f64::from_bits(bits))
    }

    /// UTC date payload, signed milliseconds since the epoch.
    pub fn get_utc_date(&self) -> Result<i64> {
        if self.head() != 0x1c {
            return Err(VpackError::InvalidType("expecting utc-date".to_owned()));
        }
        self.require(9)?;
        Ok(read_integer(&self.data[1..9])? as i64)
    }

    /// Boolean payload.
    pub fn get_bool(&self) -> Result<bool> {
        match self.head() {
            0x19 => Ok(false),
            0x1a => Ok(true),
            _ => Err(VpackError::InvalidType("expecting bool".to_owned())),
        }
    }

    /// Binary payload.
    pub fn get_binary(&self) -> Result<&'a [u8]> {
        let h = self.head();
        if !(0xc0..=0xc7).contains(&h) {
            return Err(VpackError::InvalidType("expecting binary".to_owned()));
        }
        let l = (h - 0xbf) as usize;
        self.require(1 + l)?;
        let len = read_integer(&self.data[1..1 + l])? as usize;
        self.require(1 + l + len)?;
        Ok(&self.data[1 + l..1 + l + len])
    }

    /// Compares this string value to `other` without allocating.
    pub fn is_equal_string(&self, other: &str) -> Result<bool> {
        Ok(self.string_bytes()? == other.as_bytes())
    }

    // Offset of the first subvalue of a nonempty indexed or equal-size
    // container, skipping any zero padding left in the reserved header.
    fn find_data_offset(&self) -> Result<usize> {
        let fsm = match self.head() {
            0x02 => 2,
            0x03 | 0x06 | 0x0b => 3,
            0x04 | 0x07 | 0x0c => 5,
            _ => 9,
        };
        if fsm <= 2 && self.byte_at(2)? != 0 {
            return Ok(2);
        }
        if fsm <= 3 && self.byte_at(3)? != 0 {
            return Ok(3);
        }
        if fsm <= 5 && self.byte_at(5)? != 0 {
            return Ok(5);
        }
        Ok(9)
    }

    // Walks to the n-th item of a compact container.
    fn nth_compact(&self, n: usize) -> Result<Slice<'a>> {
        let bs = self.byte_size()?;
        self.require(bs)?;
        let count = read_variable_value_length(self.data, bs - 1, true);
        let pairs = self.head() == 0x14;
        if (pairs && n >= 2 * count) || (!pairs && n >= count) {
            return Err(VpackError::IndexOutOfBounds);
        }
        let mut offset = 1;
        while self.byte_at(offset)? & 0x80 != 0 {
            offset += 1;
        }
        offset += 1;
        let mut current = Slice::new(&self.data[offset..]);
        for _ in 0..n {
            current = current.next()?;
        }
        Ok(current)
    }

    // Reads entry `i` of the index table of a width-`w` container.
    fn indexed_offset(&self, i: usize, w: usize) -> Result<usize> {
        let n = self.length()?;
        if i >= n {
            return Err(VpackError::IndexOutOfBounds);
        }
        let bs = self.byte_size()?;
        self.require(bs)?;
        let table = if w == 8 { bs - 8 - n * 8 } else { bs - n * w };
        let entry = table + i * w;
        read_integer(&self.data[entry..entry + w]).map(|v| v as usize)
    }

    fn read_length_field(&self, w: usize) -> Result<usize> {
        self.require(1 + w)?;
        read_integer(&self.data[1..1 + w]).map(|v| v as usize)
    }

    fn read_count_field(&self, w: usize) -> Result<usize> {
        if w == 8 {
            let bs = self.byte_size()?;
            self.require(bs)?;
            read_integer(&self.data[bs - 8..bs]).map(|v| v as usize)
        } else {
            self.require(1 + 2 * w)?;
            read_integer(&self.data[1 + w..1 + 2 * w]).map(|v| v as usize)
        }
    }

    #[inline]
    fn byte_at(&self, i: usize) -> Result<u8> {
        self.data.get(i).copied().ok_or(VpackError::IndexOutOfBounds)
    }

    #[inline]
    fn require(&self, n: usize) -> Result<()> {
        if self.data.len() < n {
            return Err(VpackError::IndexOutOfBounds);
        }
        Ok(())
    }
}

// Little-endian unsigned read of up to 8 bytes.
fn read_integer(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(VpackError::NumberOutOfRange);
    }
    let mut v = 0u64;
    for (i, b) in bytes.iter().enumerate() {
        v |= (*b as u64) << (8 * i);
    }
    Ok(v)
}
