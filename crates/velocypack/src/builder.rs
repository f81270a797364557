//! Incremental builder for VelocyPack values.
//!
//! A [`Builder`] appends encoded bytes to a single grow-on-demand buffer
//! while a stack of open-container frames tracks where each array or
//! object started and where its children sit. Closing a container picks
//! the smallest consistent on-wire layout, which may mean relocating the
//! already-written children backward to shrink the reserved header.

use std::collections::HashSet;
use std::io;
use std::ops::Range;

use velocypack_buffers::Buffer;

use crate::constants::{
    ARRAY, ARRAY_COMPACT, DOUBLE, EMPTY_ARRAY, EMPTY_OBJECT, FALSE, ILLEGAL, MAX_KEY, MIN_KEY,
    NULL, OBJECT, OBJECT_COMPACT, STRING_LONG, TRUE, UTC_DATE,
};
use crate::error::{Result, VpackError};
use crate::iterator::{ArrayIterator, ObjectIterator};
use crate::slice::Slice;
use crate::value::Value;
use crate::value_type::ValueType;
use crate::varint::{get_variable_value_length, store_variable_value_length};

/// Options that influence how the builder lays out containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuilderOptions {
    /// Prefer the compact (unindexed) layout for arrays opened as indexed.
    pub build_unindexed_arrays: bool,
    /// Prefer the compact (unindexed) layout for objects opened as indexed.
    pub build_unindexed_objects: bool,
    /// Reject objects with duplicate attribute names at close time.
    pub check_attribute_uniqueness: bool,
}

/// Append-only encoder producing a single VelocyPack value.
///
/// # Example
///
/// ```
/// use velocypack::Builder;
///
/// let mut b = Builder::new(64);
/// b.open_array(false).unwrap();
/// b.add(1i64).unwrap();
/// b.add(2i64).unwrap();
/// b.add(3i64).unwrap();
/// b.close().unwrap();
/// assert_eq!(b.bytes().unwrap(), [0x02, 0x05, 0x31, 0x32, 0x33]);
/// ```
#[derive(Default)]
pub struct Builder {
    /// Layout options; may be changed between values.
    pub options: BuilderOptions,
    buf: Buffer,
    stack: Vec<usize>,
    // Per-depth child-offset vectors, kept allocated across frame pops.
    index: Vec<Vec<usize>>,
    key_written: bool,
}

impl Builder {
    /// Creates a builder with the given initial buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Buffer::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Creates a builder with the given layout options.
    pub fn with_options(options: BuilderOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Clears all state so the builder can produce a fresh value. Buffer
    /// and index allocations are retained.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.stack.clear();
        self.key_written = false;
    }

    /// The generated bytes. Fails while any container is still open.
    pub fn bytes(&self) -> Result<&[u8]> {
        if !self.is_closed() {
            return Err(VpackError::BuilderNotClosed);
        }
        Ok(self.buf.as_slice())
    }

    /// The generated value as a [`Slice`].
    pub fn slice(&self) -> Result<Slice<'_>> {
        if self.buf.is_empty() {
            return Ok(Slice::new(&[]));
        }
        Ok(Slice::new(self.bytes()?))
    }

    /// Writes the generated bytes to `writer`.
    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> io::Result<u64> {
        let bytes = self
            .bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Size in bytes of the generated value. Fails while open.
    pub fn size(&self) -> Result<usize> {
        if !self.is_closed() {
            return Err(VpackError::BuilderNotClosed);
        }
        Ok(self.buf.len())
    }

    /// True when no bytes have been generated yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True when no containers remain open.
    pub fn is_closed(&self) -> bool {
        self.stack.is_empty()
    }

    /// True when the innermost open container is an object.
    pub fn is_open_object(&self) -> bool {
        match self.stack.last() {
            Some(&tos) => matches!(self.buf[tos], OBJECT | OBJECT_COMPACT),
            None => false,
        }
    }

    /// True when the innermost open container is an array.
    pub fn is_open_array(&self) -> bool {
        match self.stack.last() {
            Some(&tos) => matches!(self.buf[tos], ARRAY | ARRAY_COMPACT),
            None => false,
        }
    }

    /// Starts a new array. Must be terminated with [`close`](Self::close).
    pub fn open_array(&mut self, unindexed: bool) -> Result<()> {
        self.open_compound(if unindexed { ARRAY_COMPACT } else { ARRAY })
    }

    /// Starts a new object. Must be terminated with [`close`](Self::close).
    pub fn open_object(&mut self, unindexed: bool) -> Result<()> {
        self.open_compound(if unindexed { OBJECT_COMPACT } else { OBJECT })
    }

    /// Adds any value convertible into a [`Value`].
    pub fn add<T: Into<Value>>(&mut self, v: T) -> Result<()> {
        self.add_value(&v.into())
    }

    /// Adds a typed value to the open array, or as the pending key/value
    /// of an open object, or as the top-level value.
    pub fn add_value(&mut self, v: &Value) -> Result<()> {
        self.add_internal(v)
    }

    /// Adds a key and value to the open object.
    pub fn add_key_value(&mut self, key: &str, v: &Value) -> Result<()> {
        let have_reported = self.add_internal_key(key)?;
        match self.set(v) {
            Ok(()) => Ok(()),
            Err(e) => {
                if have_reported {
                    self.cleanup_add();
                }
                Err(e)
            }
        }
    }

    /// Adds an already-encoded value, copied verbatim.
    pub fn add_slice(&mut self, s: Slice<'_>) -> Result<()> {
        self.add_internal_slice(&s)
    }

    /// Adds all elements of `it` to the open array, which is left open.
    pub fn add_values_from_array_iterator(&mut self, it: ArrayIterator<'_>) -> Result<()> {
        let Some(&tos) = self.stack.last() else {
            return Err(VpackError::BuilderNeedOpenArray);
        };
        if !matches!(self.buf[tos], ARRAY | ARRAY_COMPACT) {
            return Err(VpackError::BuilderNeedOpenArray);
        }
        for item in it {
            let slice = item?;
            self.add_internal_slice(&slice)?;
        }
        Ok(())
    }

    /// Adds all key-value pairs of `it` to the open object, which is left
    /// open. Fails when a key is already pending.
    pub fn add_key_values_from_object_iterator(&mut self, it: ObjectIterator<'_>) -> Result<()> {
        let Some(&tos) = self.stack.last() else {
            return Err(VpackError::BuilderNeedOpenObject);
        };
        if !matches!(self.buf[tos], OBJECT | OBJECT_COMPACT) {
            return Err(VpackError::BuilderNeedOpenObject);
        }
        if self.key_written {
            return Err(VpackError::BuilderKeyAlreadyWritten);
        }
        for pair in it {
            let (k, v) = pair?;
            let key = k.make_key()?;
            let have_reported = self.add_internal_key(key.get_string()?)?;
            if let Err(e) = self.set_slice(&v) {
                if have_reported {
                    self.cleanup_add();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Removes the last subvalue written to the open container.
    pub fn remove_last(&mut self) -> Result<()> {
        let Some(&tos) = self.stack.last() else {
            return Err(VpackError::BuilderNeedOpenCompound);
        };
        let depth = self.stack.len() - 1;
        let Some(&last) = self.index[depth].last() else {
            return Err(VpackError::BuilderNeedSubValue);
        };
        let new_len = tos + last;
        self.buf.shrink(self.buf.len() - new_len);
        self.index[depth].pop();
        Ok(())
    }

    /// Whether the open object already contains `key`.
    pub fn has_key(&self, key: &str) -> Result<bool> {
        let tos = self.open_object_frame()?;
        for &off in &self.index[self.stack.len() - 1] {
            let k = Slice::new(&self.buf[tos + off..]).make_key()?;
            if k.is_equal_string(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The value stored under `key` in the open object, if present.
    pub fn get_key(&self, key: &str) -> Result<Option<Slice<'_>>> {
        let tos = self.open_object_frame()?;
        for &off in &self.index[self.stack.len() - 1] {
            let s = Slice::new(&self.buf[tos + off..]);
            if s.make_key()?.is_equal_string(key)? {
                return Ok(Some(s.next()?));
            }
        }
        Ok(None)
    }

    /// Seals the innermost open array or object.
    pub fn close(&mut self) -> Result<()> {
        let Some(&tos) = self.stack.last() else {
            return Err(VpackError::BuilderNeedOpenCompound);
        };
        let head = self.buf[tos];
        debug_assert!(matches!(head, ARRAY | OBJECT | ARRAY_COMPACT | OBJECT_COMPACT));
        let is_array = matches!(head, ARRAY | ARRAY_COMPACT);
        let depth = self.stack.len() - 1;

        if self.index[depth].is_empty() {
            self.buf[tos] = if is_array { EMPTY_ARRAY } else { EMPTY_OBJECT };
            debug_assert_eq!(self.buf.len(), tos + 9);
            self.buf.shrink(8);
            self.stack.pop();
            return Ok(());
        }

        // The index vector is taken out for the duration of the close and
        // put back afterwards so its allocation survives the pop.
        let mut index = std::mem::take(&mut self.index[depth]);

        if head == ARRAY_COMPACT
            || head == OBJECT_COMPACT
            || (head == ARRAY && self.options.build_unindexed_arrays)
            || (head == OBJECT && (self.options.build_unindexed_objects || index.len() == 1))
        {
            if self.close_compact(tos, is_array, &index) {
                self.index[depth] = index;
                self.stack.pop();
                return Ok(());
            }
            // Compact needed a 9+ byte length header; fall through to the
            // general layout.
        }

        if is_array {
            self.close_array(tos, &mut index);
            self.index[depth] = index;
            self.stack.pop();
            return Ok(());
        }

        // Closing an object. Fix the head byte in case a compact object
        // was originally requested.
        self.buf[tos] = OBJECT;

        // Byte width of the offsets, the byte length and the item count.
        // The 1-byte case wins back 6 header bytes but pays one byte per
        // entry in the index table.
        let mut offset_size = 8;
        if self.buf.len() - tos + index.len() - 6 <= 0xff {
            offset_size = 1;
            if self.buf.len() > tos + 9 {
                self.buf.copy_within(tos + 9.., tos + 3);
            }
            self.buf.shrink(6);
            for off in index.iter_mut() {
                *off -= 6;
            }
            // Moving down data would pay off in the 2-byte case as well;
            // skipped, as only 4 bytes would be saved.
        } else if self.buf.len() - tos + 2 * index.len() <= 0xffff {
            offset_size = 2;
        } else if self.buf.len() - tos + 4 * index.len() <= 0xffff_ffff {
            offset_size = 4;
        }

        let extra = offset_size * index.len() + if offset_size == 8 { 8 } else { 0 };
        self.buf.reserve_space(extra);
        let table_base = self.buf.len();
        self.buf.grow(offset_size * index.len());
        if index.len() >= 2 {
            if let Err(e) = sort_object_index(&self.buf, tos, &mut index) {
                self.index[depth] = index;
                return Err(e);
            }
        }
        for (i, off) in index.iter().enumerate() {
            let base = table_base + offset_size * i;
            set_length(&mut self.buf[base..base + offset_size], *off);
        }

        if offset_size > 1 {
            if offset_size == 2 {
                self.buf[tos] += 1;
            } else if offset_size == 4 {
                self.buf[tos] += 2;
            } else {
                self.buf[tos] += 3;
                let n = index.len();
                self.append_length(n, 8);
            }
        }

        let total = self.buf.len() - tos;
        set_length(&mut self.buf[tos + 1..tos + 1 + offset_size], total);
        if offset_size < 8 {
            let start = tos + 1 + offset_size;
            set_length(&mut self.buf[start..start + offset_size], index.len());
        }

        if self.options.check_attribute_uniqueness && index.len() > 1 {
            if let Err(e) = self.check_attribute_uniqueness(tos) {
                self.index[depth] = index;
                return Err(e);
            }
        }

        self.index[depth] = index;
        self.stack.pop();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal plumbing

    fn open_compound(&mut self, head: u8) -> Result<()> {
        if let Some(&tos) = self.stack.last() {
            if !self.key_written {
                if !matches!(self.buf[tos], ARRAY | ARRAY_COMPACT) {
                    return Err(VpackError::BuilderNeedOpenArray);
                }
                self.report_add();
            } else {
                self.key_written = false;
            }
        }
        self.add_compound(head);
        Ok(())
    }

    // Emits the container tag plus 8 reserved header bytes and pushes a
    // frame. The reserved bytes are rewritten or discarded at close.
    fn add_compound(&mut self, head: u8) {
        let pos = self.buf.len();
        self.stack.push(pos);
        let depth = self.stack.len();
        while self.index.len() < depth {
            self.index.push(Vec::with_capacity(16));
        }
        self.index[depth - 1].clear();
        let dst = self.buf.grow(9);
        dst[0] = head;
    }

    // Records the offset of the child about to be written in the current
    // frame's index vector.
    fn report_add(&mut self) {
        if let Some(&tos) = self.stack.last() {
            let depth = self.stack.len() - 1;
            self.index[depth].push(self.buf.len() - tos);
        }
    }

    // Rolls back the offset recorded by the latest report_add.
    fn cleanup_add(&mut self) {
        let depth = self.stack.len() - 1;
        self.index[depth].pop();
    }

    fn add_internal(&mut self, item: &Value) -> Result<()> {
        let mut have_reported = false;
        if !self.stack.is_empty() && !self.key_written {
            self.report_add();
            have_reported = true;
        }
        match self.set(item) {
            Ok(()) => Ok(()),
            Err(e) => {
                if have_reported {
                    self.cleanup_add();
                }
                Err(e)
            }
        }
    }

    fn add_internal_slice(&mut self, s: &Slice<'_>) -> Result<()> {
        let mut have_reported = false;
        if !self.stack.is_empty() && !self.key_written {
            self.report_add();
            have_reported = true;
        }
        match self.set_slice(s) {
            Ok(()) => Ok(()),
            Err(e) => {
                if have_reported {
                    self.cleanup_add();
                }
                Err(e)
            }
        }
    }

    // Appends the attribute key and marks it pending. Returns whether an
    // index entry was recorded, so the caller can roll it back when the
    // value part fails.
    fn add_internal_key(&mut self, name: &str) -> Result<bool> {
        let mut have_reported = false;
        if let Some(&tos) = self.stack.last() {
            if !matches!(self.buf[tos], OBJECT | OBJECT_COMPACT) {
                return Err(VpackError::BuilderNeedOpenObject);
            }
            if self.key_written {
                return Err(VpackError::BuilderKeyAlreadyWritten);
            }
            self.report_add();
            have_reported = true;
        }
        if let Err(e) = self.check_key_is_string(true) {
            if have_reported {
                self.cleanup_add();
            }
            return Err(e);
        }
        self.add_string(name);
        self.key_written = true;
        Ok(have_reported)
    }

    // Enforces the attribute-key type rule: while the top frame is an
    // object and no key is pending, the next value must be a string and
    // becomes the pending key; the value after a pending key clears it.
    fn check_key_is_string(&mut self, is_string: bool) -> Result<()> {
        if let Some(&tos) = self.stack.last() {
            if matches!(self.buf[tos], OBJECT | OBJECT_COMPACT) {
                if !self.key_written {
                    if !is_string {
                        return Err(VpackError::BuilderKeyMustBeString);
                    }
                    self.key_written = true;
                } else {
                    self.key_written = false;
                }
            }
        }
        Ok(())
    }

    fn set(&mut self, item: &Value) -> Result<()> {
        self.check_key_is_string(matches!(item, Value::String(_)))?;
        match item {
            Value::None => Err(VpackError::BuilderUnexpectedType(
                "cannot add a none value".to_owned(),
            )),
            Value::External => Err(VpackError::BuilderUnexpectedType(
                "external values are not supported".to_owned(),
            )),
            Value::Custom => Err(VpackError::BuilderUnexpectedType(
                "cannot add a custom value with this method".to_owned(),
            )),
            Value::Bcd => Err(VpackError::BuilderUnexpectedType(
                "bcd values are not supported".to_owned(),
            )),
            Value::Null => {
                self.buf.push(NULL);
                Ok(())
            }
            Value::Bool(v) => {
                self.buf.push(if *v { TRUE } else { FALSE });
                Ok(())
            }
            Value::Double(v) => {
                self.add_double(*v);
                Ok(())
            }
            Value::Int(v) => {
                self.add_int(*v);
                Ok(())
            }
            Value::UInt(v) => {
                self.add_uint(*v);
                Ok(())
            }
            Value::UtcDate(v) => {
                self.add_utc_date(*v);
                Ok(())
            }
            Value::String(s) => {
                self.add_string(s);
                Ok(())
            }
            Value::Binary(b) => {
                self.add_binary(b);
                Ok(())
            }
            Value::Illegal => {
                self.buf.push(ILLEGAL);
                Ok(())
            }
            Value::MinKey => {
                self.buf.push(MIN_KEY);
                Ok(())
            }
            Value::MaxKey => {
                self.buf.push(MAX_KEY);
                Ok(())
            }
            Value::Array(items) => {
                self.add_compound(ARRAY);
                for item in items {
                    self.add_internal(item)?;
                }
                self.close()
            }
            Value::Object(fields) => {
                self.add_compound(OBJECT);
                for (key, value) in fields {
                    let have_reported = self.add_internal_key(key)?;
                    if let Err(e) = self.set(value) {
                        if have_reported {
                            self.cleanup_add();
                        }
                        return Err(e);
                    }
                }
                self.close()
            }
        }
    }

    fn set_slice(&mut self, s: &Slice<'_>) -> Result<()> {
        self.check_key_is_string(s.is_string())?;
        match s.value_type() {
            ValueType::None => Err(VpackError::BuilderUnexpectedType(
                "cannot add a none slice".to_owned(),
            )),
            ValueType::External => Err(VpackError::BuilderUnexpectedType(
                "external values are not supported".to_owned(),
            )),
            ValueType::Custom => Err(VpackError::BuilderUnexpectedType(
                "cannot add a custom slice with this method".to_owned(),
            )),
            _ => {
                let len = s.byte_size()?;
                self.buf.write(&s.as_bytes()[..len]);
                Ok(())
            }
        }
    }

    fn open_object_frame(&self) -> Result<usize> {
        let Some(&tos) = self.stack.last() else {
            return Err(VpackError::BuilderNeedOpenObject);
        };
        if !matches!(self.buf[tos], OBJECT | OBJECT_COMPACT) {
            return Err(VpackError::BuilderNeedOpenObject);
        }
        Ok(tos)
    }

    // ------------------------------------------------------------------
    // Primitive encoders

    fn add_int(&mut self, v: i64) {
        if (0..=9).contains(&v) {
            self.buf.push(0x30 + v as u8);
        } else if (-6..=-1).contains(&v) {
            self.buf.push((0x40 + v) as u8);
        } else {
            self.append_int(v, 0x1f);
        }
    }

    fn add_uint(&mut self, v: u64) {
        if v <= 9 {
            self.buf.push(0x30 + v as u8);
        } else {
            self.append_uint(v, 0x27);
        }
    }

    fn add_double(&mut self, v: f64) {
        self.buf.reserve_space(9);
        self.buf.push(DOUBLE);
        self.buf.write(&v.to_bits().to_le_bytes());
    }

    fn add_utc_date(&mut self, v: i64) {
        let dst = self.buf.grow(9);
        dst[0] = UTC_DATE;
        dst[1..9].copy_from_slice(&(v as u64).to_le_bytes());
    }

    fn add_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len();
        if len > 126 {
            // long string with explicit 8-byte length
            let dst = self.buf.grow(1 + 8 + len);
            dst[0] = STRING_LONG;
            dst[1..9].copy_from_slice(&(len as u64).to_le_bytes());
            dst[9..].copy_from_slice(bytes);
        } else {
            let dst = self.buf.grow(1 + len);
            dst[0] = 0x40 + len as u8;
            dst[1..].copy_from_slice(bytes);
        }
    }

    fn add_binary(&mut self, v: &[u8]) {
        self.buf.reserve_space(1 + 8 + v.len());
        self.append_uint(v.len() as u64, 0xbf);
        self.buf.write(v);
    }

    // Writes a signed integer in the minimal two's-complement width with
    // tag `base + width`.
    fn append_int(&mut self, v: i64, base: u8) {
        let v_size = int_length(v);
        let mut x = if v_size == 8 {
            v as u64
        } else {
            let shift = 1i64 << (v_size * 8 - 1);
            if v >= 0 {
                v as u64
            } else {
                (v + shift) as u64 + shift as u64
            }
        };
        let dst = self.buf.grow(1 + v_size);
        dst[0] = base + v_size as u8;
        for b in dst[1..].iter_mut() {
            *b = (x & 0xff) as u8;
            x >>= 8;
        }
    }

    // Writes an unsigned integer in the minimal width with tag
    // `base + width`.
    fn append_uint(&mut self, v: u64, base: u8) {
        self.buf.reserve_space(9);
        let save = self.buf.len();
        self.buf.push(0); // patched with the tag below
        let mut v = v;
        let mut v_size = 0u8;
        loop {
            v_size += 1;
            self.buf.push((v & 0xff) as u8);
            v >>= 8;
            if v == 0 {
                break;
            }
        }
        self.buf[save] = base + v_size;
    }

    fn append_length(&mut self, v: usize, n: usize) {
        let dst = self.buf.grow(n);
        set_length(dst, v);
    }

    // ------------------------------------------------------------------
    // Container close paths

    // Tries the compact layout with variable-length byte size and item
    // count. Returns false when the length header would not fit in the 8
    // reserved bytes.
    fn close_compact(&mut self, tos: usize, is_array: bool, index: &[usize]) -> bool {
        let nr_items = index.len();
        let nr_items_len = get_variable_value_length(nr_items);

        let mut byte_size = self.buf.len() - (tos + 8) + nr_items_len;
        let mut byte_size_len = get_variable_value_length(byte_size);
        byte_size += byte_size_len;
        // Adding its own length may push the encoding over a 7-bit
        // boundary once.
        if get_variable_value_length(byte_size) != byte_size_len {
            byte_size += 1;
            byte_size_len += 1;
        }

        if byte_size_len >= 9 {
            return false;
        }

        self.buf[tos] = if is_array { ARRAY_COMPACT } else { OBJECT_COMPACT };

        let values_len = self.buf.len() - (tos + 9);
        if values_len > 0 && byte_size_len < 8 {
            self.buf
                .copy_within(tos + 9..tos + 9 + values_len, tos + 1 + byte_size_len);
        }
        self.buf.shrink(8 - byte_size_len);

        store_variable_value_length(&mut self.buf, tos + 1, byte_size, false);

        self.buf.grow(nr_items_len);
        store_variable_value_length(&mut self.buf, tos + byte_size - 1, nr_items, true);
        true
    }

    fn close_array(&mut self, tos: usize, index: &mut [usize]) {
        // Fix the head byte in case a compact array was originally
        // requested.
        self.buf[tos] = ARRAY;
        let n = index.len();

        let mut need_index_table = true;
        let mut need_nr_subs = true;
        if n == 1 {
            need_index_table = false;
            need_nr_subs = false;
        } else if (self.buf.len() - tos) - index[0] == n * (index[1] - index[0]) {
            // All entries may have the same byte length, in which case no
            // offset table is needed at all.
            let sub_len = index[1] - index[0];
            let mut no_table = (self.buf.len() - tos) - index[n - 1] == sub_len;
            if no_table {
                for i in 1..n - 1 {
                    if index[i + 1] - index[i] != sub_len {
                        no_table = false;
                        break;
                    }
                }
            }
            if no_table {
                need_index_table = false;
                need_nr_subs = false;
            }
        }

        let index_len_if_needed = if need_index_table { n } else { 0 };
        let nr_subs_len_if_needed = if need_nr_subs { 6 } else { 7 };
        let offset_size = if self.buf.len() - tos + index_len_if_needed - nr_subs_len_if_needed
            <= 0xff
        {
            1
        } else if self.buf.len() - tos + 2 * index_len_if_needed <= 0xffff {
            2
        } else if self.buf.len() - tos + 4 * index_len_if_needed <= 0xffff_ffff {
            4
        } else {
            8
        };

        if offset_size == 1 {
            let target_pos = if need_index_table { 3 } else { 2 };
            if self.buf.len() > tos + 9 {
                self.buf.copy_within(tos + 9.., tos + target_pos);
            }
            let diff = 9 - target_pos;
            self.buf.shrink(diff);
            if need_index_table {
                for off in index.iter_mut() {
                    *off -= diff;
                }
            }
            // Without an index table the offsets are now stale, but no
            // longer needed either.
        }
        // Moving down data would pay off in the 2-byte case as well;
        // skipped, as only 4 bytes would be saved.

        if need_index_table {
            let extra = offset_size * n + if offset_size == 8 { 8 } else { 0 };
            self.buf.reserve_space(extra);
            let table_base = self.buf.len();
            self.buf.grow(offset_size * n);
            for (i, off) in index.iter().enumerate() {
                let base = table_base + offset_size * i;
                set_length(&mut self.buf[base..base + offset_size], *off);
            }
        } else {
            self.buf[tos] = 0x02;
        }

        if offset_size > 1 {
            if offset_size == 2 {
                self.buf[tos] += 1;
            } else if offset_size == 4 {
                self.buf[tos] += 2;
            } else {
                self.buf[tos] += 3;
                if need_nr_subs {
                    self.append_length(n, 8);
                }
            }
        }

        let total = self.buf.len() - tos;
        set_length(&mut self.buf[tos + 1..tos + 1 + offset_size], total);
        if offset_size < 8 && need_nr_subs {
            let start = tos + 1 + offset_size;
            set_length(&mut self.buf[start..start + offset_size], n);
        }
    }

    // Verifies attribute uniqueness on the finalized object slice.
    fn check_attribute_uniqueness(&self, tos: usize) -> Result<()> {
        let obj = Slice::new(&self.buf[tos..]);
        let n = obj.length()?;
        if obj.is_sorted() {
            // Adjacent keys in the sorted index table suffice.
            let mut prev = obj.key_at(0)?.get_string()?;
            for i in 1..n {
                let current = obj.key_at(i)?.get_string()?;
                if prev == current {
                    return Err(VpackError::DuplicateAttributeName);
                }
                prev = current;
            }
        } else {
            let mut keys = HashSet::new();
            for i in 0..n {
                let key = obj.key_at(i)?.get_string()?;
                if !keys.insert(key) {
                    return Err(VpackError::DuplicateAttributeName);
                }
            }
        }
        Ok(())
    }
}

// Number of bytes required to store the value in two's-complement, such
// that the high bit does not spuriously flip the sign.
fn int_length(value: i64) -> usize {
    if (-0x80..=0x7f).contains(&value) {
        return 1;
    }
    let mut x = if value >= 0 {
        value as u64
    } else {
        (-(value + 1)) as u64
    };
    let mut size = 0;
    loop {
        size += 1;
        x >>= 8;
        if x < 0x80 {
            return size + 1;
        }
    }
}

// Little-endian store of `v` across the whole of `dst`.
fn set_length(dst: &mut [u8], v: usize) {
    let mut v = v;
    for b in dst.iter_mut() {
        *b = (v & 0xff) as u8;
        v >>= 8;
    }
}

// Byte range of the attribute name reachable from the key at `pos`.
fn find_attr_name(buf: &[u8], pos: usize) -> Result<Range<usize>> {
    let h = buf[pos];
    if (0x40..=0xbe).contains(&h) {
        let l = (h - 0x40) as usize;
        return Ok(pos + 1..pos + 1 + l);
    }
    if h == 0xbf {
        let mut l = 0usize;
        for i in (1..=8).rev() {
            l = (l << 8) + buf[pos + i] as usize;
        }
        return Ok(pos + 1 + 8..pos + 1 + 8 + l);
    }
    // Keys that are not literal strings resolve through the external
    // attribute translator; make_key surfaces that requirement.
    Slice::new(&buf[pos..]).make_key()?;
    Err(VpackError::InvalidType(
        "unexpected attribute key type".to_owned(),
    ))
}

// Reorders `index` so the table stores child offsets in lexicographic
// order of the raw UTF-8 bytes of their attribute names.
fn sort_object_index(buf: &[u8], tos: usize, index: &mut [usize]) -> Result<()> {
    let mut entries: Vec<(usize, Range<usize>)> = Vec::with_capacity(index.len());
    for &off in index.iter() {
        let name = find_attr_name(buf, tos + off)?;
        entries.push((off, name));
    }
    entries.sort_by(|a, b| buf[a.1.clone()].cmp(&buf[b.1.clone()]));
    for (slot, (off, _)) in entries.into_iter().enumerate() {
        index[slot] = off;
    }
    Ok(())
}
