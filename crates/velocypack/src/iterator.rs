//! Iteration over the children of a finalized array or object slice.

use crate::error::{Result, VpackError};
use crate::slice::Slice;

/// Iterates over the elements of an array slice in element order.
///
/// Walks sequentially from the first element, so compact arrays are
/// traversed without repeated index-table lookups.
pub struct ArrayIterator<'a> {
    current: Option<Slice<'a>>,
    position: usize,
    size: usize,
}

impl<'a> ArrayIterator<'a> {
    pub fn new(slice: Slice<'a>) -> Result<Self> {
        if !slice.is_array() {
            return Err(VpackError::InvalidType("expecting array".to_owned()));
        }
        let size = slice.length()?;
        let current = if size > 0 { Some(slice.at(0)?) } else { None };
        Ok(Self {
            current,
            position: 0,
            size,
        })
    }
}

impl<'a> Iterator for ArrayIterator<'a> {
    type Item = Result<Slice<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.size {
            return None;
        }
        let item = self.current?;
        self.position += 1;
        if self.position < self.size {
            match item.next() {
                Ok(next) => self.current = Some(next),
                Err(e) => {
                    self.position = self.size;
                    return Some(Err(e));
                }
            }
        }
        Some(Ok(item))
    }
}

/// Iterates over the key-value pairs of an object slice.
///
/// For indexed objects the pairs come in index-table (key-sorted) order;
/// for compact objects in stored order. Keys are yielded untranslated.
pub struct ObjectIterator<'a> {
    slice: Slice<'a>,
    current: Option<Slice<'a>>,
    position: usize,
    size: usize,
}

impl<'a> ObjectIterator<'a> {
    pub fn new(slice: Slice<'a>) -> Result<Self> {
        if !slice.is_object() {
            return Err(VpackError::InvalidType("expecting object".to_owned()));
        }
        let size = slice.length()?;
        let current = if size > 0 && slice.head() == 0x14 {
            Some(slice.raw_key_at(0)?)
        } else {
            None
        };
        Ok(Self {
            slice,
            current,
            position: 0,
            size,
        })
    }

    fn pair_at(&mut self) -> Result<(Slice<'a>, Slice<'a>)> {
        if let Some(key) = self.current {
            // Sequential walk over a compact object.
            let value = key.next()?;
            if self.position + 1 < self.size {
                self.current = Some(value.next()?);
            }
            Ok((key, value))
        } else {
            let key = self.slice.raw_key_at(self.position)?;
            let value = key.next()?;
            Ok((key, value))
        }
    }
}

impl<'a> Iterator for ObjectIterator<'a> {
    type Item = Result<(Slice<'a>, Slice<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.size {
            return None;
        }
        let pair = self.pair_at();
        if pair.is_err() {
            self.position = self.size;
            return Some(pair);
        }
        self.position += 1;
        Some(pair)
    }
}
