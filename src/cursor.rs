//! `ByteCursor`: a position-tracked little-endian reader over a byte slice
//! (spec §4.1). Grounded on the teacher's `legacy/io_reader.rs`, generalised
//! from a trait over `Read` to a cursor over `&[u8]` so every decoder shares
//! one implementation regardless of whether the underlying bytes came from
//! a whole file, a GPX sector payload, or an inflated GP7 entry.

use std::cmp;

use byteorder::{ByteOrder, LittleEndian};
use encoding::all::ISO_8859_1;
use encoding::{DecoderTrap, Encoding};

use crate::error::{Error, ErrorKind, Result};

pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.pos.checked_add(n).map_or(true, |end| end > self.data.len()) {
            Err(Error::from(ErrorKind::Truncated))
        } else {
            Ok(())
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n)?;
        let data = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|b| b != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(LittleEndian::read_u16(bytes))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.read_bytes(2)?;
        Ok(LittleEndian::read_i16(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_i32(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        Ok(LittleEndian::read_f64(bytes))
    }

    fn decode_latin1(bytes: &[u8]) -> Result<String> {
        ISO_8859_1
            .decode(bytes, DecoderTrap::Replace)
            .map_err(|e| Error::from(ErrorKind::BadContainer(e.into_owned())))
    }

    /// `int32 totalSize`, `uint8 strLen`, `strLen` bytes, then skip
    /// `max(0, totalSize - 1 - strLen)` padding bytes.
    pub fn read_int_byte_sized_string(&mut self) -> Result<String> {
        let total_size = self.read_i32()?;
        let str_len = self.read_u8()? as i32;
        let bytes = self.read_bytes(cmp::max(0, str_len) as usize)?;
        let s = Self::decode_latin1(bytes)?;
        let padding = cmp::max(0, total_size - 1 - str_len);
        self.skip(padding as usize)?;
        Ok(s)
    }

    /// `int32 len`, `len` bytes (empty if `len <= 0`).
    pub fn read_int_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len <= 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len as usize)?;
        Self::decode_latin1(bytes)
    }

    /// `uint8 strLen`, `min(strLen, fixed_len)` bytes, skip to `fixed_len` total.
    pub fn read_byte_sized_string(&mut self, fixed_len: usize) -> Result<String> {
        let str_len = self.read_u8()? as usize;
        let take = cmp::min(str_len, fixed_len);
        let bytes = self.read_bytes(take)?;
        let s = Self::decode_latin1(bytes)?;
        self.skip(fixed_len - take)?;
        Ok(s)
    }
}
