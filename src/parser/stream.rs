use crate::error::DecodeError;
use crate::parser::helpers::sign_extend;
use crate::schema::Endianness;

/// Cursor over a frame or payload slice for fixed-width integer reads
pub struct TlgDataStream<'a> {
    data: &'a [u8],
    pub pos: usize,
    end: usize,
    pub eof: bool,
}

impl<'a> TlgDataStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            eof: data.is_empty(),
        }
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
        self.eof = pos >= self.end;
    }

    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if self.pos < self.end {
            let byte = self.data[self.pos];
            self.pos += 1;
            self.eof = self.pos >= self.end;
            Ok(byte)
        } else {
            self.eof = true;
            Err(DecodeError::UnexpectedEof { offset: self.pos })
        }
    }

    /// Read `width` bytes (1..=4) as an unsigned integer in the given byte order
    pub fn read_uint(&mut self, width: usize, endian: Endianness) -> Result<u32, DecodeError> {
        if width == 0 || width > 4 {
            return Err(DecodeError::UnsupportedWidth(width));
        }
        if self.remaining() < width {
            self.eof = true;
            return Err(DecodeError::UnexpectedEof { offset: self.pos });
        }

        let mut value = 0u32;
        for i in 0..width {
            let byte = self.read_byte()? as u32;
            value |= match endian {
                Endianness::Little => byte << (8 * i),
                Endianness::Big => byte << (8 * (width - 1 - i)),
            };
        }
        Ok(value)
    }

    /// Read `width` bytes and sign-extend when `signed` is set
    pub fn read_int(
        &mut self,
        width: usize,
        signed: bool,
        endian: Endianness,
    ) -> Result<i64, DecodeError> {
        let raw = self.read_uint(width, endian)?;
        if signed {
            Ok(sign_extend(raw, width) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(self.read_uint(2, Endianness::Little)? as u16)
    }
}
