// Copyright (c) 2025 The RTC-BWE Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::Buf;
use bytes::BufMut;

use crate::error::Error;
use crate::Result;

/// Encoder for RTP wire data.
pub trait Encoder {
    /// Write an unsigned 8 bit integer to self.
    fn write_u8(&mut self, n: u8) -> Result<usize>;

    /// Write an unsigned 16 bit integer to self in big-endian byte order.
    fn write_u16(&mut self, n: u16) -> Result<usize>;

    /// Write an unsigned 24 bit integer to self in big-endian byte order.
    fn write_u24(&mut self, n: u32) -> Result<usize>;

    /// Write an unsigned 32 bit integer to self in big-endian byte order.
    fn write_u32(&mut self, n: u32) -> Result<usize>;

    /// Write a slice to self.
    fn write(&mut self, src: &[u8]) -> Result<usize>;
}

/// Decoder for RTP wire data.
///
/// All reads are bounds-checked against the remaining bytes and return
/// `Error::BufferTooShort` on underflow.
pub trait Decoder {
    /// Read an unsigned 8 bit integer from self.
    fn read_u8(&mut self) -> Result<u8>;

    /// Read an unsigned 16 bit integer from self in big-endian byte order.
    fn read_u16(&mut self) -> Result<u16>;

    /// Read an unsigned 24 bit integer from self in big-endian byte order.
    fn read_u24(&mut self) -> Result<u32>;

    /// Read a signed 24 bit integer from self in big-endian byte order,
    /// sign-extended to 32 bits.
    fn read_i24(&mut self) -> Result<i32>;

    /// Read an unsigned 32 bit integer from self in big-endian byte order.
    fn read_u32(&mut self) -> Result<u32>;

    /// Read `len` bytes inside self.
    fn read(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Skip len bytes inside self.
    fn skip(&mut self, len: usize) -> Result<()>;
}

impl Encoder for &mut [u8] {
    fn write_u8(&mut self, n: u8) -> Result<usize> {
        if self.remaining_mut() < 1 {
            return Err(Error::BufferTooShort);
        }
        self.put_u8(n);
        Ok(1)
    }

    fn write_u16(&mut self, n: u16) -> Result<usize> {
        if self.remaining_mut() < 2 {
            return Err(Error::BufferTooShort);
        }
        self.put_u16(n);
        Ok(2)
    }

    fn write_u24(&mut self, n: u32) -> Result<usize> {
        if self.remaining_mut() < 3 {
            return Err(Error::BufferTooShort);
        }
        self.put_u8(((n & 0x00FF_0000) >> 16) as u8);
        self.put_u16((n & 0xFFFF) as u16);
        Ok(3)
    }

    fn write_u32(&mut self, n: u32) -> Result<usize> {
        if self.remaining_mut() < 4 {
            return Err(Error::BufferTooShort);
        }
        self.put_u32(n);
        Ok(4)
    }

    fn write(&mut self, src: &[u8]) -> Result<usize> {
        if self.remaining_mut() < src.len() {
            return Err(Error::BufferTooShort);
        }
        self.put_slice(src);
        Ok(src.len())
    }
}

impl Decoder for &[u8] {
    fn read_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(Error::BufferTooShort);
        }
        Ok(self.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(Error::BufferTooShort);
        }
        Ok(self.get_u16())
    }

    fn read_u24(&mut self) -> Result<u32> {
        if self.remaining() < 3 {
            return Err(Error::BufferTooShort);
        }
        let high = self.get_u8() as u32;
        let low = self.get_u16() as u32;
        Ok((high << 16) | low)
    }

    fn read_i24(&mut self) -> Result<i32> {
        let v = self.read_u24()?;
        // Sign-extend from bit 23.
        if v & 0x0080_0000 != 0 {
            Ok((v | 0xFF00_0000) as i32)
        } else {
            Ok(v as i32)
        }
    }

    fn read_u32(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(Error::BufferTooShort);
        }
        Ok(self.get_u32())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(Error::BufferTooShort);
        }
        let mut v = vec![0u8; len];
        self.copy_to_slice(&mut v);
        Ok(v)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(Error::BufferTooShort);
        }
        self.advance(len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_read_fixed_width() -> Result<()> {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a];
        let mut buf = &data[..];

        assert_eq!(buf.read_u8()?, 0x01);
        assert_eq!(buf.read_u16()?, 0x0203);
        assert_eq!(buf.read_u24()?, 0x040506);
        assert_eq!(buf.read_u32()?, 0x0708090a);
        assert_eq!(buf.read_u8(), Err(Error::BufferTooShort));
        Ok(())
    }

    #[test]
    fn codec_read_i24() -> Result<()> {
        let mut buf = &[0xFF, 0xFF, 0xFE][..];
        assert_eq!(buf.read_i24()?, -2);

        let mut buf = &[0x00, 0x00, 0x02][..];
        assert_eq!(buf.read_i24()?, 2);

        let mut buf = &[0x80, 0x00, 0x00][..];
        assert_eq!(buf.read_i24()?, -8388608);
        Ok(())
    }

    #[test]
    fn codec_read_underflow() {
        let mut buf = &[0x01, 0x02][..];
        assert_eq!(buf.read_u24(), Err(Error::BufferTooShort));
        assert_eq!(buf.read_u32(), Err(Error::BufferTooShort));
        assert_eq!(buf.read(3), Err(Error::BufferTooShort));
        assert_eq!(buf.skip(3), Err(Error::BufferTooShort));

        // A failed read must not consume anything.
        assert_eq!(buf.read_u16(), Ok(0x0102));
    }

    #[test]
    fn codec_write_roundtrip() -> Result<()> {
        let mut data = [0u8; 10];
        let mut buf = &mut data[..];
        buf.write_u8(0x01)?;
        buf.write_u16(0x0203)?;
        buf.write_u24(0x040506)?;
        buf.write_u32(0x0708090a)?;
        assert_eq!(buf.write_u8(0xff), Err(Error::BufferTooShort));

        let mut buf = &data[..];
        assert_eq!(buf.read_u8()?, 0x01);
        assert_eq!(buf.read_u16()?, 0x0203);
        assert_eq!(buf.read_u24()?, 0x040506);
        assert_eq!(buf.read_u32()?, 0x0708090a);
        Ok(())
    }

    #[test]
    fn codec_write_slice() -> Result<()> {
        let mut data = [0u8; 4];
        let mut buf = &mut data[..];
        buf.write(&[0xde, 0xad])?;
        buf.write(&[0xbe, 0xef])?;
        assert_eq!(buf.write(&[0x00]), Err(Error::BufferTooShort));
        assert_eq!(data, [0xde, 0xad, 0xbe, 0xef]);
        Ok(())
    }
}
