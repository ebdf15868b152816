//! Chunked binary streams.
//!
//! A chunk is a header followed by its payload:
//!
//! ```text
//! u16 BE   name length in bytes
//! [u8]     name, UTF-8
//! i32 BE   payload length in bytes
//! [u8]     payload (primitives and nested chunks)
//! ```
//!
//! Integers inside a payload use a variable-length encoding. The first byte
//! holds a continuation flag (bit 0), the sign (bit 1) and the low 6
//! magnitude bits; each following byte holds a continuation flag and 7 more
//! magnitude bits. Floats are 32-bit big-endian.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{BspError, Result};

/// Writes chunks to an underlying stream.
///
/// Chunk lengths are only known when a chunk ends, so the whole top-level
/// chunk is buffered and written out in one go once it is closed.
#[derive(Debug)]
pub struct ChunkWriter<W: Write> {
    inner: W,
    data: Vec<u8>,
    open: Vec<(String, usize)>,
}

impl<W: Write> ChunkWriter<W> {
    /// Creates a writer on top of `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            data: Vec::new(),
            open: Vec::new(),
        }
    }

    /// Starts a (possibly nested) chunk.
    pub fn begin_chunk(&mut self, name: &str) -> Result<()> {
        write_utf(&mut self.data, name)?;
        self.data.write_i32::<BigEndian>(0)?;
        self.open.push((name.to_owned(), self.data.len()));
        Ok(())
    }

    /// Ends the innermost open chunk, patching its length.
    ///
    /// Closing a top-level chunk flushes it to the underlying stream.
    pub fn end_chunk(&mut self) -> Result<()> {
        let (name, begin) = self.open.pop().ok_or(BspError::UnpairedEndChunk)?;
        let size = self.data.len() - begin;
        let length = i32::try_from(size).map_err(|_| BspError::InvalidChunkLength {
            name,
            length: i32::MAX,
        })?;
        BigEndian::write_i32(&mut self.data[begin - 4..begin], length);

        if self.open.is_empty() {
            self.inner.write_all(&self.data)?;
            self.data.clear();
        }
        Ok(())
    }

    /// Writes a variable-length integer.
    pub fn write_int(&mut self, value: i32) -> Result<()> {
        write_var_int(&mut self.data, value)?;
        Ok(())
    }

    /// Writes a big-endian float.
    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.data.write_f32::<BigEndian>(value)?;
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        write_utf(&mut self.data, value)
    }

    /// Writes a single raw byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.data.write_u8(value)?;
        Ok(())
    }

    /// Returns the number of buffered, not yet flushed bytes.
    pub fn buffered(&self) -> usize {
        self.data.len()
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Returns the underlying stream.
    ///
    /// Data of chunks that are still open is discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads chunks from an underlying stream.
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    inner: CountingReader<R>,
    open: Vec<(String, u64)>,
}

impl<R: Read> ChunkReader<R> {
    /// Creates a reader on top of `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner: CountingReader {
                inner,
                position: 0,
            },
            open: Vec::new(),
        }
    }

    /// Returns the number of bytes consumed so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.inner.position
    }

    /// Reads a chunk header and returns the chunk name.
    pub fn begin_chunk(&mut self) -> Result<String> {
        let name = self.read_utf()?;
        let length = self.inner.read_i32::<BigEndian>()?;
        self.check_bounds()?;
        if length < 0 {
            return Err(BspError::InvalidChunkLength { name, length });
        }

        let end = self.position() + length as u64;
        self.open.push((name.clone(), end));
        Ok(name)
    }

    /// Reads a chunk header, failing unless the chunk is called `expected`.
    pub fn expect_chunk(&mut self, expected: &str) -> Result<()> {
        let found = self.begin_chunk()?;
        if found != expected {
            return Err(BspError::UnexpectedChunk {
                expected: expected.to_owned(),
                found,
            });
        }
        Ok(())
    }

    /// Ends the innermost chunk, skipping whatever was left unread.
    pub fn end_chunk(&mut self) -> Result<()> {
        let (name, end) = self.open.pop().ok_or(BspError::UnpairedEndChunk)?;
        let position = self.position();
        if position > end {
            return Err(BspError::ChunkOverflow(name));
        }

        let left = end - position;
        if left > 0 {
            let skipped = io::copy(&mut (&mut self.inner).take(left), &mut io::sink())?;
            if skipped != left {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
        }
        Ok(())
    }

    /// Reads a variable-length integer.
    pub fn read_int(&mut self) -> Result<i32> {
        let value = read_var_int(&mut self.inner)?;
        self.check_bounds()?;
        Ok(value)
    }

    /// Reads a big-endian float.
    pub fn read_float(&mut self) -> Result<f32> {
        let value = self.inner.read_f32::<BigEndian>()?;
        self.check_bounds()?;
        Ok(value)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let value = self.read_utf()?;
        self.check_bounds()?;
        Ok(value)
    }

    /// Reads a single raw byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let value = self.inner.read_u8()?;
        self.check_bounds()?;
        Ok(value)
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner.inner
    }

    fn read_utf(&mut self) -> Result<String> {
        let len = self.inner.read_u16::<BigEndian>()? as usize;
        let mut bytes = vec![0; len];
        self.inner.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| BspError::InvalidString("not valid UTF-8"))
    }

    fn check_bounds(&self) -> Result<()> {
        match self.open.last() {
            Some((name, end)) if self.position() > *end => {
                Err(BspError::ChunkOverflow(name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Counts the bytes read through it.
#[derive(Debug)]
struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

fn write_utf(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| BspError::InvalidString("too long"))?;
    out.write_u16::<BigEndian>(len)?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Encodes `value` with the variable-length integer codec.
pub fn write_var_int<W: Write>(out: &mut W, value: i32) -> io::Result<()> {
    let mut magnitude = value.unsigned_abs();
    let sign = if value < 0 { 2 } else { 0 };

    let mut byte = ((magnitude & 0x3f) << 2) as u8 | sign;
    magnitude >>= 6;
    if magnitude != 0 {
        byte |= 1;
    }
    out.write_u8(byte)?;

    while magnitude != 0 {
        let mut byte = ((magnitude & 0x7f) << 1) as u8;
        magnitude >>= 7;
        if magnitude != 0 {
            byte |= 1;
        }
        out.write_u8(byte)?;
    }
    Ok(())
}

/// Decodes a value written by [`write_var_int`].
pub fn read_var_int<R: Read>(input: &mut R) -> Result<i32> {
    let mut byte = input.read_u8()?;
    let negative = byte & 2 != 0;
    let mut magnitude = u64::from(byte >> 2);
    let mut shift = 6;

    while byte & 1 != 0 {
        // 6 + 4 * 7 bits already cover every i32
        if shift >= 34 {
            return Err(BspError::VarIntOverflow);
        }
        byte = input.read_u8()?;
        magnitude |= u64::from(byte >> 1) << shift;
        shift += 7;
    }

    let value = if negative {
        -(magnitude as i64)
    } else {
        magnitude as i64
    };
    i32::try_from(value).map_err(|_| BspError::VarIntOverflow)
}
