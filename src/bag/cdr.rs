use crate::error::CdrError;

const HEADER_LEN: usize = 4;

/// Reader over a CDR-encapsulated ROS 2 payload.
///
/// Alignment is computed relative to the first byte after the 4-byte
/// encapsulation header, the way rmw serializes messages.
pub struct CdrReader<'a> {
    data: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> CdrReader<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self, CdrError> {
        if payload.len() < HEADER_LEN {
            return Err(CdrError::UnexpectedEof {
                offset: 0,
                needed: HEADER_LEN,
            });
        }
        let little_endian = match (payload[0], payload[1]) {
            (0x00, 0x00) | (0x00, 0x02) => false,
            (0x00, 0x01) | (0x00, 0x03) => true,
            (a, b) => return Err(CdrError::InvalidEncapsulation(a, b)),
        };
        Ok(Self {
            data: &payload[HEADER_LEN..],
            offset: 0,
            little_endian,
        })
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn align(&mut self, size: usize) {
        let rem = self.offset % size;
        if rem != 0 {
            self.offset += size - rem;
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CdrError> {
        if self.offset + len > self.data.len() {
            return Err(CdrError::UnexpectedEof {
                offset: self.offset,
                needed: len,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CdrError> {
        self.align(N);
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CdrError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CdrError> {
        let bytes = self.take_array::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, CdrError> {
        let bytes = self.take_array::<4>()?;
        Ok(if self.little_endian {
            i32::from_le_bytes(bytes)
        } else {
            i32::from_be_bytes(bytes)
        })
    }

    pub fn read_f32(&mut self) -> Result<f32, CdrError> {
        let bytes = self.take_array::<4>()?;
        Ok(if self.little_endian {
            f32::from_le_bytes(bytes)
        } else {
            f32::from_be_bytes(bytes)
        })
    }

    /// Reads a length-prefixed string; the length includes the trailing NUL.
    pub fn read_string(&mut self) -> Result<String, CdrError> {
        let len = self.read_u32()? as usize;
        let start = self.offset;
        let bytes = self.take(len)?;
        let trimmed = match bytes.split_last() {
            Some((0, rest)) => rest,
            _ => bytes,
        };
        std::str::from_utf8(trimmed)
            .map(str::to_owned)
            .map_err(|_| CdrError::InvalidString(start))
    }

    /// Reads a sequence length and checks it against the bytes left, assuming
    /// each element needs at least `min_element_size` bytes.
    pub fn read_sequence_len(&mut self, min_element_size: usize) -> Result<usize, CdrError> {
        let len = self.read_u32()?;
        if (len as usize).saturating_mul(min_element_size) > self.remaining() {
            return Err(CdrError::SequenceTooLong(len));
        }
        Ok(len as usize)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], CdrError> {
        let len = self.read_sequence_len(1)?;
        self.take(len)
    }
}

/// Little-endian CDR writer, used to build bag fixtures.
#[cfg(test)]
pub(crate) struct CdrWriter {
    buf: Vec<u8>,
}

#[cfg(test)]
impl CdrWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![0x00, 0x01, 0x00, 0x00],
        }
    }

    fn align(&mut self, size: usize) {
        while (self.buf.len() - HEADER_LEN) % size != 0 {
            self.buf.push(0);
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.align(4);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.align(4);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.align(4);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.u32(value.len() as u32 + 1);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.u32(value.len() as u32);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_aligned_primitives_after_a_byte() {
        let payload = CdrWriter::new().u8(7).u32(42).f32(0.5).finish();
        let mut reader = CdrReader::new(&payload).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_f32().unwrap(), 0.5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn strings_drop_the_nul_terminator() {
        let payload = CdrWriter::new().string("bgr8").i32(-3).finish();
        let mut reader = CdrReader::new(&payload).unwrap();
        assert_eq!(reader.read_string().unwrap(), "bgr8");
        assert_eq!(reader.read_i32().unwrap(), -3);
    }

    #[test]
    fn big_endian_payloads_decode() {
        let payload = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02];
        let mut reader = CdrReader::new(&payload).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 0x0102);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let payload = [0x00, 0x01, 0x00, 0x00, 0x01, 0x00];
        let mut reader = CdrReader::new(&payload).unwrap();
        assert!(matches!(
            reader.read_u32(),
            Err(CdrError::UnexpectedEof { offset: 0, needed: 4 })
        ));
    }

    #[test]
    fn oversized_sequence_is_rejected() {
        let payload = CdrWriter::new().u32(1_000).finish();
        let mut reader = CdrReader::new(&payload).unwrap();
        assert_eq!(reader.read_bytes(), Err(CdrError::SequenceTooLong(1_000)));
    }

    #[test]
    fn unknown_encapsulation_is_rejected() {
        let payload = [0x01, 0x09, 0x00, 0x00];
        assert!(matches!(
            CdrReader::new(&payload),
            Err(CdrError::InvalidEncapsulation(0x01, 0x09))
        ));
    }
}
