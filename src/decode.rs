use {std::str, thiserror::Error};

/// An error that can occur when parsing a [`Module`](crate::Module).
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unknown instruction")]
    UnknownInstruction,
    #[error("expected a floating point immediate")]
    ExpectedFloatingImmediate,
    #[error("expected an index")]
    ExpectedIndex,
    #[error("expected a kind tag")]
    ExpectedKindTag,
    #[error("expected a signed immediate")]
    ExpectedSignedImmediate,
    #[error("expected a size")]
    ExpectedSize,
    #[error("expected a value or a terminator")]
    ExpectedValueOrTerminator,
    #[error("invalid immediate")]
    InvalidImmediate,
    #[error("invalid index")]
    InvalidIndex,
    #[error("invalid input")]
    InvalidInput,
    #[error("invalid module magic")]
    InvalidModuleMagic,
    #[error("invalid module version")]
    InvalidModuleVersion,
    #[error("invalid size")]
    InvalidSize,
    #[error("invalid tag")]
    InvalidTag,
    #[error("invalid type")]
    InvalidType,
    #[error("requested allocation is too large")]
    HugeAllocationRequested,
    #[error("out of memory")]
    OutOfMemory,
    #[error("section size mismatch")]
    SectionSizeMismatch,
    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,
    #[error("duplicate section")]
    DuplicateSection,
    #[error("section out of order")]
    SectionOutOfOrder,
}

/// A cursor over a byte slice that knows the Wasm binary encoding primitives.
///
/// A decoder never reads past the end of its slice, so a section decoder obtained from
/// [`Decoder::decoder`] cannot read past its declared boundary.
#[derive(Clone, Debug)]
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.position == self.bytes.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Maps a failed read to `error` if the failure left the decoder exactly at its end.
    ///
    /// Reads that fail before the end are malformed encodings rather than truncations,
    /// and are reported as [`ParseError::InvalidInput`].
    pub(crate) fn with_eof_check(&self, error: ParseError) -> ParseError {
        if self.is_at_end() {
            error
        } else {
            ParseError::InvalidInput
        }
    }

    /// Applies [`with_eof_check`](Self::with_eof_check) to a read that ran out of input.
    /// Malformed encodings keep their own error.
    fn truncated(&self, cause: ParseError, error: ParseError) -> ParseError {
        match cause {
            ParseError::UnexpectedEof => self.with_eof_check(error),
            cause => cause,
        }
    }

    pub(crate) fn decode<T>(&mut self) -> Result<T, ParseError>
    where
        T: Decode,
    {
        T::decode(self)
    }

    /// Splits off the next `len` bytes as a decoder of their own.
    pub(crate) fn decoder(&mut self, len: usize) -> Result<Decoder<'a>, ParseError> {
        Ok(Decoder::new(self.read_bytes(len)?))
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, ParseError> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or(ParseError::UnexpectedEof)?;
        self.position += 1;
        Ok(byte)
    }

    pub(crate) fn peek_byte(&self) -> Result<u8, ParseError> {
        self.bytes
            .get(self.position)
            .copied()
            .ok_or(ParseError::UnexpectedEof)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if len > self.remaining() {
            self.position = self.bytes.len();
            return Err(ParseError::UnexpectedEof);
        }
        let bytes = &self.bytes[self.position..][..len];
        self.position += len;
        Ok(bytes)
    }

    pub(crate) fn read_bytes_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub(crate) fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.bytes[self.position..];
        self.position = self.bytes.len();
        bytes
    }

    /// Reads an unsigned LEB128 integer of at most `bits` bits.
    fn read_unsigned(&mut self, bits: u32) -> Result<u64, ParseError> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= u64::from(byte & 0x7F) << shift;
            shift += 7;
            if shift >= bits {
                if byte & 0x80 != 0 {
                    return Err(ParseError::InvalidInput);
                }
                let value_bits = bits - (shift - 7);
                if value_bits < 7 && byte >> value_bits != 0 {
                    return Err(ParseError::InvalidInput);
                }
                return Ok(result);
            }
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Reads a signed LEB128 integer of at most `bits` bits, sign extended to 64 bits.
    fn read_signed(&mut self, bits: u32) -> Result<i64, ParseError> {
        let mut result = 0i128;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= i128::from(byte & 0x7F) << shift;
            shift += 7;
            if shift >= bits {
                if byte & 0x80 != 0 {
                    return Err(ParseError::InvalidInput);
                }
                // The bits past the sign bit must all repeat it.
                let value_bits = bits - (shift - 7);
                let mask = (0x7F >> (value_bits - 1)) << (value_bits - 1);
                let extension = byte & mask;
                if extension != 0 && extension != mask {
                    return Err(ParseError::InvalidInput);
                }
                break;
            }
            if byte & 0x80 == 0 {
                break;
            }
        }
        if result & (1 << (shift - 1)) != 0 {
            result |= -1i128 << shift;
        }
        Ok(result as i64)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        Ok(self.read_unsigned(32)? as u32)
    }

    pub(crate) fn read_s33(&mut self) -> Result<i64, ParseError> {
        self.read_signed(33)
    }

    pub(crate) fn read_index(&mut self) -> Result<u32, ParseError> {
        self.read_u32()
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedIndex))
    }

    pub(crate) fn read_size(&mut self) -> Result<u32, ParseError> {
        self.read_u32()
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedSize))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, ParseError> {
        self.read_signed(32)
            .map(|value| value as i32)
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedSignedImmediate))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, ParseError> {
        self.read_signed(64)
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedSignedImmediate))
    }

    pub(crate) fn read_f32_bits(&mut self) -> Result<u32, ParseError> {
        self.read_bytes_array()
            .map(u32::from_le_bytes)
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedFloatingImmediate))
    }

    pub(crate) fn read_f64_bits(&mut self) -> Result<u64, ParseError> {
        self.read_bytes_array()
            .map(u64::from_le_bytes)
            .map_err(|cause| self.truncated(cause, ParseError::ExpectedFloatingImmediate))
    }

    /// Reads a UTF-8 name. Overlong encodings and surrogates are rejected.
    pub(crate) fn read_name(&mut self) -> Result<String, ParseError> {
        let len = self.read_size()? as usize;
        let bytes = self.read_bytes(len)?;
        str::from_utf8(bytes)
            .map(|name| name.to_owned())
            .map_err(|_| ParseError::InvalidUtf8)
    }

    /// Reads a vector, decoding each element with `decode_elem`.
    pub(crate) fn read_vec<T>(
        &mut self,
        mut decode_elem: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let count = self.read_size()? as usize;
        // Every element takes at least one byte.
        if count > self.remaining() {
            return Err(ParseError::HugeAllocationRequested);
        }
        let mut elems = Vec::new();
        elems
            .try_reserve_exact(count)
            .map_err(|_| ParseError::OutOfMemory)?;
        for _ in 0..count {
            elems.push(decode_elem(self)?);
        }
        Ok(elems)
    }

    pub(crate) fn decode_vec<T>(&mut self) -> Result<Vec<T>, ParseError>
    where
        T: Decode,
    {
        self.read_vec(T::decode)
    }
}

pub(crate) trait Decode: Sized {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError>;
}

impl Decode for String {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        decoder.read_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_unsigned_leb128() {
        let mut decoder = Decoder::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(decoder.read_u32(), Ok(624_485));
        assert!(decoder.is_at_end());
        let mut decoder = Decoder::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(decoder.read_u32(), Ok(u32::MAX));
    }

    #[test]
    fn rejects_unsigned_leb128_with_unused_bits() {
        let mut decoder = Decoder::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(decoder.read_u32(), Err(ParseError::InvalidInput));
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(decoder.read_u32(), Err(ParseError::InvalidInput));
    }

    #[test]
    fn reads_signed_leb128() {
        assert_eq!(Decoder::new(&[0x7F]).read_i32(), Ok(-1));
        assert_eq!(Decoder::new(&[0xC0, 0xBB, 0x78]).read_i32(), Ok(-123_456));
        assert_eq!(
            Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x78]).read_i32(),
            Ok(i32::MIN)
        );
        assert_eq!(
            Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7F])
                .read_i64(),
            Ok(i64::MIN)
        );
        assert_eq!(Decoder::new(&[0x40]).read_s33(), Ok(-64));
    }

    #[test]
    fn rejects_signed_leb128_with_bad_sign_extension() {
        assert_eq!(
            Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x70]).read_i32(),
            Err(ParseError::InvalidInput)
        );
        assert_eq!(
            Decoder::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).read_i32(),
            Err(ParseError::InvalidInput)
        );
    }

    #[test]
    fn truncated_index_is_expected_index() {
        let mut decoder = Decoder::new(&[0x80]);
        assert_eq!(decoder.read_index(), Err(ParseError::ExpectedIndex));
        let mut decoder = Decoder::new(&[]);
        assert_eq!(decoder.read_index(), Err(ParseError::ExpectedIndex));
    }

    #[test]
    fn overlong_index_is_invalid_input() {
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00]);
        assert_eq!(decoder.read_index(), Err(ParseError::InvalidInput));
    }

    #[test]
    fn malformed_leb128_at_end_of_input_is_invalid_input() {
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x10]);
        assert_eq!(decoder.read_index(), Err(ParseError::InvalidInput));
        assert!(decoder.is_at_end());
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x10]);
        assert_eq!(decoder.read_size(), Err(ParseError::InvalidInput));
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02]);
        assert_eq!(decoder.read_i64(), Err(ParseError::InvalidInput));
        let mut decoder = Decoder::new(&[0x00, 0x00]);
        assert_eq!(decoder.read_f32_bits(), Err(ParseError::ExpectedFloatingImmediate));
    }

    #[test]
    fn names_are_strict_utf8() {
        assert_eq!(
            Decoder::new(&[0x03, b'a', b'b', b'c']).read_name(),
            Ok("abc".to_owned())
        );
        // Overlong NUL.
        assert_eq!(
            Decoder::new(&[0x02, 0xC0, 0x80]).read_name(),
            Err(ParseError::InvalidUtf8)
        );
        // U+D800 encoded directly.
        assert_eq!(
            Decoder::new(&[0x03, 0xED, 0xA0, 0x80]).read_name(),
            Err(ParseError::InvalidUtf8)
        );
    }

    #[test]
    fn huge_vectors_are_rejected_before_allocating() {
        let mut decoder = Decoder::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x00]);
        assert_eq!(
            decoder.read_vec(|decoder| decoder.read_byte()),
            Err(ParseError::HugeAllocationRequested)
        );
    }
}
