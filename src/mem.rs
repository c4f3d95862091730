use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        limits::Limits,
        trap::Trap,
    },
    std::{fmt, ops::Range},
};

/// The size of a Wasm page in bytes.
pub const PAGE_SIZE: usize = 65_536;

/// The largest number of pages a 32-bit memory can have.
pub const MAX_PAGES: u32 = 65_536;

/// The type of a memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MemType {
    pub limits: Limits,
}

impl MemType {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self {
            limits: Limits { min, max },
        }
    }

    pub fn is_valid(self) -> bool {
        self.limits.is_valid(MAX_PAGES)
    }
}

impl Decode for MemType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            limits: decoder.decode()?,
        })
    }
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.limits.fmt(f)
    }
}

/// A memory instance in a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct MemInst {
    type_: MemType,
    bytes: Vec<u8>,
}

impl MemInst {
    pub(crate) fn new(type_: MemType) -> Self {
        Self {
            type_,
            bytes: vec![0; type_.limits.min as usize * PAGE_SIZE],
        }
    }

    /// Returns the current type of this memory. Its minimum is the current size in pages.
    pub fn type_(&self) -> MemType {
        MemType {
            limits: Limits {
                min: self.size(),
                max: self.type_.limits.max,
            },
        }
    }

    /// Returns the size of this memory in pages.
    pub fn size(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Grows this memory by `count` pages.
    ///
    /// Returns the previous size in pages, or `None` if the memory cannot grow that much.
    pub fn grow(&mut self, count: u32) -> Option<u32> {
        let old_size = self.size();
        let new_size = old_size.checked_add(count)?;
        if new_size > self.type_.limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES) {
            return None;
        }
        let additional = count as usize * PAGE_SIZE;
        self.bytes.try_reserve_exact(additional).ok()?;
        self.bytes.resize(new_size as usize * PAGE_SIZE, 0);
        Some(old_size)
    }

    /// Copies bytes starting at `offset` into `buf`.
    ///
    /// # Errors
    ///
    /// If the range is out of bounds.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), Trap> {
        let range = self.range(offset, buf.len() as u64)?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    /// Copies `buf` into this memory starting at `offset`.
    ///
    /// # Errors
    ///
    /// If the range is out of bounds.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<(), Trap> {
        let range = self.range(offset, buf.len() as u64)?;
        self.bytes[range].copy_from_slice(buf);
        Ok(())
    }

    /// Returns `len` bytes of this memory starting at `offset`.
    ///
    /// # Errors
    ///
    /// If the range is out of bounds.
    pub fn slice_mut(&mut self, offset: u64, len: u64) -> Result<&mut [u8], Trap> {
        let range = self.range(offset, len)?;
        Ok(&mut self.bytes[range])
    }

    #[inline]
    pub(crate) fn load<const N: usize>(&self, addr: u32, offset: u32) -> Result<[u8; N], Trap> {
        let range = self.range(u64::from(addr) + u64::from(offset), N as u64)?;
        let mut bytes = [0; N];
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(bytes)
    }

    #[inline]
    pub(crate) fn store<const N: usize>(&mut self, addr: u32, offset: u32, bytes: [u8; N]) -> Result<(), Trap> {
        let range = self.range(u64::from(addr) + u64::from(offset), N as u64)?;
        self.bytes[range].copy_from_slice(&bytes);
        Ok(())
    }

    pub(crate) fn fill(&mut self, dst: u32, val: u8, count: u32) -> Result<(), Trap> {
        let range = self.range(u64::from(dst), u64::from(count))?;
        self.bytes[range].fill(val);
        Ok(())
    }

    pub(crate) fn copy_within(&mut self, dst: u32, src: u32, count: u32) -> Result<(), Trap> {
        let dst_range = self.range(u64::from(dst), u64::from(count))?;
        let src_range = self.range(u64::from(src), u64::from(count))?;
        self.bytes.copy_within(src_range, dst_range.start);
        Ok(())
    }

    /// Copies `count` bytes from `src_bytes` at `src` into this memory at `dst`.
    pub(crate) fn init(&mut self, dst: u32, src_bytes: &[u8], src: u32, count: u32) -> Result<(), Trap> {
        let dst_range = self.range(u64::from(dst), u64::from(count))?;
        let src_end = u64::from(src) + u64::from(count);
        if src_end > src_bytes.len() as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        self.bytes[dst_range].copy_from_slice(&src_bytes[src as usize..src_end as usize]);
        Ok(())
    }

    fn range(&self, start: u64, len: u64) -> Result<Range<usize>, Trap> {
        let end = start.checked_add(len).ok_or(Trap::MemoryOutOfBounds)?;
        if end > self.bytes.len() as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(start as usize..end as usize)
    }
}
