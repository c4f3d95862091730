use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        index::MemIdx,
        instr::Expression,
    },
    std::sync::Arc,
};

/// A data segment as declared by a module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Data {
    pub init: Arc<[u8]>,
    pub mode: DataMode,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataMode {
    Passive,
    Active { mem: MemIdx, offset: Expression },
}

impl Decode for Data {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let mode = match decoder.read_u32()? {
            0 => DataMode::Active {
                mem: MemIdx::new(0),
                offset: decoder.decode()?,
            },
            1 => DataMode::Passive,
            2 => DataMode::Active {
                mem: decoder.decode()?,
                offset: decoder.decode()?,
            },
            _ => return Err(ParseError::InvalidTag),
        };
        let len = decoder.read_size()? as usize;
        let init = decoder.read_bytes(len)?.into();
        Ok(Self { init, mode })
    }
}

/// A data instance: the bytes of a segment, until it is dropped.
#[derive(Debug)]
pub struct DataInst {
    bytes: Option<Arc<[u8]>>,
}

impl DataInst {
    pub(crate) fn new(bytes: Arc<[u8]>) -> Self {
        Self { bytes: Some(bytes) }
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    pub(crate) fn drop_bytes(&mut self) {
        self.bytes = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_segments_are_empty() {
        let bytes = [0x01, 0x03, b'a', b'b', b'c'];
        let data = Data::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(data.mode, DataMode::Passive);
        let mut inst = DataInst::new(data.init);
        assert_eq!(inst.bytes(), b"abc");
        inst.drop_bytes();
        assert!(inst.bytes().is_empty());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = [0x01, 0x05, b'a'];
        assert!(Data::decode(&mut Decoder::new(&bytes)).is_err());
    }
}
