use byteorder::{ByteOrder, LittleEndian};

/// An opaque row payload. On the wire a tuple is a 4-byte length prefix
/// followed by the payload bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self { data: data.to_vec() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the serialized form: length prefix plus payload.
    pub fn serialized_size(&self) -> usize {
        4 + self.data.len()
    }

    /// Write the length-prefixed form into `buf`, returning the bytes written.
    pub fn serialize_to(&self, buf: &mut [u8]) -> usize {
        LittleEndian::write_u32(&mut buf[0..4], self.data.len() as u32);
        buf[4..4 + self.data.len()].copy_from_slice(&self.data);
        self.serialized_size()
    }

    /// Read a length-prefixed tuple from `buf`. Returns `None` when the
    /// buffer is too short to contain the declared payload.
    pub fn deserialize_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < 4 {
            return None;
        }
        let len = LittleEndian::read_u32(&buf[0..4]) as usize;
        if buf.len() < 4 + len {
            return None;
        }
        Some(Self {
            data: buf[4..4 + len].to_vec(),
        })
    }
}
