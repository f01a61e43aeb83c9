//! Native byte order, fixed at compile time.

/// Byte order of multi-byte scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// The byte order of the compilation target.
pub const NATIVE_BYTE_ORDER: ByteOrder = if cfg!(target_endian = "little") {
    ByteOrder::Little
} else {
    ByteOrder::Big
};

impl ByteOrder {
    /// Encode a `usize` in this byte order.
    pub const fn encode_usize(self, value: usize) -> [u8; std::mem::size_of::<usize>()] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    /// Decode a `usize` stored in this byte order.
    pub const fn decode_usize(self, bytes: [u8; std::mem::size_of::<usize>()]) -> usize {
        match self {
            Self::Little => usize::from_le_bytes(bytes),
            Self::Big => usize::from_be_bytes(bytes),
        }
    }
}
