use thiserror::Error;

pub type Result<T> = std::result::Result<T, BinaryError>;

/// Structural failures inside one module; the parser surfaces them as a
/// single malformed-artifact result for the whole file.
#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("truncated data at offset {0}")]
    Truncated(usize),

    #[error("{0}")]
    Invalid(String),

    #[error("unknown IL opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u16, offset: usize },

    #[error("unmapped rva 0x{0:08X}")]
    UnmappedRva(u32),
}

impl BinaryError {
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        BinaryError::Invalid(reason.into())
    }
}
