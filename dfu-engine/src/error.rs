// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::fmt;
use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// Reason a packet was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The packet could not be decoded
    Protocol(dfu_protocol::Error),
    /// Another transfer, chaining vector or digest is still pending
    Busy,
    /// Transfer would land outside the application region
    AddressOutOfRange { address: u32, length: u32 },
    /// Transfer or digest requested over zero bytes, or a digest at address zero
    EmptyRange,
    BadChainVectorLength { expected: usize, actual: usize },
    BadDigestLength { expected: usize, actual: usize },
    /// Payload packet without an active transfer
    NoTransfer,
    /// Payload would run past the end of the declared transfer
    Overrun { end: u32, limit: u32 },
    /// Transfer address or length is not a whole number of cipher blocks
    Unaligned { address: u32, length: u32 },
    DigestMismatch { address: u32 },
    /// `DONE` without a successful digest check of the last transfer
    Unverified,
    /// The boot-state record holds neither the provisional nor the confirmed tag
    BootRecord { tag: u32 },
    /// A fatal error was seen earlier; nothing more is accepted
    Halted,
    /// The erase unit of the flash driver does not match the engine buffer
    EraseUnit { expected: usize, actual: usize },
    Flash(FlashError),
}

impl Error {
    /// Fatal errors mean the image in storage is not what the bootloader expects.
    /// The engine refuses every later packet once one has been returned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::BootRecord { .. } | Error::EraseUnit { .. })
    }
}

impl From<dfu_protocol::Error> for Error {
    fn from(e: dfu_protocol::Error) -> Self {
        Error::Protocol(e)
    }
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        Error::Flash(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "malformed packet: {e}"),
            Error::Busy => write!(f, "previous command not complete"),
            Error::AddressOutOfRange { address, length } => {
                write!(f, "{length} bytes at {address:#x} fall outside the application region")
            }
            Error::EmptyRange => write!(f, "command without data block"),
            Error::BadChainVectorLength { expected, actual } => {
                write!(f, "chaining vector should be {expected} bytes, got {actual}")
            }
            Error::BadDigestLength { expected, actual } => {
                write!(f, "digest should be {expected} bytes, got {actual}")
            }
            Error::NoTransfer => write!(f, "no data transfer in progress"),
            Error::Overrun { end, limit } => {
                write!(f, "payload ends at {end:#x}, transfer ends at {limit:#x}")
            }
            Error::Unaligned { address, length } => {
                write!(f, "transfer of {length} bytes at {address:#x} is not block aligned")
            }
            Error::DigestMismatch { address } => write!(f, "digest mismatch for block at {address:#x}"),
            Error::Unverified => write!(f, "image not verified"),
            Error::BootRecord { tag } => write!(f, "unexpected boot record tag {tag:#010x}"),
            Error::Halted => write!(f, "update halted after a fatal error"),
            Error::EraseUnit { expected, actual } => {
                write!(f, "erase unit is {actual} bytes, buffer is {expected}")
            }
            Error::Flash(e) => write!(f, "flash error: {e}"),
        }
    }
}

/// Flash driver failure, reduced to the kinds the NOR flash traits expose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    NotAligned,
    OutOfBounds,
    Other,
}

impl FlashError {
    pub fn from_driver<E: NorFlashError>(e: E) -> Self {
        match e.kind() {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
            _ => FlashError::Other,
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::NotAligned => write!(f, "not aligned"),
            FlashError::OutOfBounds => write!(f, "out of bounds"),
            FlashError::Other => write!(f, "driver error"),
        }
    }
}
