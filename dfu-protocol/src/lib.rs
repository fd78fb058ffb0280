// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Peer to bootloader over-the-air update protocol.
//! The peer (phone or host tool) streams an encrypted image; the bootloader is the target.
//!
//! Three packet shapes travel over the link, all little-endian:
//! - control packets, fixed size: `[command:16][length:16][address:32]`
//! - data packets, variable size: `[address:32][payload...]`, or the raw chaining
//!   vector / expected digest when one was announced by a control packet
//! - progress notifications, fixed size: `[code:8][address:32]`

#![no_std]


/// Size of a control packet.
pub const CONTROL_PACKET_SIZE: usize = 8;

/// Size of the address field leading every payload data packet.
pub const ADDRESS_SIZE: usize = 4;

/// Length of a block-cipher chaining vector (one AES block).
pub const IV_LEN: usize = 16;

/// Length of the SHA-256 digest sent after each block of the image.
pub const DIGEST_LEN: usize = 32;

/// Size of an outbound progress notification.
pub const PROGRESS_SIZE: usize = 5;

/// Commands carried by control packets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Command {
    /// Reset the update session and renegotiate connection parameters
    Restart = 1,
    /// `length` bytes of ciphertext for `address` follow on the data channel
    Data = 2,
    /// The next `length` bytes on the data channel are a chaining vector
    Iv = 3,
    /// All data sent; confirm the image if it verified
    Done = 4,
    /// Restart the device once the connection closes
    Reset = 5,
    /// A digest covering `length` bytes at `address` follows on the data channel
    Digest = 6,
    /// Progress poll
    Ping = 7,
}

impl Command {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Restart),
            2 => Some(Self::Data),
            3 => Some(Self::Iv),
            4 => Some(Self::Done),
            5 => Some(Self::Reset),
            6 => Some(Self::Digest),
            7 => Some(Self::Ping),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Fixed size command packet written to the control characteristic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlPacket {
    pub command: Command,
    pub length: u16,
    pub address: u32,
}

impl ControlPacket {
    pub fn new(command: Command, length: u16, address: u32) -> Self {
        Self {
            command,
            length,
            address,
        }
    }

    pub fn decode(packet: &[u8]) -> Result<Self, Error> {
        let packet: &[u8; CONTROL_PACKET_SIZE] = packet.try_into().map_err(|_| Error::WrongLength {
            expected: CONTROL_PACKET_SIZE,
            actual: packet.len(),
        })?;
        let code = u16::from_le_bytes([packet[0], packet[1]]);
        let command = Command::from_code(code).ok_or(Error::UnknownCommand(code))?;
        Ok(Self {
            command,
            length: u16::from_le_bytes([packet[2], packet[3]]),
            address: u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]),
        })
    }

    pub fn encode(&self) -> [u8; CONTROL_PACKET_SIZE] {
        let mut buf = [0; CONTROL_PACKET_SIZE];
        buf[..2].copy_from_slice(&self.command.code().to_le_bytes());
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..].copy_from_slice(&self.address.to_le_bytes());
        buf
    }
}

/// Image payload carried by a data packet, tagged with the address of its first byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadPacket<'a> {
    pub address: u32,
    pub payload: &'a [u8],
}

impl<'a> PayloadPacket<'a> {
    /// Split a data packet into its address field and payload.
    ///
    /// A packet without at least one payload byte is rejected.
    pub fn decode(packet: &'a [u8]) -> Result<Self, Error> {
        if packet.len() <= ADDRESS_SIZE {
            return Err(Error::TooShort {
                minimum: ADDRESS_SIZE + 1,
                actual: packet.len(),
            });
        }
        let (address, payload) = packet.split_at(ADDRESS_SIZE);
        Ok(Self {
            address: u32::from_le_bytes([address[0], address[1], address[2], address[3]]),
            payload,
        })
    }

    /// Write the packet into `buf`, returning the number of bytes used.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = ADDRESS_SIZE + self.payload.len();
        if buf.len() < len {
            return Err(Error::BufferTooSmall);
        }
        buf[..ADDRESS_SIZE].copy_from_slice(&self.address.to_le_bytes());
        buf[ADDRESS_SIZE..len].copy_from_slice(self.payload);
        Ok(len)
    }
}

/// Outbound notification on the progress characteristic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// A packet was missed, resume sending at `address`
    Resync { address: u32 },
    /// The digest of the range starting at `address` did not match
    DigestFailed { address: u32 },
}

impl Progress {
    const RESYNC: u8 = 1;
    const DIGEST_FAILED: u8 = 2;

    pub fn encode(&self) -> [u8; PROGRESS_SIZE] {
        let (code, address) = match *self {
            Self::Resync { address } => (Self::RESYNC, address),
            Self::DigestFailed { address } => (Self::DIGEST_FAILED, address),
        };
        let mut buf = [0; PROGRESS_SIZE];
        buf[0] = code;
        buf[1..].copy_from_slice(&address.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let buf: &[u8; PROGRESS_SIZE] = buf.try_into().map_err(|_| Error::WrongLength {
            expected: PROGRESS_SIZE,
            actual: buf.len(),
        })?;
        let address = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        match buf[0] {
            Self::RESYNC => Ok(Self::Resync { address }),
            Self::DIGEST_FAILED => Ok(Self::DigestFailed { address }),
            code => Err(Error::UnknownProgress(code)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    WrongLength { expected: usize, actual: usize },
    TooShort { minimum: usize, actual: usize },
    TooLong { maximum: usize, actual: usize },
    UnknownCommand(u16),
    UnknownProgress(u8),
    BufferTooSmall,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "packet should be {expected} bytes, but is {actual}")
            }
            Self::TooShort { minimum, actual } => {
                write!(f, "packet should be at least {minimum} bytes, but is {actual}")
            }
            Self::TooLong { maximum, actual } => {
                write!(f, "packet should be at most {maximum} bytes, but is {actual}")
            }
            Self::UnknownCommand(code) => write!(f, "unknown command {code:#06x}"),
            Self::UnknownProgress(code) => write!(f, "unknown progress code {code}"),
            Self::BufferTooSmall => write!(f, "buffer too small for serialization"),
        }
    }
}
