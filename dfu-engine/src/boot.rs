// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot-state record found at the start of every loadable image, and the
//! decision the bootloader takes from it at reset.

use embedded_storage_async::nor_flash::NorFlash;

use crate::error::{Error, FlashError};

/// Size of the serialized record.
pub const RECORD_SIZE: usize = 36;

/// Offset of the type tag within the record.
pub const TAG_OFFSET: u32 = 16;

/// Image written by the updater but not verified yet.
pub const TAG_PROVISIONAL: u32 = 0xFFFF_FFA7;
/// Image verified and allowed to run. Differs from [`TAG_PROVISIONAL`] only in
/// bits that NOR programming can clear.
pub const TAG_CONFIRMED: u32 = 0xF765_FFA7;
/// Record of the bootloader itself.
pub const TAG_BOOTLOADER: u32 = 0x0000_0BA7;

/// Key the application leaves in retained RAM before a soft reset to ask for update mode.
pub const UPDATE_REQUEST_KEY: [u8; 16] = [
    0xCE, 0x8D, 0xC1, 0x1F, 0x37, 0x7B, 0xB1, 0x9A, 0x79, 0xF5, 0xE1, 0x44, 0x8C, 0xC9, 0xAD, 0x57,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordTag {
    Provisional,
    Confirmed,
    Bootloader,
    Unknown(u32),
}

impl From<u32> for RecordTag {
    fn from(tag: u32) -> Self {
        match tag {
            TAG_PROVISIONAL => RecordTag::Provisional,
            TAG_CONFIRMED => RecordTag::Confirmed,
            TAG_BOOTLOADER => RecordTag::Bootloader,
            other => RecordTag::Unknown(other),
        }
    }
}

/// Little-endian layout:
///
/// | offset | field          |
/// |--------|----------------|
/// | 0      | stack top      |
/// | 4      | reset vector   |
/// | 8      | NMI handler    |
/// | 12     | hard fault     |
/// | 16     | type tag       |
/// | 20     | vector table   |
/// | 24     | timestamp      |
/// | 28     | app version    |
/// | 32     | record size    |
/// | 33     | reserved (3)   |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootRecord {
    pub stack_top: u32,
    pub reset_vector: u32,
    pub nmi: u32,
    pub hard_fault: u32,
    pub tag: u32,
    pub vector_table: u32,
    pub timestamp: u32,
    pub app_version: u32,
    pub size: u8,
}

impl BootRecord {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..RECORD_SIZE)?;
        let word = |offset: usize| {
            u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
        };
        Some(Self {
            stack_top: word(0),
            reset_vector: word(4),
            nmi: word(8),
            hard_fault: word(12),
            tag: word(16),
            vector_table: word(20),
            timestamp: word(24),
            app_version: word(28),
            size: bytes[32],
        })
    }

    pub fn serialize(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0; RECORD_SIZE];
        let fields = [
            self.stack_top,
            self.reset_vector,
            self.nmi,
            self.hard_fault,
            self.tag,
            self.vector_table,
            self.timestamp,
            self.app_version,
        ];
        for (chunk, field) in buf.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        buf[32] = self.size;
        buf
    }

    pub fn tag(&self) -> RecordTag {
        self.tag.into()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootTarget {
    Application(BootRecord),
    Update,
}

/// Whether the application asked for update mode before resetting.
/// A power-on reset leaves retained RAM undefined, so it never counts.
pub fn update_requested(power_on_reset: bool, retained: &[u8; 16]) -> bool {
    !power_on_reset && *retained == UPDATE_REQUEST_KEY
}

/// Run the application only if its record is confirmed and no update was asked for.
pub fn select(record: Option<BootRecord>, update_requested: bool) -> BootTarget {
    match record {
        Some(record) if !update_requested && record.tag() == RecordTag::Confirmed => BootTarget::Application(record),
        _ => BootTarget::Update,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Confirmation {
    Confirmed,
    AlreadyConfirmed,
}

/// Flip the record at `record_address` from provisional to confirmed.
///
/// The tag word is the only thing written. Any tag other than the two image
/// tags is an error the caller must treat as fatal.
pub async fn confirm<F: NorFlash>(flash: &mut F, record_address: u32) -> Result<Confirmation, Error> {
    let tag_address = record_address + TAG_OFFSET;
    match read_tag(flash, tag_address).await? {
        TAG_CONFIRMED => Ok(Confirmation::AlreadyConfirmed),
        TAG_PROVISIONAL => {
            flash
                .write(tag_address, &TAG_CONFIRMED.to_le_bytes())
                .await
                .map_err(FlashError::from_driver)?;
            match read_tag(flash, tag_address).await? {
                TAG_CONFIRMED => Ok(Confirmation::Confirmed),
                tag => Err(Error::BootRecord { tag }),
            }
        }
        tag => Err(Error::BootRecord { tag }),
    }
}

async fn read_tag<F: NorFlash>(flash: &mut F, address: u32) -> Result<u32, Error> {
    let mut tag = [0; 4];
    flash.read(address, &mut tag).await.map_err(FlashError::from_driver)?;
    Ok(u32::from_le_bytes(tag))
}
