// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use dfu_protocol::DIGEST_LEN;
use embedded_storage_async::nor_flash::ReadNorFlash;
use sha2::{Digest, Sha256};

use crate::error::{Error, FlashError};

/// Flash is hashed through a small stack buffer of this size.
const CHUNK: usize = 64;

/// SHA-256 of the `size` bytes of flash starting at `address`.
pub async fn sha256<F: ReadNorFlash>(flash: &mut F, address: u32, size: u32) -> Result<[u8; DIGEST_LEN], Error> {
    let end = address
        .checked_add(size)
        .ok_or(Error::Flash(FlashError::OutOfBounds))?;

    let mut hasher = Sha256::new();
    let mut chunk = [0; CHUNK];
    let mut offset = address;
    while offset < end {
        let len = CHUNK.min((end - offset) as usize);
        flash
            .read(offset, &mut chunk[..len])
            .await
            .map_err(FlashError::from_driver)?;
        hasher.update(&chunk[..len]);
        offset += len as u32;
    }
    Ok(hasher.finalize().into())
}
