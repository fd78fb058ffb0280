// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage_async::nor_flash::NorFlash;

use crate::cipher::ChainCipher;
use crate::error::{Error, FlashError};

/// Byte range of the buffer holding ciphertext not yet programmed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Span {
    start: usize,
    end: usize,
}

/// Mirror of one erase unit of flash.
///
/// Ciphertext is collected here until the unit is left or the transfer ends, then
/// decrypted in place and the whole unit is erased and programmed in one go.
/// Bytes outside the received span keep what flash held when the unit was adopted.
pub(crate) struct Pipeline<const PAGE: usize> {
    buf: [u8; PAGE],
    base: Option<u32>,
    span: Option<Span>,
}

impl<const PAGE: usize> Pipeline<PAGE> {
    pub(crate) const fn new() -> Self {
        Self {
            buf: [0xFF; PAGE],
            base: None,
            span: None,
        }
    }

    pub(crate) fn unit_base(address: u32) -> u32 {
        address - address % PAGE as u32
    }

    /// First address of the ciphertext still held in the buffer.
    pub(crate) fn buffered_from(&self) -> Option<u32> {
        match (self.base, self.span) {
            (Some(base), Some(span)) => Some(base + span.start as u32),
            _ => None,
        }
    }

    /// Make the buffer mirror the unit containing `address`.
    ///
    /// A different unit gets the pending span committed first, then the new
    /// unit is read back from flash.
    pub(crate) async fn seek<F: NorFlash>(
        &mut self,
        flash: &mut F,
        cipher: &mut ChainCipher,
        address: u32,
    ) -> Result<(), Error> {
        let base = Self::unit_base(address);
        if self.base == Some(base) {
            return Ok(());
        }
        self.flush(flash, cipher).await?;

        self.base = None;
        flash.read(base, &mut self.buf).await.map_err(FlashError::from_driver)?;
        self.base = Some(base);
        Ok(())
    }

    /// Copy as much of `bytes` as fits in the current unit, starting at `address`.
    /// Returns the number of bytes taken.
    pub(crate) fn write(&mut self, address: u32, bytes: &[u8]) -> Result<usize, Error> {
        let base = match self.base {
            Some(base) if address >= base && ((address - base) as usize) < PAGE => base,
            _ => return Err(Error::NoTransfer),
        };
        let offset = (address - base) as usize;
        let len = bytes.len().min(PAGE - offset);
        self.buf[offset..offset + len].copy_from_slice(&bytes[..len]);

        self.span = Some(match self.span {
            Some(span) => Span {
                start: span.start.min(offset),
                end: span.end.max(offset + len),
            },
            None => Span {
                start: offset,
                end: offset + len,
            },
        });
        Ok(len)
    }

    /// Decrypt the pending span and program the unit.
    pub(crate) async fn flush<F: NorFlash>(&mut self, flash: &mut F, cipher: &mut ChainCipher) -> Result<(), Error> {
        let (Some(base), Some(span)) = (self.base, self.span.take()) else {
            return Ok(());
        };
        if !cipher.decrypt(&mut self.buf[span.start..span.end]) {
            // The buffer no longer matches flash once the span is dropped.
            self.base = None;
            return Err(Error::Unaligned {
                address: base + span.start as u32,
                length: (span.end - span.start) as u32,
            });
        }

        let Some(end) = base.checked_add(PAGE as u32) else {
            self.base = None;
            return Err(FlashError::OutOfBounds.into());
        };
        debug!("Flashing unit at {:#x}", base);
        let programmed = match flash.erase(base, end).await {
            Ok(()) => flash.write(base, &self.buf).await,
            Err(e) => Err(e),
        };
        if let Err(e) = programmed {
            self.base = None;
            return Err(FlashError::from_driver(e).into());
        }
        Ok(())
    }

    /// Forget the buffered unit, dropping any ciphertext not yet programmed.
    pub(crate) fn discard(&mut self) {
        self.base = None;
        self.span = None;
    }
}
