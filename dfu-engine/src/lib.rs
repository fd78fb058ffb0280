// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Over-the-air update engine of the bootloader.
//!
//! The peer streams an AES-256-CBC encrypted image as control and data packets.
//! The engine resequences the data against a write cursor, decrypts it one erase
//! unit at a time, programs flash, checks SHA-256 digests of what landed and
//! finally flips the boot-state record of the image to confirmed.
//!
//! It is generic over the async NOR flash traits and a [`Link`] back to the peer,
//! and processes one packet at a time to completion.

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod boot;
mod cipher;
mod config;
mod control;
mod data;
pub mod digest;
mod error;
mod link;
mod pipeline;
mod session;

#[cfg(test)]
mod tests;

pub use config::{Config, KEY_LEN};
pub use error::{Error, FlashError};
pub use link::{ConnParams, Link, LinkError, Throughput};
pub use session::{Activity, Session};

use cipher::ChainCipher;
use embedded_storage_async::nor_flash::NorFlash;
use pipeline::Pipeline;

/// Update engine buffering one erase unit of `PAGE` bytes.
pub struct Dfu<const PAGE: usize = { consts::FLASH_PAGE }> {
    config: Config,
    session: Session,
    cipher: ChainCipher,
    pipeline: Pipeline<PAGE>,
    reset_requested: bool,
    halted: bool,
}

impl<const PAGE: usize> Dfu<PAGE> {
    pub fn new(config: Config) -> Self {
        let cipher = ChainCipher::new(config.key);
        Self {
            config,
            session: Session::default(),
            cipher,
            pipeline: Pipeline::new(),
            reset_requested: false,
            halted: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `RESET` was accepted; restart once the connection is gone.
    /// Survives `RESTART`.
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Handle one packet from the control characteristic.
    /// `Ok` means the command was accepted.
    pub async fn control<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        packet: &[u8],
    ) -> Result<(), Error> {
        let result = match self.ready::<F>() {
            Ok(()) => self.handle_control(flash, link, packet).await,
            Err(e) => Err(e),
        };
        self.latch(result)
    }

    /// Handle one packet from the data characteristic.
    /// `Ok` means the packet was accepted, which for a digest means it matched.
    pub async fn data<F: NorFlash, L: Link>(&mut self, flash: &mut F, link: &mut L, packet: &[u8]) -> Result<(), Error> {
        let result = match self.ready::<F>() {
            Ok(()) => self.handle_data(flash, link, packet).await,
            Err(e) => Err(e),
        };
        self.latch(result)
    }

    fn ready<F: NorFlash>(&self) -> Result<(), Error> {
        if self.halted {
            return Err(Error::Halted);
        }
        if F::ERASE_SIZE != PAGE {
            return Err(Error::EraseUnit {
                expected: PAGE,
                actual: F::ERASE_SIZE,
            });
        }
        Ok(())
    }

    fn latch(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        if let Err(e) = result {
            if e.is_fatal() {
                error!("Update halted: {}", e);
                self.halted = true;
            } else {
                warn!("Rejected: {}", e);
            }
        }
        result
    }

    fn throughput<L: Link>(&self, link: &L, expected: u32) -> Throughput {
        Throughput {
            expected,
            progress: self.session.cursor.wrapping_sub(self.session.transfer_base),
            bytes: self.session.bytes_read,
            elapsed_ms: link.now_ms().saturating_sub(self.session.started_ms),
        }
    }
}
