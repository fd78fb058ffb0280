// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::link::ConnParams;

/// Size of the AES-256 content key.
pub const KEY_LEN: usize = 32;

/// Run-time settings of the update engine.
///
/// Holds the content key and has no `Debug` impl.
#[derive(Clone)]
pub struct Config {
    /// Lowest address data may be written to. The boot-state record of the
    /// application lives here.
    pub app_base: u32,
    /// First address past the application region.
    pub app_limit: u32,
    pub key: [u8; KEY_LEN],
    pub conn: ConnParams,
    /// Largest data packet accepted, address field included.
    pub max_packet: usize,
}

impl Config {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            app_base: consts::BASE_APP_ADDR,
            app_limit: consts::BASE_BOOTLOADER_ADDR,
            key,
            conn: ConnParams::default(),
            max_packet: consts::MAX_PACKET_SIZE,
        }
    }

    /// Place the application region at `[base, limit)`.
    pub fn with_app_region(mut self, base: u32, limit: u32) -> Self {
        self.app_base = base;
        self.app_limit = limit;
        self
    }
}
