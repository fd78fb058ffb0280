// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// What the next data packet is expected to be.
///
/// Holding this as a single value keeps a transfer, a chaining vector and a
/// digest from ever being pending at the same time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    #[default]
    Idle,
    /// Payload for `[base, base + len)`
    Transfer { base: u32, len: u32 },
    /// A raw chaining vector of `len` bytes
    ChainVector { len: usize },
    /// The expected digest of `[address, address + size)`
    Digest { address: u32, size: u32, len: usize },
}

/// Volatile state of one update session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    pub(crate) activity: Activity,
    /// Address the next payload byte is expected for
    pub(crate) cursor: u32,
    /// Start of the most recent transfer, kept for progress reports after it completes
    pub(crate) transfer_base: u32,
    /// Last digest check failed; blocks `DONE`
    pub(crate) digest_failed: bool,
    /// A digest check passed since the last `DATA`
    pub(crate) verified: bool,
    pub(crate) bytes_read: u32,
    pub(crate) started_ms: u64,
}

impl Session {
    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn digest_failed(&self) -> bool {
        self.digest_failed
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn bytes_read(&self) -> u32 {
        self.bytes_read
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.activity == Activity::Idle
    }
}
