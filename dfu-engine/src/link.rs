// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use dfu_protocol::Progress;

/// Connection parameters asked of the peer when an update session restarts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// In 1.25 ms units
    pub min_interval: u16,
    /// In 1.25 ms units
    pub max_interval: u16,
    pub latency: u16,
    /// In 10 ms units
    pub supervision_timeout: u16,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            min_interval: consts::MIN_CONN_INTERVAL,
            max_interval: consts::MAX_CONN_INTERVAL,
            latency: consts::CONN_LATENCY,
            supervision_timeout: consts::SUPERVISION_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    NotConnected,
    Rejected,
}

/// Bytes received for the current transfer and the time it took.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Throughput {
    /// Bytes the peer claims to have sent, as carried by `PING`; transfer length otherwise
    pub expected: u32,
    /// Distance of the write cursor from the start of the transfer
    pub progress: u32,
    pub bytes: u32,
    pub elapsed_ms: u64,
}

impl Throughput {
    pub fn bytes_per_sec(&self) -> u32 {
        if self.elapsed_ms == 0 {
            return 0;
        }
        (u64::from(self.bytes) * 1000 / self.elapsed_ms) as u32
    }
}

/// The transport the engine talks back through.
pub trait Link {
    /// Queue an outbound progress notification.
    fn notify(&mut self, progress: Progress);

    /// Monotonic time in milliseconds.
    fn now_ms(&self) -> u64;

    fn request_conn_params(&mut self, params: &ConnParams) -> Result<(), LinkError>;

    fn report(&mut self, _throughput: &Throughput) {}
}
