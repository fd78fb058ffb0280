// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::dfu_service::{ACCEPTED, REJECTED};
use crate::server::Server;
use crate::{DfuEvent, CONNECTION, DFU_EVENTS};
use cortex_m::peripheral::SCB;
use defmt::{debug, info, warn};
use dfu_engine::{ConnParams, Dfu, Link, LinkError, Throughput};
use dfu_protocol::Progress;
use embassy_time::Instant;
use nrf_softdevice::ble::gatt_server::{notify_value, NotifyValueError};
use nrf_softdevice::raw::ble_gap_conn_params_t;
use nrf_softdevice::{Flash, RawError};

/// Sends everything the engine has to say back over the current connection.
struct GattLink<'a> {
    server: &'a Server,
}

impl GattLink<'_> {
    fn send(&self, handle: u16, value: &[u8]) {
        CONNECTION.lock(|c| match c.borrow().as_ref() {
            Some(conn) => match notify_value(conn, handle, value) {
                Ok(()) => {}
                Err(NotifyValueError::Raw(RawError::BleGattsSysAttrMissing)) => {
                    debug!("Notifications not enabled yet");
                }
                Err(e) => warn!("Notify failed: {:?}", e),
            },
            None => debug!("Not connected, dropping notification"),
        })
    }

    fn ack(&self, handle: u16, accepted: bool) {
        self.send(handle, &[if accepted { ACCEPTED } else { REJECTED }]);
    }
}

impl Link for GattLink<'_> {
    fn notify(&mut self, progress: Progress) {
        self.send(self.server.dfu.progress_handle(), &progress.encode());
    }

    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn request_conn_params(&mut self, params: &ConnParams) -> Result<(), LinkError> {
        CONNECTION.lock(|c| {
            let c = c.borrow();
            let conn = c.as_ref().ok_or(LinkError::NotConnected)?;
            conn.set_conn_params(ble_gap_conn_params_t {
                min_conn_interval: params.min_interval,
                max_conn_interval: params.max_interval,
                slave_latency: params.latency,
                conn_sup_timeout: params.supervision_timeout,
            })
            .map_err(|_| LinkError::Rejected)
        })
    }

    fn report(&mut self, throughput: &Throughput) {
        info!(
            "{}/{} bytes, {} ms, {}/sec",
            throughput.progress,
            throughput.expected,
            throughput.elapsed_ms,
            throughput.bytes_per_sec()
        );
    }
}

/// Feed queued GATT writes to the engine one at a time.
/// Resets the device when the connection closes after an accepted `RESET`.
pub async fn run_updater(dfu: &mut Dfu, server: &Server, flash: &mut Flash) -> ! {
    let mut link = GattLink { server };
    loop {
        match DFU_EVENTS.receive().await {
            DfuEvent::Control(packet) => {
                let result = dfu.control(flash, &mut link, &packet).await;
                link.ack(server.dfu.control_handle(), result.is_ok());
            }
            DfuEvent::Data(packet) => {
                if dfu.data(flash, &mut link, &packet).await.is_err() {
                    link.ack(server.dfu.data_handle(), false);
                }
            }
            DfuEvent::Disconnected => {
                if dfu.reset_requested() {
                    info!("Resetting");
                    SCB::sys_reset();
                }
                info!("Disconnected, waiting for a new connection");
            }
        }
    }
}
