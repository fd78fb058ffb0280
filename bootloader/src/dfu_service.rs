// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Over-the-air update GATT service.
//!
//! Control packets are written with response and acknowledged by a one byte
//! notification on the same characteristic. Data packets are written without
//! response and only rejections are notified back. Resync and digest failures
//! go out on the progress characteristic.

use crate::consts::ATT_MTU;
use crate::{DfuEvent, DFU_EVENTS};
use defmt::{info, warn};
use dfu_protocol::{CONTROL_PACKET_SIZE, PROGRESS_SIZE};
use heapless::Vec;
use nrf_softdevice::gatt_service;

/// Acknowledgement of an accepted packet.
pub const ACCEPTED: u8 = 0;
/// Acknowledgement of a rejected packet.
pub const REJECTED: u8 = 1;

#[gatt_service(uuid = "95301000-963F-46B1-B801-0B23E8904835")]
pub struct DfuService {
    #[characteristic(uuid = "95301001-963F-46B1-B801-0B23E8904835", write, notify)]
    control: Vec<u8, CONTROL_PACKET_SIZE>,

    #[characteristic(uuid = "95301002-963F-46B1-B801-0B23E8904835", write_without_response, notify)]
    data: Vec<u8, ATT_MTU>,

    #[characteristic(uuid = "95301003-963F-46B1-B801-0B23E8904835", notify)]
    progress: Vec<u8, PROGRESS_SIZE>,
}

impl DfuService {
    pub(crate) fn handle(&self, event: DfuServiceEvent) {
        let queued = match event {
            DfuServiceEvent::ControlWrite(packet) => DFU_EVENTS.try_send(DfuEvent::Control(packet)),
            DfuServiceEvent::DataWrite(packet) => DFU_EVENTS.try_send(DfuEvent::Data(packet)),
            DfuServiceEvent::ControlCccdWrite { notifications }
            | DfuServiceEvent::DataCccdWrite { notifications }
            | DfuServiceEvent::ProgressCccdWrite { notifications } => {
                info!("Notifications: {}", notifications);
                Ok(())
            }
        };
        // A dropped data packet is recovered by the resync protocol.
        if queued.is_err() {
            warn!("DFU event queue full, packet dropped");
        }
    }

    pub(crate) fn control_handle(&self) -> u16 {
        self.control_value_handle
    }

    pub(crate) fn data_handle(&self) -> u16 {
        self.data_value_handle
    }

    pub(crate) fn progress_handle(&self) -> u16 {
        self.progress_value_handle
    }
}
