// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Maximum Transfer Unit (MTU) size for BLE communication.
/// The ATT header takes 3 bytes of it, the rest is left for the characteristic value.
pub const ATT_MTU: usize = 247;

/// Largest characteristic value the peer can write in one packet.
pub const MAX_PACKET_SIZE: usize = ATT_MTU - 3;

/// Payload size the host tool uses for each data packet, not counting the address field.
/// The engine accepts anything up to [`MAX_PACKET_SIZE`], this is only the expected steady state.
pub const DATA_CHUNK_SIZE: usize = 64;

/// Full device name advertised over BLE while in update mode.
pub const DEVICE_NAME: &str = "Passport Prime OTA";

/// Short device name used in limited advertising data.
pub const SHORT_NAME: &str = "OTA";

/// UUID of the update service.
pub const DFU_SERVICE_UUID: u128 = 0x95301000_963F_46B1_B801_0B23E8904835;
/// Control characteristic: fixed size command packets, acknowledged by notification.
pub const DFU_CONTROL_UUID: u128 = 0x95301001_963F_46B1_B801_0B23E8904835;
/// Data characteristic: payload, chaining vector and digest packets.
pub const DFU_DATA_UUID: u128 = 0x95301002_963F_46B1_B801_0B23E8904835;
/// Progress characteristic: resync and digest failure notifications.
pub const DFU_PROGRESS_UUID: u128 = 0x95301003_963F_46B1_B801_0B23E8904835;

/// List of BLE service UUIDs advertised by the bootloader.
pub const SERVICES_LIST: [[u8; 16]; 1] = [DFU_SERVICE_UUID.to_le_bytes()];

/// Start of the application partition, right after the SoftDevice.
/// The boot-state record of the application sits at this address.
pub const BASE_APP_ADDR: u32 = 0x19000;

/// Start of the bootloader partition. Everything between [`BASE_APP_ADDR`] and here
/// belongs to the application.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x26000;

/// Size of a flash page (erase unit) on the nRF52805.
pub const FLASH_PAGE: usize = 4096;

/// Starting address in UICR where the 256-bit content key is provisioned.
pub const UICR_SECRET_START: u32 = 0x10001080;

/// Size in bytes of the content key stored in UICR.
pub const UICR_SECRET_SIZE: u32 = 0x20;

/// Connection interval requested on restart, in 1.25 ms units (10 ms).
pub const MIN_CONN_INTERVAL: u16 = 8;
/// Upper bound of the requested connection interval, in 1.25 ms units (15 ms).
pub const MAX_CONN_INTERVAL: u16 = 12;
/// Number of connection events the peripheral may skip.
pub const CONN_LATENCY: u16 = 0;
/// Supervision timeout in 10 ms units (5 s).
pub const SUPERVISION_TIMEOUT: u16 = 500;

/// Last 16 bytes of RAM, kept out of the bootloader's own RAM region.
/// The application writes the update request key here before a soft reset.
pub const UPDATE_REQUEST_ADDR: u32 = 0x2000_5FF0;

/// Size of the update request key.
pub const UPDATE_REQUEST_SIZE: usize = 16;
