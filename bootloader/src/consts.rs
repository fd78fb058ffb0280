// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

pub use ::consts::*;

/// Start address of the bootloader, stored in the UICR register the MBR reads at startup
/// to find and run the bootloader.
#[used]
#[link_section = ".mbr_uicr_bootloader_addr"]
pub static BOOTLOADER_ADDR: u32 = BASE_BOOTLOADER_ADDR;

/// Disables debugger access once the bootloader is flashed.
#[cfg(feature = "no-dbg-access")]
#[used]
#[link_section = ".uicr_approtect"]
pub static APP_PROTECTION: u32 = 0x0000_0000;

/// Content key provisioned in UICR.
pub fn content_key() -> [u8; UICR_SECRET_SIZE as usize] {
    let secret = unsafe { core::slice::from_raw_parts(UICR_SECRET_START as *const u8, UICR_SECRET_SIZE as usize) };
    let mut key = [0; UICR_SECRET_SIZE as usize];
    key.copy_from_slice(secret);
    key
}

/// Read and scrub the update request the application may have left in retained RAM.
pub fn take_update_request() -> [u8; UPDATE_REQUEST_SIZE] {
    let retained = UPDATE_REQUEST_ADDR as *mut [u8; UPDATE_REQUEST_SIZE];
    unsafe {
        let request = core::ptr::read_volatile(retained);
        core::ptr::write_volatile(retained, [1; UPDATE_REQUEST_SIZE]);
        request
    }
}

/// Reset reason register, cleared once read. Zero after a power-on reset.
pub fn take_reset_reason() -> u32 {
    let power = unsafe { &*nrf52805_pac::POWER::ptr() };
    let reason = power.resetreas.read().bits();
    power.resetreas.write(|w| unsafe { w.bits(reason) });
    reason
}
