// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` from the layout in the `consts` crate and puts it
//! on the linker search path.

use consts::{BASE_BOOTLOADER_ADDR, UPDATE_REQUEST_ADDR, UPDATE_REQUEST_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    /* The SoftDevice S112 minimal RAM requirement grows with the ATT MTU and attribute table, */
    /* reserve the same 10648 bytes (0x2998) as the application does */
    let soft_device_ram_reserved = 10648;
    let ram_end = UPDATE_REQUEST_ADDR - 0x2000_0000;

    let memory_x_content = format!(
        r##"
        BASE_BOOTLOADER_ADDR = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* The bootloader flash partition runs up to the end of the 192K of flash */
            FLASH (rx) : ORIGIN = 0x00000000 + BASE_BOOTLOADER_ADDR, LENGTH = 192K - BASE_BOOTLOADER_ADDR
            RAM : ORIGIN = 0x20000000 + {}, LENGTH = {} - {}
            /* Update request left by the application, never initialized by the bootloader */
            RETAINED (rw) : ORIGIN = {:#X}, LENGTH = {}
            mbr_uicr_bootloader_addr (r) : ORIGIN = 0x10001014, LENGTH = 0x4
            uicr_approtect (r) : ORIGIN = 0x10001208, LENGTH = 0x4
        }}

        SECTIONS {{
            .uicr_approtect :  {{
                KEEP(*(.uicr_approtect))
                . = ALIGN(4);
            }} > uicr_approtect

            .mbr_uicr_bootloader_addr :  {{
                KEEP(*(.mbr_uicr_bootloader_addr))
                . = ALIGN(4);
            }} > mbr_uicr_bootloader_addr
        }};
        "##,
        BASE_BOOTLOADER_ADDR,
        soft_device_ram_reserved,
        ram_end,
        soft_device_ram_reserved,
        UPDATE_REQUEST_ADDR,
        UPDATE_REQUEST_SIZE
    );
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
