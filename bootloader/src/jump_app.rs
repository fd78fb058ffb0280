// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later
use defmt::info;
use dfu_engine::boot::BootRecord;
use nrf_softdevice_s112::sd_softdevice_vector_table_base_set;

/// SoftDevice vector table, where the MBR forwards interrupts to.
const SOFTDEVICE_VECTOR_TABLE: u32 = 0x1000;

/// Boots the application described by `record`, assuming the SoftDevice is present
/// but not enabled.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run code placed in the application partition.
/// `record` must come from a confirmed boot-state record.
pub unsafe fn jump_to_app(record: &BootRecord) -> ! {
    use nrf_softdevice_mbr as mbr;

    let mut cmd = mbr::sd_mbr_command_t {
        command: mbr::NRF_MBR_COMMANDS_SD_MBR_COMMAND_INIT_SD,
        params: mbr::sd_mbr_command_t__bindgen_ty_1 {
            irq_forward_address_set: mbr::sd_mbr_command_irq_forward_address_set_t {
                address: record.vector_table,
            },
        },
    };
    let ret = mbr::sd_mbr_command(&mut cmd);
    info!("ret SD init result {}", ret);

    critical_section::with(|_| {
        let ret = sd_softdevice_vector_table_base_set(record.vector_table);
        info!("ret val base set {}", ret);

        let mut cmd = mbr::sd_mbr_command_t {
            command: mbr::NRF_MBR_COMMANDS_SD_MBR_COMMAND_IRQ_FORWARD_ADDRESS_SET,
            params: mbr::sd_mbr_command_t__bindgen_ty_1 {
                irq_forward_address_set: mbr::sd_mbr_command_irq_forward_address_set_t {
                    address: SOFTDEVICE_VECTOR_TABLE,
                },
            },
        };
        let ret = mbr::sd_mbr_command(&mut cmd);
        info!("ret forward irq mbr result {}", ret);

        let msp = record.stack_top;
        let rv = record.reset_vector;
        info!("msp = {=u32:x}, rv = {=u32:x}", msp, rv);

        // * Modify control register to use MSP as stack pointer (clear spsel bit)
        // * Synchronize instruction barrier
        // * Initialize stack pointer
        // * Set link register to not return (0xFF)
        // * Jump to the application reset vector
        core::arch::asm!(
            "mrs {tmp}, CONTROL",
            "bics {tmp}, {spsel}",
            "msr CONTROL, {tmp}",
            "isb",
            "msr MSP, {msp}",
            "mov lr, {new_lr}",
            "bx {rv}",
            // `out(reg) _` is not permitted in a `noreturn` asm! call,
            // so instead use `in(reg) 0` and don't restore it afterwards.
            tmp = in(reg) 0,
            spsel = in(reg) 2,
            new_lr = in(reg) 0xFFFFFFFFu32,
            msp = in(reg) msp,
            rv = in(reg) rv,
            options(noreturn),
        );
    })
}
