// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod consts;
mod dfu_service;
mod jump_app;
mod server;
mod updater;

use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use core::cell::RefCell;
use core::pin::pin;
use crate::consts::{content_key, take_reset_reason, take_update_request, ATT_MTU, BASE_APP_ADDR};
use defmt::{info, unwrap};
use dfu_engine::boot::{self, BootRecord, BootTarget, RECORD_SIZE};
use dfu_engine::{Config, Dfu};
use dfu_protocol::CONTROL_PACKET_SIZE;
use embassy_executor::Spawner;
use embassy_nrf::interrupt;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
#[cfg(not(feature = "debug"))]
use jump_app::jump_to_app;
use nrf_softdevice::ble::Connection;
use nrf_softdevice::{Flash, Softdevice};
use server::{initialize_sd, run_bluetooth, Server};
use static_cell::StaticCell;
use updater::run_updater;

/// Maximum number of GATT writes waiting for the updater.
pub const DFU_EVENT_QUEUE: usize = 8;

/// Work handed from the GATT server to the updater.
pub enum DfuEvent {
    Control(Vec<u8, CONTROL_PACKET_SIZE>),
    Data(Vec<u8, ATT_MTU>),
    Disconnected,
}

static DFU_EVENTS: Channel<ThreadModeRawMutex, DfuEvent, DFU_EVENT_QUEUE> = Channel::new();

static CONNECTION: Mutex<ThreadModeRawMutex, RefCell<Option<Connection>>> = Mutex::new(RefCell::new(None));

static DFU: StaticCell<Dfu> = StaticCell::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    info!("SD is running");
    sd.run().await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let reset_reason = take_reset_reason();
    let request = take_update_request();
    let requested = boot::update_requested(reset_reason == 0, &request);
    let record = BootRecord::parse(unsafe { core::slice::from_raw_parts(BASE_APP_ADDR as *const u8, RECORD_SIZE) });
    info!("Reset reason {=u32:#x}, update requested: {}", reset_reason, requested);

    match boot::select(record, requested) {
        #[cfg(not(feature = "debug"))]
        BootTarget::Application(record) => unsafe { jump_to_app(&record) },
        target => info!("Staying in update mode: {:?}", target),
    }

    let mut conf = embassy_nrf::config::Config::default();
    conf.gpiote_interrupt_priority = interrupt::Priority::P2;
    conf.time_interrupt_priority = interrupt::Priority::P2;
    let _p = embassy_nrf::init(conf);

    let sd = initialize_sd();
    let server = unwrap!(Server::new(sd), "Creating the GATT server failed");
    unwrap!(spawner.spawn(softdevice_task(sd)), "Spawning the softdevice failed");

    let mut flash = Flash::take(sd);
    let dfu = DFU.init(Dfu::new(Config::new(content_key())));

    let updater = run_updater(dfu, &server, &mut flash);
    let ble = run_bluetooth(sd, &server);
    info!("Init tasks");

    futures::future::select(pin!(updater), pin!(ble)).await;
}
