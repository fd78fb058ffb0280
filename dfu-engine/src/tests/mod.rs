// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later


use dfu_protocol::{Command, Progress, IV_LEN};
use futures::executor::block_on;

use self::flash::{MockFlash, PAGE};
use self::script::*;
use crate::boot::{self, BootRecord, BootTarget, Confirmation, RecordTag, RECORD_SIZE, TAG_BOOTLOADER, TAG_CONFIRMED};
use crate::*;

const APP_BASE: u32 = 0x1000;
const FLASH_SIZE: usize = 0x4000;

struct Rig {
    dfu: Dfu<PAGE>,
    flash: MockFlash,
    link: RecordingLink,
}

impl Rig {
    fn new() -> Self {
        Self {
            dfu: Dfu::new(Config::new(KEY).with_app_region(APP_BASE, FLASH_SIZE as u32)),
            flash: MockFlash::new(FLASH_SIZE),
            link: RecordingLink::default(),
        }
    }

    fn control(&mut self, command: Command, length: u16, address: u32) -> Result<(), Error> {
        self.raw_control(&control(command, length, address))
    }

    fn raw_control(&mut self, packet: &[u8]) -> Result<(), Error> {
        block_on(self.dfu.control(&mut self.flash, &mut self.link, packet))
    }

    fn data(&mut self, packet: &[u8]) -> Result<(), Error> {
        block_on(self.dfu.data(&mut self.flash, &mut self.link, packet))
    }

    fn send(&mut self, address: u32, bytes: &[u8]) -> Result<(), Error> {
        self.data(&payload(address, bytes))
    }

    fn begin(&mut self, iv: [u8; IV_LEN], address: u32, len: usize) {
        self.control(Command::Iv, IV_LEN as u16, 0).unwrap();
        self.data(&iv).unwrap();
        self.control(Command::Data, len as u16, address).unwrap();
    }

    fn transfer_with(&mut self, iv: [u8; IV_LEN], address: u32, plain: &[u8], chunk: usize) {
        self.begin(iv, address, plain.len());
        let cipher = encrypt(iv, plain);
        for (i, part) in cipher.chunks(chunk).enumerate() {
            self.send(address + (i * chunk) as u32, part).unwrap();
        }
    }

    fn transfer(&mut self, address: u32, plain: &[u8], chunk: usize) {
        self.transfer_with(IV, address, plain, chunk);
    }

    fn verify(&mut self, address: u32, plain: &[u8]) -> Result<(), Error> {
        self.control(Command::Digest, plain.len() as u16, address)?;
        self.data(&sha256(plain))
    }

    fn tag(&self) -> RecordTag {
        BootRecord::parse(self.flash.slice(APP_BASE, RECORD_SIZE)).unwrap().tag()
    }
}

#[test]
fn transfer_lands_decrypted() {
    let mut rig = Rig::new();
    rig.control(Command::Restart, 0, 0).unwrap();
    assert_eq!(rig.link.conn_requests, vec![ConnParams::default()]);

    let plain = pattern(64, 1);
    let cipher = encrypt(IV, &plain);
    rig.control(Command::Iv, 16, 0).unwrap();
    rig.data(&IV).unwrap();
    rig.link.now = 100;
    rig.control(Command::Data, 64, 0x1000).unwrap();

    rig.link.now = 350;
    rig.send(0x1000, &cipher[..32]).unwrap();
    assert!(rig.link.reports.is_empty());
    assert_eq!(rig.flash.writes, 0);

    rig.send(0x1020, &cipher[32..]).unwrap();
    assert_eq!(rig.flash.slice(0x1000, 64), &plain[..]);
    assert_eq!(
        rig.link.reports,
        vec![Throughput {
            expected: 64,
            progress: 64,
            bytes: 64,
            elapsed_ms: 250,
        }]
    );
    assert_eq!(rig.link.reports[0].bytes_per_sec(), 256);
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
    assert_eq!(rig.flash.erases, 1);
    assert!(rig.flash.slice(0x1040, PAGE - 64).iter().all(|b| *b == 0xFF));
    assert!(rig.link.notifications.is_empty());
}

#[test]
fn gap_is_answered_with_resync() {
    let mut rig = Rig::new();
    let plain = pattern(64, 2);
    let cipher = encrypt(IV, &plain);
    rig.begin(IV, 0x1000, 64);

    rig.send(0x1000, &cipher[..32]).unwrap();
    rig.send(0x1100, &cipher[32..]).unwrap();
    assert_eq!(rig.link.notifications, vec![Progress::Resync { address: 0x1020 }]);
    assert_eq!(rig.dfu.session().cursor(), 0x1020);
    assert_eq!(rig.flash.writes, 0);
    assert!(rig.flash.slice(0x1100, 32).iter().all(|b| *b == 0xFF));

    rig.send(0x1020, &cipher[32..]).unwrap();
    assert_eq!(rig.flash.slice(0x1000, 64), &plain[..]);
    assert_eq!(rig.link.notifications.len(), 1);
}

#[test]
fn digest_failure_blocks_done() {
    let mut rig = Rig::new();
    let plain = image(128);
    rig.transfer(APP_BASE, &plain, 64);

    rig.control(Command::Digest, 128, APP_BASE).unwrap();
    let mut wrong = sha256(&plain);
    wrong[0] ^= 1;
    assert_eq!(rig.data(&wrong), Err(Error::DigestMismatch { address: APP_BASE }));
    assert_eq!(rig.link.notifications, vec![Progress::DigestFailed { address: APP_BASE }]);
    assert!(rig.dfu.session().digest_failed());

    assert_eq!(rig.control(Command::Done, 0, 0), Err(Error::Unverified));
    assert_eq!(rig.tag(), RecordTag::Provisional);

    rig.verify(APP_BASE, &plain).unwrap();
    assert!(!rig.dfu.session().digest_failed());
    rig.control(Command::Done, 0, 0).unwrap();
    assert_eq!(rig.tag(), RecordTag::Confirmed);
}

#[test]
fn done_needs_a_digest_after_the_last_transfer() {
    let mut rig = Rig::new();
    let plain = image(64);
    rig.transfer(APP_BASE, &plain, 64);
    assert_eq!(rig.control(Command::Done, 0, 0), Err(Error::Unverified));

    rig.verify(APP_BASE, &plain).unwrap();
    let more = pattern(64, 4);
    rig.transfer(0x1400, &more, 32);
    assert_eq!(rig.control(Command::Done, 0, 0), Err(Error::Unverified));
    assert_eq!(rig.tag(), RecordTag::Provisional);
}

#[test]
fn one_activity_at_a_time() {
    let mut rig = Rig::new();

    rig.control(Command::Iv, 16, 0).unwrap();
    let pending = rig.dfu.session().clone();
    assert_eq!(rig.control(Command::Data, 64, 0x1000), Err(Error::Busy));
    assert_eq!(rig.control(Command::Digest, 64, 0x1000), Err(Error::Busy));
    assert_eq!(rig.control(Command::Iv, 16, 0), Err(Error::Busy));
    assert_eq!(rig.control(Command::Done, 0, 0), Err(Error::Busy));
    assert_eq!(rig.dfu.session(), &pending);
    rig.data(&IV).unwrap();

    let plain = pattern(64, 5);
    let cipher = encrypt(IV, &plain);
    rig.control(Command::Data, 64, 0x1000).unwrap();
    let pending = rig.dfu.session().clone();
    assert_eq!(rig.control(Command::Iv, 16, 0), Err(Error::Busy));
    assert_eq!(rig.control(Command::Digest, 64, 0x1000), Err(Error::Busy));
    assert_eq!(rig.control(Command::Data, 64, 0x1400), Err(Error::Busy));
    assert_eq!(rig.dfu.session(), &pending);
    rig.send(0x1000, &cipher).unwrap();

    rig.control(Command::Digest, 64, 0x1000).unwrap();
    let pending = rig.dfu.session().clone();
    assert_eq!(rig.control(Command::Data, 64, 0x1400), Err(Error::Busy));
    assert_eq!(rig.control(Command::Iv, 16, 0), Err(Error::Busy));
    assert_eq!(rig.dfu.session(), &pending);
    rig.data(&sha256(&plain)).unwrap();
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
}

#[test]
fn resent_packets_leave_flash_unchanged() {
    let plain = pattern(2048, 9);
    let cipher = encrypt(IV, &plain);
    let packets: Vec<(u32, &[u8])> = cipher
        .chunks(64)
        .enumerate()
        .map(|(i, part)| (0x1400 + 64 * i as u32, part))
        .collect();

    let mut clean = Rig::new();
    clean.transfer(0x1400, &plain, 64);

    let mut rig = Rig::new();
    rig.begin(IV, 0x1400, 2048);
    for (address, part) in &packets[..4] {
        rig.send(*address, part).unwrap();
    }
    // Still buffered: the cursor moves back.
    rig.send(packets[1].0, packets[1].1).unwrap();
    assert_eq!(rig.dfu.session().cursor(), 0x1480);
    for (address, part) in &packets[2..20] {
        rig.send(*address, part).unwrap();
    }
    // Already programmed: dropped.
    let cursor = rig.dfu.session().cursor();
    rig.send(packets[10].0, packets[10].1).unwrap();
    assert_eq!(rig.dfu.session().cursor(), cursor);
    for (address, part) in &packets[20..] {
        rig.send(*address, part).unwrap();
    }

    assert_eq!(rig.flash.slice(0x1400, 2048), &plain[..]);
    assert_eq!(rig.flash.mem, clean.flash.mem);
    assert!(rig.link.notifications.is_empty());
}

#[test]
fn transfer_across_unit_boundary_keeps_neighbours() {
    let mut rig = Rig::new();
    let existing = pattern(PAGE, 0x33);
    rig.flash.preload(0x1000, &existing);

    let start = 0x1000 + PAGE as u32 - 32;
    let plain = pattern(96, 0x77);
    rig.transfer(start, &plain, 20);

    assert_eq!(rig.flash.slice(start, 96), &plain[..]);
    assert_eq!(rig.flash.slice(0x1000, PAGE - 32), &existing[..PAGE - 32]);
    assert!(rig.flash.slice(start + 96, 64).iter().all(|b| *b == 0xFF));
    assert_eq!(rig.flash.erases, 2);
}

#[test]
fn digest_notices_a_flipped_bit() {
    let mut rig = Rig::new();
    let plain = image(256);
    rig.transfer(APP_BASE, &plain, 64);
    rig.verify(APP_BASE, &plain).unwrap();

    rig.flash.mem[APP_BASE as usize + 200] ^= 0x10;
    assert_eq!(
        rig.verify(APP_BASE, &plain),
        Err(Error::DigestMismatch { address: APP_BASE })
    );
}

#[test]
fn digest_of_partial_chunk() {
    let mut flash = MockFlash::new(FLASH_SIZE);
    flash.preload(0x1000, &pattern(100, 8));
    let digest = block_on(digest::sha256(&mut flash, 0x1000, 100)).unwrap();
    assert_eq!(digest, sha256(&pattern(100, 8)));
    assert_eq!(
        block_on(digest::sha256(&mut flash, u32::MAX, 2)),
        Err(Error::Flash(FlashError::OutOfBounds))
    );
}

#[test]
fn confirm_is_idempotent() {
    let mut flash = MockFlash::new(FLASH_SIZE);
    flash.preload(APP_BASE, &image(RECORD_SIZE));

    assert_eq!(block_on(boot::confirm(&mut flash, APP_BASE)), Ok(Confirmation::Confirmed));
    assert_eq!(flash.writes, 1);
    assert_eq!(block_on(boot::confirm(&mut flash, APP_BASE)), Ok(Confirmation::AlreadyConfirmed));
    assert_eq!(flash.writes, 1);

    let record = BootRecord::parse(flash.slice(APP_BASE, RECORD_SIZE)).unwrap();
    assert_eq!(record.tag, TAG_CONFIRMED);
    assert_eq!(&flash.slice(APP_BASE, RECORD_SIZE)[..16], &image(RECORD_SIZE)[..16]);
}

#[test]
fn confirm_refuses_unknown_tags() {
    let mut flash = MockFlash::new(FLASH_SIZE);
    let mut record = BootRecord::parse(&image(RECORD_SIZE)).unwrap();
    record.tag = TAG_BOOTLOADER;
    flash.preload(APP_BASE, &record.serialize());

    assert_eq!(
        block_on(boot::confirm(&mut flash, APP_BASE)),
        Err(Error::BootRecord { tag: TAG_BOOTLOADER })
    );
    assert_eq!(
        block_on(boot::confirm(&mut flash, 0x2000)),
        Err(Error::BootRecord { tag: 0xFFFF_FFFF })
    );
    assert_eq!(flash.writes, 0);
}

#[test]
fn unknown_boot_record_halts_the_engine() {
    let mut rig = Rig::new();
    let mut record = BootRecord::parse(&image(RECORD_SIZE)).unwrap();
    record.tag = TAG_BOOTLOADER;
    rig.flash.preload(APP_BASE, &record.serialize());

    let plain = pattern(64, 3);
    rig.transfer(0x1400, &plain, 32);
    rig.verify(0x1400, &plain).unwrap();
    assert_eq!(
        rig.control(Command::Done, 0, 0),
        Err(Error::BootRecord { tag: TAG_BOOTLOADER })
    );
    assert!(rig.dfu.is_halted());

    assert_eq!(rig.control(Command::Restart, 0, 0), Err(Error::Halted));
    assert_eq!(rig.control(Command::Ping, 0, 0), Err(Error::Halted));
    assert_eq!(rig.data(&IV), Err(Error::Halted));
}

#[test]
fn full_update_in_blocks() {
    let mut rig = Rig::new();
    rig.control(Command::Restart, 0, 0).unwrap();
    let image = image(2 * PAGE);
    for (i, block) in image.chunks(PAGE).enumerate() {
        let address = APP_BASE + (i * PAGE) as u32;
        rig.transfer_with([i as u8 + 1; IV_LEN], address, block, 64);
        rig.control(Command::Ping, block.len() as u16, 0).unwrap();
        rig.verify(address, block).unwrap();
    }
    rig.control(Command::Done, 0, 0).unwrap();
    rig.control(Command::Reset, 0, 0).unwrap();
    assert!(rig.dfu.reset_requested());

    let mut expected = image.clone();
    expected[16..20].copy_from_slice(&TAG_CONFIRMED.to_le_bytes());
    assert_eq!(rig.flash.slice(APP_BASE, 2 * PAGE), &expected[..]);

    let record = BootRecord::parse(rig.flash.slice(APP_BASE, RECORD_SIZE));
    assert!(matches!(boot::select(record, false), BootTarget::Application(_)));
    assert_eq!(rig.link.reports.len(), 4);
}

#[test]
fn restart_drops_partial_unit() {
    let mut rig = Rig::new();
    let plain = pattern(128, 6);
    let cipher = encrypt(IV, &plain);
    rig.begin(IV, 0x1000, 128);
    rig.send(0x1000, &cipher[..64]).unwrap();
    rig.control(Command::Reset, 0, 0).unwrap();

    rig.link.refuse_conn_params = true;
    rig.control(Command::Restart, 0, 0).unwrap();
    assert_eq!(rig.flash.writes, 0);
    assert_eq!(rig.dfu.session(), &Session::default());
    assert!(rig.dfu.reset_requested());
    assert_eq!(rig.send(0x1040, &cipher[64..]), Err(Error::NoTransfer));
}

#[test]
fn malformed_commands_are_rejected() {
    let mut rig = Rig::new();
    assert_eq!(
        rig.control(Command::Data, 64, 0x0C00),
        Err(Error::AddressOutOfRange {
            address: 0x0C00,
            length: 64
        })
    );
    assert_eq!(
        rig.control(Command::Data, 64, FLASH_SIZE as u32 - 32),
        Err(Error::AddressOutOfRange {
            address: FLASH_SIZE as u32 - 32,
            length: 64
        })
    );
    assert_eq!(
        rig.control(Command::Data, 40, 0x1000),
        Err(Error::Unaligned {
            address: 0x1000,
            length: 40
        })
    );
    assert_eq!(
        rig.control(Command::Data, 64, 0x1008),
        Err(Error::Unaligned {
            address: 0x1008,
            length: 64
        })
    );
    assert_eq!(rig.control(Command::Data, 0, 0x1000), Err(Error::EmptyRange));
    assert_eq!(rig.control(Command::Digest, 64, 0), Err(Error::EmptyRange));
    assert_eq!(rig.control(Command::Digest, 0, 0x1000), Err(Error::EmptyRange));
    assert_eq!(
        rig.control(Command::Iv, 8, 0),
        Err(Error::BadChainVectorLength {
            expected: 16,
            actual: 8
        })
    );
    assert_eq!(
        rig.raw_control(&[1, 0, 0, 0, 0, 0, 0]),
        Err(Error::Protocol(dfu_protocol::Error::WrongLength {
            expected: 8,
            actual: 7
        }))
    );
    assert_eq!(
        rig.raw_control(&[9, 0, 0, 0, 0, 0, 0, 0]),
        Err(Error::Protocol(dfu_protocol::Error::UnknownCommand(9)))
    );
    assert_eq!(rig.dfu.session(), &Session::default());
    assert_eq!(rig.flash.erases + rig.flash.writes, 0);
}

#[test]
fn bad_chain_vector_is_not_retried() {
    let mut rig = Rig::new();
    rig.control(Command::Iv, 16, 0).unwrap();
    assert_eq!(
        rig.data(&[0; 15]),
        Err(Error::BadChainVectorLength {
            expected: 16,
            actual: 15
        })
    );
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
    assert_eq!(rig.data(&IV), Err(Error::NoTransfer));
}

#[test]
fn oversized_packet_consumes_pending_vector_and_digest() {
    let mut rig = Rig::new();
    let oversized = vec![0; consts::MAX_PACKET_SIZE + 1];
    let too_long = Err(Error::Protocol(dfu_protocol::Error::TooLong {
        maximum: consts::MAX_PACKET_SIZE,
        actual: consts::MAX_PACKET_SIZE + 1,
    }));

    rig.control(Command::Iv, 16, 0).unwrap();
    assert_eq!(rig.data(&oversized), too_long);
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
    assert_eq!(rig.data(&IV), Err(Error::NoTransfer));

    rig.control(Command::Digest, 64, 0x1000).unwrap();
    assert_eq!(rig.data(&oversized), too_long);
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
    assert!(rig.link.notifications.is_empty());
    assert_eq!(rig.data(&[0; 32]), Err(Error::NoTransfer));
}

#[test]
fn bad_digest_length_clears_pending_digest() {
    let mut rig = Rig::new();
    rig.control(Command::Digest, 64, 0x1000).unwrap();
    assert_eq!(
        rig.data(&[0; 31]),
        Err(Error::BadDigestLength {
            expected: 32,
            actual: 31
        })
    );
    assert_eq!(rig.dfu.session().activity(), Activity::Idle);
    assert!(rig.link.notifications.is_empty());
}

#[test]
fn payload_bounds() {
    let mut rig = Rig::new();
    assert_eq!(rig.send(0x1000, &[0; 16]), Err(Error::NoTransfer));

    rig.begin(IV, 0x1000, 64);
    assert_eq!(
        rig.send(0x1000, &[0; 80]),
        Err(Error::Overrun {
            end: 0x1050,
            limit: 0x1040
        })
    );
    assert_eq!(rig.dfu.session().cursor(), 0x1000);
    assert_eq!(
        rig.data(&[0, 0x10, 0, 0]),
        Err(Error::Protocol(dfu_protocol::Error::TooShort { minimum: 5, actual: 4 }))
    );
    let oversized = vec![0; consts::MAX_PACKET_SIZE + 1];
    assert_eq!(
        rig.data(&oversized),
        Err(Error::Protocol(dfu_protocol::Error::TooLong {
            maximum: consts::MAX_PACKET_SIZE,
            actual: consts::MAX_PACKET_SIZE + 1
        }))
    );
}

#[test]
fn ping_reports_progress() {
    let mut rig = Rig::new();
    let plain = pattern(128, 7);
    let cipher = encrypt(IV, &plain);
    rig.begin(IV, 0x1000, 128);
    rig.link.now = 500;
    rig.send(0x1000, &cipher[..64]).unwrap();
    rig.control(Command::Ping, 64, 0).unwrap();
    assert_eq!(
        rig.link.reports,
        vec![Throughput {
            expected: 64,
            progress: 64,
            bytes: 64,
            elapsed_ms: 500,
        }]
    );
    assert_eq!(rig.link.reports[0].bytes_per_sec(), 128);
}

#[test]
fn erase_unit_must_match_buffer() {
    let mut dfu: Dfu<2048> = Dfu::new(Config::new(KEY).with_app_region(APP_BASE, FLASH_SIZE as u32));
    let mut flash = MockFlash::new(FLASH_SIZE);
    let mut link = RecordingLink::default();
    let packet = control(Command::Restart, 0, 0);
    assert_eq!(
        block_on(dfu.control(&mut flash, &mut link, &packet)),
        Err(Error::EraseUnit {
            expected: 2048,
            actual: PAGE
        })
    );
    assert!(dfu.is_halted());
}
