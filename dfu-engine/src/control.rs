// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use dfu_protocol::{Command, ControlPacket, DIGEST_LEN, IV_LEN};
use embedded_storage_async::nor_flash::NorFlash;

use crate::boot::{self, Confirmation};
use crate::session::{Activity, Session};
use crate::{Dfu, Error, Link};

impl<const PAGE: usize> Dfu<PAGE> {
    pub(crate) async fn handle_control<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        packet: &[u8],
    ) -> Result<(), Error> {
        let ControlPacket {
            command,
            length,
            address,
        } = ControlPacket::decode(packet)?;
        debug!("Cmd {:?}, len {} @ {:#x}", command, length, address);

        match command {
            Command::Restart => {
                self.pipeline.discard();
                self.session = Session::default();
                if let Err(e) = link.request_conn_params(&self.config.conn) {
                    warn!("set_conn_params failed: {:?}", e);
                }
                info!("Restarted DFU");
                Ok(())
            }
            Command::Data => self.start_transfer(flash, link, address, u32::from(length)).await,
            Command::Iv => {
                if !self.session.is_idle() {
                    return Err(Error::Busy);
                }
                if usize::from(length) != IV_LEN {
                    return Err(Error::BadChainVectorLength {
                        expected: IV_LEN,
                        actual: length.into(),
                    });
                }
                self.session.activity = Activity::ChainVector { len: IV_LEN };
                debug!("IV command: {} bytes", length);
                Ok(())
            }
            Command::Digest => {
                if !self.session.is_idle() {
                    return Err(Error::Busy);
                }
                if address == 0 || length == 0 {
                    return Err(Error::EmptyRange);
                }
                self.session.activity = Activity::Digest {
                    address,
                    size: length.into(),
                    len: DIGEST_LEN,
                };
                debug!("Digest command: {} bytes at {:#x}", length, address);
                Ok(())
            }
            Command::Done => {
                if !self.session.is_idle() {
                    return Err(Error::Busy);
                }
                if self.session.digest_failed || !self.session.verified {
                    return Err(Error::Unverified);
                }
                // The buffered unit may mirror the record about to change.
                self.pipeline.discard();
                match boot::confirm(flash, self.config.app_base).await? {
                    Confirmation::Confirmed => info!("Boot record at {:#x} confirmed", self.config.app_base),
                    Confirmation::AlreadyConfirmed => info!("Boot record already confirmed"),
                }
                Ok(())
            }
            Command::Reset => {
                self.reset_requested = true;
                info!("Reset armed");
                Ok(())
            }
            Command::Ping => {
                let throughput = self.throughput(link, length.into());
                info!(
                    "Pinged at {}/{}, {} bytes/sec",
                    throughput.expected,
                    throughput.progress,
                    throughput.bytes_per_sec()
                );
                link.report(&throughput);
                Ok(())
            }
        }
    }

    async fn start_transfer<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        address: u32,
        length: u32,
    ) -> Result<(), Error> {
        if !self.session.is_idle() {
            return Err(Error::Busy);
        }
        if length == 0 {
            return Err(Error::EmptyRange);
        }
        let end = address.checked_add(length);
        if address < self.config.app_base || end.map_or(true, |end| end > self.config.app_limit) {
            return Err(Error::AddressOutOfRange { address, length });
        }
        if address % IV_LEN as u32 != 0 || length % IV_LEN as u32 != 0 {
            return Err(Error::Unaligned { address, length });
        }

        self.pipeline.seek(flash, &mut self.cipher, address).await?;

        let session = &mut self.session;
        session.activity = Activity::Transfer { base: address, len: length };
        session.cursor = address;
        session.transfer_base = address;
        session.verified = false;
        session.bytes_read = 0;
        session.started_ms = link.now_ms();
        info!("DATA command: {} bytes at {:#x}", length, address);
        Ok(())
    }
}
