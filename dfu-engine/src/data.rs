// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use dfu_protocol::{PayloadPacket, Progress, DIGEST_LEN, IV_LEN};
use embedded_storage_async::nor_flash::NorFlash;

use crate::session::Activity;
use crate::{digest, Dfu, Error, Link};

impl<const PAGE: usize> Dfu<PAGE> {
    pub(crate) async fn handle_data<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        packet: &[u8],
    ) -> Result<(), Error> {
        if packet.len() > self.config.max_packet {
            // A pending vector or digest is consumed by the malformed packet.
            if let Activity::ChainVector { .. } | Activity::Digest { .. } = self.session.activity {
                self.session.activity = Activity::Idle;
            }
            return Err(dfu_protocol::Error::TooLong {
                maximum: self.config.max_packet,
                actual: packet.len(),
            }
            .into());
        }

        match self.session.activity {
            Activity::ChainVector { len } => {
                // A malformed vector is not retried, the peer has to start over with `IV`.
                self.session.activity = Activity::Idle;
                let iv: [u8; IV_LEN] = match packet.try_into() {
                    Ok(iv) if packet.len() == len => iv,
                    _ => {
                        return Err(Error::BadChainVectorLength {
                            expected: len,
                            actual: packet.len(),
                        })
                    }
                };
                self.cipher.seed(iv);
                debug!("Chaining vector set");
                Ok(())
            }
            Activity::Digest { address, size, len } => {
                self.session.activity = Activity::Idle;
                let expected: [u8; DIGEST_LEN] = match packet.try_into() {
                    Ok(digest) if packet.len() == len => digest,
                    _ => {
                        return Err(Error::BadDigestLength {
                            expected: len,
                            actual: packet.len(),
                        })
                    }
                };
                self.check_digest(flash, link, address, size, &expected).await
            }
            Activity::Transfer { base, len } => self.payload(flash, link, base + len, packet).await,
            Activity::Idle => Err(Error::NoTransfer),
        }
    }

    async fn payload<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        limit: u32,
        packet: &[u8],
    ) -> Result<(), Error> {
        let PayloadPacket { address, payload } = PayloadPacket::decode(packet)?;
        let cursor = self.session.cursor;

        if address > cursor {
            // The peer skipped a packet. Its payload is dropped and it is told where to resume.
            warn!("Packet address {:#x} != expected {:#x}", address, cursor);
            link.notify(Progress::Resync { address: cursor });
            return Ok(());
        }
        if address < cursor {
            match self.pipeline.buffered_from() {
                Some(from) if address >= from => {
                    debug!("Rewinding from {:#x} to {:#x}", cursor, address);
                }
                // Already decrypted and programmed; the chaining state for it is gone.
                _ => {
                    debug!("Dropping resent packet at {:#x}", address);
                    return Ok(());
                }
            }
        }

        let end = address
            .checked_add(payload.len() as u32)
            .filter(|end| *end <= limit)
            .ok_or(Error::Overrun {
                end: address.wrapping_add(payload.len() as u32),
                limit,
            })?;

        self.session.cursor = address;
        self.session.bytes_read += payload.len() as u32;
        let mut rest = payload;
        while !rest.is_empty() {
            self.pipeline.seek(flash, &mut self.cipher, self.session.cursor).await?;
            let taken = self.pipeline.write(self.session.cursor, rest)?;
            self.session.cursor += taken as u32;
            rest = &rest[taken..];
        }

        if end == limit {
            self.pipeline.flush(flash, &mut self.cipher).await?;
            self.session.activity = Activity::Idle;
            let throughput = self.throughput(link, limit - self.session.transfer_base);
            info!(
                "Transferred {} bytes in {} ms at {}/sec",
                throughput.bytes,
                throughput.elapsed_ms,
                throughput.bytes_per_sec()
            );
            link.report(&throughput);
        }
        Ok(())
    }

    async fn check_digest<F: NorFlash, L: Link>(
        &mut self,
        flash: &mut F,
        link: &mut L,
        address: u32,
        size: u32,
        expected: &[u8; DIGEST_LEN],
    ) -> Result<(), Error> {
        let actual = digest::sha256(flash, address, size).await?;
        if actual != *expected {
            self.session.digest_failed = true;
            self.session.verified = false;
            link.notify(Progress::DigestFailed { address });
            return Err(Error::DigestMismatch { address });
        }
        self.session.digest_failed = false;
        self.session.verified = true;
        info!("Digest of {} bytes at {:#x} verified", size, address);
        Ok(())
    }
}
