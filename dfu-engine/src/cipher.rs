// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use dfu_protocol::IV_LEN;

use crate::config::KEY_LEN;

type Decryptor = cbc::Decryptor<Aes256>;

/// AES-256-CBC decryption whose chaining state survives between spans.
pub(crate) struct ChainCipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl ChainCipher {
    pub(crate) fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key, iv: [0; IV_LEN] }
    }

    pub(crate) fn seed(&mut self, iv: [u8; IV_LEN]) {
        self.iv = iv;
    }

    /// Decrypt `span` in place. The last ciphertext block becomes the chaining
    /// vector of the next span, so consecutive spans decrypt as one stream.
    ///
    /// Returns `false` without touching `span` if it is not whole blocks.
    pub(crate) fn decrypt(&mut self, span: &mut [u8]) -> bool {
        if span.is_empty() || span.len() % IV_LEN != 0 {
            return false;
        }
        let mut next = [0; IV_LEN];
        next.copy_from_slice(&span[span.len() - IV_LEN..]);

        let decryptor = Decryptor::new(&self.key.into(), &self.iv.into());
        if decryptor.decrypt_padded_mut::<NoPadding>(span).is_err() {
            return false;
        }
        self.iv = next;
        true
    }
}
