/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use zeroize::Zeroizing;

use super::crypt_common::CryptCommon;
use super::crypt_des::CryptDes;
use super::crypt_des_crypt::{secret_to_key, reject_nul};
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_h64::CryptH64;
use super::crypt_handler::
{
    CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings,
    RoundsInfo, SaltInfo, SaltEncoding, settings_outside_policy, truncate_secret
};
use super::crypt_policy::SchemePolicy;
use super::crypt_error;

/// BSDi extended DES crypt: 24-bit rounds, 24-bit salt, the whole secret
/// is folded into the key.
///
/// Format: `_` RRRR SSSS CCCCCCCCCCC, rounds and salt are little-endian
/// hash64 integers.
///
/// Even rounds counts leak weak DES keys, generated rounds are always odd
/// and stored hashes with even rounds always need an update.
pub struct BsdiCrypt
{
    info: HandlerInfo,
}

impl BsdiCrypt
{
    pub const NAME: &'static str = "bsdi_crypt";

    pub const IDENT: &'static str = "_";

    const HASH_LEN: usize = 20;

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new(Self::NAME);

        info.ident = Some(Self::IDENT);
        info.rounds = Some(RoundsInfo{ min: 1, max: 0x00ff_ffff, default: 5001 });
        info.salt = Some(SaltInfo{ min_size: 4, max_size: 4, default_size: 4, encoding: SaltEncoding::Hash64 });

        return BsdiCrypt{ info: info };
    }

    /// Folds a secret of any length into the 8 bytes DES key.
    fn secret_to_key(secret: &[u8]) -> CryptResult<Zeroizing<[u8; 8]>>
    {
        let mut key = secret_to_key(secret);

        if secret.len() > 8
        {
            for chunk in secret[8..].chunks(8)
            {
                let encrypted = Zeroizing::new(CryptDes::des_cipher_block(&key, &key, 0, 1)?);
                let next = secret_to_key(chunk);

                for i in 0..8
                {
                    key[i] = encrypted[i] ^ next[i];
                }
            }
        }

        return Ok(key);
    }

    fn calc_checksum(&self, secret: &[u8], rounds: u32, salt: &str) -> CryptResult<String>
    {
        reject_nul(Self::NAME, secret)?;

        let salt_value = CryptH64::decode_int_le(salt)? as u32;
        let key = Self::secret_to_key(secret)?;

        let block = CryptDes::des_cipher_block(&key, &[0; 8], salt_value, rounds)?;

        return Ok(CryptH64::encode_int64(u64::from_be_bytes(block)));
    }

    fn split_hash<'h>(&self, hash: &'h str) -> CryptResult<(u32, &'h str, &'h str)>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: expected '_' and 19 hash64 chars", Self::NAME);
        }

        let rounds = CryptH64::decode_int_le(&hash[1..5])? as u32;

        if rounds == 0
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: zero rounds", Self::NAME);
        }

        return Ok((rounds, &hash[5..9], &hash[9..]));
    }
}

impl CryptHandler for BsdiCrypt
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return
            hash.len() == Self::HASH_LEN &&
            hash.starts_with(Self::IDENT) == true &&
            CryptCommon::is_charset(&hash[1..], CryptCommon::HASH64_CHARS) == true;
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let secret = truncate_secret(&self.info, secret, config.get_truncate_error())?;
        let rounds = config.rounds_required()?;
        let salt = config.salt_or_generate(&self.info)?;

        if rounds & 1 == 0
        {
            tracing::warn!(scheme = Self::NAME, rounds, "even rounds may reveal weak DES keys");
        }

        let checksum = self.calc_checksum(secret, rounds, &salt)?;

        return Ok(format!("{}{}{}{}", Self::IDENT, CryptH64::encode_int_le(rounds as u64, 4), salt, checksum));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let (rounds, salt, checksum) = self.split_hash(hash)?;

        let secret = truncate_secret(&self.info, secret, false)?;
        let expected = self.calc_checksum(secret, rounds, salt)?;

        return Ok(CryptCommon::consteq(expected.as_bytes(), checksum.as_bytes()));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let (rounds, salt, _) = self.split_hash(hash)?;

        let mut settings = HashSettings::new(Self::NAME);
        settings.rounds = Some(rounds);
        settings.salt_size = Some(salt.len());

        return Ok(settings);
    }

    fn needs_update(&self, hash: &str, policy: &SchemePolicy) -> CryptResult<bool>
    {
        if policy.deprecated == true
        {
            return Ok(true);
        }

        let settings = self.settings(hash)?;

        if settings.rounds.map(|r| r & 1 == 0).unwrap_or(false) == true
        {
            return Ok(true);
        }

        return Ok(settings_outside_policy(&settings, policy));
    }

    fn normalize_rounds(&self, rounds: u32) -> u32
    {
        return rounds | 1;
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;

#[test]
fn bsdi_crypt_known()
{
    let h = BsdiCrypt::new();
    let ctx = CryptUserContext::none();

    let vectors =
    [
        (&b"password"[..], 7250, "K0Ay", "_Gl/.K0Ay.aosctsbJ1k"),
        (&b"correct horse battery"[..], 7250, "K0Ay", "_Gl/.K0Ayd.4dNrhY.8U"),
        (&b"password"[..], 1, "K0Ay", "_/...K0Ayd4d.TyFrAgA"),
        (&b"password"[..], 1, "....", "_/.......zqM49hRzxko"),
        (&b""[..], 1, "....", "_/.......X8NBuQ4l6uQ"),
    ];

    for (secret, rounds, salt, expected) in vectors.iter()
    {
        let cfg = h.configure(&CryptOptions::new().rounds(*rounds).salt(*salt)).unwrap();

        assert_eq!(h.hash(secret, &cfg, &ctx).unwrap(), *expected);
        assert_eq!(h.verify(secret, expected, &ctx).unwrap(), true);
        assert_eq!(h.verify(b"passwore", expected, &ctx).unwrap(), false);
    }
}

#[test]
fn bsdi_crypt_long_secret_matters()
{
    let h = BsdiCrypt::new();
    let ctx = CryptUserContext::none();

    assert_eq!(h.verify(b"correct horse battery", "_Gl/.K0Ayd.4dNrhY.8U", &ctx).unwrap(), true);
    assert_eq!(h.verify(b"correct horse", "_Gl/.K0Ayd.4dNrhY.8U", &ctx).unwrap(), false);
}

#[test]
fn bsdi_crypt_rounds()
{
    let h = BsdiCrypt::new();

    let cfg = h.configure(&CryptOptions::new()).unwrap();
    assert_eq!(cfg.get_rounds(), Some(5001));

    assert_eq!(h.configure(&CryptOptions::new().rounds(0)).err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
    assert_eq!(h.configure(&CryptOptions::new().rounds(0).relaxed(true)).unwrap().get_rounds(), Some(1));
    assert_eq!(h.configure(&CryptOptions::new().rounds(0x0100_0000)).is_err(), true);

    assert_eq!(h.normalize_rounds(5000), 5001);
    assert_eq!(h.normalize_rounds(5001), 5001);

    let s = h.settings("_Gl/.K0Ay.aosctsbJ1k").unwrap();
    assert_eq!(s.rounds, Some(7250));
    assert_eq!(s.salt_size, Some(4));

    // 7250 is even
    assert_eq!(h.needs_update("_Gl/.K0Ay.aosctsbJ1k", &SchemePolicy::default()).unwrap(), true);
    assert_eq!(h.needs_update("_/...K0Ayd4d.TyFrAgA", &SchemePolicy::default()).unwrap(), false);
}

#[test]
fn bsdi_crypt_identify()
{
    let h = BsdiCrypt::new();
    let ctx = CryptUserContext::none();

    assert_eq!(h.identify("_Gl/.K0Ay.aosctsbJ1k"), true);
    assert_eq!(h.identify("_Gl/.K0Ay.aosctsbJ1"), false);
    assert_eq!(h.identify("xGl/.K0Ay.aosctsbJ1k"), false);
    assert_eq!(h.identify("_Gl/.K0Ay.aosctsbJ1$"), false);
    assert_eq!(h.identify("_"), false);

    assert_eq!(h.verify(b"a", "_....K0Ay.aosctsbJ1k", &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
}
