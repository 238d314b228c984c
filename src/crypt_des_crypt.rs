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
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_h64::CryptH64;
use super::crypt_handler::
{
    CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings,
    SaltInfo, SaltEncoding, truncate_secret
};
use super::crypt_error;

/// Converts up to 8 bytes of the secret into a DES key: each byte is
/// shifted into the 7 high bits, missing bytes are zero.
pub(crate)
fn secret_to_key(secret: &[u8]) -> Zeroizing<[u8; 8]>
{
    let mut key = Zeroizing::new([0_u8; 8]);

    for (k, c) in key.iter_mut().zip(secret.iter())
    {
        *k = c << 1;
    }

    return key;
}

/// Rejects secrets with the NUL byte which the crypt(3) family can not
/// represent.
pub(crate)
fn reject_nul(scheme: &str, secret: &[u8]) -> CryptResult<()>
{
    if secret.contains(&0) == true
    {
        crypt_error!(CryptErrorCode::InvalidSecret, "{}: NUL bytes are not allowed in the password", scheme);
    }

    return Ok(());
}

/// The traditional unix crypt(3): 12-bit salt, 25 DES rounds, only 8
/// bytes (7 bits each) of the secret are used.
///
/// Format: 2 salt chars and 11 checksum chars, all hash64.
pub struct DesCrypt
{
    info: HandlerInfo,
}

impl DesCrypt
{
    pub const NAME: &'static str = "des_crypt";

    /// DES encryptions of the zero block.
    pub const DES_ROUNDS: u32 = 25;

    const HASH_LEN: usize = 13;

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new(Self::NAME);

        info.salt = Some(SaltInfo{ min_size: 2, max_size: 2, default_size: 2, encoding: SaltEncoding::Hash64 });
        info.truncate_size = Some(8);

        return DesCrypt{ info: info };
    }

    fn calc_checksum(&self, secret: &[u8], salt: &str) -> CryptResult<String>
    {
        reject_nul(Self::NAME, secret)?;

        let salt_value = CryptH64::decode_int_le(salt)? as u32;
        let key = secret_to_key(secret);

        let schedule = CryptDes::schedule_key(&key);
        let block = CryptDes::encrypt_block(&schedule, CryptDes::apply_salt(salt_value), &[0; 8], Self::DES_ROUNDS)?;

        return Ok(CryptH64::encode_int64(u64::from_be_bytes(block)));
    }

    fn split_hash<'h>(&self, hash: &'h str) -> CryptResult<(&'h str, &'h str)>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: expected 13 hash64 chars", Self::NAME);
        }

        return Ok((&hash[..2], &hash[2..]));
    }
}

impl CryptHandler for DesCrypt
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return
            hash.len() == Self::HASH_LEN &&
            CryptCommon::is_charset(hash, CryptCommon::HASH64_CHARS) == true;
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        reject_nul(Self::NAME, secret)?;

        let secret = truncate_secret(&self.info, secret, config.get_truncate_error())?;
        let salt = config.salt_or_generate(&self.info)?;

        let checksum = self.calc_checksum(secret, &salt)?;

        return Ok(format!("{}{}", salt, checksum));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let (salt, checksum) = self.split_hash(hash)?;

        reject_nul(Self::NAME, secret)?;

        let secret = truncate_secret(&self.info, secret, false)?;
        let expected = self.calc_checksum(secret, salt)?;

        return Ok(CryptCommon::consteq(expected.as_bytes(), checksum.as_bytes()));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let (salt, _) = self.split_hash(hash)?;

        let mut settings = HashSettings::new(Self::NAME);
        settings.salt_size = Some(salt.len());

        return Ok(settings);
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;

#[test]
fn des_crypt_known()
{
    let h = DesCrypt::new();
    let ctx = CryptUserContext::none();

    let vectors =
    [
        (&b"password"[..], "xO", "xOAFZqRz5RduI"),
        (&b"test"[..], "aZ", "aZGJuE6EXrjEE"),
        (&b"rasmuslerdorf"[..], "rl", "rl.3StKT.4T8M"),
        (&b""[..], "..", "..X8NBuQ4l6uQ"),
    ];

    for (secret, salt, expected) in vectors.iter()
    {
        let cfg = h.configure(&CryptOptions::new().salt(*salt)).unwrap();

        assert_eq!(h.hash(secret, &cfg, &ctx).unwrap(), *expected);
        assert_eq!(h.verify(secret, expected, &ctx).unwrap(), true);
        assert_eq!(h.verify(b"wrong", expected, &ctx).unwrap(), false);
    }
}

#[test]
fn des_crypt_truncation()
{
    let h = DesCrypt::new();
    let ctx = CryptUserContext::none();

    assert_eq!(h.verify(b"password123", "xOAFZqRz5RduI", &ctx).unwrap(), true);

    let cfg = h.configure(&CryptOptions::new().salt("xO")).unwrap();
    assert_eq!(h.hash(b"password123", &cfg, &ctx).unwrap(), "xOAFZqRz5RduI");

    let cfg = h.configure(&CryptOptions::new().salt("xO").truncate_error(true)).unwrap();
    assert_eq!(
        h.hash(b"password123", &cfg, &ctx).err().unwrap().err_code(),
        CryptErrorCode::PasswordTooLong
    );
}

#[test]
fn des_crypt_rejects()
{
    let h = DesCrypt::new();
    let ctx = CryptUserContext::none();

    assert_eq!(h.identify("xOAFZqRz5RduI"), true);
    assert_eq!(h.identify("xOAFZqRz5Rdu"), false);
    assert_eq!(h.identify("xOAFZqRz5Rdu$"), false);
    assert_eq!(h.identify(""), false);

    assert_eq!(h.verify(b"x", "$1$abc", &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
    assert_eq!(h.verify(b"pa\0ss", "xOAFZqRz5RduI", &ctx).err().unwrap().err_code(), CryptErrorCode::InvalidSecret);
    assert_eq!(h.configure(&CryptOptions::new().rounds(10)).is_err(), true);
    assert_eq!(h.configure(&CryptOptions::new().salt("x")).is_err(), true);
}

#[test]
fn des_crypt_random_salt()
{
    let h = DesCrypt::new();
    let ctx = CryptUserContext::none();
    let cfg = h.configure(&CryptOptions::new()).unwrap();

    let hash = h.hash(b"secret", &cfg, &ctx).unwrap();

    assert_eq!(h.identify(&hash), true);
    assert_eq!(h.verify(b"secret", &hash, &ctx).unwrap(), true);
    assert_eq!(h.settings(&hash).unwrap().salt_size, Some(2));
}
