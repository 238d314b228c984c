/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use getrandom::getrandom;
use subtle::ConstantTimeEq;

use super::crypt_error::{CryptResult, CryptErrorCode};
use super::{crypt_error, crypt_error_map};

pub struct CryptCommon{}
impl CryptCommon
{
    /// A hard limit for any secret passed to any scheme.
    pub const MAX_PASSWORD_SIZE: usize = 4096;

    /// The hash64 alphabet used by the crypt(3) family.
    pub const HASH64_CHARS: &'static [u8; 64] =
        b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    /// A secret which is used to produce sample and dummy hashes.
    pub const SAMPLE_SECRET: &'static [u8] = b"too many secrets";

    /// Generates random secuence of bytes
    ///
    /// # Arguments
    ///
    /// * `len` - a length of the array
    ///
    /// # Returns
    ///
    /// * [CryptResult] Ok - elements or Error
    pub
    fn cc_random(len: usize) -> CryptResult<Vec<u8>>
    {
        let mut data = vec![0_u8; len];

        getrandom(&mut data)
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::ExternalError, "getrandom err, {}", e)
            )?;

        return Ok(data);
    }

    /// Generates a random string of `len` characters taken from `charset`.
    /// The `charset` length must divide 256 to keep the distribution uniform,
    /// both alphabets of this module do.
    ///
    /// # Arguments
    ///
    /// * `len` - amount of characters
    ///
    /// * `charset` - an alphabet
    ///
    /// # Returns
    ///
    /// * [CryptResult] Ok - a random string or Error
    pub
    fn cc_random_string(len: usize, charset: &[u8]) -> CryptResult<String>
    {
        if charset.is_empty() == true
        {
            crypt_error!(CryptErrorCode::InternalError, "empty charset");
        }

        let raw = Self::cc_random(len)?;

        let out: String =
            raw.iter()
                .map(|b| charset[(*b as usize) % charset.len()] as char)
                .collect();

        return Ok(out);
    }

    /// Picks a random number in the inclusive range `[lower, upper]`.
    ///
    /// # Returns
    ///
    /// * [CryptResult] Ok - a number or Error
    pub
    fn cc_random_range(lower: u32, upper: u32) -> CryptResult<u32>
    {
        if lower >= upper
        {
            return Ok(lower);
        }

        let raw = Self::cc_random(8)?;
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(&raw);

        let span = (upper - lower) as u64 + 1;

        return Ok(lower + (u64::from_le_bytes(buf) % span) as u32);
    }

    /// Compares two byte sequences in constant time. Sequences of
    /// different length are never equal.
    pub
    fn consteq(left: &[u8], right: &[u8]) -> bool
    {
        return bool::from(left.ct_eq(right));
    }

    /// Rejects secrets which exceed [CryptCommon::MAX_PASSWORD_SIZE].
    pub
    fn validate_secret(secret: &[u8]) -> CryptResult<()>
    {
        if secret.len() > Self::MAX_PASSWORD_SIZE
        {
            crypt_error!(CryptErrorCode::PasswordTooLong,
                "password exceeds max allowed size: {} > {}", secret.len(), Self::MAX_PASSWORD_SIZE);
        }

        return Ok(());
    }

    /// Encodes data with the adapted base64: the standard alphabet with
    /// `.` instead of `+` and without padding.
    pub
    fn ab64_encode(data: &[u8]) -> String
    {
        return STANDARD_NO_PAD.encode(data).replace('+', ".");
    }

    /// Decodes the adapted base64.
    ///
    /// # Returns
    ///
    /// * [CryptResult] Ok - the raw bytes, or Error [CryptErrorCode::MalformedHash]
    pub
    fn ab64_decode(data: &str) -> CryptResult<Vec<u8>>
    {
        if data.contains('+') == true
        {
            crypt_error!(CryptErrorCode::MalformedHash, "unexpected char '+' in ab64 string");
        }

        return
            STANDARD_NO_PAD
                .decode(data.replace('.', "+"))
                .map_err(|e|
                    crypt_error_map!(CryptErrorCode::MalformedHash, "ab64 decode err, {}", e)
                );
    }

    /// Checks that every char of `data` belongs to `charset`.
    pub
    fn is_charset(data: &str, charset: &[u8]) -> bool
    {
        return data.bytes().all(|b| charset.contains(&b));
    }
}

#[test]
fn random_lengths()
{
    let raw = CryptCommon::cc_random(16).unwrap();
    assert_eq!(raw.len(), 16);

    let salt = CryptCommon::cc_random_string(22, CryptCommon::HASH64_CHARS).unwrap();
    assert_eq!(salt.len(), 22);
    assert_eq!(CryptCommon::is_charset(&salt, CryptCommon::HASH64_CHARS), true);
}

#[test]
fn random_range_bounds()
{
    for _ in 0..200
    {
        let r = CryptCommon::cc_random_range(10, 13).unwrap();
        assert_eq!(r >= 10 && r <= 13, true, "{}", r);
    }

    assert_eq!(CryptCommon::cc_random_range(7, 7).unwrap(), 7);
    assert_eq!(CryptCommon::cc_random_range(9, 3).unwrap(), 9);
    assert_eq!(CryptCommon::cc_random_range(0, u32::MAX).is_ok(), true);
}

#[test]
fn consteq_lengths()
{
    assert_eq!(CryptCommon::consteq(b"abc", b"abc"), true);
    assert_eq!(CryptCommon::consteq(b"abc", b"abd"), false);
    assert_eq!(CryptCommon::consteq(b"abc", b"abcd"), false);
    assert_eq!(CryptCommon::consteq(b"", b""), true);
}

#[test]
fn ab64_known()
{
    assert_eq!(CryptCommon::ab64_encode(b"saltsaltsaltsalt"), "c2FsdHNhbHRzYWx0c2FsdA");

    let raw = CryptCommon::ab64_decode("4vjV83LKPjQzk31VI4E0Vw").unwrap();
    assert_eq!(raw.len(), 16);
    assert_eq!(CryptCommon::ab64_encode(&raw), "4vjV83LKPjQzk31VI4E0Vw");

    assert_eq!(CryptCommon::ab64_decode("ab+c").is_err(), true);
    assert_eq!(CryptCommon::ab64_decode("a").is_err(), true);
    assert_eq!(CryptCommon::ab64_decode("c2Fs$").is_err(), true);
}

#[test]
fn secret_limit()
{
    let big = vec![b'a'; CryptCommon::MAX_PASSWORD_SIZE + 1];
    let err = CryptCommon::validate_secret(&big).err().unwrap();

    assert_eq!(err.err_code(), CryptErrorCode::PasswordTooLong);
    assert_eq!(CryptCommon::validate_secret(&big[1..]).is_ok(), true);
}
