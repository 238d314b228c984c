/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Hash64 integer codecs used by the crypt(3) family. Each character
//! carries 6 bits, `./0-9A-Za-z` map to 0..63.

use super::crypt_common::CryptCommon;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_error;

pub struct CryptH64{}
impl CryptH64
{
    /// Returns the 6 bit value of the hash64 character.
    #[inline]
    pub
    fn decode_char(c: u8) -> Option<u8>
    {
        return
            match c
            {
                b'.' => Some(0),
                b'/' => Some(1),
                b'0'..=b'9' => Some(c - b'0' + 2),
                b'A'..=b'Z' => Some(c - b'A' + 12),
                b'a'..=b'z' => Some(c - b'a' + 38),
                _ => None,
            };
    }

    #[inline]
    fn encode_char(v: u64) -> char
    {
        return CryptCommon::HASH64_CHARS[(v & 0x3f) as usize] as char;
    }

    /// Encodes `count` digits of `value`, the least significant digit first.
    pub
    fn encode_int_le(value: u64, count: usize) -> String
    {
        let mut out = String::with_capacity(count);

        for i in 0..count
        {
            out.push(Self::encode_char(value >> (6 * i)));
        }

        return out;
    }

    /// Encodes `count` digits of `value`, the most significant digit first.
    pub
    fn encode_int_be(value: u64, count: usize) -> String
    {
        let mut out = String::with_capacity(count);

        for i in (0..count).rev()
        {
            out.push(Self::encode_char(value >> (6 * i)));
        }

        return out;
    }

    /// Encodes a 64-bit block as 11 big-endian digits. The block is
    /// shifted left by 2 so the last digit carries 2 zero pad bits.
    pub
    fn encode_int64(value: u64) -> String
    {
        let wide = (value as u128) << 2;
        let mut out = String::with_capacity(11);

        for i in (0..11).rev()
        {
            out.push(CryptCommon::HASH64_CHARS[((wide >> (6 * i)) & 0x3f) as usize] as char);
        }

        return out;
    }

    /// Decodes digits stored least significant first. At most 10 digits.
    ///
    /// # Returns
    ///
    /// * [CryptResult] Ok - value or Error [CryptErrorCode::MalformedHash]
    pub
    fn decode_int_le(data: &str) -> CryptResult<u64>
    {
        let mut value: u64 = 0;

        for (i, c) in Self::digits(data)?.into_iter().enumerate()
        {
            value |= (c as u64) << (6 * i);
        }

        return Ok(value);
    }

    /// Decodes digits stored most significant first. At most 10 digits.
    pub
    fn decode_int_be(data: &str) -> CryptResult<u64>
    {
        let mut value: u64 = 0;

        for c in Self::digits(data)?
        {
            value = (value << 6) | (c as u64);
        }

        return Ok(value);
    }

    fn digits(data: &str) -> CryptResult<Vec<u8>>
    {
        if data.len() > 10
        {
            crypt_error!(CryptErrorCode::InternalError, "h64 int wider than 60 bits: {}", data.len());
        }

        let mut out = Vec::with_capacity(data.len());

        for b in data.bytes()
        {
            match Self::decode_char(b)
            {
                Some(v) => out.push(v),
                None => crypt_error!(CryptErrorCode::MalformedHash,
                                    "invalid h64 char: 0x{:02x}", b),
            }
        }

        return Ok(out);
    }
}

#[test]
fn h64_chars()
{
    for (i, c) in CryptCommon::HASH64_CHARS.iter().enumerate()
    {
        assert_eq!(CryptH64::decode_char(*c), Some(i as u8));
    }

    assert_eq!(CryptH64::decode_char(b'$'), None);
    assert_eq!(CryptH64::decode_char(b'_'), None);
}

#[test]
fn h64_int_le()
{
    // bsdi rounds 7250
    assert_eq!(CryptH64::encode_int_le(7250, 4), "Gl/.");
    assert_eq!(CryptH64::decode_int_le("Gl/.").unwrap(), 7250);
    // des salt "xO"
    assert_eq!(CryptH64::decode_int_le("xO").unwrap(), 61 | (26 << 6));
    assert_eq!(CryptH64::decode_int_le("..").unwrap(), 0);
    assert_eq!(CryptH64::decode_int_le("a$").is_err(), true);
}

#[test]
fn h64_int_be()
{
    assert_eq!(CryptH64::encode_int_be(1, 2), ".0");
    assert_eq!(CryptH64::decode_int_be(".0").unwrap(), 1);
    assert_eq!(CryptH64::decode_int_be("zz").unwrap(), 4095);
}

#[test]
fn h64_int64()
{
    assert_eq!(CryptH64::encode_int64(0x8ca64de9c1b123a7), "X8NBuQ4l6uQ");
    assert_eq!(CryptH64::encode_int64(0), "...........");
}
