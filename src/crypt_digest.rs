/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::num::NonZeroU32;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

#[cfg(not(feature = "use_ring"))]
use hmac::Hmac;
#[cfg(not(feature = "use_ring"))]
use pbkdf2::pbkdf2;

#[cfg(feature = "use_ring")]
use ring::pbkdf2 as ring_pbkdf2;

use super::crypt_error::{CryptResult, CryptErrorCode};
use super::{crypt_error, crypt_error_map};

/// A digest backend used by the schemes.
pub trait CryptDigest
{
    /// A name as it appears in the hash strings (IANA style).
    const DIGEST_NAME: &'static str;

    /// The length of the raw digest.
    const OUTPUT_SIZE: usize;

    /// A function which hashes the data using the hash function.
    fn hash(data: &[u8]) -> Vec<u8>;
}

/// A digest backend which can be used as PBKDF2 PRF (via HMAC).
pub trait CryptPbkdf2: CryptDigest
{
    /// A function which does PBKDF2 key derivation using the hash function.
    /// The derived key has the [CryptDigest::OUTPUT_SIZE] length.
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>;
}

/// MD5, used only by unsalted legacy schemes.
pub struct CryptMd5;

impl CryptDigest for CryptMd5
{
    const DIGEST_NAME: &'static str = "md5";
    const OUTPUT_SIZE: usize = 16;

    fn hash(data: &[u8]) -> Vec<u8>
    {
        let hash = Md5::digest(data);

        return Vec::from(hash.as_slice());
    }
}

/// SHA-1 digest and PBKDF2-HMAC-SHA1.
pub struct CryptSha1;

impl CryptDigest for CryptSha1
{
    const DIGEST_NAME: &'static str = "sha-1";
    const OUTPUT_SIZE: usize = 20;

    fn hash(data: &[u8]) -> Vec<u8>
    {
        let hash = Sha1::digest(data);

        return Vec::from(hash.as_slice());
    }
}

impl CryptPbkdf2 for CryptSha1
{
    #[cfg(not(feature = "use_ring"))]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut result = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        pbkdf2::<Hmac<Sha1>>(password, salt, iterations.get(), result.as_mut_slice())
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::ExternalError, "pbkdf2 Hmac::<Sha1> err, {}", e)
            )?;

        return Ok(result);
    }

    #[cfg(feature = "use_ring")]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut salted = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        ring_pbkdf2::derive(ring_pbkdf2::PBKDF2_HMAC_SHA1, iterations, salt, password, salted.as_mut_slice());

        return Ok(salted);
    }
}

/// SHA-256 digest and PBKDF2-HMAC-SHA256.
pub struct CryptSha256;

impl CryptDigest for CryptSha256
{
    const DIGEST_NAME: &'static str = "sha-256";
    const OUTPUT_SIZE: usize = 32;

    fn hash(data: &[u8]) -> Vec<u8>
    {
        let hash = Sha256::digest(data);

        return Vec::from(hash.as_slice());
    }
}

impl CryptPbkdf2 for CryptSha256
{
    #[cfg(not(feature = "use_ring"))]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut salted = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        pbkdf2::<Hmac<Sha256>>(password, salt, iterations.get(), salted.as_mut_slice())
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::ExternalError, "pbkdf2 Hmac::<Sha256> err, {}", e)
            )?;

        return Ok(salted);
    }

    #[cfg(feature = "use_ring")]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut salted = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        ring_pbkdf2::derive(ring_pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, password, salted.as_mut_slice());

        return Ok(salted);
    }
}

/// SHA-512 digest and PBKDF2-HMAC-SHA512.
pub struct CryptSha512;

impl CryptDigest for CryptSha512
{
    const DIGEST_NAME: &'static str = "sha-512";
    const OUTPUT_SIZE: usize = 64;

    fn hash(data: &[u8]) -> Vec<u8>
    {
        let hash = Sha512::digest(data);

        return Vec::from(hash.as_slice());
    }
}

impl CryptPbkdf2 for CryptSha512
{
    #[cfg(not(feature = "use_ring"))]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut salted = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        pbkdf2::<Hmac<Sha512>>(password, salt, iterations.get(), salted.as_mut_slice())
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::ExternalError, "pbkdf2 Hmac::<Sha512> err, {}", e)
            )?;

        return Ok(salted);
    }

    #[cfg(feature = "use_ring")]
    fn derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let mut salted = Zeroizing::new(vec![0; Self::OUTPUT_SIZE]);

        ring_pbkdf2::derive(ring_pbkdf2::PBKDF2_HMAC_SHA512, iterations, salt, password, salted.as_mut_slice());

        return Ok(salted);
    }
}

/// A runtime selector of the digest for the schemes which store the
/// digest name inside of the hash string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CryptDigestAlg
{
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl fmt::Display for CryptDigestAlg
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}", self.iana_name())
    }
}

impl CryptDigestAlg
{
    /// Resolves a digest by a loosely written name: `sha1`, `SHA-1`,
    /// `sha_256` are accepted.
    pub
    fn from_name(name: &str) -> Option<Self>
    {
        let norm: String =
            name.chars()
                .filter(|c| *c != '-' && *c != '_')
                .map(|c| c.to_ascii_lowercase())
                .collect();

        return
            match norm.as_str()
            {
                "md5" => Some(Self::Md5),
                "sha1" => Some(Self::Sha1),
                "sha256" => Some(Self::Sha256),
                "sha512" => Some(Self::Sha512),
                _ => None,
            };
    }

    pub
    fn iana_name(&self) -> &'static str
    {
        return
            match *self
            {
                Self::Md5 => CryptMd5::DIGEST_NAME,
                Self::Sha1 => CryptSha1::DIGEST_NAME,
                Self::Sha256 => CryptSha256::DIGEST_NAME,
                Self::Sha512 => CryptSha512::DIGEST_NAME,
            };
    }

    pub
    fn output_size(&self) -> usize
    {
        return
            match *self
            {
                Self::Md5 => CryptMd5::OUTPUT_SIZE,
                Self::Sha1 => CryptSha1::OUTPUT_SIZE,
                Self::Sha256 => CryptSha256::OUTPUT_SIZE,
                Self::Sha512 => CryptSha512::OUTPUT_SIZE,
            };
    }

    pub
    fn hash(&self, data: &[u8]) -> Vec<u8>
    {
        return
            match *self
            {
                Self::Md5 => CryptMd5::hash(data),
                Self::Sha1 => CryptSha1::hash(data),
                Self::Sha256 => CryptSha256::hash(data),
                Self::Sha512 => CryptSha512::hash(data),
            };
    }

    /// PBKDF2-HMAC with this digest. MD5 is not offered as a PRF.
    pub
    fn derive(&self, password: &[u8], salt: &[u8], iterations: NonZeroU32) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        match *self
        {
            Self::Md5 =>
                crypt_error!(CryptErrorCode::InvalidConfig, "pbkdf2 with {} is not supported", self),
            Self::Sha1 => return CryptSha1::derive(password, salt, iterations),
            Self::Sha256 => return CryptSha256::derive(password, salt, iterations),
            Self::Sha512 => return CryptSha512::derive(password, salt, iterations),
        }
    }
}

#[test]
fn digest_known()
{
    assert_eq!(hex::encode(CryptMd5::hash(b"password")), "5f4dcc3b5aa765d61d8327deb882cf99");
    assert_eq!(hex::encode(CryptSha1::hash(b"password")), "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8");
    assert_eq!(
        hex::encode(CryptDigestAlg::Sha256.hash(b"password")),
        "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
    );
}

#[test]
fn pbkdf2_known()
{
    let iter = NonZeroU32::new(1000).unwrap();

    let res = CryptSha1::derive(b"password", b"saltsaltsaltsalt", iter).unwrap();
    assert_eq!(crate::CryptCommon::ab64_encode(&res), "2FWw/oC7TQkskizC.81lWlmFAMM");

    let res = CryptSha256::derive(b"password", b"saltsaltsaltsalt", iter).unwrap();
    assert_eq!(crate::CryptCommon::ab64_encode(&res), "8nX7hwFEzIB8aPajJTYK8weHQc5Ngz0pFVAKvSu4jQA");

    let res = CryptDigestAlg::Sha512.derive(b"password", b"saltsaltsaltsalt", iter).unwrap();
    assert_eq!(res.len(), 64);
    assert_eq!(
        crate::CryptCommon::ab64_encode(&res),
        "715rqIr5dXOVPpBhqqsugl037zT5bWJTWYmZtIcK8hBnisKpwfY7kokvwjDrNHqHhF50Pb7MD6HvkJwiDQw4ww"
    );

    assert_eq!(CryptDigestAlg::Md5.derive(b"password", b"salt", iter).is_err(), true);
}

#[test]
fn digest_names()
{
    assert_eq!(CryptDigestAlg::from_name("SHA-1"), Some(CryptDigestAlg::Sha1));
    assert_eq!(CryptDigestAlg::from_name("sha_256"), Some(CryptDigestAlg::Sha256));
    assert_eq!(CryptDigestAlg::from_name("sha512"), Some(CryptDigestAlg::Sha512));
    assert_eq!(CryptDigestAlg::from_name("sha-384"), None);
    assert_eq!(CryptDigestAlg::Sha512.to_string(), "sha-512");
}
