/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Unsalted legacy formats: plain hex digests, the PostgreSQL MD5 format
//! and the plaintext catch-all.

use zeroize::Zeroizing;

use super::crypt_common::CryptCommon;
use super::crypt_digest::CryptDigestAlg;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::{CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings, truncate_secret};
use super::{crypt_error, crypt_error_map};

#[inline]
fn is_hex(data: &str) -> bool
{
    return data.bytes().all(|b| b.is_ascii_hexdigit());
}

/// An unsalted hex encoded digest of the secret.
pub struct HexDigest
{
    info: HandlerInfo,
    alg: CryptDigestAlg,
}

impl HexDigest
{
    pub
    fn new(name: &'static str, alg: CryptDigestAlg) -> Self
    {
        return HexDigest{ info: HandlerInfo::new(name), alg: alg };
    }

    pub
    fn hex_md5() -> Self
    {
        return Self::new("hex_md5", CryptDigestAlg::Md5);
    }

    pub
    fn hex_sha1() -> Self
    {
        return Self::new("hex_sha1", CryptDigestAlg::Sha1);
    }

    pub
    fn hex_sha256() -> Self
    {
        return Self::new("hex_sha256", CryptDigestAlg::Sha256);
    }

    pub
    fn hex_sha512() -> Self
    {
        return Self::new("hex_sha512", CryptDigestAlg::Sha512);
    }

    fn check_hash(&self, hash: &str) -> CryptResult<()>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash,
                "{}: expected {} hex chars", self.info.name, self.alg.output_size() * 2);
        }

        return Ok(());
    }
}

impl CryptHandler for HexDigest
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return hash.len() == self.alg.output_size() * 2 && is_hex(hash) == true;
    }

    fn hash(&self, secret: &[u8], _config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let secret = truncate_secret(&self.info, secret, false)?;

        return Ok(hex::encode(Zeroizing::new(self.alg.hash(secret)).as_slice()));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        self.check_hash(hash)?;

        let secret = truncate_secret(&self.info, secret, false)?;
        let computed = hex::encode(Zeroizing::new(self.alg.hash(secret)).as_slice());

        return Ok(CryptCommon::consteq(computed.as_bytes(), hash.to_ascii_lowercase().as_bytes()));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        self.check_hash(hash)?;

        return Ok(HashSettings::new(self.info.name));
    }
}

/// PostgreSQL `md5` + hex(md5(password || username)). Requires the user
/// name in the [CryptUserContext].
pub struct PostgresMd5
{
    info: HandlerInfo,
}

impl PostgresMd5
{
    pub const NAME: &'static str = "postgres_md5";

    pub const IDENT: &'static str = "md5";

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new(Self::NAME);

        info.ident = Some(Self::IDENT);
        info.user_context = true;

        return PostgresMd5{ info: info };
    }

    fn calc_checksum(&self, secret: &[u8], ctx: &CryptUserContext) -> CryptResult<String>
    {
        let user =
            ctx.user()
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::MissingContext, "{}: user is required", Self::NAME)
                )?;

        let secret = truncate_secret(&self.info, secret, false)?;

        let mut data = Zeroizing::new(Vec::with_capacity(secret.len() + user.len()));
        data.extend_from_slice(secret);
        data.extend_from_slice(user.as_bytes());

        return Ok(hex::encode(Zeroizing::new(CryptDigestAlg::Md5.hash(&data)).as_slice()));
    }
}

impl CryptHandler for PostgresMd5
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return
            hash.len() == 35 &&
            hash.starts_with(Self::IDENT) == true &&
            is_hex(&hash[3..]) == true;
    }

    fn hash(&self, secret: &[u8], _config: &CryptConfig, ctx: &CryptUserContext) -> CryptResult<String>
    {
        return Ok(format!("{}{}", Self::IDENT, self.calc_checksum(secret, ctx)?));
    }

    fn verify(&self, secret: &[u8], hash: &str, ctx: &CryptUserContext) -> CryptResult<bool>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: expected 'md5' and 32 hex chars", Self::NAME);
        }

        let computed = self.calc_checksum(secret, ctx)?;

        return Ok(CryptCommon::consteq(computed.as_bytes(), hash[3..].to_ascii_lowercase().as_bytes()));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: expected 'md5' and 32 hex chars", Self::NAME);
        }

        return Ok(HashSettings::new(Self::NAME));
    }
}

/// Stores the secret as is. Claims any string, so it must be the last one
/// in every identification order.
pub struct Plaintext
{
    info: HandlerInfo,
}

impl Plaintext
{
    pub const NAME: &'static str = "plaintext";

    pub
    fn new() -> Self
    {
        return Plaintext{ info: HandlerInfo::new(Self::NAME) };
    }
}

impl CryptHandler for Plaintext
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, _hash: &str) -> bool
    {
        return true;
    }

    fn hash(&self, secret: &[u8], _config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let secret = truncate_secret(&self.info, secret, false)?;

        return
            std::str::from_utf8(secret)
                .map(|s| s.to_string())
                .map_err(|_|
                    crypt_error_map!(CryptErrorCode::InvalidSecret, "{}: password is not valid UTF-8", Self::NAME)
                );
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let secret = truncate_secret(&self.info, secret, false)?;

        return Ok(CryptCommon::consteq(secret, hash.as_bytes()));
    }

    fn settings(&self, _hash: &str) -> CryptResult<HashSettings>
    {
        return Ok(HashSettings::new(Self::NAME));
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;

#[test]
fn hex_digests_known()
{
    let ctx = CryptUserContext::none();
    let cfg_opts = CryptOptions::new();

    let vectors: [(HexDigest, &str); 4] =
    [
        (HexDigest::hex_md5(), "5f4dcc3b5aa765d61d8327deb882cf99"),
        (HexDigest::hex_sha1(), "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8"),
        (HexDigest::hex_sha256(), "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"),
        (
            HexDigest::hex_sha512(),
            "b109f3bbbc244eb82441917ed06d618b9008dd09b3befd1b5e07394c706a8bb9\
            80b1d7785e5976ec049b46df5f1326af5a2ea6d103fd07c95385ffab0cacbc86"
        ),
    ];

    for (h, expected) in vectors.iter()
    {
        let cfg = h.configure(&cfg_opts).unwrap();

        assert_eq!(h.hash(b"password", &cfg, &ctx).unwrap(), *expected);
        assert_eq!(h.identify(expected), true);
        assert_eq!(h.verify(b"password", expected, &ctx).unwrap(), true);
        assert_eq!(h.verify(b"password", &expected.to_ascii_uppercase(), &ctx).unwrap(), true);
        assert_eq!(h.verify(b"passwor", expected, &ctx).unwrap(), false);
    }

    let md5 = HexDigest::hex_md5();
    assert_eq!(md5.identify("5f4dcc3b5aa765d61d8327deb882cf9g"), false);
    assert_eq!(md5.verify(b"x", "abc", &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
    assert_eq!(md5.configure(&CryptOptions::new().rounds(1)).is_err(), true);
}

#[test]
fn postgres_md5_known()
{
    let h = PostgresMd5::new();
    let cfg = h.configure(&CryptOptions::new()).unwrap();
    let ctx = CryptUserContext::with_user("postgres");

    let hash = h.hash(b"password", &cfg, &ctx).unwrap();

    assert_eq!(hash, "md532e12f215ba27cb750c9e093ce4b5127");
    assert_eq!(h.verify(b"password", &hash, &ctx).unwrap(), true);
    assert_eq!(h.verify(b"password", &hash, &CryptUserContext::with_user("admin")).unwrap(), false);

    assert_eq!(
        h.verify(b"password", &hash, &CryptUserContext::none()).err().unwrap().err_code(),
        CryptErrorCode::MissingContext
    );
    assert_eq!(
        h.hash(b"password", &cfg, &CryptUserContext::none()).err().unwrap().err_code(),
        CryptErrorCode::MissingContext
    );

    assert_eq!(
        h.hash(b"mypass", &cfg, &CryptUserContext::with_user("user")).unwrap(),
        "md5453343d153608e56a54d0996a4a70a1c"
    );
}

#[test]
fn plaintext_roundtrip()
{
    let h = Plaintext::new();
    let ctx = CryptUserContext::none();
    let cfg = h.configure(&CryptOptions::new()).unwrap();

    assert_eq!(h.identify(""), true);
    assert_eq!(h.hash("пароль".as_bytes(), &cfg, &ctx).unwrap(), "пароль");
    assert_eq!(h.verify(b"abc", "abc", &ctx).unwrap(), true);
    assert_eq!(h.verify(b"abc", "abd", &ctx).unwrap(), false);
    assert_eq!(h.hash(b"\xff", &cfg, &ctx).err().unwrap().err_code(), CryptErrorCode::InvalidSecret);
}
