/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::marker::PhantomData;
use std::num::NonZeroU32;

use super::crypt_common::CryptCommon;
use super::crypt_digest::{CryptPbkdf2, CryptSha1, CryptSha256, CryptSha512};
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::
{
    CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings,
    RoundsInfo, SaltInfo, SaltEncoding, truncate_secret
};
use super::crypt_parser::{parse_mc3, render_mc3, CryptMc3};
use super::{crypt_error, crypt_error_map};

/// PBKDF2-HMAC in the modular crypt format:
/// `$pbkdf2[-digest]$rounds$ab64salt$ab64checksum`.
///
/// D: CryptPbkdf2 is the PRF digest.
pub struct Pbkdf2Handler<D: CryptPbkdf2>
{
    info: HandlerInfo,
    ident: &'static str,
    digest: PhantomData<D>,
}

pub type Pbkdf2Sha1 = Pbkdf2Handler<CryptSha1>;
pub type Pbkdf2Sha256 = Pbkdf2Handler<CryptSha256>;
pub type Pbkdf2Sha512 = Pbkdf2Handler<CryptSha512>;

impl Pbkdf2Handler<CryptSha1>
{
    pub const NAME: &'static str = "pbkdf2_sha1";

    pub
    fn pbkdf2_sha1() -> Self
    {
        return Self::new(Self::NAME, "$pbkdf2$", 131000);
    }
}

impl Pbkdf2Handler<CryptSha256>
{
    pub const NAME: &'static str = "pbkdf2_sha256";

    pub
    fn pbkdf2_sha256() -> Self
    {
        return Self::new(Self::NAME, "$pbkdf2-sha256$", 29000);
    }
}

impl Pbkdf2Handler<CryptSha512>
{
    pub const NAME: &'static str = "pbkdf2_sha512";

    pub
    fn pbkdf2_sha512() -> Self
    {
        return Self::new(Self::NAME, "$pbkdf2-sha512$", 25000);
    }
}

impl<D: CryptPbkdf2> Pbkdf2Handler<D>
{
    /// Creates a handler with the given name, tag and default rounds.
    pub
    fn new(name: &'static str, ident: &'static str, default_rounds: u32) -> Self
    {
        let mut info = HandlerInfo::new(name);

        info.ident = Some(ident);
        info.rounds = Some(RoundsInfo{ min: 1, max: u32::MAX, default: default_rounds });
        info.salt = Some(SaltInfo{ min_size: 0, max_size: 1024, default_size: 16, encoding: SaltEncoding::Ab64 });

        return
            Pbkdf2Handler
            {
                info: info,
                ident: ident,
                digest: PhantomData,
            };
    }

    fn parse<'h>(&self, hash: &'h str) -> CryptResult<(CryptMc3<'h>, Vec<u8>)>
    {
        let parsed = parse_mc3(self.info.name, hash, self.ident, '$')?;

        if parsed.rounds == 0
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: zero rounds", self.info.name);
        }

        let salt = CryptCommon::ab64_decode(parsed.salt)?;

        if salt.len() > 1024
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: salt too large", self.info.name);
        }

        return Ok((parsed, salt));
    }

    fn derive(&self, secret: &[u8], salt: &[u8], rounds: u32) -> CryptResult<zeroize::Zeroizing<Vec<u8>>>
    {
        let iterations =
            NonZeroU32::new(rounds)
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InvalidConfig, "{}: zero rounds", self.info.name)
                )?;

        return D::derive(secret, salt, iterations);
    }
}

impl<D: CryptPbkdf2 + Send + Sync> CryptHandler for Pbkdf2Handler<D>
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return hash.starts_with(self.ident);
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let secret = truncate_secret(&self.info, secret, false)?;
        let rounds = config.rounds_required()?;
        let salt_str = config.salt_or_generate(&self.info)?;
        let salt = CryptCommon::ab64_decode(&salt_str)?;

        let dk = self.derive(secret, &salt, rounds)?;
        let checksum = CryptCommon::ab64_encode(&dk);

        return Ok(render_mc3(self.ident, rounds, &salt_str, Some(&checksum), '$'));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let (parsed, salt) = self.parse(hash)?;

        let stored =
            match parsed.checksum
            {
                Some(chk) => CryptCommon::ab64_decode(chk)?,
                None => crypt_error!(CryptErrorCode::MalformedHash,
                                    "{}: expected hash, got config string", self.info.name),
            };

        if stored.len() != D::OUTPUT_SIZE
        {
            crypt_error!(CryptErrorCode::MalformedHash,
                "{}: checksum size mismatch, expected: {}, got: {}", self.info.name, D::OUTPUT_SIZE, stored.len());
        }

        let secret = truncate_secret(&self.info, secret, false)?;
        let dk = self.derive(secret, &salt, parsed.rounds)?;

        return Ok(CryptCommon::consteq(&dk, &stored));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let (parsed, salt) = self.parse(hash)?;

        let mut settings = HashSettings::new(self.info.name);
        settings.rounds = Some(parsed.rounds);
        settings.salt_size = Some(salt.len());

        return Ok(settings);
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;
#[cfg(test)]
use super::crypt_policy::SchemePolicy;

#[test]
fn pbkdf2_known()
{
    let ctx = CryptUserContext::none();

    let h = Pbkdf2Sha256::pbkdf2_sha256();
    let hash = "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ";

    assert_eq!(h.identify(hash), true);
    assert_eq!(h.verify(b"password", hash, &ctx).unwrap(), true);
    assert_eq!(h.verify(b"Password", hash, &ctx).unwrap(), false);

    let cfg = h.configure(&CryptOptions::new().rounds(1212).salt("4vjV83LKPjQzk31VI4E0Vw")).unwrap();
    assert_eq!(h.hash(b"password", &cfg, &ctx).unwrap(), hash);

    let h = Pbkdf2Sha1::pbkdf2_sha1();
    let hash = "$pbkdf2$1212$OB.dtnSEXZK8U5cgxU/GYQ$y5LKPOplRmok7CZp/aqVDVg8zGI";

    assert_eq!(h.verify(b"password", hash, &ctx).unwrap(), true);

    let h = Pbkdf2Sha512::pbkdf2_sha512();
    let cfg = h.configure(&CryptOptions::new().rounds(1000).salt("c2FsdHNhbHRzYWx0c2FsdA")).unwrap();

    assert_eq!(
        h.hash(b"password", &cfg, &ctx).unwrap(),
        "$pbkdf2-sha512$1000$c2FsdHNhbHRzYWx0c2FsdA$715rqIr5dXOVPpBhqqsugl037zT5bWJTWYmZtIcK8hBnisKpwfY7kokvwjDrNHqHhF50Pb7MD6HvkJwiDQw4ww"
    );
}

#[test]
fn pbkdf2_disjoint_idents()
{
    let sha1 = Pbkdf2Sha1::pbkdf2_sha1();
    let sha256 = Pbkdf2Sha256::pbkdf2_sha256();

    assert_eq!(sha1.identify("$pbkdf2-sha256$1$salt$chk"), false);
    assert_eq!(sha256.identify("$pbkdf2$1$salt$chk"), false);
}

#[test]
fn pbkdf2_malformed()
{
    let h = Pbkdf2Sha256::pbkdf2_sha256();
    let ctx = CryptUserContext::none();

    let bad =
    [
        "$pbkdf2-sha256$01212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ",
        "$pbkdf2-sha256$0$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ",
        "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw",
        "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$",
        "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68Oi",
        "$pbkdf2-sha256$1212$4vjV8*LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ",
        "$pbkdf2-sha256$",
    ];

    for b in bad.iter()
    {
        assert_eq!(h.verify(b"password", b, &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash, "{}", b);
    }
}

#[test]
fn pbkdf2_roundtrip_and_update()
{
    let h = Pbkdf2Sha256::pbkdf2_sha256();
    let ctx = CryptUserContext::none();
    let cfg = h.configure(&CryptOptions::new().rounds(1000)).unwrap();

    let hash = h.hash(b"s3cr3t", &cfg, &ctx).unwrap();

    assert_eq!(h.verify(b"s3cr3t", &hash, &ctx).unwrap(), true);

    let s = h.settings(&hash).unwrap();
    assert_eq!(s.rounds, Some(1000));
    assert_eq!(s.salt_size, Some(16));

    let mut policy = SchemePolicy::default();
    assert_eq!(h.needs_update(&hash, &policy).unwrap(), false);

    policy.min_rounds = Some(2000);
    assert_eq!(h.needs_update(&hash, &policy).unwrap(), true);

    policy.min_rounds = None;
    policy.salt_size = Some(32);
    assert_eq!(h.needs_update(&hash, &policy).unwrap(), true);

    policy.salt_size = None;
    policy.deprecated = true;
    assert_eq!(h.needs_update(&hash, &policy).unwrap(), true);
}
