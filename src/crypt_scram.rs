/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A storage format for SCRAM credentials: one salt and rounds value and
//! a SaltedPassword digest for every configured algorithm.
//!
//! Format: `$scram$rounds$ab64salt$sha-1=ab64,sha-256=ab64,...`
//!
//! The password is used as raw UTF-8, no SASLprep normalization is
//! applied.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::num::NonZeroU32;

use zeroize::Zeroizing;

use super::crypt_common::CryptCommon;
use super::crypt_digest::CryptDigestAlg;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::
{
    CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings,
    RoundsInfo, SaltInfo, SaltEncoding, settings_outside_policy, truncate_secret
};
use super::crypt_parser::CryptMcfParser;
use super::crypt_policy::SchemePolicy;
use super::{crypt_error, crypt_error_map};

/// Parsed scram hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScramDigestInfo
{
    /// raw salt
    pub salt: Vec<u8>,

    pub rounds: u32,

    /// raw SaltedPassword per algorithm
    pub digests: BTreeMap<CryptDigestAlg, Vec<u8>>,
}

pub struct ScramHash
{
    info: HandlerInfo,
    default_algs: BTreeSet<CryptDigestAlg>,
}

impl ScramHash
{
    pub const NAME: &'static str = "scram";

    pub const IDENT: &'static str = "$scram$";

    /// The order in which the stored digests are tried by [CryptHandler::verify].
    const VERIFY_ORDER: [CryptDigestAlg; 3] = [CryptDigestAlg::Sha256, CryptDigestAlg::Sha512, CryptDigestAlg::Sha1];

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new(Self::NAME);

        info.ident = Some(Self::IDENT);
        info.rounds = Some(RoundsInfo{ min: 1, max: u32::MAX, default: 100000 });
        info.salt = Some(SaltInfo{ min_size: 0, max_size: 1024, default_size: 12, encoding: SaltEncoding::Ab64 });

        let default_algs: BTreeSet<CryptDigestAlg> =
            [CryptDigestAlg::Sha1, CryptDigestAlg::Sha256, CryptDigestAlg::Sha512].into_iter().collect();

        return ScramHash{ info: info, default_algs: default_algs };
    }

    /// Resolves a digest name which may be written as a SCRAM mechanism
    /// (`SCRAM-SHA-256`), an IANA name (`sha-256`) or a hashlib name
    /// (`sha256`).
    fn norm_alg(name: &str) -> CryptResult<CryptDigestAlg>
    {
        let trimmed = name.trim();

        let bare =
            match trimmed.get(..6)
            {
                Some(p) if p.eq_ignore_ascii_case("scram-") == true => &trimmed[6..],
                _ => trimmed,
            };

        match CryptDigestAlg::from_name(bare)
        {
            Some(CryptDigestAlg::Md5) | None =>
                crypt_error!(CryptErrorCode::InvalidConfig, "{}: unsupported digest: '{}'", Self::NAME, name),
            Some(alg) => return Ok(alg),
        }
    }

    /// Parses a comma separated list of algorithms, `sha-1` is mandatory.
    fn norm_algs(list: &str) -> CryptResult<BTreeSet<CryptDigestAlg>>
    {
        let mut algs = BTreeSet::new();

        for name in list.split(',').filter(|n| n.trim().is_empty() == false)
        {
            algs.insert(Self::norm_alg(name)?);
        }

        if algs.contains(&CryptDigestAlg::Sha1) == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "{}: sha-1 must be in the algorithm list", Self::NAME);
        }

        return Ok(algs);
    }

    fn render_algs(algs: &BTreeSet<CryptDigestAlg>) -> String
    {
        return
            algs.iter()
                .map(|a| a.iana_name())
                .collect::<Vec<&str>>()
                .join(",");
    }

    /// Parses the hash into the raw components.
    ///
    /// # Arguments
    ///
    /// * `hash` - a scram hash
    ///
    /// # Returns
    ///
    /// * [CryptResult] - [ScramDigestInfo] or Error [CryptErrorCode::MalformedHash]
    pub
    fn parse(&self, hash: &str) -> CryptResult<ScramDigestInfo>
    {
        let mut parser = CryptMcfParser::from_raw(Self::NAME, hash, Self::IDENT, '$')?;

        let rounds = parser.next_rounds()?;
        let salt_str = parser.next_field()?;
        let chk_str = parser.next_field()?;

        parser.finish()?;

        if rounds == 0
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: zero rounds", Self::NAME);
        }

        let salt = CryptCommon::ab64_decode(salt_str)?;

        if chk_str.contains('=') == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: expected hash, got config string", Self::NAME);
        }

        let mut digests = BTreeMap::new();

        for pair in chk_str.split(',')
        {
            let (name, digest) =
                pair.split_once('=')
                    .ok_or_else(||
                        crypt_error_map!(CryptErrorCode::MalformedHash, "{}: malformed digest pair", Self::NAME)
                    )?;

            let alg =
                CryptDigestAlg::from_name(name)
                    .filter(|a| *a != CryptDigestAlg::Md5 && a.iana_name() == name)
                    .ok_or_else(||
                        crypt_error_map!(CryptErrorCode::MalformedHash, "{}: unsupported digest name", Self::NAME)
                    )?;

            let raw = CryptCommon::ab64_decode(digest)?;

            if raw.len() != alg.output_size()
            {
                crypt_error!(CryptErrorCode::MalformedHash, "{}: mis-sized {} digest", Self::NAME, alg);
            }

            if digests.insert(alg, raw).is_some() == true
            {
                crypt_error!(CryptErrorCode::MalformedHash, "{}: duplicate {} digest", Self::NAME, alg);
            }
        }

        if digests.contains_key(&CryptDigestAlg::Sha1) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: sha-1 digest is missing", Self::NAME);
        }

        return Ok(ScramDigestInfo{ salt: salt, rounds: rounds, digests: digests });
    }

    /// Returns `(salt, rounds, SaltedPassword)` for the algorithm requested
    /// by a SCRAM client.
    ///
    /// # Arguments
    ///
    /// * `hash` - a stored scram hash
    ///
    /// * `alg` - a digest name i.e `SCRAM-SHA-256`, `sha-256` or `sha256`
    pub
    fn extract_digest_info(&self, hash: &str, alg: &str) -> CryptResult<(Vec<u8>, u32, Vec<u8>)>
    {
        let alg = Self::norm_alg(alg)?;
        let mut parsed = self.parse(hash)?;

        match parsed.digests.remove(&alg)
        {
            Some(d) => return Ok((parsed.salt, parsed.rounds, d)),
            None => crypt_error!(CryptErrorCode::InvalidConfig, "{}: hash has no {} digest", Self::NAME, alg),
        }
    }

    /// Returns IANA names of the stored digests.
    pub
    fn extract_digest_algs(&self, hash: &str) -> CryptResult<Vec<&'static str>>
    {
        let parsed = self.parse(hash)?;

        return Ok(parsed.digests.keys().map(|a| a.iana_name()).collect());
    }

    /// Computes SCRAM `SaltedPassword := Hi(password, salt, i)`.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - raw digest or Error [CryptErrorCode::InvalidSecret]
    ///     if the password is not UTF-8
    pub
    fn derive_digest(password: &[u8], salt: &[u8], rounds: u32, alg: &str) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        let alg = Self::norm_alg(alg)?;

        return Self::derive_alg(password, salt, rounds, alg);
    }

    fn derive_alg(password: &[u8], salt: &[u8], rounds: u32, alg: CryptDigestAlg) -> CryptResult<Zeroizing<Vec<u8>>>
    {
        if std::str::from_utf8(password).is_err() == true
        {
            crypt_error!(CryptErrorCode::InvalidSecret, "{}: password is not valid UTF-8", Self::NAME);
        }

        let iterations =
            NonZeroU32::new(rounds)
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InvalidConfig, "{}: zero rounds", Self::NAME)
                )?;

        return alg.derive(password, salt, iterations);
    }

    /// Verifies every stored digest.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - Ok(true) if all digests match, Ok(false) if none,
    ///     Error [CryptErrorCode::MalformedHash] if they disagree
    pub
    fn verify_full(&self, secret: &[u8], hash: &str) -> CryptResult<bool>
    {
        let parsed = self.parse(hash)?;
        let secret = truncate_secret(&self.info, secret, false)?;

        let mut correct = false;
        let mut failed = false;

        for (alg, stored) in parsed.digests.iter()
        {
            let dk = Self::derive_alg(secret, &parsed.salt, parsed.rounds, *alg)?;

            if CryptCommon::consteq(&dk, stored) == true
            {
                correct = true;
            }
            else
            {
                failed = true;
            }
        }

        if correct == true && failed == true
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: hash verified inconsistently, may be corrupted", Self::NAME);
        }

        return Ok(correct);
    }

    fn desired_algs(&self, policy: &SchemePolicy) -> CryptResult<BTreeSet<CryptDigestAlg>>
    {
        return
            match policy.ident
            {
                Some(ref list) => Self::norm_algs(list),
                None => Ok(self.default_algs.clone()),
            };
    }
}

impl CryptHandler for ScramHash
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return hash.starts_with(Self::IDENT);
    }

    fn check_ident(&self, ident: &str) -> CryptResult<String>
    {
        return Ok(Self::render_algs(&Self::norm_algs(ident)?));
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let secret = truncate_secret(&self.info, secret, false)?;
        let rounds = config.rounds_required()?;
        let salt_str = config.salt_or_generate(&self.info)?;
        let salt = CryptCommon::ab64_decode(&salt_str)?;

        let algs =
            match config.get_ident()
            {
                Some(list) => Self::norm_algs(list)?,
                None => self.default_algs.clone(),
            };

        let mut pairs: Vec<String> = Vec::with_capacity(algs.len());

        for alg in algs.iter()
        {
            let dk = Self::derive_alg(secret, &salt, rounds, *alg)?;

            pairs.push(format!("{}={}", alg.iana_name(), CryptCommon::ab64_encode(&dk)));
        }

        return Ok(format!("{}{}${}${}", Self::IDENT, rounds, salt_str, pairs.join(",")));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let parsed = self.parse(hash)?;
        let secret = truncate_secret(&self.info, secret, false)?;

        for alg in Self::VERIFY_ORDER.iter()
        {
            if let Some(stored) = parsed.digests.get(alg)
            {
                let dk = Self::derive_alg(secret, &parsed.salt, parsed.rounds, *alg)?;

                return Ok(CryptCommon::consteq(&dk, stored));
            }
        }

        crypt_error!(CryptErrorCode::InternalError, "{}: sha-1 digest not found", Self::NAME);
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let parsed = self.parse(hash)?;

        let algs: BTreeSet<CryptDigestAlg> = parsed.digests.keys().copied().collect();

        let mut settings = HashSettings::new(Self::NAME);
        settings.rounds = Some(parsed.rounds);
        settings.salt_size = Some(parsed.salt.len());
        settings.ident = Some(Self::render_algs(&algs));

        return Ok(settings);
    }

    fn needs_update(&self, hash: &str, policy: &SchemePolicy) -> CryptResult<bool>
    {
        if policy.deprecated == true
        {
            return Ok(true);
        }

        let parsed = self.parse(hash)?;
        let desired = self.desired_algs(policy)?;

        if desired.iter().all(|a| parsed.digests.contains_key(a)) == false
        {
            return Ok(true);
        }

        let mut settings = HashSettings::new(Self::NAME);
        settings.rounds = Some(parsed.rounds);
        settings.salt_size = Some(parsed.salt.len());

        return Ok(settings_outside_policy(&settings, policy));
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;

#[test]
fn scram_known()
{
    let h = ScramHash::new();
    let ctx = CryptUserContext::none();

    let cfg =
        h.configure(&CryptOptions::new().rounds(4096).salt("QSXCR.Q6sek8bf92")).unwrap();

    let hash = h.hash(b"pencil", &cfg, &ctx).unwrap();

    assert_eq!(
        hash,
        "$scram$4096$QSXCR.Q6sek8bf92$\
        sha-1=HZbuOlKbWl.eR8AfIposuKbhX30,\
        sha-256=qXUXrlcvnaxxWG00DdRgVioR2gnUpuX5r.3EZ1rdhVY,\
        sha-512=lzgniLFcvglRLS0gt.C4gy.NurS3OIOVRAU1zZOV4P.qFiVFO2/edGQSu/kD1LwdX0SNV/KsPdHSwEl5qRTuZQ"
    );

    assert_eq!(h.verify(b"pencil", &hash, &ctx).unwrap(), true);
    assert_eq!(h.verify(b"pencils", &hash, &ctx).unwrap(), false);
    assert_eq!(h.verify_full(b"pencil", &hash).unwrap(), true);
    assert_eq!(h.verify_full(b"pen", &hash).unwrap(), false);
}

#[test]
fn scram_sha1_only()
{
    let h = ScramHash::new();
    let ctx = CryptUserContext::none();
    let hash = "$scram$4096$QSXCR.Q6sek8bf92$sha-1=HZbuOlKbWl.eR8AfIposuKbhX30";

    assert_eq!(h.verify(b"pencil", hash, &ctx).unwrap(), true);
    assert_eq!(h.extract_digest_algs(hash).unwrap(), vec!["sha-1"]);

    // stored algs are not a superset of the default ones
    assert_eq!(h.needs_update(hash, &SchemePolicy::default()).unwrap(), true);

    let mut policy = SchemePolicy::default();
    policy.ident = Some("sha-1".to_string());
    assert_eq!(h.needs_update(hash, &policy).unwrap(), false);
}

#[test]
fn scram_digest_info()
{
    let h = ScramHash::new();
    let hash = "$scram$4096$QSXCR.Q6sek8bf92$sha-1=HZbuOlKbWl.eR8AfIposuKbhX30";

    let (salt, rounds, digest) = h.extract_digest_info(hash, "SCRAM-SHA-1").unwrap();
    assert_eq!(rounds, 4096);
    assert_eq!(CryptCommon::ab64_encode(&salt), "QSXCR.Q6sek8bf92");
    assert_eq!(CryptCommon::ab64_encode(&digest), "HZbuOlKbWl.eR8AfIposuKbhX30");

    let derived = ScramHash::derive_digest(b"pencil", &salt, rounds, "sha1").unwrap();
    assert_eq!(derived.as_slice(), digest.as_slice());

    assert_eq!(h.extract_digest_info(hash, "sha-256").is_err(), true);
    assert_eq!(h.extract_digest_info(hash, "md5").is_err(), true);
}

#[test]
fn scram_algs_option()
{
    let h = ScramHash::new();
    let ctx = CryptUserContext::none();

    let cfg = h.configure(&CryptOptions::new().rounds(10).ident("SHA-256, sha1")).unwrap();
    assert_eq!(cfg.get_ident(), Some("sha-1,sha-256"));

    let hash = h.hash(b"x", &cfg, &ctx).unwrap();
    assert_eq!(h.extract_digest_algs(&hash).unwrap(), vec!["sha-1", "sha-256"]);
    assert_eq!(h.settings(&hash).unwrap().ident.as_deref(), Some("sha-1,sha-256"));

    assert_eq!(h.configure(&CryptOptions::new().ident("sha-256")).is_err(), true);
    assert_eq!(h.configure(&CryptOptions::new().ident("sha-1,md5")).is_err(), true);
}

#[test]
fn scram_malformed()
{
    let h = ScramHash::new();
    let ctx = CryptUserContext::none();

    let bad =
    [
        "$scram$4096$QSXCR.Q6sek8bf92$sha-1,sha-256",
        "$scram$04096$QSXCR.Q6sek8bf92$sha-1=HZbuOlKbWl.eR8AfIposuKbhX30",
        "$scram$4096$QSXCR.Q6sek8bf92$sha-256=qXUXrlcvnaxxWG00DdRgVioR2gnUpuX5r.3EZ1rdhVY",
        "$scram$4096$QSXCR.Q6sek8bf92$sha-1=HZbuOlKbWl",
        "$scram$4096$QSXCR.Q6sek8bf92$SHA-1=HZbuOlKbWl.eR8AfIposuKbhX30",
        "$scram$4096$QSXCR.Q6sek8bf92",
    ];

    for b in bad.iter()
    {
        assert_eq!(h.verify(b"pencil", b, &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash, "{}", b);
    }

    assert_eq!(h.verify(b"\xff\xfe", "$scram$4096$QSXCR.Q6sek8bf92$sha-1=HZbuOlKbWl.eR8AfIposuKbhX30", &ctx)
        .err().unwrap().err_code(), CryptErrorCode::InvalidSecret);
}
