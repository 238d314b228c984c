/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use super::crypt_common::CryptCommon;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_policy::SchemePolicy;
use super::{crypt_error, crypt_error_map};

/// Bounds and default of the cost parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundsInfo
{
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

/// How the salt appears in the hash string. The size of a
/// [SaltEncoding::Hash64] salt is counted in chars, the size of a
/// [SaltEncoding::Ab64] salt in raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltEncoding
{
    Hash64,
    Ab64,
}

/// Bounds and default of the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltInfo
{
    pub min_size: usize,
    pub max_size: usize,
    pub default_size: usize,
    pub encoding: SaltEncoding,
}

impl SaltInfo
{
    /// Generates a fresh encoded salt of `size`.
    pub
    fn generate(&self, size: usize) -> CryptResult<String>
    {
        return
            match self.encoding
            {
                SaltEncoding::Hash64 =>
                    CryptCommon::cc_random_string(size, CryptCommon::HASH64_CHARS),
                SaltEncoding::Ab64 =>
                    Ok(CryptCommon::ab64_encode(&CryptCommon::cc_random(size)?)),
            };
    }

    /// Returns the size of an encoded salt or Error if it is not encoded
    /// properly.
    pub
    fn measure(&self, scheme: &str, salt: &str) -> CryptResult<usize>
    {
        match self.encoding
        {
            SaltEncoding::Hash64 =>
            {
                if CryptCommon::is_charset(salt, CryptCommon::HASH64_CHARS) == false
                {
                    crypt_error!(CryptErrorCode::MalformedHash, "{}: salt contains non hash64 chars", scheme);
                }

                return Ok(salt.len());
            },
            SaltEncoding::Ab64 =>
            {
                return Ok(CryptCommon::ab64_decode(salt)?.len());
            }
        }
    }
}

/// Static description of a scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo
{
    /// A unique scheme name.
    pub name: &'static str,

    /// The tag prefix, when the grammar has one.
    pub ident: Option<&'static str>,

    pub rounds: Option<RoundsInfo>,

    pub salt: Option<SaltInfo>,

    /// Only that many bytes of the secret are used.
    pub truncate_size: Option<usize>,

    /// The scheme mixes the user name into the digest.
    pub user_context: bool,
}

impl HandlerInfo
{
    pub
    fn new(name: &'static str) -> Self
    {
        return
            HandlerInfo
            {
                name: name,
                ident: None,
                rounds: None,
                salt: None,
                truncate_size: None,
                user_context: false,
            };
    }
}

/// Per call options for [CryptHandler::configure].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CryptOptions
{
    /// The cost parameter, scheme default when unset.
    pub rounds: Option<u32>,

    /// A pinned salt in its encoded form. For reproducible output only.
    pub salt: Option<String>,

    /// The size of a generated salt.
    pub salt_size: Option<usize>,

    /// The scheme variant.
    pub ident: Option<String>,

    /// Fail with [CryptErrorCode::PasswordTooLong] instead of truncating.
    pub truncate_error: Option<bool>,

    /// Clamp out of range values instead of failing.
    pub relaxed: bool,
}

impl CryptOptions
{
    pub
    fn new() -> Self
    {
        return Self::default();
    }

    pub
    fn rounds(mut self, rounds: u32) -> Self
    {
        self.rounds = Some(rounds);

        return self;
    }

    pub
    fn salt<S: Into<String>>(mut self, salt: S) -> Self
    {
        self.salt = Some(salt.into());

        return self;
    }

    pub
    fn salt_size(mut self, salt_size: usize) -> Self
    {
        self.salt_size = Some(salt_size);

        return self;
    }

    pub
    fn ident<S: Into<String>>(mut self, ident: S) -> Self
    {
        self.ident = Some(ident.into());

        return self;
    }

    pub
    fn truncate_error(mut self, flag: bool) -> Self
    {
        self.truncate_error = Some(flag);

        return self;
    }

    pub
    fn relaxed(mut self, flag: bool) -> Self
    {
        self.relaxed = flag;

        return self;
    }

    /// Fills the unset fields of `self` from `base`.
    pub
    fn merged_over(mut self, base: &CryptOptions) -> Self
    {
        if self.rounds.is_none() == true
        {
            self.rounds = base.rounds;
        }

        if self.salt.is_none() == true
        {
            self.salt = base.salt.clone();
        }

        if self.salt_size.is_none() == true
        {
            self.salt_size = base.salt_size;
        }

        if self.ident.is_none() == true
        {
            self.ident = base.ident.clone();
        }

        if self.truncate_error.is_none() == true
        {
            self.truncate_error = base.truncate_error;
        }

        self.relaxed = self.relaxed || base.relaxed;

        return self;
    }
}

/// A validated, immutable set of non-secret parameters for one hash call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptConfig
{
    scheme: &'static str,
    rounds: Option<u32>,
    salt: Option<String>,
    salt_size: Option<usize>,
    ident: Option<String>,
    truncate_error: bool,
}

impl fmt::Display for CryptConfig
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "scheme: {}, rounds: {:?}, salt_size: {:?}, ident: {:?}",
            self.scheme, self.rounds, self.salt_size, self.ident)
    }
}

impl CryptConfig
{
    /// Validates `options` against `info` and fills defaults. The variant
    /// is checked by `check_ident`.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a config or Error [CryptErrorCode::InvalidConfig]
    pub
    fn from_options<F>(info: &HandlerInfo, options: &CryptOptions, check_ident: F) -> CryptResult<Self>
    where F: Fn(&str) -> CryptResult<String>
    {
        let rounds =
            match info.rounds
            {
                Some(ri) =>
                {
                    let r = options.rounds.unwrap_or(ri.default);

                    Some(clip_rounds(info.name, &ri, r, options.relaxed)?)
                },
                None if options.rounds.is_some() == true =>
                    crypt_error!(CryptErrorCode::InvalidConfig, "{}: scheme does not use rounds", info.name),
                None => None,
            };

        let (salt, salt_size) =
            match info.salt
            {
                Some(si) =>
                {
                    let size = options.salt_size.unwrap_or(si.default_size);
                    let size = clip_salt_size(info.name, &si, size, options.relaxed)?;

                    let salt =
                        match options.salt
                        {
                            Some(ref s) => Some(norm_salt(info.name, &si, s, options.relaxed)?),
                            None => None,
                        };

                    (salt, Some(size))
                },
                None if options.salt.is_some() == true || options.salt_size.is_some() == true =>
                    crypt_error!(CryptErrorCode::InvalidConfig, "{}: scheme does not use salt", info.name),
                None => (None, None),
            };

        let ident =
            match options.ident
            {
                Some(ref i) => Some(check_ident(i)?),
                None => None,
            };

        let truncate_error = options.truncate_error.unwrap_or(false);

        if truncate_error == true && info.truncate_size.is_none() == true
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "{}: scheme does not truncate secrets", info.name);
        }

        return Ok(
            CryptConfig
            {
                scheme: info.name,
                rounds: rounds,
                salt: salt,
                salt_size: salt_size,
                ident: ident,
                truncate_error: truncate_error,
            }
        );
    }

    pub
    fn scheme(&self) -> &'static str
    {
        return self.scheme;
    }

    pub
    fn get_rounds(&self) -> Option<u32>
    {
        return self.rounds;
    }

    /// The pinned salt, if any.
    pub
    fn get_salt(&self) -> Option<&str>
    {
        return self.salt.as_ref().map(|s| s.as_str());
    }

    pub
    fn get_salt_size(&self) -> Option<usize>
    {
        return self.salt_size;
    }

    pub
    fn get_ident(&self) -> Option<&str>
    {
        return self.ident.as_ref().map(|s| s.as_str());
    }

    pub
    fn get_truncate_error(&self) -> bool
    {
        return self.truncate_error;
    }

    /// Returns the pinned salt or generates a fresh one.
    pub
    fn salt_or_generate(&self, info: &HandlerInfo) -> CryptResult<String>
    {
        if let Some(ref s) = self.salt
        {
            return Ok(s.clone());
        }

        let si =
            info.salt
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InternalError, "{}: scheme does not use salt", info.name)
                )?;

        return si.generate(self.salt_size.unwrap_or(si.default_size));
    }

    /// Returns the configured rounds or fails if the scheme expects them.
    pub
    fn rounds_required(&self) -> CryptResult<u32>
    {
        return
            self.rounds
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InternalError, "{}: config without rounds", self.scheme)
                );
    }
}

/// Extra values which some schemes mix into the digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptUserContext
{
    user: Option<String>,
}

impl CryptUserContext
{
    pub
    fn none() -> Self
    {
        return Self::default();
    }

    pub
    fn with_user<S: Into<String>>(user: S) -> Self
    {
        return CryptUserContext{ user: Some(user.into()) };
    }

    pub
    fn user(&self) -> Option<&str>
    {
        return self.user.as_ref().map(|u| u.as_str());
    }
}

/// Parameters parsed out of a stored hash string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSettings
{
    pub scheme: &'static str,

    pub rounds: Option<u32>,

    /// in the units of [SaltInfo]
    pub salt_size: Option<usize>,

    pub ident: Option<String>,
}

impl HashSettings
{
    pub
    fn new(scheme: &'static str) -> Self
    {
        return HashSettings{ scheme: scheme, rounds: None, salt_size: None, ident: None };
    }
}

/// A scheme handler: one backend and one hash string grammar.
///
/// Implementors must keep [CryptHandler::identify] free of cryptographic
/// work and total: it is called with arbitrary user input.
pub trait CryptHandler: Send + Sync
{
    /// The static description of the scheme.
    fn info(&self) -> &HandlerInfo;

    fn name(&self) -> &'static str
    {
        return self.info().name;
    }

    /// Syntax check of the hash string.
    fn identify(&self, hash: &str) -> bool;

    /// Validates the options and produces an immutable config.
    fn configure(&self, options: &CryptOptions) -> CryptResult<CryptConfig>
    {
        return CryptConfig::from_options(self.info(), options, |i| self.check_ident(i));
    }

    /// Validates a variant name. Schemes without variants reject any.
    fn check_ident(&self, ident: &str) -> CryptResult<String>
    {
        crypt_error!(CryptErrorCode::InvalidConfig, "{}: scheme has no variants, got: {}", self.name(), ident);
    }

    /// Hashes the secret with the config.
    fn hash(&self, secret: &[u8], config: &CryptConfig, ctx: &CryptUserContext) -> CryptResult<String>;

    /// Recomputes the checksum under the parameters stored in `hash` and
    /// compares it in constant time.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - Ok(true) on match, Ok(false) on mismatch, or Error
    ///     [CryptErrorCode::MalformedHash] if the hash can not be parsed
    fn verify(&self, secret: &[u8], hash: &str, ctx: &CryptUserContext) -> CryptResult<bool>;

    /// Parses the stored parameters.
    fn settings(&self, hash: &str) -> CryptResult<HashSettings>;

    /// Checks the stored parameters against the policy.
    fn needs_update(&self, hash: &str, policy: &SchemePolicy) -> CryptResult<bool>
    {
        if policy.deprecated == true
        {
            return Ok(true);
        }

        let settings = self.settings(hash)?;

        return Ok(settings_outside_policy(&settings, policy));
    }

    /// Adjusts generated rounds to the scheme preferences.
    fn normalize_rounds(&self, rounds: u32) -> u32
    {
        return rounds;
    }
}

/// The generic part of [CryptHandler::needs_update].
pub
fn settings_outside_policy(settings: &HashSettings, policy: &SchemePolicy) -> bool
{
    if let Some(rounds) = settings.rounds
    {
        if policy.min_rounds.map(|m| rounds < m).unwrap_or(false) == true ||
            policy.max_rounds.map(|m| rounds > m).unwrap_or(false) == true
        {
            return true;
        }
    }

    if let (Some(have), Some(want)) = (settings.salt_size, policy.salt_size)
    {
        if have < want
        {
            return true;
        }
    }

    if let (Some(have), Some(want)) = (settings.ident.as_ref(), policy.ident.as_ref())
    {
        if have != want
        {
            return true;
        }
    }

    return false;
}

/// Checks the rounds against the scheme bounds, clamps when `relaxed`.
pub
fn clip_rounds(scheme: &str, info: &RoundsInfo, rounds: u32, relaxed: bool) -> CryptResult<u32>
{
    if rounds < info.min
    {
        if relaxed == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig,
                "{}: rounds too low, min: {}, got: {}", scheme, info.min, rounds);
        }

        tracing::warn!(scheme, rounds, min = info.min, "rounds too low, clamped");

        return Ok(info.min);
    }
    else if rounds > info.max
    {
        if relaxed == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig,
                "{}: rounds too high, max: {}, got: {}", scheme, info.max, rounds);
        }

        tracing::warn!(scheme, rounds, max = info.max, "rounds too high, clamped");

        return Ok(info.max);
    }

    return Ok(rounds);
}

fn clip_salt_size(scheme: &str, info: &SaltInfo, size: usize, relaxed: bool) -> CryptResult<usize>
{
    if size < info.min_size
    {
        if relaxed == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig,
                "{}: salt_size too small, min: {}, got: {}", scheme, info.min_size, size);
        }

        tracing::warn!(scheme, size, min = info.min_size, "salt_size too small, clamped");

        return Ok(info.min_size);
    }
    else if size > info.max_size
    {
        if relaxed == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig,
                "{}: salt_size too large, max: {}, got: {}", scheme, info.max_size, size);
        }

        tracing::warn!(scheme, size, max = info.max_size, "salt_size too large, clamped");

        return Ok(info.max_size);
    }

    return Ok(size);
}

fn norm_salt(scheme: &str, info: &SaltInfo, salt: &str, relaxed: bool) -> CryptResult<String>
{
    let size =
        info.measure(scheme, salt)
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::InvalidConfig, "{}: invalid salt, {}", scheme, e.message())
            )?;

    if size < info.min_size
    {
        crypt_error!(CryptErrorCode::InvalidConfig,
            "{}: salt too small, min: {}, got: {}", scheme, info.min_size, size);
    }
    else if size > info.max_size
    {
        if relaxed == false || info.encoding != SaltEncoding::Hash64
        {
            crypt_error!(CryptErrorCode::InvalidConfig,
                "{}: salt too large, max: {}, got: {}", scheme, info.max_size, size);
        }

        tracing::warn!(scheme, size, max = info.max_size, "salt too large, truncated");

        return Ok(salt[..info.max_size].to_string());
    }

    return Ok(salt.to_string());
}

/// Applies the hard limit and the scheme truncation policy to the secret.
///
/// # Arguments
///
/// * `info` - the scheme description
///
/// * `secret` - the secret
///
/// * `truncate_error` - fail instead of truncating
///
/// # Returns
///
/// * [CryptResult] - the part of the secret the scheme uses or Error
///     [CryptErrorCode::PasswordTooLong]
pub
fn truncate_secret<'s>(info: &HandlerInfo, secret: &'s [u8], truncate_error: bool) -> CryptResult<&'s [u8]>
{
    CryptCommon::validate_secret(secret)?;

    if let Some(limit) = info.truncate_size
    {
        if secret.len() > limit
        {
            if truncate_error == true
            {
                crypt_error!(CryptErrorCode::PasswordTooLong,
                    "{}: password exceeds the {} bytes limit", info.name, limit);
            }

            return Ok(&secret[..limit]);
        }
    }

    return Ok(secret);
}

#[cfg(test)]
fn test_info() -> HandlerInfo
{
    let mut info = HandlerInfo::new("test_scheme");

    info.rounds = Some(RoundsInfo{ min: 10, max: 100, default: 50 });
    info.salt = Some(SaltInfo{ min_size: 2, max_size: 4, default_size: 4, encoding: SaltEncoding::Hash64 });
    info.truncate_size = Some(8);

    return info;
}

#[cfg(test)]
fn no_ident(i: &str) -> CryptResult<String>
{
    crypt_error!(CryptErrorCode::InvalidConfig, "no variants, {}", i);
}

#[test]
fn config_defaults()
{
    let cfg = CryptConfig::from_options(&test_info(), &CryptOptions::new(), no_ident).unwrap();

    assert_eq!(cfg.get_rounds(), Some(50));
    assert_eq!(cfg.get_salt_size(), Some(4));
    assert_eq!(cfg.get_salt(), None);
    assert_eq!(cfg.get_truncate_error(), false);

    let salt = cfg.salt_or_generate(&test_info()).unwrap();
    assert_eq!(salt.len(), 4);
}

#[test]
fn config_rounds_strict_and_relaxed()
{
    let info = test_info();

    let err = CryptConfig::from_options(&info, &CryptOptions::new().rounds(5), no_ident).err().unwrap();
    assert_eq!(err.err_code(), CryptErrorCode::InvalidConfig);

    let cfg = CryptConfig::from_options(&info, &CryptOptions::new().rounds(5).relaxed(true), no_ident).unwrap();
    assert_eq!(cfg.get_rounds(), Some(10));

    let cfg = CryptConfig::from_options(&info, &CryptOptions::new().rounds(500).relaxed(true), no_ident).unwrap();
    assert_eq!(cfg.get_rounds(), Some(100));
}

#[test]
fn config_salt()
{
    let info = test_info();

    let cfg = CryptConfig::from_options(&info, &CryptOptions::new().salt("ab./"), no_ident).unwrap();
    assert_eq!(cfg.get_salt(), Some("ab./"));

    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().salt("a"), no_ident).is_err(), true);
    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().salt("ab$d"), no_ident).is_err(), true);
    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().salt("abcdef"), no_ident).is_err(), true);

    let cfg = CryptConfig::from_options(&info, &CryptOptions::new().salt("abcdef").relaxed(true), no_ident).unwrap();
    assert_eq!(cfg.get_salt(), Some("abcd"));

    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().ident("x"), no_ident).is_err(), true);
}

#[test]
fn config_unused_params()
{
    let info = HandlerInfo::new("plain");

    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().rounds(5), no_ident).is_err(), true);
    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().salt_size(5), no_ident).is_err(), true);
    assert_eq!(CryptConfig::from_options(&info, &CryptOptions::new().truncate_error(true), no_ident).is_err(), true);
}

#[test]
fn secret_truncation()
{
    let info = test_info();

    assert_eq!(truncate_secret(&info, b"password123", false).unwrap(), b"password");
    assert_eq!(
        truncate_secret(&info, b"password123", true).err().unwrap().err_code(),
        CryptErrorCode::PasswordTooLong
    );
    assert_eq!(truncate_secret(&info, b"pass", true).unwrap(), b"pass");
}

#[test]
fn options_merge()
{
    let base = CryptOptions::new().rounds(20).salt_size(3).relaxed(true);
    let merged = CryptOptions::new().rounds(30).merged_over(&base);

    assert_eq!(merged.rounds, Some(30));
    assert_eq!(merged.salt_size, Some(3));
    assert_eq!(merged.relaxed, true);
}

#[test]
fn options_toml()
{
    let opts: CryptOptions = toml::from_str("rounds = 1000\nrelaxed = true\n").unwrap();

    assert_eq!(opts, CryptOptions::new().rounds(1000).relaxed(true));
    assert_eq!(toml::from_str::<CryptOptions>("rouds = 1").is_err(), true);
}
