/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Disabled account markers as found in the shadow file: an empty field,
//! or a hash prefixed with `!` or `*`.

use super::crypt_common::CryptCommon;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::{CryptHandler, CryptConfig, CryptUserContext, HandlerInfo, HashSettings};
use super::crypt_policy::SchemePolicy;
use super::crypt_error;

/// A pseudo scheme which never verifies.
pub struct UnixDisabled
{
    info: HandlerInfo,
}

impl UnixDisabled
{
    pub const NAME: &'static str = "unix_disabled";

    /// The marker which is used by default.
    pub const DEFAULT_MARKER: &'static str = "!";

    const MARKERS: [&'static str; 2] = ["!", "*"];

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new(Self::NAME);

        info.ident = Some(Self::DEFAULT_MARKER);

        return UnixDisabled{ info: info };
    }

    /// Tells if the `hash` is a disabled account marker.
    pub
    fn is_marker(hash: &str) -> bool
    {
        return
            hash.is_empty() == true ||
            Self::MARKERS.iter().any(|m| hash.starts_with(m) == true);
    }

    /// Marks the `hash` as disabled. The original hash is kept after the
    /// marker so it can be restored by [UnixDisabled::enable_hash]. An already
    /// disabled hash is re-marked with `marker`.
    ///
    /// # Arguments
    ///
    /// * `marker` - one of `!` or `*`
    ///
    /// * `hash` - the hash to disable, if any
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the disabled hash or Error
    pub
    fn disable_hash(marker: &str, hash: Option<&str>) -> CryptResult<String>
    {
        if Self::is_known_marker(marker) == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "{}: unknown marker: '{}'", Self::NAME, marker);
        }

        let orig =
            match hash
            {
                Some(h) if h.is_empty() == true => "",
                Some(h) if Self::is_marker(h) == true => Self::strip_marker(h).unwrap_or(""),
                Some(h) => h,
                None => "",
            };

        return Ok(format!("{}{}", marker, orig));
    }

    /// Restores the hash which was disabled by [UnixDisabled::disable_hash].
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the original hash or Error [CryptErrorCode::MalformedHash]
    ///     if the `hash` is not disabled or holds nothing to restore
    pub
    fn enable_hash(hash: &str) -> CryptResult<String>
    {
        match Self::strip_marker(hash)
        {
            Some(orig) if orig.is_empty() == false =>
                return Ok(orig.to_string()),
            Some(_) =>
                crypt_error!(CryptErrorCode::MalformedHash, "{}: cannot restore the original hash", Self::NAME),
            None =>
                crypt_error!(CryptErrorCode::MalformedHash, "{}: hash is not disabled", Self::NAME),
        }
    }

    fn is_known_marker(marker: &str) -> bool
    {
        return Self::MARKERS.iter().any(|m| *m == marker);
    }

    fn strip_marker(hash: &str) -> Option<&str>
    {
        return
            Self::MARKERS
                .iter()
                .find_map(|m| hash.strip_prefix(m));
    }
}

impl CryptHandler for UnixDisabled
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return Self::is_marker(hash);
    }

    fn check_ident(&self, ident: &str) -> CryptResult<String>
    {
        if Self::is_known_marker(ident) == false
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "{}: unknown marker: '{}'", Self::NAME, ident);
        }

        return Ok(ident.to_string());
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        CryptCommon::validate_secret(secret)?;

        return Ok(config.get_ident().unwrap_or(Self::DEFAULT_MARKER).to_string());
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        CryptCommon::validate_secret(secret)?;

        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: not a disabled account marker", Self::NAME);
        }

        return Ok(false);
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        if self.identify(hash) == false
        {
            crypt_error!(CryptErrorCode::MalformedHash, "{}: not a disabled account marker", Self::NAME);
        }

        return Ok(HashSettings::new(Self::NAME));
    }

    /// A marker can not be replaced by rehashing, it never needs an update.
    fn needs_update(&self, hash: &str, _policy: &SchemePolicy) -> CryptResult<bool>
    {
        self.settings(hash)?;

        return Ok(false);
    }
}

#[cfg(test)]
use super::crypt_handler::CryptOptions;

#[test]
fn disabled_never_verifies()
{
    let h = UnixDisabled::new();
    let ctx = CryptUserContext::none();

    for hash in ["", "!", "*", "!xOAFZqRz5RduI", "*LK*"].iter()
    {
        assert_eq!(h.identify(hash), true);
        assert_eq!(h.verify(b"", hash, &ctx).unwrap(), false);
        assert_eq!(h.verify(b"password", hash, &ctx).unwrap(), false);
    }

    assert_eq!(h.identify("xOAFZqRz5RduI"), false);
    assert_eq!(h.verify(b"password", "xOAFZqRz5RduI", &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
}

#[test]
fn disabled_hash_marker()
{
    let h = UnixDisabled::new();
    let ctx = CryptUserContext::none();

    let cfg = h.configure(&CryptOptions::new()).unwrap();
    assert_eq!(h.hash(b"password", &cfg, &ctx).unwrap(), "!");

    let cfg = h.configure(&CryptOptions::new().ident("*")).unwrap();
    assert_eq!(h.hash(b"password", &cfg, &ctx).unwrap(), "*");

    assert_eq!(h.configure(&CryptOptions::new().ident("#")).is_err(), true);
    assert_eq!(h.needs_update("!", &SchemePolicy::default()).unwrap(), false);
}

#[test]
fn disable_enable()
{
    let hash = "$pbkdf2$1212$OB.dtnSEXZK8U5cgxU/GYQ$y5LKPOplRmok7CZp/aqVDVg8zGI";

    let disabled = UnixDisabled::disable_hash("!", Some(hash)).unwrap();
    assert_eq!(disabled, format!("!{}", hash));

    // re-marking keeps one marker
    assert_eq!(UnixDisabled::disable_hash("*", Some(&disabled)).unwrap(), format!("*{}", hash));

    assert_eq!(UnixDisabled::enable_hash(&disabled).unwrap(), hash);
    assert_eq!(UnixDisabled::disable_hash("!", None).unwrap(), "!");

    assert_eq!(UnixDisabled::enable_hash("!").err().unwrap().err_code(), CryptErrorCode::MalformedHash);
    assert_eq!(UnixDisabled::enable_hash(hash).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
    assert_eq!(UnixDisabled::disable_hash("#", Some(hash)).is_err(), true);
}
