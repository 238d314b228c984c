/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::Arc;

use super::crypt_digests::{HexDigest, Plaintext};
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::{CryptHandler, CryptConfig, CryptOptions, CryptUserContext, HandlerInfo, HashSettings};
use super::crypt_pbkdf2::{Pbkdf2Sha1, Pbkdf2Sha256};
use super::crypt_policy::SchemePolicy;
use super::crypt_error;

/// Re-tags the hashes of another scheme: `orig_prefix` of the inner
/// grammar is replaced with `prefix`.
pub struct PrefixWrapper
{
    info: HandlerInfo,
    prefix: &'static str,
    orig_prefix: &'static str,
    inner: Arc<dyn CryptHandler>,
}

impl PrefixWrapper
{
    /// Creates a new wrapper.
    ///
    /// # Arguments
    ///
    /// * `name` - a name of the wrapping scheme
    ///
    /// * `inner` - the wrapped handler
    ///
    /// * `prefix` - the tag of the wrapping scheme
    ///
    /// * `orig_prefix` - the tag of the inner scheme which is replaced, may
    ///     be empty
    pub
    fn new(name: &'static str, inner: Arc<dyn CryptHandler>, prefix: &'static str, orig_prefix: &'static str) -> Self
    {
        let mut info = inner.info().clone();

        info.name = name;
        info.ident = Some(prefix);

        return
            PrefixWrapper
            {
                info: info,
                prefix: prefix,
                orig_prefix: orig_prefix,
                inner: inner,
            };
    }

    pub
    fn ldap_hex_md5() -> Self
    {
        return Self::new("ldap_hex_md5", Arc::new(HexDigest::hex_md5()), "{MD5}", "");
    }

    pub
    fn ldap_hex_sha1() -> Self
    {
        return Self::new("ldap_hex_sha1", Arc::new(HexDigest::hex_sha1()), "{SHA}", "");
    }

    pub
    fn roundup_plaintext() -> Self
    {
        return Self::new("roundup_plaintext", Arc::new(Plaintext::new()), "{plaintext}", "");
    }

    pub
    fn ldap_pbkdf2_sha256() -> Self
    {
        return Self::new("ldap_pbkdf2_sha256", Arc::new(Pbkdf2Sha256::pbkdf2_sha256()), "{PBKDF2-SHA256}", "$pbkdf2-sha256$");
    }

    pub
    fn roundup_pbkdf2_sha1() -> Self
    {
        return Self::new("roundup_pbkdf2_sha1", Arc::new(Pbkdf2Sha1::pbkdf2_sha1()), "{PBKDF2}", "$pbkdf2$");
    }

    /// The wrapped handler.
    pub
    fn inner(&self) -> &Arc<dyn CryptHandler>
    {
        return &self.inner;
    }

    fn unwrap_hash(&self, hash: &str) -> CryptResult<String>
    {
        match hash.strip_prefix(self.prefix)
        {
            Some(rest) =>
                return Ok(format!("{}{}", self.orig_prefix, rest)),
            None =>
                crypt_error!(CryptErrorCode::MalformedHash, "{}: expected prefix '{}'", self.info.name, self.prefix),
        }
    }

    fn wrap_hash(&self, hash: String) -> CryptResult<String>
    {
        match hash.strip_prefix(self.orig_prefix)
        {
            Some(rest) =>
                return Ok(format!("{}{}", self.prefix, rest)),
            None =>
                crypt_error!(CryptErrorCode::InternalError,
                    "{}: inner scheme '{}' produced an unexpected prefix", self.info.name, self.inner.name()),
        }
    }
}

impl CryptHandler for PrefixWrapper
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return
            match hash.strip_prefix(self.prefix)
            {
                Some(rest) if self.orig_prefix.is_empty() == true =>
                    self.inner.identify(rest),
                Some(rest) =>
                    self.inner.identify(&format!("{}{}", self.orig_prefix, rest)),
                None =>
                    false,
            };
    }

    fn configure(&self, options: &CryptOptions) -> CryptResult<CryptConfig>
    {
        return self.inner.configure(options);
    }

    fn check_ident(&self, ident: &str) -> CryptResult<String>
    {
        return self.inner.check_ident(ident);
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, ctx: &CryptUserContext) -> CryptResult<String>
    {
        let hash = self.inner.hash(secret, config, ctx)?;

        return self.wrap_hash(hash);
    }

    fn verify(&self, secret: &[u8], hash: &str, ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let inner_hash = self.unwrap_hash(hash)?;

        return self.inner.verify(secret, &inner_hash, ctx);
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let mut settings = self.inner.settings(&self.unwrap_hash(hash)?)?;
        settings.scheme = self.info.name;

        return Ok(settings);
    }

    fn needs_update(&self, hash: &str, policy: &SchemePolicy) -> CryptResult<bool>
    {
        if policy.deprecated == true
        {
            return Ok(true);
        }

        return self.inner.needs_update(&self.unwrap_hash(hash)?, policy);
    }

    fn normalize_rounds(&self, rounds: u32) -> u32
    {
        return self.inner.normalize_rounds(rounds);
    }
}

#[test]
fn wrapper_hex()
{
    let h = PrefixWrapper::ldap_hex_md5();
    let ctx = CryptUserContext::none();
    let cfg = h.configure(&CryptOptions::new()).unwrap();

    let hash = h.hash(b"password", &cfg, &ctx).unwrap();

    assert_eq!(hash, "{MD5}5f4dcc3b5aa765d61d8327deb882cf99");
    assert_eq!(h.identify(&hash), true);
    assert_eq!(h.identify("5f4dcc3b5aa765d61d8327deb882cf99"), false);
    assert_eq!(h.identify("{MD5}5f4dcc3b"), false);
    assert_eq!(h.verify(b"password", &hash, &ctx).unwrap(), true);
    assert_eq!(h.verify(b"password", "{SHA}5f4dcc3b", &ctx).err().unwrap().err_code(), CryptErrorCode::MalformedHash);
    assert_eq!(h.settings(&hash).unwrap().scheme, "ldap_hex_md5");
}

#[test]
fn wrapper_pbkdf2()
{
    let h = PrefixWrapper::ldap_pbkdf2_sha256();
    let ctx = CryptUserContext::none();

    let hash = "{PBKDF2-SHA256}1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ";

    assert_eq!(h.identify(hash), true);
    assert_eq!(h.verify(b"password", hash, &ctx).unwrap(), true);

    let cfg = h.configure(&CryptOptions::new().rounds(1212).salt("4vjV83LKPjQzk31VI4E0Vw")).unwrap();
    assert_eq!(h.hash(b"password", &cfg, &ctx).unwrap(), hash);

    let s = h.settings(hash).unwrap();
    assert_eq!(s.scheme, "ldap_pbkdf2_sha256");
    assert_eq!(s.rounds, Some(1212));

    let mut policy = SchemePolicy::default();
    policy.min_rounds = Some(2000);
    assert_eq!(h.needs_update(hash, &policy).unwrap(), true);

    let h = PrefixWrapper::roundup_pbkdf2_sha1();
    let hash = "{PBKDF2}1212$OB.dtnSEXZK8U5cgxU/GYQ$y5LKPOplRmok7CZp/aqVDVg8zGI";

    assert_eq!(h.identify(hash), true);
    assert_eq!(h.verify(b"password", hash, &ctx).unwrap(), true);
}

#[test]
fn wrapper_plaintext()
{
    let h = PrefixWrapper::roundup_plaintext();
    let ctx = CryptUserContext::none();
    let cfg = h.configure(&CryptOptions::new()).unwrap();

    assert_eq!(h.hash(b"secret", &cfg, &ctx).unwrap(), "{plaintext}secret");
    assert_eq!(h.identify("{plaintext}"), true);
    assert_eq!(h.identify("secret"), false);
    assert_eq!(h.verify(b"secret", "{plaintext}secret", &ctx).unwrap(), true);
}
