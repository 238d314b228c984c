/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A name to handler table.
//!
//! The registration order is the identification priority: the grammars
//! which may claim the hashes of other schemes (the hex digests, the
//! disabled markers, the plaintext) are registered last.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::crypt_bsdi_crypt::BsdiCrypt;
use super::crypt_common::CryptCommon;
use super::crypt_des_crypt::DesCrypt;
use super::crypt_digests::{HexDigest, PostgresMd5, Plaintext};
use super::crypt_disabled::UnixDisabled;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::{CryptHandler, CryptOptions, CryptUserContext};
use super::crypt_pbkdf2::{Pbkdf2Sha1, Pbkdf2Sha256, Pbkdf2Sha512};
use super::crypt_scram::ScramHash;
use super::crypt_wrapper::PrefixWrapper;
use super::{crypt_error, crypt_error_map};

/// Constructs a handler on the first lookup.
pub type HandlerFactory = fn() -> Arc<dyn CryptHandler>;

struct RegistryEntry
{
    name: &'static str,
    factory: Option<HandlerFactory>,
    handler: OnceLock<Arc<dyn CryptHandler>>,
}

impl RegistryEntry
{
    fn handler(&self) -> CryptResult<Arc<dyn CryptHandler>>
    {
        if let Some(h) = self.handler.get()
        {
            return Ok(h.clone());
        }

        let factory =
            self.factory
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InternalError, "{}: entry without handler", self.name)
                )?;

        let h = self.handler.get_or_init(factory);

        if h.name() != self.name
        {
            crypt_error!(CryptErrorCode::InternalError,
                "factory of '{}' produced a handler named '{}'", self.name, h.name());
        }

        return Ok(h.clone());
    }
}

/// A registry of scheme handlers. Lookups are pure reads, lazy entries are
/// constructed once even when looked up concurrently.
pub struct CryptRegistry
{
    entries: Vec<RegistryEntry>,
    index: HashMap<&'static str, usize>,
}

impl CryptRegistry
{
    /// Creates an empty registry.
    pub
    fn new() -> Self
    {
        return CryptRegistry{ entries: Vec::new(), index: HashMap::new() };
    }

    /// Creates a registry with every shipped scheme in the identification
    /// priority order.
    pub
    fn with_builtins() -> Self
    {
        let builtins: [(&'static str, HandlerFactory); 18] =
        [
            (ScramHash::NAME, || -> Arc<dyn CryptHandler> { Arc::new(ScramHash::new()) }),
            (Pbkdf2Sha512::NAME, || -> Arc<dyn CryptHandler> { Arc::new(Pbkdf2Sha512::pbkdf2_sha512()) }),
            (Pbkdf2Sha256::NAME, || -> Arc<dyn CryptHandler> { Arc::new(Pbkdf2Sha256::pbkdf2_sha256()) }),
            (Pbkdf2Sha1::NAME, || -> Arc<dyn CryptHandler> { Arc::new(Pbkdf2Sha1::pbkdf2_sha1()) }),
            ("ldap_pbkdf2_sha256", || -> Arc<dyn CryptHandler> { Arc::new(PrefixWrapper::ldap_pbkdf2_sha256()) }),
            ("roundup_pbkdf2_sha1", || -> Arc<dyn CryptHandler> { Arc::new(PrefixWrapper::roundup_pbkdf2_sha1()) }),
            (BsdiCrypt::NAME, || -> Arc<dyn CryptHandler> { Arc::new(BsdiCrypt::new()) }),
            (PostgresMd5::NAME, || -> Arc<dyn CryptHandler> { Arc::new(PostgresMd5::new()) }),
            ("ldap_hex_md5", || -> Arc<dyn CryptHandler> { Arc::new(PrefixWrapper::ldap_hex_md5()) }),
            ("ldap_hex_sha1", || -> Arc<dyn CryptHandler> { Arc::new(PrefixWrapper::ldap_hex_sha1()) }),
            ("roundup_plaintext", || -> Arc<dyn CryptHandler> { Arc::new(PrefixWrapper::roundup_plaintext()) }),
            (DesCrypt::NAME, || -> Arc<dyn CryptHandler> { Arc::new(DesCrypt::new()) }),
            ("hex_md5", || -> Arc<dyn CryptHandler> { Arc::new(HexDigest::hex_md5()) }),
            ("hex_sha1", || -> Arc<dyn CryptHandler> { Arc::new(HexDigest::hex_sha1()) }),
            ("hex_sha256", || -> Arc<dyn CryptHandler> { Arc::new(HexDigest::hex_sha256()) }),
            ("hex_sha512", || -> Arc<dyn CryptHandler> { Arc::new(HexDigest::hex_sha512()) }),
            (UnixDisabled::NAME, || -> Arc<dyn CryptHandler> { Arc::new(UnixDisabled::new()) }),
            (Plaintext::NAME, || -> Arc<dyn CryptHandler> { Arc::new(Plaintext::new()) }),
        ];

        let mut reg = Self::new();

        for (name, factory) in builtins
        {
            reg.push_entry(name, Some(factory), None);
        }

        return reg;
    }

    fn push_entry(&mut self, name: &'static str, factory: Option<HandlerFactory>, handler: Option<Arc<dyn CryptHandler>>)
    {
        let cell = OnceLock::new();

        if let Some(h) = handler
        {
            let _ = cell.set(h);
        }

        self.index.insert(name, self.entries.len());
        self.entries.push(RegistryEntry{ name: name, factory: factory, handler: cell });
    }

    /// Registers a constructed handler at the end of the priority order.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - Ok or Error [CryptErrorCode::InvalidConfig] if the
    ///     name is taken
    pub
    fn register(&mut self, handler: Arc<dyn CryptHandler>) -> CryptResult<()>
    {
        let name = handler.name();

        if self.contains(name) == true
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "scheme '{}' is already registered", name);
        }

        self.push_entry(name, None, Some(handler));

        return Ok(());
    }

    /// Registers a handler which is constructed by `factory` on the first
    /// lookup. The handler must be named `name`.
    pub
    fn register_lazy(&mut self, name: &'static str, factory: HandlerFactory) -> CryptResult<()>
    {
        if self.contains(name) == true
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "scheme '{}' is already registered", name);
        }

        self.push_entry(name, Some(factory), None);

        return Ok(());
    }

    /// Looks up a handler by name.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the handler or Error [CryptErrorCode::UnknownScheme]
    pub
    fn get(&self, name: &str) -> CryptResult<Arc<dyn CryptHandler>>
    {
        let idx =
            self.index
                .get(name)
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::UnknownScheme, "scheme '{}' is not registered", name)
                )?;

        return self.entries[*idx].handler();
    }

    pub
    fn contains(&self, name: &str) -> bool
    {
        return self.index.contains_key(name);
    }

    /// The names in the priority order.
    pub
    fn names(&self) -> Vec<&'static str>
    {
        return self.entries.iter().map(|e| e.name).collect();
    }

    /// Returns the first registered handler which claims the hash.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the handler or Error [CryptErrorCode::UnknownHashFormat]
    pub
    fn identify(&self, hash: &str) -> CryptResult<Arc<dyn CryptHandler>>
    {
        for entry in self.entries.iter()
        {
            let h = entry.handler()?;

            if h.identify(hash) == true
            {
                return Ok(h);
            }
        }

        crypt_error!(CryptErrorCode::UnknownHashFormat, "hash is not claimed by any registered scheme");
    }

    /// Same as [CryptRegistry::identify] but tries only the `names` in the
    /// given order.
    pub
    fn identify_in(&self, hash: &str, names: &[&str]) -> CryptResult<Arc<dyn CryptHandler>>
    {
        for name in names.iter()
        {
            let h = self.get(name)?;

            if h.identify(hash) == true
            {
                return Ok(h);
            }
        }

        crypt_error!(CryptErrorCode::UnknownHashFormat, "hash is not claimed by any of the schemes");
    }

    /// Validates the registration order, see [CryptRegistry::validate_order].
    pub
    fn validate(&self) -> CryptResult<()>
    {
        let names = self.names();

        return self.validate_order(&names);
    }

    /// Checks that the `names` order does not shadow any scheme: a sample
    /// hash of each scheme, made with its cheapest settings, must be claimed
    /// by that scheme before any other.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - Ok or Error [CryptErrorCode::InvalidConfig] naming
    ///     the shadowing scheme
    pub
    fn validate_order(&self, names: &[&str]) -> CryptResult<()>
    {
        let handlers =
            names
                .iter()
                .map(|n| self.get(n))
                .collect::<CryptResult<Vec<Arc<dyn CryptHandler>>>>()?;

        let ctx = CryptUserContext::with_user("sample");

        for producer in handlers.iter()
        {
            let mut options = CryptOptions::new();

            if let Some(ri) = producer.info().rounds
            {
                options = options.rounds(producer.normalize_rounds(ri.min));
            }

            let config = producer.configure(&options)?;
            let sample = producer.hash(CryptCommon::SAMPLE_SECRET, &config, &ctx)?;

            let claimant =
                handlers
                    .iter()
                    .find(|h| h.identify(&sample) == true)
                    .ok_or_else(||
                        crypt_error_map!(CryptErrorCode::InvalidConfig,
                            "{}: scheme does not identify its own hash", producer.name())
                    )?;

            if claimant.name() != producer.name()
            {
                crypt_error!(CryptErrorCode::InvalidConfig,
                    "'{}' claims the hashes of '{}', it must be placed after it", claimant.name(), producer.name());
            }
        }

        return Ok(());
    }
}

/// The process wide registry with the shipped schemes.
pub
fn default_registry() -> Arc<CryptRegistry>
{
    static DEFAULT_REGISTRY: OnceLock<Arc<CryptRegistry>> = OnceLock::new();

    return DEFAULT_REGISTRY.get_or_init(|| Arc::new(CryptRegistry::with_builtins())).clone();
}

#[test]
fn registry_builtins()
{
    let reg = default_registry();

    assert_eq!(reg.names().len(), 18);
    assert_eq!(reg.names()[0], "scram");
    assert_eq!(reg.names()[17], "plaintext");
    assert_eq!(reg.contains("des_crypt"), true);
    assert_eq!(reg.get("des_crypt").unwrap().name(), "des_crypt");
    assert_eq!(reg.get("md5_crypt").err().unwrap().err_code(), CryptErrorCode::UnknownScheme);

    reg.validate().unwrap();
}

#[test]
fn registry_identify()
{
    let reg = default_registry();

    let vectors =
    [
        ("xOAFZqRz5RduI", "des_crypt"),
        ("_Gl/.K0Ay.aosctsbJ1k", "bsdi_crypt"),
        ("$pbkdf2$1212$OB.dtnSEXZK8U5cgxU/GYQ$y5LKPOplRmok7CZp/aqVDVg8zGI", "pbkdf2_sha1"),
        ("{MD5}5f4dcc3b5aa765d61d8327deb882cf99", "ldap_hex_md5"),
        ("5f4dcc3b5aa765d61d8327deb882cf99", "hex_md5"),
        ("md532e12f215ba27cb750c9e093ce4b5127", "postgres_md5"),
        ("!xOAFZqRz5RduI", "unix_disabled"),
        ("", "unix_disabled"),
        ("hello world", "plaintext"),
    ];

    for (hash, scheme) in vectors.iter()
    {
        assert_eq!(reg.identify(hash).unwrap().name(), *scheme, "{}", hash);
    }

    assert_eq!(
        reg.identify_in("hello world", &["des_crypt", "bsdi_crypt"]).err().unwrap().err_code(),
        CryptErrorCode::UnknownHashFormat
    );
}

#[test]
fn registry_shadowing()
{
    let reg = default_registry();

    reg.validate_order(&["des_crypt", "unix_disabled"]).unwrap();

    assert_eq!(
        reg.validate_order(&["plaintext", "des_crypt"]).err().unwrap().err_code(),
        CryptErrorCode::InvalidConfig
    );
    assert_eq!(
        reg.validate_order(&["hex_md5", "postgres_md5", "plaintext", "unix_disabled"]).err().unwrap().err_code(),
        CryptErrorCode::InvalidConfig
    );
}

#[test]
fn registry_register()
{
    let mut reg = CryptRegistry::new();

    reg.register(Arc::new(DesCrypt::new())).unwrap();
    reg.register_lazy(Plaintext::NAME, || -> Arc<dyn CryptHandler> { Arc::new(Plaintext::new()) }).unwrap();

    assert_eq!(reg.register(Arc::new(DesCrypt::new())).err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
    assert_eq!(reg.names(), vec!["des_crypt", "plaintext"]);
    assert_eq!(reg.identify("abc").unwrap().name(), "plaintext");

    reg.validate().unwrap();
}

#[test]
fn registry_lazy_concurrent()
{
    let reg = Arc::new(CryptRegistry::with_builtins());

    let threads: Vec<_> =
        (0..8)
            .map(|_|
                {
                    let reg = reg.clone();

                    std::thread::spawn(move || reg.get("bsdi_crypt").unwrap())
                }
            )
            .collect();

    let handlers: Vec<Arc<dyn CryptHandler>> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    for h in handlers.iter()
    {
        assert_eq!(Arc::ptr_eq(h, &handlers[0]), true);
    }
}
