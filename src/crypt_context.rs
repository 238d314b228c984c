/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::{Arc, OnceLock};

use super::crypt_common::CryptCommon;
use super::crypt_disabled::UnixDisabled;
use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::{CryptHandler, CryptConfig, CryptOptions, CryptUserContext, RoundsInfo};
use super::crypt_policy::{PolicyConfig, PolicySet, SchemePolicy};
#[cfg(test)]
use super::crypt_policy::VaryRounds;
use super::crypt_registry::{CryptRegistry, default_registry};
use super::{crypt_error, crypt_error_map};

/// A result of [CryptContext::verify_and_update].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome
{
    /// The secret matches the hash.
    pub verified: bool,

    /// A new hash of the same secret under the default scheme which should
    /// be stored instead of the old one. Only set when `verified`.
    pub replacement: Option<String>,
}

impl VerifyOutcome
{
    fn new(verified: bool, replacement: Option<String>) -> Self
    {
        return VerifyOutcome{ verified: verified, replacement: replacement };
    }
}

/// A password hashing policy context.
///
/// Hashes new secrets with the default scheme of the policy, verifies the
/// hashes of every allowed scheme and tells when a stored hash should be
/// replaced. Immutable, a changed policy produces a new context, see
/// [CryptContext::with_policy].
///
/// ```ignore
/// let ctx = CryptContext::from_toml(r#"
///     schemes = ["pbkdf2_sha256", "des_crypt"]
///     deprecated = ["auto"]
/// "#)?;
///
/// let outcome = ctx.verify_and_update(b"password", &stored)?;
///
/// if let Some(new_hash) = outcome.replacement
/// {
///     // store new_hash
/// }
/// ```
pub struct CryptContext
{
    registry: Arc<CryptRegistry>,
    policy: Arc<PolicySet>,

    /// In the identification order.
    handlers: Vec<Arc<dyn CryptHandler>>,

    /// A hash of the default scheme for [CryptContext::dummy_verify].
    dummy: OnceLock<String>,
}

impl CryptContext
{
    /// Creates a context over the [default_registry].
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a context or Error [CryptErrorCode::InvalidConfig],
    ///     [CryptErrorCode::UnknownScheme]
    pub
    fn new(config: PolicyConfig) -> CryptResult<Self>
    {
        return Self::with_registry(config, default_registry());
    }

    /// Creates a context over the custom `registry`.
    pub
    fn with_registry(config: PolicyConfig, registry: Arc<CryptRegistry>) -> CryptResult<Self>
    {
        let policy = PolicySet::build(config, &registry)?;

        let handlers =
            policy.schemes()
                .iter()
                .map(|s| registry.get(s))
                .collect::<CryptResult<Vec<Arc<dyn CryptHandler>>>>()?;

        return Ok(
            CryptContext
            {
                registry: registry,
                policy: Arc::new(policy),
                handlers: handlers,
                dummy: OnceLock::new(),
            }
        );
    }

    /// Creates a context from the TOML policy.
    pub
    fn from_toml(src: &str) -> CryptResult<Self>
    {
        return Self::new(PolicyConfig::from_toml(src)?);
    }

    /// Serializes the policy back to TOML.
    pub
    fn to_toml(&self) -> CryptResult<String>
    {
        return self.policy.config().to_toml();
    }

    /// Creates a new context with another policy over the same registry.
    /// This context is not affected.
    pub
    fn with_policy(&self, config: PolicyConfig) -> CryptResult<Self>
    {
        return Self::with_registry(config, self.registry.clone());
    }

    pub
    fn policy(&self) -> &PolicySet
    {
        return &self.policy;
    }

    /// The allowed schemes in the identification order.
    pub
    fn schemes(&self) -> &[&'static str]
    {
        return self.policy.schemes();
    }

    pub
    fn default_scheme(&self) -> &'static str
    {
        return self.policy.default_scheme();
    }

    /// Returns the handler of an allowed scheme.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the handler or Error [CryptErrorCode::UnknownScheme]
    pub
    fn handler(&self, scheme: &str) -> CryptResult<Arc<dyn CryptHandler>>
    {
        return
            self.handlers
                .iter()
                .find(|h| h.name() == scheme)
                .cloned()
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::UnknownScheme, "scheme '{}' is not allowed by the policy", scheme)
                );
    }

    /// Returns the name of the first allowed scheme which claims the hash.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a scheme name or Error [CryptErrorCode::UnknownHashFormat]
    pub
    fn identify(&self, hash: &str) -> CryptResult<&'static str>
    {
        return self.identify_handler(hash).map(|h| h.name());
    }

    fn identify_handler(&self, hash: &str) -> CryptResult<Arc<dyn CryptHandler>>
    {
        match self.handlers.iter().find(|h| h.identify(hash) == true)
        {
            Some(h) =>
                return Ok(h.clone()),
            None =>
            {
                tracing::debug!(schemes = self.handlers.len(), "hash is not claimed by any allowed scheme");

                crypt_error!(CryptErrorCode::UnknownHashFormat, "hash is not claimed by any allowed scheme");
            }
        }
    }

    fn select(&self, hash: &str, scheme: Option<&str>) -> CryptResult<Arc<dyn CryptHandler>>
    {
        return
            match scheme
            {
                Some(name) => self.handler(name),
                None => self.identify_handler(hash),
            };
    }

    /// Hashes the secret with the default scheme and the policy settings.
    pub
    fn hash(&self, secret: &[u8]) -> CryptResult<String>
    {
        return self.hash_with(secret, None, &CryptOptions::new(), &CryptUserContext::none());
    }

    /// Hashes the secret.
    ///
    /// # Arguments
    ///
    /// * `secret` - the secret
    ///
    /// * `scheme` - an allowed scheme, the default when [Option::None]
    ///
    /// * `options` - the call site options, they take precedence over the
    ///     policy settings
    ///
    /// * `ctx` - the user context for the schemes which require it
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the hash or Error
    pub
    fn hash_with(&self, secret: &[u8], scheme: Option<&str>, options: &CryptOptions, ctx: &CryptUserContext) -> CryptResult<String>
    {
        let handler = self.handler(scheme.unwrap_or(self.default_scheme()))?;
        let config = self.build_config(&handler, options, None)?;

        return handler.hash(secret, &config, ctx);
    }

    /// Verifies the secret against a hash of any allowed scheme.
    pub
    fn verify(&self, secret: &[u8], hash: &str) -> CryptResult<bool>
    {
        return self.verify_with(secret, hash, None, &CryptUserContext::none());
    }

    /// Verifies the secret against the hash.
    ///
    /// # Arguments
    ///
    /// * `secret` - the secret
    ///
    /// * `hash` - the stored hash
    ///
    /// * `scheme` - the scheme of the hash, identified when [Option::None]
    ///
    /// * `ctx` - the user context for the schemes which require it
    ///
    /// # Returns
    ///
    /// * [CryptResult] - Ok(true) on match, Ok(false) on mismatch or Error
    ///     [CryptErrorCode::UnknownHashFormat], [CryptErrorCode::MalformedHash]
    pub
    fn verify_with(&self, secret: &[u8], hash: &str, scheme: Option<&str>, ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let handler = self.select(hash, scheme)?;

        return handler.verify(secret, hash, ctx);
    }

    /// Verifies the secret and, on success, rehashes it if the stored hash
    /// does not comply with the policy.
    pub
    fn verify_and_update(&self, secret: &[u8], hash: &str) -> CryptResult<VerifyOutcome>
    {
        return self.verify_and_update_with(secret, hash, None, &CryptUserContext::none());
    }

    /// Same as [CryptContext::verify_and_update] with an explicit scheme and
    /// user context.
    pub
    fn verify_and_update_with(&self, secret: &[u8], hash: &str, scheme: Option<&str>, ctx: &CryptUserContext)
        -> CryptResult<VerifyOutcome>
    {
        let handler = self.select(hash, scheme)?;

        if handler.verify(secret, hash, ctx)? == false
        {
            return Ok(VerifyOutcome::new(false, None));
        }

        let policy = self.policy.scheme_policy(handler.name())?;

        if handler.needs_update(hash, policy)? == false
        {
            return Ok(VerifyOutcome::new(true, None));
        }

        let default = self.handler(self.default_scheme())?;

        // a relative increase only makes sense within one scheme
        let stored_rounds =
            if handler.name() == default.name()
            {
                handler.settings(hash)?.rounds
            }
            else
            {
                None
            };

        tracing::debug!(from = handler.name(), to = default.name(), "hash needs an update, rehashing");

        let config = self.build_config(&default, &CryptOptions::new(), stored_rounds)?;
        let replacement = default.hash(secret, &config, ctx)?;

        return Ok(VerifyOutcome::new(true, Some(replacement)));
    }

    /// Tells if the hash does not comply with the policy. Does not verify.
    pub
    fn needs_update(&self, hash: &str) -> CryptResult<bool>
    {
        return self.needs_update_with(hash, None);
    }

    pub
    fn needs_update_with(&self, hash: &str, scheme: Option<&str>) -> CryptResult<bool>
    {
        let handler = self.select(hash, scheme)?;
        let policy = self.policy.scheme_policy(handler.name())?;

        return handler.needs_update(hash, policy);
    }

    /// Spends about the same time as [CryptContext::verify] of a default
    /// scheme hash. Used when the user is not found to hide that fact.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - always Ok(false) or Error
    pub
    fn dummy_verify(&self) -> CryptResult<bool>
    {
        let handler = self.handler(self.default_scheme())?;
        let ctx = CryptUserContext::with_user("dummy");

        if self.dummy.get().is_none() == true
        {
            let config = self.build_config(&handler, &CryptOptions::new(), None)?;
            let hash = handler.hash(CryptCommon::SAMPLE_SECRET, &config, &ctx)?;

            let _ = self.dummy.set(hash);
        }

        let dummy =
            self.dummy
                .get()
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::InternalError, "dummy hash is not initialized")
                )?;

        handler.verify(CryptCommon::SAMPLE_SECRET, dummy, &ctx)?;

        return Ok(false);
    }

    /// Marks the hash as disabled, see [UnixDisabled::disable_hash]. The
    /// marker is the `ident` of the `unix_disabled` policy settings or `!`.
    pub
    fn disable(&self, hash: Option<&str>) -> CryptResult<String>
    {
        let marker =
            self.policy
                .scheme_policy(UnixDisabled::NAME)
                .ok()
                .and_then(|p| p.ident.clone())
                .unwrap_or_else(|| UnixDisabled::DEFAULT_MARKER.to_string());

        return UnixDisabled::disable_hash(&marker, hash);
    }

    /// Restores a disabled hash, see [UnixDisabled::enable_hash].
    pub
    fn enable(&self, hash: &str) -> CryptResult<String>
    {
        return UnixDisabled::enable_hash(hash);
    }

    /// Tells if the hash is not a disabled account marker.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a flag or Error [CryptErrorCode::UnknownHashFormat]
    ///     when the hash is not a marker and is not claimed by any allowed scheme
    pub
    fn is_enabled(&self, hash: &str) -> CryptResult<bool>
    {
        if UnixDisabled::is_marker(hash) == true
        {
            return Ok(false);
        }

        self.identify_handler(hash)?;

        return Ok(true);
    }

    /// Merges the call site options over the policy settings and resolves
    /// the rounds.
    fn build_config(&self, handler: &Arc<dyn CryptHandler>, options: &CryptOptions, stored_rounds: Option<u32>)
        -> CryptResult<CryptConfig>
    {
        let policy = self.policy.scheme_policy(handler.name())?;
        let mut merged = options.clone().merged_over(&policy.to_options());

        match (handler.info().rounds, options.rounds)
        {
            // explicit rounds are checked by the handler as given
            (Some(_), Some(rounds)) =>
            {
                if let Some(min) = policy.min_rounds.filter(|m| rounds < *m)
                {
                    tracing::warn!(scheme = handler.name(), rounds, min,
                        "using rounds value below desired minimum");
                }

                if let Some(max) = policy.max_rounds.filter(|m| rounds > *m)
                {
                    tracing::warn!(scheme = handler.name(), rounds, max,
                        "using rounds value above desired maximum");
                }
            },
            (Some(ri), None) =>
            {
                let target =
                    match (policy.rounds_increase, stored_rounds)
                    {
                        (Some(pct), Some(stored)) =>
                        {
                            let increased = stored as u64 + stored as u64 * pct as u64 / 100;

                            increased.min(u32::MAX as u64) as u32
                        },
                        _ =>
                        {
                            let (lower, upper) =
                                policy.vary_rounds_range(policy.default_rounds.unwrap_or(ri.default));

                            CryptCommon::cc_random_range(lower, upper)?
                        },
                    };

                merged.rounds = Some(Self::fit_rounds(handler, policy, &ri, target));
            },
            (None, _) => {},
        }

        return handler.configure(&merged);
    }

    /// Clamps the rounds to the desired and the scheme bounds and applies
    /// the scheme preferences.
    fn fit_rounds(handler: &Arc<dyn CryptHandler>, policy: &SchemePolicy, ri: &RoundsInfo, rounds: u32) -> u32
    {
        let lower = policy.min_rounds.map(|m| m.max(ri.min)).unwrap_or(ri.min);
        let upper = policy.max_rounds.map(|m| m.min(ri.max)).unwrap_or(ri.max);

        let clamped = rounds.max(lower).min(upper);
        let normalized = handler.normalize_rounds(clamped);

        if normalized > upper && clamped > lower
        {
            return handler.normalize_rounds(clamped - 1);
        }

        return normalized;
    }
}

#[cfg(test)]
fn migration_config() -> PolicyConfig
{
    return
        PolicyConfig::new(&["pbkdf2_sha256", "des_crypt", "unix_disabled"])
            .with_deprecated("des_crypt")
            .with_options("pbkdf2_sha256", SchemePolicy{ default_rounds: Some(1000), ..Default::default() });
}

#[test]
fn context_migrates_deprecated()
{
    let ctx = CryptContext::new(migration_config()).unwrap();

    assert_eq!(ctx.identify("xOAFZqRz5RduI").unwrap(), "des_crypt");
    assert_eq!(ctx.needs_update("xOAFZqRz5RduI").unwrap(), true);

    let outcome = ctx.verify_and_update(b"password", "xOAFZqRz5RduI").unwrap();

    assert_eq!(outcome.verified, true);

    let replacement = outcome.replacement.unwrap();

    assert_eq!(replacement.starts_with("$pbkdf2-sha256$1000$"), true);
    assert_eq!(ctx.needs_update(&replacement).unwrap(), false);
    assert_eq!(ctx.verify(b"password", &replacement).unwrap(), true);

    let outcome = ctx.verify_and_update(b"password", &replacement).unwrap();
    assert_eq!(outcome, VerifyOutcome::new(true, None));
}

#[test]
fn context_never_migrates_wrong_password()
{
    let ctx = CryptContext::new(migration_config()).unwrap();

    let outcome = ctx.verify_and_update(b"wrong", "xOAFZqRz5RduI").unwrap();

    assert_eq!(outcome, VerifyOutcome::new(false, None));
}

#[test]
fn context_disabled_accounts()
{
    let ctx = CryptContext::new(migration_config()).unwrap();

    for secret in [&b""[..], &b"password"[..], &b"!"[..]].iter()
    {
        assert_eq!(ctx.verify(secret, "").unwrap(), false);
        assert_eq!(ctx.verify(secret, "!").unwrap(), false);
        assert_eq!(ctx.verify(secret, "*xOAFZqRz5RduI").unwrap(), false);
        assert_eq!(ctx.verify_and_update(secret, "!xOAFZqRz5RduI").unwrap(), VerifyOutcome::new(false, None));
    }

    let disabled = ctx.disable(Some("xOAFZqRz5RduI")).unwrap();

    assert_eq!(disabled, "!xOAFZqRz5RduI");
    assert_eq!(ctx.is_enabled(&disabled).unwrap(), false);
    assert_eq!(ctx.verify(b"password", &disabled).unwrap(), false);

    let enabled = ctx.enable(&disabled).unwrap();

    assert_eq!(enabled, "xOAFZqRz5RduI");
    assert_eq!(ctx.is_enabled(&enabled).unwrap(), true);
    assert_eq!(ctx.verify(b"password", &enabled).unwrap(), true);
}

#[test]
fn context_rounds_strict_and_relaxed()
{
    let ctx = CryptContext::new(migration_config()).unwrap();
    let user = CryptUserContext::none();

    let err = ctx.hash_with(b"password", Some("pbkdf2_sha256"), &CryptOptions::new().rounds(0), &user).err().unwrap();
    assert_eq!(err.err_code(), CryptErrorCode::InvalidConfig);

    let hash = ctx.hash_with(b"password", None, &CryptOptions::new().rounds(0).relaxed(true), &user).unwrap();
    assert_eq!(hash.starts_with("$pbkdf2-sha256$1$"), true);
    assert_eq!(ctx.verify(b"password", &hash).unwrap(), true);

    let err = ctx.hash_with(b"password", Some("bsdi_crypt"), &CryptOptions::new(), &user).err().unwrap();
    assert_eq!(err.err_code(), CryptErrorCode::UnknownScheme);
}

#[test]
fn context_rounds_increase()
{
    let config =
        PolicyConfig::new(&["pbkdf2_sha256"])
            .with_options(
                "pbkdf2_sha256",
                SchemePolicy{ min_rounds: Some(1500), default_rounds: Some(1500), rounds_increase: Some(50), ..Default::default() }
            );

    let ctx = CryptContext::new(config).unwrap();

    let stored = "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ";

    let outcome = ctx.verify_and_update(b"password", stored).unwrap();
    let replacement = outcome.replacement.unwrap();

    // 1212 + 50%
    assert_eq!(replacement.starts_with("$pbkdf2-sha256$1818$"), true);
    assert_eq!(ctx.needs_update(&replacement).unwrap(), false);

    assert_eq!(ctx.hash(b"password").unwrap().starts_with("$pbkdf2-sha256$1500$"), true);
}

#[test]
fn context_bsdi_rounds_normalized()
{
    let config =
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ default_rounds: Some(100), ..Default::default() });

    let ctx = CryptContext::new(config).unwrap();
    let hash = ctx.hash(b"password").unwrap();

    assert_eq!(ctx.handler("bsdi_crypt").unwrap().settings(&hash).unwrap().rounds, Some(101));

    let config =
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ default_rounds: Some(100), max_rounds: Some(100), ..Default::default() });

    let ctx = CryptContext::new(config).unwrap();
    let hash = ctx.hash(b"password").unwrap();

    assert_eq!(ctx.handler("bsdi_crypt").unwrap().settings(&hash).unwrap().rounds, Some(99));
    assert_eq!(ctx.needs_update(&hash).unwrap(), false);
}

#[test]
fn context_bsdi_fixed_even_rounds()
{
    // no odd value within [100, 100]
    let config =
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt",
                SchemePolicy{ default_rounds: Some(100), min_rounds: Some(100), max_rounds: Some(100), ..Default::default() });

    assert_eq!(CryptContext::new(config).err().unwrap().err_code(), CryptErrorCode::InvalidConfig);

    let config =
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt",
                SchemePolicy{ default_rounds: Some(100), min_rounds: Some(100), max_rounds: Some(101), ..Default::default() });

    let ctx = CryptContext::new(config).unwrap();
    let hash = ctx.hash(b"pw").unwrap();

    assert_eq!(ctx.handler("bsdi_crypt").unwrap().settings(&hash).unwrap().rounds, Some(101));
    assert_eq!(ctx.needs_update(&hash).unwrap(), false);

    let outcome = ctx.verify_and_update(b"pw", &hash).unwrap();
    assert_eq!(outcome, VerifyOutcome::new(true, None));
}

#[test]
fn context_vary_rounds()
{
    let config =
        PolicyConfig::new(&["pbkdf2_sha256"])
            .with_options("pbkdf2_sha256",
                SchemePolicy
                {
                    default_rounds: Some(1000),
                    min_rounds: Some(950),
                    vary_rounds: Some(VaryRounds::Rounds(100)),
                    ..Default::default()
                });

    let ctx = CryptContext::new(config).unwrap();
    let handler = ctx.handler("pbkdf2_sha256").unwrap();

    for _ in 0..16
    {
        let hash = ctx.hash(b"password").unwrap();
        let rounds = handler.settings(&hash).unwrap().rounds.unwrap();

        assert_eq!(rounds >= 950 && rounds <= 1100, true, "{}", rounds);
        assert_eq!(ctx.needs_update(&hash).unwrap(), false);
    }

    let ctx =
        CryptContext::from_toml(r#"
            schemes = ["bsdi_crypt"]

            [options.bsdi_crypt]
            default_rounds = 200
            max_rounds = 210
            vary_rounds = "10%"
        "#).unwrap();

    let handler = ctx.handler("bsdi_crypt").unwrap();

    for _ in 0..16
    {
        let hash = ctx.hash(b"password").unwrap();
        let rounds = handler.settings(&hash).unwrap().rounds.unwrap();

        assert_eq!(rounds >= 180 && rounds <= 210 && rounds % 2 == 1, true, "{}", rounds);
    }
}

#[test]
#[tracing_test::traced_test]
fn context_explicit_rounds_outside_desired()
{
    let config =
        PolicyConfig::new(&["pbkdf2_sha256"])
            .with_options("pbkdf2_sha256",
                SchemePolicy{ default_rounds: Some(1000), min_rounds: Some(900), max_rounds: Some(1100), ..Default::default() });

    let ctx = CryptContext::new(config).unwrap();
    let user = CryptUserContext::none();

    let hash = ctx.hash_with(b"password", None, &CryptOptions::new().rounds(500), &user).unwrap();

    assert_eq!(hash.starts_with("$pbkdf2-sha256$500$"), true);
    assert_eq!(ctx.needs_update(&hash).unwrap(), true);
    assert!(logs_contain("below desired minimum"));

    let hash = ctx.hash_with(b"password", None, &CryptOptions::new().rounds(1200), &user).unwrap();

    assert_eq!(hash.starts_with("$pbkdf2-sha256$1200$"), true);
    assert!(logs_contain("above desired maximum"));
}

#[test]
fn context_auto_deprecation()
{
    let ctx =
        CryptContext::from_toml(r#"
            schemes = ["pbkdf2_sha256", "bsdi_crypt", "des_crypt"]
            deprecated = ["auto"]

            [options.pbkdf2_sha256]
            default_rounds = 1000
        "#).unwrap();

    assert_eq!(ctx.default_scheme(), "pbkdf2_sha256");
    assert_eq!(ctx.needs_update("_/...K0Ayd4d.TyFrAgA").unwrap(), true);
    assert_eq!(ctx.needs_update("xOAFZqRz5RduI").unwrap(), true);
    assert_eq!(
        ctx.needs_update("$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ").unwrap(),
        false
    );

    let outcome = ctx.verify_and_update(b"password", "_/...K0Ayd4d.TyFrAgA").unwrap();
    assert_eq!(outcome.replacement.unwrap().starts_with("$pbkdf2-sha256$1000$"), true);
}

#[test]
fn context_identify_total()
{
    let ctx = CryptContext::new(PolicyConfig::new(&["pbkdf2_sha256", "des_crypt", "bsdi_crypt"])).unwrap();

    let huge = "x".repeat(1 << 20);

    for hash in ["", "$", "_", "$pbkdf2-sha256", "ЖЖЖЖЖЖЖЖЖЖЖЖЖ", "{MD5}", huge.as_str()].iter()
    {
        assert_eq!(ctx.identify(hash).err().unwrap().err_code(), CryptErrorCode::UnknownHashFormat);
    }

    assert_eq!(ctx.verify(b"password", "nope").err().unwrap().err_code(), CryptErrorCode::UnknownHashFormat);
    assert_eq!(ctx.is_enabled("nope").err().unwrap().err_code(), CryptErrorCode::UnknownHashFormat);
}

#[test]
fn context_malformed_and_limits()
{
    let ctx = CryptContext::new(migration_config()).unwrap();

    assert_eq!(
        ctx.verify(b"password", "$pbkdf2-sha256$01$4vjV83LKPjQzk31VI4E0Vw$hsYF68Oi").err().unwrap().err_code(),
        CryptErrorCode::MalformedHash
    );

    let long = vec![b'a'; CryptCommon::MAX_PASSWORD_SIZE + 1];

    assert_eq!(ctx.hash(&long).err().unwrap().err_code(), CryptErrorCode::PasswordTooLong);
    assert_eq!(ctx.verify(&long, "xOAFZqRz5RduI").err().unwrap().err_code(), CryptErrorCode::PasswordTooLong);
}

#[test]
fn context_user_context()
{
    let ctx = CryptContext::new(PolicyConfig::new(&["postgres_md5"])).unwrap();
    let user = CryptUserContext::with_user("postgres");

    let hash = ctx.hash_with(b"password", None, &CryptOptions::new(), &user).unwrap();

    assert_eq!(hash, "md532e12f215ba27cb750c9e093ce4b5127");
    assert_eq!(ctx.verify_with(b"password", &hash, None, &user).unwrap(), true);
    assert_eq!(ctx.hash(b"password").err().unwrap().err_code(), CryptErrorCode::MissingContext);
    assert_eq!(ctx.dummy_verify().unwrap(), false);
}

#[test]
fn context_dummy_verify()
{
    let ctx = CryptContext::new(migration_config()).unwrap();

    assert_eq!(ctx.dummy_verify().unwrap(), false);
    assert_eq!(ctx.dummy_verify().unwrap(), false);
}

#[test]
fn context_toml_roundtrip()
{
    let src = r#"
schemes = ["pbkdf2_sha256", "des_crypt", "unix_disabled"]
default = "pbkdf2_sha256"
deprecated = ["des_crypt"]

[options.pbkdf2_sha256]
default_rounds = 2000
min_rounds = 1000
"#;

    let ctx = CryptContext::from_toml(src).unwrap();
    let out = ctx.to_toml().unwrap();

    assert_eq!(PolicyConfig::from_toml(&out).unwrap(), PolicyConfig::from_toml(src).unwrap());
    assert_eq!(CryptContext::from_toml(&out).unwrap().schemes(), ctx.schemes());
}

#[test]
fn context_with_policy()
{
    let ctx = CryptContext::new(migration_config()).unwrap();
    let next = ctx.with_policy(PolicyConfig::new(&["bsdi_crypt", "des_crypt"])).unwrap();

    assert_eq!(ctx.default_scheme(), "pbkdf2_sha256");
    assert_eq!(next.default_scheme(), "bsdi_crypt");
    assert_eq!(next.hash(b"password").unwrap().starts_with("_"), true);
}

#[test]
fn context_shared_between_threads()
{
    let ctx = Arc::new(CryptContext::new(migration_config()).unwrap());
    let hash = ctx.hash(b"password").unwrap();

    let threads: Vec<_> =
        (0..4)
            .map(|_|
                {
                    let ctx = ctx.clone();
                    let hash = hash.clone();

                    std::thread::spawn(move || ctx.verify(b"password", &hash).unwrap())
                }
            )
            .collect();

    for t in threads
    {
        assert_eq!(t.join().unwrap(), true);
    }
}
