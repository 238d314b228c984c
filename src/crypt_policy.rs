/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A policy: the allowed schemes in the identification order, the default
//! scheme, the deprecated schemes and the per scheme settings.
//!
//! ```toml
//! schemes = ["pbkdf2_sha256", "des_crypt", "unix_disabled"]
//! default = "pbkdf2_sha256"
//! deprecated = ["auto"]
//!
//! [options.pbkdf2_sha256]
//! default_rounds = 29000
//! min_rounds = 20000
//! rounds_increase = 20
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::crypt_error::{CryptResult, CryptErrorCode};
use super::crypt_handler::CryptOptions;
use super::crypt_registry::CryptRegistry;
use super::{crypt_error, crypt_error_map};

#[inline]
fn is_false(v: &bool) -> bool
{
    return *v == false;
}

/// The settings of one scheme within a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemePolicy
{
    /// Rounds of the new hashes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rounds: Option<u32>,

    /// Stored hashes below are updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rounds: Option<u32>,

    /// Stored hashes above are updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    /// A rehash of a hash of the same scheme gets this many percent more
    /// rounds than the stored hash had.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds_increase: Option<u32>,

    /// New hashes get a random amount of rounds within `default_rounds`
    /// plus or minus this value, kept inside the desired bounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vary_rounds: Option<VaryRounds>,

    /// Salt size of the new hashes. Stored hashes with a smaller salt are
    /// updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt_size: Option<usize>,

    /// The scheme variant of the new hashes. Stored hashes of another
    /// variant are updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate_error: Option<bool>,

    #[serde(skip_serializing_if = "is_false")]
    pub relaxed: bool,

    /// Set from [PolicyConfig::deprecated].
    #[serde(skip)]
    pub deprecated: bool,
}

impl SchemePolicy
{
    pub
    fn new() -> Self
    {
        return Self::default();
    }

    /// The options which the policy passes to [crate::CryptHandler::configure].
    pub
    fn to_options(&self) -> CryptOptions
    {
        return
            CryptOptions
            {
                rounds: self.default_rounds,
                salt: None,
                salt_size: self.salt_size,
                ident: self.ident.clone(),
                truncate_error: self.truncate_error,
                relaxed: self.relaxed,
            };
    }

    fn has_rounds(&self) -> bool
    {
        return
            self.default_rounds.is_some() == true ||
            self.min_rounds.is_some() == true ||
            self.max_rounds.is_some() == true ||
            self.rounds_increase.is_some() == true ||
            self.vary_rounds.is_some() == true;
    }

    /// The range which the rounds of the new hashes are drawn from, clamped
    /// to the policy `[min_rounds, max_rounds]`.
    ///
    /// # Arguments
    ///
    /// * `default_rounds` - the rounds before the variation
    pub
    fn vary_rounds_range(&self, default_rounds: u32) -> (u32, u32)
    {
        let delta =
            match self.vary_rounds
            {
                Some(VaryRounds::Rounds(r)) => r,
                Some(VaryRounds::Percent(p)) =>
                    (default_rounds as u64 * p.min(100) as u64 / 100) as u32,
                None => 0,
            };

        return (
            clamp_desired(self, default_rounds.saturating_sub(delta)),
            clamp_desired(self, default_rounds.saturating_add(delta))
        );
    }
}

/// A spread of the rounds of the new hashes. In TOML either an integer
/// amount of rounds or a string with a percentage of `default_rounds`:
/// `vary_rounds = 100` or `vary_rounds = "10%"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VaryRoundsRepr", into = "VaryRoundsRepr")]
pub enum VaryRounds
{
    Rounds(u32),
    Percent(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VaryRoundsRepr
{
    Rounds(u32),
    Text(String),
}

impl TryFrom<VaryRoundsRepr> for VaryRounds
{
    type Error = String;

    fn try_from(value: VaryRoundsRepr) -> Result<Self, Self::Error>
    {
        match value
        {
            VaryRoundsRepr::Rounds(r) =>
                return Ok(VaryRounds::Rounds(r)),
            VaryRoundsRepr::Text(t) =>
            {
                let t = t.trim();

                let res =
                    match t.strip_suffix('%')
                    {
                        Some(p) => p.trim().parse::<u32>().map(VaryRounds::Percent),
                        None => t.parse::<u32>().map(VaryRounds::Rounds),
                    };

                return res.map_err(|e| format!("vary_rounds '{}' is not valid, {}", t, e));
            }
        }
    }
}

impl From<VaryRounds> for VaryRoundsRepr
{
    fn from(value: VaryRounds) -> Self
    {
        match value
        {
            VaryRounds::Rounds(r) => return VaryRoundsRepr::Rounds(r),
            VaryRounds::Percent(p) => return VaryRoundsRepr::Text(format!("{}%", p)),
        }
    }
}

/// The serializable form of a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig
{
    /// The allowed schemes in the identification order.
    pub schemes: Vec<String>,

    /// The scheme of the new hashes, the first scheme when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Schemes whose hashes are replaced on verify. The single entry `auto`
    /// deprecates every scheme except the default.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deprecated: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, SchemePolicy>,
}

impl PolicyConfig
{
    /// The deprecation keyword which selects every non default scheme.
    pub const AUTO: &'static str = "auto";

    pub
    fn new<S: AsRef<str>>(schemes: &[S]) -> Self
    {
        return
            PolicyConfig
            {
                schemes: schemes.iter().map(|s| s.as_ref().to_string()).collect(),
                ..Default::default()
            };
    }

    pub
    fn with_default<S: Into<String>>(mut self, scheme: S) -> Self
    {
        self.default = Some(scheme.into());

        return self;
    }

    pub
    fn with_deprecated<S: Into<String>>(mut self, scheme: S) -> Self
    {
        self.deprecated.push(scheme.into());

        return self;
    }

    pub
    fn with_options<S: Into<String>>(mut self, scheme: S, policy: SchemePolicy) -> Self
    {
        self.options.insert(scheme.into(), policy);

        return self;
    }

    /// Parses a policy from TOML.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a config or Error [CryptErrorCode::InvalidConfig]
    pub
    fn from_toml(src: &str) -> CryptResult<Self>
    {
        return
            toml::from_str(src)
                .map_err(|e|
                    crypt_error_map!(CryptErrorCode::InvalidConfig, "policy parse error, {}", e)
                );
    }

    pub
    fn to_toml(&self) -> CryptResult<String>
    {
        return
            toml::to_string(self)
                .map_err(|e|
                    crypt_error_map!(CryptErrorCode::InternalError, "policy serialize error, {}", e)
                );
    }
}

/// A validated, immutable policy.
#[derive(Debug, Clone)]
pub struct PolicySet
{
    config: PolicyConfig,
    schemes: Vec<&'static str>,
    default: &'static str,
    policies: HashMap<&'static str, SchemePolicy>,
}

impl PolicySet
{
    /// Validates the `config` against the `registry`.
    ///
    /// # Arguments
    ///
    /// * `config` - the policy
    ///
    /// * `registry` - the registry which provides the handlers
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a policy or Error [CryptErrorCode::InvalidConfig],
    ///     [CryptErrorCode::UnknownScheme]
    pub
    fn build(config: PolicyConfig, registry: &CryptRegistry) -> CryptResult<Self>
    {
        if config.schemes.is_empty() == true
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "policy without schemes");
        }

        let mut schemes: Vec<&'static str> = Vec::with_capacity(config.schemes.len());

        for name in config.schemes.iter()
        {
            let handler = registry.get(name)?;

            if schemes.contains(&handler.name()) == true
            {
                crypt_error!(CryptErrorCode::InvalidConfig, "scheme '{}' is listed twice", name);
            }

            schemes.push(handler.name());
        }

        let default =
            match config.default
            {
                Some(ref name) =>
                    schemes
                        .iter()
                        .copied()
                        .find(|s| *s == name.as_str())
                        .ok_or_else(||
                            crypt_error_map!(CryptErrorCode::InvalidConfig,
                                "default scheme '{}' is not in the schemes list", name)
                        )?,
                None => schemes[0],
            };

        let deprecated: HashSet<&'static str> =
            if config.deprecated.iter().any(|d| d == PolicyConfig::AUTO) == true
            {
                if config.deprecated.len() != 1
                {
                    crypt_error!(CryptErrorCode::InvalidConfig, "'auto' can not be mixed with scheme names");
                }

                schemes.iter().copied().filter(|s| *s != default).collect()
            }
            else
            {
                let mut set = HashSet::new();

                for name in config.deprecated.iter()
                {
                    let s =
                        schemes
                            .iter()
                            .copied()
                            .find(|s| *s == name.as_str())
                            .ok_or_else(||
                                crypt_error_map!(CryptErrorCode::InvalidConfig,
                                    "deprecated scheme '{}' is not in the schemes list", name)
                            )?;

                    if s == default
                    {
                        crypt_error!(CryptErrorCode::InvalidConfig, "default scheme '{}' can not be deprecated", s);
                    }

                    set.insert(s);
                }

                set
            };

        for name in config.options.keys()
        {
            if schemes.iter().any(|s| *s == name.as_str()) == false
            {
                crypt_error!(CryptErrorCode::InvalidConfig, "options for scheme '{}' which is not in the schemes list", name);
            }
        }

        let mut policies: HashMap<&'static str, SchemePolicy> = HashMap::with_capacity(schemes.len());

        for scheme in schemes.iter().copied()
        {
            let handler = registry.get(scheme)?;

            let mut policy = config.options.get(scheme).cloned().unwrap_or_default();
            policy.deprecated = deprecated.contains(scheme);

            match handler.info().rounds
            {
                Some(ri) =>
                {
                    if let (Some(min), Some(max)) = (policy.min_rounds, policy.max_rounds)
                    {
                        if min > max
                        {
                            crypt_error!(CryptErrorCode::InvalidConfig,
                                "{}: min_rounds {} is above max_rounds {}", scheme, min, max);
                        }
                    }

                    let lower = policy.min_rounds.map(|m| m.max(ri.min)).unwrap_or(ri.min);
                    let upper = policy.max_rounds.map(|m| m.min(ri.max)).unwrap_or(ri.max);

                    if lower > upper
                    {
                        crypt_error!(CryptErrorCode::InvalidConfig,
                            "{}: desired rounds [{}, {}] are outside of the scheme range [{}, {}]",
                            scheme, lower, upper, ri.min, ri.max);
                    }

                    // the scheme may accept only some values, e.g. odd rounds of BSDi
                    let fits = |r: u32| -> bool { return r >= lower && r <= upper; };

                    if fits(handler.normalize_rounds(lower)) == false &&
                        fits(handler.normalize_rounds(upper)) == false
                    {
                        crypt_error!(CryptErrorCode::InvalidConfig,
                            "{}: no rounds value accepted by the scheme within [{}, {}]",
                            scheme, lower, upper);
                    }

                    if let Some(VaryRounds::Percent(p)) = policy.vary_rounds
                    {
                        if p > 100
                        {
                            crypt_error!(CryptErrorCode::InvalidConfig,
                                "{}: vary_rounds {}% is above 100%", scheme, p);
                        }
                    }

                    if let Some(r) = policy.default_rounds
                    {
                        let clamped = clamp_desired(&policy, r);

                        if clamped != r
                        {
                            tracing::warn!(scheme, default_rounds = r, clamped,
                                "default_rounds is outside of the desired bounds, clamped");

                            policy.default_rounds = Some(clamped);
                        }
                    }
                },
                None if policy.has_rounds() == true =>
                    crypt_error!(CryptErrorCode::InvalidConfig, "{}: scheme does not use rounds", scheme),
                None => {},
            }

            // validates the salt, the variant and the rounds against the scheme
            let cfg = handler.configure(&policy.to_options())?;

            if policy.ident.is_some() == true
            {
                policy.ident = cfg.get_ident().map(|i| i.to_string());
            }

            policies.insert(scheme, policy);
        }

        registry.validate_order(&schemes)?;

        return Ok(
            PolicySet
            {
                config: config,
                schemes: schemes,
                default: default,
                policies: policies,
            }
        );
    }

    /// The allowed schemes in the identification order.
    pub
    fn schemes(&self) -> &[&'static str]
    {
        return &self.schemes;
    }

    pub
    fn default_scheme(&self) -> &'static str
    {
        return self.default;
    }

    /// The resolved settings of an allowed scheme.
    ///
    /// # Returns
    ///
    /// * [CryptResult] - the settings or Error [CryptErrorCode::UnknownScheme]
    pub
    fn scheme_policy(&self, scheme: &str) -> CryptResult<&SchemePolicy>
    {
        return
            self.policies
                .get(scheme)
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::UnknownScheme, "scheme '{}' is not allowed by the policy", scheme)
                );
    }

    pub
    fn is_deprecated(&self, scheme: &str) -> bool
    {
        return self.policies.get(scheme).map(|p| p.deprecated).unwrap_or(false);
    }

    /// The source of this policy.
    pub
    fn config(&self) -> &PolicyConfig
    {
        return &self.config;
    }
}

/// Clamps the rounds to the policy `[min_rounds, max_rounds]`.
pub(crate)
fn clamp_desired(policy: &SchemePolicy, rounds: u32) -> u32
{
    let mut r = rounds;

    if let Some(min) = policy.min_rounds
    {
        r = r.max(min);
    }

    if let Some(max) = policy.max_rounds
    {
        r = r.min(max);
    }

    return r;
}

#[cfg(test)]
use super::crypt_registry::default_registry;

#[test]
fn policy_basic()
{
    let reg = default_registry();

    let config =
        PolicyConfig::new(&["pbkdf2_sha256", "des_crypt", "unix_disabled"])
            .with_deprecated("des_crypt");

    let set = PolicySet::build(config, &reg).unwrap();

    assert_eq!(set.schemes(), &["pbkdf2_sha256", "des_crypt", "unix_disabled"]);
    assert_eq!(set.default_scheme(), "pbkdf2_sha256");
    assert_eq!(set.is_deprecated("des_crypt"), true);
    assert_eq!(set.is_deprecated("pbkdf2_sha256"), false);
    assert_eq!(set.scheme_policy("bsdi_crypt").err().unwrap().err_code(), CryptErrorCode::UnknownScheme);
}

#[test]
fn policy_auto_deprecation()
{
    let reg = default_registry();

    let config =
        PolicyConfig::new(&["bsdi_crypt", "pbkdf2_sha256", "des_crypt"])
            .with_default("pbkdf2_sha256")
            .with_deprecated("auto");

    let set = PolicySet::build(config, &reg).unwrap();

    assert_eq!(set.is_deprecated("bsdi_crypt"), true);
    assert_eq!(set.is_deprecated("des_crypt"), true);
    assert_eq!(set.is_deprecated("pbkdf2_sha256"), false);

    let config =
        PolicyConfig::new(&["pbkdf2_sha256", "des_crypt"])
            .with_deprecated("auto")
            .with_deprecated("des_crypt");

    assert_eq!(PolicySet::build(config, &reg).err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
}

#[test]
fn policy_invalid()
{
    let reg = default_registry();

    let bad =
    [
        PolicyConfig::new::<&str>(&[]),
        PolicyConfig::new(&["des_crypt", "des_crypt"]),
        PolicyConfig::new(&["des_crypt"]).with_default("pbkdf2_sha256"),
        PolicyConfig::new(&["des_crypt"]).with_deprecated("des_crypt"),
        PolicyConfig::new(&["des_crypt"]).with_deprecated("bsdi_crypt"),
        PolicyConfig::new(&["des_crypt"]).with_options("bsdi_crypt", SchemePolicy::new()),
        PolicyConfig::new(&["plaintext", "des_crypt"]),
        PolicyConfig::new(&["des_crypt"])
            .with_options("des_crypt", SchemePolicy{ min_rounds: Some(10), ..Default::default() }),
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ min_rounds: Some(10), max_rounds: Some(5), ..Default::default() }),
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ salt_size: Some(2), ..Default::default() }),
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ min_rounds: Some(100), max_rounds: Some(100), ..Default::default() }),
        PolicyConfig::new(&["bsdi_crypt"])
            .with_options("bsdi_crypt", SchemePolicy{ min_rounds: Some(0x0100_0000), ..Default::default() }),
        PolicyConfig::new(&["pbkdf2_sha256"])
            .with_options("pbkdf2_sha256", SchemePolicy{ vary_rounds: Some(VaryRounds::Percent(150)), ..Default::default() }),
        PolicyConfig::new(&["des_crypt"])
            .with_options("des_crypt", SchemePolicy{ vary_rounds: Some(VaryRounds::Rounds(10)), ..Default::default() }),
    ];

    for config in bad.into_iter()
    {
        let dbg = format!("{:?}", config);

        assert_eq!(PolicySet::build(config, &reg).err().unwrap().err_code(), CryptErrorCode::InvalidConfig, "{}", dbg);
    }

    assert_eq!(
        PolicySet::build(PolicyConfig::new(&["md5_crypt"]), &reg).err().unwrap().err_code(),
        CryptErrorCode::UnknownScheme
    );
}

#[test]
fn policy_default_rounds_clamped()
{
    let reg = default_registry();

    let config =
        PolicyConfig::new(&["pbkdf2_sha256"])
            .with_options(
                "pbkdf2_sha256",
                SchemePolicy{ default_rounds: Some(500), min_rounds: Some(1000), max_rounds: Some(5000), ..Default::default() }
            );

    let set = PolicySet::build(config, &reg).unwrap();

    assert_eq!(set.scheme_policy("pbkdf2_sha256").unwrap().default_rounds, Some(1000));
}

#[test]
fn policy_scram_ident_normalized()
{
    let reg = default_registry();

    let config =
        PolicyConfig::new(&["scram"])
            .with_options("scram", SchemePolicy{ ident: Some("SCRAM-SHA-256, sha1".to_string()), ..Default::default() });

    let set = PolicySet::build(config, &reg).unwrap();

    assert_eq!(set.scheme_policy("scram").unwrap().ident.as_deref(), Some("sha-1,sha-256"));
}

#[test]
fn policy_toml()
{
    let src = r#"
schemes = ["pbkdf2_sha256", "des_crypt", "unix_disabled"]
default = "pbkdf2_sha256"
deprecated = ["auto"]

[options.pbkdf2_sha256]
default_rounds = 29000
min_rounds = 20000
rounds_increase = 20
"#;

    let config = PolicyConfig::from_toml(src).unwrap();

    assert_eq!(config.schemes.len(), 3);
    assert_eq!(config.options["pbkdf2_sha256"].rounds_increase, Some(20));

    let config =
        config.with_options("pbkdf2_sha256",
            SchemePolicy{ default_rounds: Some(29000), vary_rounds: Some(VaryRounds::Percent(10)), ..Default::default() });

    let out = config.to_toml().unwrap();
    assert_eq!(PolicyConfig::from_toml(&out).unwrap(), config);

    assert_eq!(PolicyConfig::from_toml("schemes = 1").err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
    assert_eq!(PolicyConfig::from_toml("shemes = []").err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
}

#[test]
fn policy_vary_rounds()
{
    let parse =
        |v: &str| -> CryptResult<Option<VaryRounds>>
        {
            let src = format!("schemes = [\"pbkdf2_sha256\"]\n[options.pbkdf2_sha256]\nvary_rounds = {}\n", v);

            return PolicyConfig::from_toml(&src).map(|c| c.options["pbkdf2_sha256"].vary_rounds);
        };

    assert_eq!(parse("100").unwrap(), Some(VaryRounds::Rounds(100)));
    assert_eq!(parse("\"100\"").unwrap(), Some(VaryRounds::Rounds(100)));
    assert_eq!(parse("\"10%\"").unwrap(), Some(VaryRounds::Percent(10)));
    assert_eq!(parse("\"ten\"").err().unwrap().err_code(), CryptErrorCode::InvalidConfig);
    assert_eq!(parse("-5").err().unwrap().err_code(), CryptErrorCode::InvalidConfig);

    let policy =
        SchemePolicy
        {
            min_rounds: Some(950),
            max_rounds: Some(1050),
            vary_rounds: Some(VaryRounds::Percent(10)),
            ..Default::default()
        };

    assert_eq!(policy.vary_rounds_range(1000), (950, 1050));
    assert_eq!(SchemePolicy::new().vary_rounds_range(1000), (1000, 1000));

    let policy = SchemePolicy{ vary_rounds: Some(VaryRounds::Rounds(50)), ..Default::default() };

    assert_eq!(policy.vary_rounds_range(1000), (950, 1050));
    assert_eq!(policy.vary_rounds_range(20), (0, 70));
}
