
use std::sync::Arc;

use cryptctx_rs::{crypt_error, crypt_error_map};
use cryptctx_rs::CryptCommon;
use cryptctx_rs::CryptConfig;
use cryptctx_rs::CryptContext;
use cryptctx_rs::CryptDigestAlg;
use cryptctx_rs::CryptErrorCode;
use cryptctx_rs::CryptHandler;
use cryptctx_rs::CryptRegistry;
use cryptctx_rs::CryptResult;
use cryptctx_rs::CryptUserContext;
use cryptctx_rs::HandlerInfo;
use cryptctx_rs::HashSettings;
use cryptctx_rs::PolicyConfig;
use cryptctx_rs::SaltEncoding;
use cryptctx_rs::SaltInfo;

/// A salted SHA-256: `{SSHA256}` + ab64(salt) + `$` + hex(sha256(salt || password)).
struct SaltedSha256
{
    info: HandlerInfo,
}

impl SaltedSha256
{
    const IDENT: &'static str = "{SSHA256}";

    pub
    fn new() -> Self
    {
        let mut info = HandlerInfo::new("salted_sha256");

        info.ident = Some(Self::IDENT);
        info.salt = Some(SaltInfo{ min_size: 4, max_size: 64, default_size: 16, encoding: SaltEncoding::Ab64 });

        return SaltedSha256{ info: info };
    }

    fn checksum(salt: &[u8], secret: &[u8]) -> String
    {
        let mut data = Vec::with_capacity(salt.len() + secret.len());
        data.extend_from_slice(salt);
        data.extend_from_slice(secret);

        return hex::encode(CryptDigestAlg::Sha256.hash(&data));
    }

    fn split<'h>(&self, hash: &'h str) -> CryptResult<(Vec<u8>, &'h str)>
    {
        let body =
            hash.strip_prefix(Self::IDENT)
                .ok_or_else(|| crypt_error_map!(CryptErrorCode::MalformedHash, "salted_sha256: no prefix"))?;

        match body.split_once('$')
        {
            Some((salt, chk)) => return Ok((CryptCommon::ab64_decode(salt)?, chk)),
            None => crypt_error!(CryptErrorCode::MalformedHash, "salted_sha256: no checksum"),
        }
    }
}

impl CryptHandler for SaltedSha256
{
    fn info(&self) -> &HandlerInfo
    {
        return &self.info;
    }

    fn identify(&self, hash: &str) -> bool
    {
        return hash.starts_with(Self::IDENT);
    }

    fn hash(&self, secret: &[u8], config: &CryptConfig, _ctx: &CryptUserContext) -> CryptResult<String>
    {
        let salt = config.salt_or_generate(&self.info)?;
        let raw_salt = CryptCommon::ab64_decode(&salt)?;

        return Ok(format!("{}{}${}", Self::IDENT, salt, Self::checksum(&raw_salt, secret)));
    }

    fn verify(&self, secret: &[u8], hash: &str, _ctx: &CryptUserContext) -> CryptResult<bool>
    {
        let (salt, chk) = self.split(hash)?;

        return Ok(CryptCommon::consteq(Self::checksum(&salt, secret).as_bytes(), chk.as_bytes()));
    }

    fn settings(&self, hash: &str) -> CryptResult<HashSettings>
    {
        let (salt, _) = self.split(hash)?;

        let mut settings = HashSettings::new(self.info.name);
        settings.salt_size = Some(salt.len());

        return Ok(settings);
    }
}

/// Registers an own scheme next to the shipped ones.
pub fn main() -> CryptResult<()>
{
    let mut registry = CryptRegistry::with_builtins();

    registry.register(Arc::new(SaltedSha256::new()))?;

    let ctx =
        CryptContext::with_registry(
            PolicyConfig::new(&["pbkdf2_sha256", "salted_sha256"]).with_deprecated("salted_sha256"),
            Arc::new(registry)
        )?;

    let legacy = ctx.hash_with(b"hunter2", Some("salted_sha256"), &Default::default(), &Default::default())?;

    println!("legacy: {}", legacy);

    let outcome = ctx.verify_and_update(b"hunter2", &legacy)?;

    println!("verified: {}, replacement: {:?}", outcome.verified, outcome.replacement);

    return Ok(());
}
