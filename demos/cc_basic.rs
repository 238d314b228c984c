
use cryptctx_rs::CryptContext;
use cryptctx_rs::CryptResult;
use cryptctx_rs::PolicyConfig;
use cryptctx_rs::SchemePolicy;

/// Hashes and verifies a password with the default scheme.
pub fn main() -> CryptResult<()>
{
    let config =
        PolicyConfig::new(&["pbkdf2_sha256", "des_crypt", "unix_disabled"])
            .with_options("pbkdf2_sha256", SchemePolicy{ default_rounds: Some(29000), ..Default::default() });

    let ctx = CryptContext::new(config)?;

    let hash = ctx.hash(b"correct horse battery staple")?;

    println!("scheme: {}", ctx.identify(&hash)?);
    println!("hash: {}", hash);

    println!("right password: {}", ctx.verify(b"correct horse battery staple", &hash)?);
    println!("wrong password: {}", ctx.verify(b"correct horse battery stapler", &hash)?);

    let disabled = ctx.disable(Some(&hash))?;

    println!("disabled: {}, verifies: {}", disabled, ctx.verify(b"correct horse battery staple", &disabled)?);

    return Ok(());
}
