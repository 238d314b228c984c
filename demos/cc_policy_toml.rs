
use cryptctx_rs::CryptContext;
use cryptctx_rs::CryptResult;

const POLICY: &'static str = r#"
schemes = ["scram", "pbkdf2_sha512", "pbkdf2_sha256", "unix_disabled"]
default = "pbkdf2_sha512"
deprecated = ["pbkdf2_sha256"]

[options.pbkdf2_sha512]
default_rounds = 30000
min_rounds = 25000
max_rounds = 100000
rounds_increase = 10
vary_rounds = "5%"
salt_size = 24

[options.scram]
ident = "sha-1,sha-256"
default_rounds = 4096
"#;

/// Loads a policy from TOML and prints it back.
pub fn main() -> CryptResult<()>
{
    let ctx = CryptContext::from_toml(POLICY)?;

    println!("schemes: {:?}, default: {}", ctx.schemes(), ctx.default_scheme());
    println!("{}", ctx.to_toml()?);

    let scram = ctx.hash_with(b"pencil", Some("scram"), &Default::default(), &Default::default())?;

    println!("scram: {}", scram);
    println!("scram verifies: {}", ctx.verify(b"pencil", &scram)?);

    let strict = ctx.with_policy(ctx.policy().config().clone().with_default("scram"))?;

    println!("new default: {}, old default: {}", strict.default_scheme(), ctx.default_scheme());

    return Ok(());
}
