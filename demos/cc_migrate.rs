
use std::collections::HashMap;

use cryptctx_rs::CryptContext;
use cryptctx_rs::CryptResult;
use cryptctx_rs::PolicyConfig;

/// Replaces the legacy hashes of a user database on login.
pub fn main() -> CryptResult<()>
{
    let ctx =
        CryptContext::new(
            PolicyConfig::new(&["pbkdf2_sha256", "bsdi_crypt", "des_crypt"])
                .with_deprecated("auto")
        )?;

    let mut db: HashMap<&str, String> = HashMap::new();

    db.insert("alice", "xOAFZqRz5RduI".to_string());
    db.insert("bob", "_/...K0Ayd4d.TyFrAgA".to_string());

    for user in ["alice", "bob"]
    {
        let stored = db[user].clone();

        println!("{}: stored with {}, needs update: {}", user, ctx.identify(&stored)?, ctx.needs_update(&stored)?);

        let outcome = ctx.verify_and_update(b"password", &stored)?;

        if outcome.verified == false
        {
            println!("{}: login failed", user);
            continue;
        }

        if let Some(new_hash) = outcome.replacement
        {
            println!("{}: rehashed to {}", user, new_hash);

            db.insert(user, new_hash);
        }
    }

    for (user, hash) in db.iter()
    {
        println!("{}: {}, needs update: {}", user, hash, ctx.needs_update(hash)?);
    }

    return Ok(());
}
