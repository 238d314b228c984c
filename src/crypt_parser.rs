/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Modular crypt format helpers: `{ident}{rounds}$salt[$checksum]` and a
//! field reader for the custom layouts.

use std::str::Split;

use super::crypt_error::{CryptResult, CryptErrorCode};
use super::{crypt_error, crypt_error_map};

/// Fields of a hash string with the rounds component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptMc3<'par>
{
    /// decimal rounds
    pub rounds: u32,

    /// encoded salt
    pub salt: &'par str,

    /// encoded checksum, `None` when the string is a configuration only
    pub checksum: Option<&'par str>,
}

/// A field reader over a hash string with the lifetime 'par.
pub struct CryptMcfParser<'par>
{
    scheme: &'static str,
    fields: Split<'par, char>,
    count: usize,
}

impl<'par> CryptMcfParser<'par>
{
    /// Strips the `ident` prefix and prepares the field iterator.
    ///
    /// # Arguments
    ///
    /// * `scheme` - a scheme name for the error messages
    ///
    /// * `hash` - the full hash string
    ///
    /// * `ident` - the tag prefix
    ///
    /// * `sep` - the field separator
    ///
    /// # Returns
    ///
    /// * [CryptResult] - a parser or Error [CryptErrorCode::MalformedHash]
    pub
    fn from_raw(scheme: &'static str, hash: &'par str, ident: &str, sep: char) -> CryptResult<Self>
    {
        let rest =
            hash.strip_prefix(ident)
                .ok_or_else(||
                    crypt_error_map!(CryptErrorCode::MalformedHash, "{}: hash does not start with '{}'", scheme, ident)
                )?;

        return Ok(
            CryptMcfParser
            {
                scheme: scheme,
                fields: rest.split(sep),
                count: 0,
            }
        );
    }

    /// Reads the next field or fails when the string ended.
    pub
    fn next_field(&mut self) -> CryptResult<&'par str>
    {
        match self.fields.next()
        {
            Some(f) =>
            {
                self.count += 1;
                return Ok(f);
            },
            None => crypt_error!(CryptErrorCode::MalformedHash,
                                "{}: unexpected end of hash at field {}", self.scheme, self.count),
        }
    }

    /// Reads the next field if any. A present but empty field is a
    /// malformed hash.
    pub
    fn next_optional(&mut self) -> CryptResult<Option<&'par str>>
    {
        match self.fields.next()
        {
            Some(f) =>
            {
                self.count += 1;

                if f.is_empty() == true
                {
                    crypt_error!(CryptErrorCode::MalformedHash,
                                "{}: empty field {}", self.scheme, self.count);
                }

                return Ok(Some(f));
            },
            None =>
                return Ok(None),
        }
    }

    /// Reads a decimal rounds field.
    pub
    fn next_rounds(&mut self) -> CryptResult<u32>
    {
        let field = self.next_field()?;

        return parse_rounds(self.scheme, field);
    }

    /// Makes sure that no fields left.
    pub
    fn finish(mut self) -> CryptResult<()>
    {
        if self.fields.next().is_some() == true
        {
            crypt_error!(CryptErrorCode::MalformedHash,
                        "{}: unexpected fields after field {}", self.scheme, self.count);
        }

        return Ok(());
    }
}

/// Parses a decimal rounds value. Empty, signed and zero padded values
/// are rejected to keep the encoding canonical.
pub
fn parse_rounds(scheme: &str, field: &str) -> CryptResult<u32>
{
    if field.is_empty() == true
    {
        crypt_error!(CryptErrorCode::MalformedHash, "{}: empty rounds field", scheme);
    }
    else if field.bytes().all(|b| b.is_ascii_digit()) == false
    {
        crypt_error!(CryptErrorCode::MalformedHash, "{}: rounds field is not a decimal number", scheme);
    }
    else if field.len() > 1 && field.starts_with('0') == true
    {
        crypt_error!(CryptErrorCode::MalformedHash, "{}: zero-padded rounds field", scheme);
    }

    return
        field.parse::<u32>()
            .map_err(|e|
                crypt_error_map!(CryptErrorCode::MalformedHash, "{}: rounds field, {}", scheme, e)
            );
}

/// Parses `{ident}{rounds}{sep}{salt}[{sep}{checksum}]`.
pub
fn parse_mc3<'par>(scheme: &'static str, hash: &'par str, ident: &str, sep: char) -> CryptResult<CryptMc3<'par>>
{
    let mut parser = CryptMcfParser::from_raw(scheme, hash, ident, sep)?;

    let rounds = parser.next_rounds()?;
    let salt = parser.next_field()?;
    let checksum = parser.next_optional()?;

    parser.finish()?;

    return Ok(CryptMc3{ rounds: rounds, salt: salt, checksum: checksum });
}

/// Renders the fields back, the exact inverse of [parse_mc3].
pub
fn render_mc3(ident: &str, rounds: u32, salt: &str, checksum: Option<&str>, sep: char) -> String
{
    return
        match checksum
        {
            Some(chk) => format!("{}{}{}{}{}{}", ident, rounds, sep, salt, sep, chk),
            None => format!("{}{}{}{}", ident, rounds, sep, salt),
        };
}

#[test]
fn mc3_parse()
{
    let h = "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ";
    let res = parse_mc3("pbkdf2_sha256", h, "$pbkdf2-sha256$", '$').unwrap();

    assert_eq!(res.rounds, 1212);
    assert_eq!(res.salt, "4vjV83LKPjQzk31VI4E0Vw");
    assert_eq!(res.checksum, Some("hsYF68OiOUPdDZ1Fg.fJPeq1h/gXXY7acBp9/6c.tmQ"));

    assert_eq!(render_mc3("$pbkdf2-sha256$", res.rounds, res.salt, res.checksum, '$'), h);

    let cfg = parse_mc3("pbkdf2_sha256", "$pbkdf2-sha256$1212$salt", "$pbkdf2-sha256$", '$').unwrap();
    assert_eq!(cfg.checksum, None);
}

#[test]
fn mc3_parse_rejects()
{
    let bad =
    [
        "$pbkdf2-sha256$01212$salt$chk",
        "$pbkdf2-sha256$$salt$chk",
        "$pbkdf2-sha256$-5$salt$chk",
        "$pbkdf2-sha256$99999999999$salt$chk",
        "$pbkdf2-sha256$1212",
        "$pbkdf2-sha256$1212$salt$chk$extra",
        "$pbkdf2-sha256$1212$4vjV83LKPjQzk31VI4E0Vw$",
        "$pbkdf2$1212$salt$chk",
    ];

    for b in bad.iter()
    {
        let err = parse_mc3("pbkdf2_sha256", b, "$pbkdf2-sha256$", '$').err().unwrap();

        assert_eq!(err.err_code(), CryptErrorCode::MalformedHash, "{}", b);
    }

    assert_eq!(parse_rounds("x", "0").unwrap(), 0);
}
