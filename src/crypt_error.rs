/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

/// A runtime error which is returned by every fallible operation of the crate.
/// Wrong password is not an error, it is reported as `Ok(false)`.
pub struct CryptRuntimeError
{
    err_code: CryptErrorCode,
    message: String,
}

impl CryptRuntimeError
{
    pub
    fn new(err_code: CryptErrorCode, msg: String) -> Self
    {
        return CryptRuntimeError{err_code: err_code, message: msg};
    }

    /// Returns the error class.
    pub
    fn err_code(&self) -> CryptErrorCode
    {
        return self.err_code;
    }

    /// Returns the human readable description.
    pub
    fn message(&self) -> &str
    {
        return self.message.as_str();
    }
}

impl fmt::Display for CryptRuntimeError
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "crypt: {}, {}", self.err_code, self.message)
    }
}

impl fmt::Debug for CryptRuntimeError
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "crypt: {}, {}", self.err_code, self.message)
    }
}

impl std::error::Error for CryptRuntimeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptErrorCode
{
    /// A rounds, salt, variant or policy value is outside of the allowed range.
    InvalidConfig,

    /// The secret exceeds the hard limit of the scheme.
    PasswordTooLong,

    /// The secret contains bytes which the scheme can not process.
    InvalidSecret,

    /// The hash string was claimed by a scheme but can not be parsed.
    MalformedHash,

    /// No scheme of the policy recognizes the hash string.
    UnknownHashFormat,

    /// The scheme name is not registered or not allowed by the policy.
    UnknownScheme,

    /// The scheme requires a context value (i.e user) which was not provided.
    MissingContext,

    /// A failure of a third party component (RNG, serializer).
    ExternalError,

    InternalError,
}

impl fmt::Display for CryptErrorCode
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Self::InvalidConfig => write!(f, "Invalid Configuration"),
            Self::PasswordTooLong => write!(f, "Password Too Long"),
            Self::InvalidSecret => write!(f, "Invalid Secret"),
            Self::MalformedHash => write!(f, "Malformed Hash"),
            Self::UnknownHashFormat => write!(f, "Unknown Hash Format"),
            Self::UnknownScheme => write!(f, "Unknown Scheme"),
            Self::MissingContext => write!(f, "Missing Context"),
            Self::ExternalError => write!(f, "External Error"),
            Self::InternalError => write!(f, "Internal Error"),
        }
    }
}

pub type CryptResult<T> = Result<T, CryptRuntimeError>;

#[macro_export]
macro_rules! crypt_error
{
    ($src:expr,$($arg:tt)*) => (
        return std::result::Result::Err($crate::crypt_error::CryptRuntimeError::new($src, format!($($arg)*)))
    )
}

#[macro_export]
macro_rules! crypt_error_map
{
    ($src:expr,$($arg:tt)*) => (
        $crate::crypt_error::CryptRuntimeError::new($src, format!($($arg)*))
    )
}

#[test]
fn crypt_error_display()
{
    fn fail(rounds: u32) -> CryptResult<u32>
    {
        if rounds == 0
        {
            crypt_error!(CryptErrorCode::InvalidConfig, "rounds must be positive, got: {}", rounds);
        }

        return Ok(rounds);
    }

    let err = fail(0).err().unwrap();

    assert_eq!(err.err_code(), CryptErrorCode::InvalidConfig);
    assert_eq!(err.message(), "rounds must be positive, got: 0");
    assert_eq!(format!("{}", err), "crypt: Invalid Configuration, rounds must be positive, got: 0");
    assert_eq!(fail(5).unwrap(), 5);

    let mapped = crypt_error_map!(CryptErrorCode::ExternalError, "rng, {}", "down");
    assert_eq!(format!("{:?}", mapped), "crypt: External Error, rng, down");
}
