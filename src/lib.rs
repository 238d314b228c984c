/*-
 * Cryptctx-rs - a password hashing policy context library
 * Copyright (C) 2021-2022  Aleksandr Morozov
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 *  file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Cryptctx-RS
//!
//! A password hashing policy context. Provides:
//! - scheme handlers behind one trait: PBKDF2-SHA1/256/512, SCRAM
//!   credentials, DES crypt, BSDi crypt, hex digests, PostgreSQL MD5,
//!   LDAP and Roundup prefixed formats, disabled account markers and
//!   plaintext
//! - a registry with a validated identification order
//! - a policy context: default scheme, deprecation and rehash on verify
//!
//! For usage see ./demos/
//!
//! Files:
//! - crypt_context.rs the policy context
//! - crypt_policy.rs the policy and its TOML form
//! - crypt_registry.rs the scheme registry
//! - crypt_handler.rs the handler interface and the option validation
//! - crypt_des.rs the DES block cipher with the crypt(3) salt
//! - crypt_des_crypt.rs, crypt_bsdi_crypt.rs, crypt_pbkdf2.rs,
//!   crypt_scram.rs, crypt_digests.rs, crypt_disabled.rs, crypt_wrapper.rs
//!   the schemes
//! - crypt_digest.rs the digest and the PBKDF2 backends
//! - crypt_parser.rs, crypt_h64.rs the hash string grammar
//! - crypt_common.rs a common code
//! - crypt_error.rs error reporting code

pub mod crypt_error;
pub mod crypt_common;
pub mod crypt_h64;
pub mod crypt_des;
pub mod crypt_digest;
pub mod crypt_parser;
pub mod crypt_handler;
pub mod crypt_des_crypt;
pub mod crypt_bsdi_crypt;
pub mod crypt_pbkdf2;
pub mod crypt_scram;
pub mod crypt_digests;
pub mod crypt_disabled;
pub mod crypt_wrapper;
pub mod crypt_registry;
pub mod crypt_policy;
pub mod crypt_context;

pub use crypt_error::{CryptRuntimeError, CryptErrorCode, CryptResult};
pub use crypt_common::CryptCommon;
pub use crypt_des::{CryptDes, DesKeySchedule};
pub use crypt_digest::CryptDigestAlg;
pub use crypt_handler::
{
    CryptHandler, CryptConfig, CryptOptions, CryptUserContext, HandlerInfo,
    HashSettings, RoundsInfo, SaltInfo, SaltEncoding
};
pub use crypt_des_crypt::DesCrypt;
pub use crypt_bsdi_crypt::BsdiCrypt;
pub use crypt_pbkdf2::{Pbkdf2Handler, Pbkdf2Sha1, Pbkdf2Sha256, Pbkdf2Sha512};
pub use crypt_scram::{ScramHash, ScramDigestInfo};
pub use crypt_digests::{HexDigest, PostgresMd5, Plaintext};
pub use crypt_disabled::UnixDisabled;
pub use crypt_wrapper::PrefixWrapper;
pub use crypt_registry::{CryptRegistry, HandlerFactory, default_registry};
pub use crypt_policy::{PolicyConfig, PolicySet, SchemePolicy, VaryRounds};
pub use crypt_context::{CryptContext, VerifyOutcome};
