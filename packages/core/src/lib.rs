//! Pure-logic building blocks of the apconform protocol test suite.
//!
//! Nothing in this crate performs I/O. The engine crate supplies the HTTP
//! plumbing and calls into these types to shape, sign and judge traffic.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`document`] | Open JSON-LD documents with typed access to recognised properties |
//! | [`verdict`] | [`Verdict`] and the ordered [`ResultSet`] |
//! | [`http_signature`] | RSA-SHA256 HTTP Signatures: signing, parsing, verification |

pub mod document;
pub mod http_signature;
pub mod verdict;

pub use document::{is_activity_type, Document, DocumentError, Prop, ACTIVITY_JSON, AS_CONTEXT};
pub use http_signature::{
    digest_header, parse_signature_header, verify_request, KeyError, SignableRequest,
    SignedIdentity, SigningError, SigningKeypair, VerifyError,
};
pub use verdict::{ResultSet, Tally, Verdict};
