//! HTTP Signatures (draft-cavage-http-signatures-12) with `rsa-sha256`.
//!
//! A [`SignedIdentity`] signs a [`SignableRequest`] in place: missing `Date`,
//! `Host` and `Digest` headers are synthesized first, then the signing string
//! is built from the configured header list and signed with RSA PKCS#1 v1.5
//! over SHA-256. The result is attached as the `Signature` header:
//!
//! ```text
//! keyId="https://suite.example/ap/u/s/a#main-key",algorithm="rsa-sha256",headers="(request-target) host date digest",signature="<base64>"
//! ```
//!
//! The signing string is one line per header, joined by `\n`:
//!
//! ```text
//! (request-target): post /inbox
//! host: server.example
//! date: Tue, 07 Jun 2026 20:51:35 GMT
//! digest: SHA-256=<base64>
//! ```
//!
//! Signatures embed the request target and body digest, so they are computed
//! fresh for every request. [`verify_request`] performs the reverse check.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Pseudo-header covering the lowercased method and the path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// The only algorithm this module produces or accepts.
pub const ALGORITHM: &str = "rsa-sha256";

/// Header list used by [`SignedIdentity::new`]. `digest` is dropped for
/// requests without a body.
pub const DEFAULT_HEADERS: [&str; 4] = [REQUEST_TARGET, "host", "date", "digest"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a request could not be signed.
#[derive(Debug, Error, PartialEq)]
pub enum SigningError {
    #[error("header {0:?} is not set on the request and cannot be synthesized")]
    UnresolvableHeader(String),

    #[error("digest is in the signed header list but the request has no body")]
    DigestWithoutBody,

    #[error("RSA signing failed: {0}")]
    Rsa(String),
}

/// Why a received signature was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
    #[error("invalid Signature header: {0}")]
    Malformed(String),

    #[error("unsupported algorithm {0:?}")]
    Algorithm(String),

    #[error("signed header {0:?} is missing from the request")]
    MissingHeader(String),

    #[error("signature is not valid base64 RSA output: {0}")]
    Encoding(String),

    #[error("Digest header does not match the request body")]
    DigestMismatch,

    #[error("signature verification failed")]
    BadSignature,
}

/// Key generation and PEM handling failures.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("RSA key generation failed: {0}")]
    Generate(String),

    #[error("PEM error: {0}")]
    Pem(String),
}

// ---------------------------------------------------------------------------
// SigningKeypair
// ---------------------------------------------------------------------------

/// An RSA keypair, immutable once built.
///
/// One keypair is generated per process and shared by reference between all
/// simulated actors.
pub struct SigningKeypair {
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
    public_key_pem: String,
}

impl SigningKeypair {
    /// Generate a fresh keypair with a modulus of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Load a private key from PEM, accepting PKCS#8 or PKCS#1 framing.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KeyError::Pem(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, KeyError> {
        let public_key = private_key.to_public_key();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Pem(e.to_string()))?;
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key,
            public_key_pem,
        })
    }

    /// SubjectPublicKeyInfo PEM, as published in an actor's `publicKeyPem`.
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        self.signing_key
            .try_sign(data)
            .map(|sig| sig.to_vec())
            .map_err(|e| SigningError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair").finish_non_exhaustive()
    }
}

/// Decode a SubjectPublicKeyInfo PEM public key.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| KeyError::Pem(e.to_string()))
}

// ---------------------------------------------------------------------------
// SignableRequest
// ---------------------------------------------------------------------------

/// The parts of an HTTP request that participate in a signature.
///
/// Header names are matched case-insensitively; insertion order is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct SignableRequest {
    pub method: String,
    /// Path plus query string, e.g. `/ap/u/1/inbox?x=1`.
    pub path: String,
    /// `host[:port]` of the target URL.
    pub authority: String,
    headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl SignableRequest {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            authority: authority.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, slot)) => *slot = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

// ---------------------------------------------------------------------------
// SignedIdentity
// ---------------------------------------------------------------------------

/// A key identifier, a shared private key and an ordered header list.
#[derive(Clone)]
pub struct SignedIdentity {
    key_id: String,
    keypair: Arc<SigningKeypair>,
    headers: Vec<String>,
}

impl SignedIdentity {
    /// Identity signing [`DEFAULT_HEADERS`].
    pub fn new(key_id: impl Into<String>, keypair: Arc<SigningKeypair>) -> Self {
        Self {
            key_id: key_id.into(),
            keypair,
            headers: DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Replace the header list. Names are lowercased, and
    /// `(request-target)` is prepended when the list omits it.
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = headers
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        if !names.iter().any(|h| h == REQUEST_TARGET) {
            names.insert(0, REQUEST_TARGET.to_string());
        }
        self.headers = names;
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn header_names(&self) -> &[String] {
        &self.headers
    }

    /// The configured list as it applies to `req`: `digest` only when the
    /// request carries a body.
    pub fn headers_for(&self, req: &SignableRequest) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| req.body.is_some() || h.as_str() != "digest")
            .cloned()
            .collect()
    }

    /// Sign `req` with the configured header list and attach `Signature`.
    ///
    /// Returns the header value that was attached.
    pub fn sign(&self, req: &mut SignableRequest) -> Result<String, SigningError> {
        let names = self.headers_for(req);
        self.sign_with(req, &names)
    }

    /// Sign `req` over exactly `names`. Unlike [`sign`](Self::sign) this does
    /// not drop `digest` for body-less requests; asking for one is an error.
    pub fn sign_with(
        &self,
        req: &mut SignableRequest,
        names: &[String],
    ) -> Result<String, SigningError> {
        synthesize_headers(req, names)?;
        let (signing_string, used) = build_signing_string(req, names)?;
        let signature = BASE64.encode(self.keypair.sign(signing_string.as_bytes())?);
        let value = format!(
            r#"keyId="{}",algorithm="{ALGORITHM}",headers="{used}",signature="{signature}""#,
            self.key_id
        );
        req.set_header("Signature", value.clone());
        Ok(value)
    }
}

impl fmt::Debug for SignedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedIdentity")
            .field("key_id", &self.key_id)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// `SHA-256=<base64 of the SHA-256 of body>`.
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Fill in `Date`, `Host` and `Digest` for any of `names` that are unset.
fn synthesize_headers(req: &mut SignableRequest, names: &[String]) -> Result<(), SigningError> {
    for name in names {
        if req.header(name).is_some() {
            continue;
        }
        match name.as_str() {
            "date" => {
                let now = httpdate::fmt_http_date(SystemTime::now());
                req.set_header("Date", now);
            }
            "host" => {
                let authority = req.authority.clone();
                req.set_header("Host", authority);
            }
            "digest" => {
                let digest = req
                    .body
                    .as_deref()
                    .map(digest_header)
                    .ok_or(SigningError::DigestWithoutBody)?;
                req.set_header("Digest", digest);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Build the signing string for `names`, returning it together with the
/// space-joined list of header names it covers.
pub fn build_signing_string(
    req: &SignableRequest,
    names: &[String],
) -> Result<(String, String), SigningError> {
    let mut lines = Vec::with_capacity(names.len());
    let mut used = Vec::with_capacity(names.len());

    for name in names {
        let name = name.to_ascii_lowercase();
        if name == REQUEST_TARGET {
            let method = req.method.to_ascii_lowercase();
            lines.push(format!("{REQUEST_TARGET}: {method} {}", req.path));
        } else {
            let value = req
                .header(&name)
                .ok_or_else(|| SigningError::UnresolvableHeader(name.clone()))?;
            lines.push(format!("{name}: {value}"));
        }
        used.push(name);
    }

    Ok((lines.join("\n"), used.join(" ")))
}

// ---------------------------------------------------------------------------
// Parsing and verification
// ---------------------------------------------------------------------------

/// The fields of a `Signature` header.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSignature {
    pub key_id: String,
    pub algorithm: String,
    pub headers: Vec<String>,
    pub signature: String,
}

/// Parse `keyId="...",algorithm="...",headers="...",signature="..."`.
///
/// A missing `headers` field defaults to `date`, per the draft.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, VerifyError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in split_signature_params(header) {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| VerifyError::Malformed(format!("parameter without value: {part:?}")))?;
        let value = unquote(value)?;
        match name.trim() {
            "keyId" => key_id = Some(value),
            "algorithm" => algorithm = Some(value),
            "headers" => {
                headers = Some(
                    value
                        .split_whitespace()
                        .map(|h| h.to_ascii_lowercase())
                        .collect::<Vec<_>>(),
                )
            }
            "signature" => signature = Some(value),
            _ => {}
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| VerifyError::Malformed("missing keyId".into()))?,
        algorithm: algorithm.unwrap_or_else(|| ALGORITHM.into()),
        headers: headers.unwrap_or_else(|| vec!["date".into()]),
        signature: signature.ok_or_else(|| VerifyError::Malformed("missing signature".into()))?,
    })
}

/// Split at commas that sit outside double quotes.
fn split_signature_params(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in s.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn unquote(s: &str) -> Result<String, VerifyError> {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        Ok(s[1..s.len() - 1].to_string())
    } else {
        Err(VerifyError::Malformed(format!("expected quoted string, got {s:?}")))
    }
}

/// Verify the `Signature` header of a received request against `public_key`.
///
/// When `digest` is among the signed headers the `Digest` header is also
/// checked against the body. Returns the parsed header on success.
pub fn verify_request(
    req: &SignableRequest,
    public_key: &RsaPublicKey,
) -> Result<ParsedSignature, VerifyError> {
    let header = req
        .header("signature")
        .ok_or_else(|| VerifyError::MissingHeader("signature".into()))?;
    let parsed = parse_signature_header(header)?;

    if !parsed.algorithm.eq_ignore_ascii_case(ALGORITHM) && parsed.algorithm != "hs2019" {
        return Err(VerifyError::Algorithm(parsed.algorithm));
    }

    if parsed.headers.iter().any(|h| h == "digest") {
        let claimed = req
            .header("digest")
            .ok_or_else(|| VerifyError::MissingHeader("digest".into()))?;
        let actual = digest_header(req.body.as_deref().unwrap_or_default());
        if claimed != actual {
            return Err(VerifyError::DigestMismatch);
        }
    }

    let (signing_string, _) = build_signing_string(req, &parsed.headers).map_err(|e| match e {
        SigningError::UnresolvableHeader(h) => VerifyError::MissingHeader(h),
        other => VerifyError::Malformed(other.to_string()),
    })?;

    let raw = BASE64
        .decode(parsed.signature.as_bytes())
        .map_err(|e| VerifyError::Encoding(e.to_string()))?;
    let signature =
        Signature::try_from(raw.as_slice()).map_err(|e| VerifyError::Encoding(e.to_string()))?;

    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| VerifyError::BadSignature)?;

    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    const DATE: &str = "Tue, 07 Jun 2026 20:51:35 GMT";

    // 1024-bit keys keep debug-build keygen fast; the scheme is size-agnostic.
    fn keypair() -> Arc<SigningKeypair> {
        static KEY: OnceLock<Arc<SigningKeypair>> = OnceLock::new();
        KEY.get_or_init(|| Arc::new(SigningKeypair::generate(1024).unwrap()))
            .clone()
    }

    fn identity() -> SignedIdentity {
        SignedIdentity::new("https://suite.example/ap/u/s/1#main-key", keypair())
    }

    fn get_request() -> SignableRequest {
        SignableRequest::new("GET", "/users/alice", "server.example").with_header("Date", DATE)
    }

    fn post_request(body: &str) -> SignableRequest {
        SignableRequest::new("POST", "/users/alice/inbox", "server.example:8443")
            .with_header("Date", DATE)
            .with_body(body.as_bytes().to_vec())
    }

    fn signature_field(header: &str) -> String {
        parse_signature_header(header).unwrap().signature
    }

    #[test]
    fn header_has_expected_shape() {
        let mut req = get_request();
        let value = identity().sign(&mut req).unwrap();
        assert!(value.starts_with(r#"keyId="https://suite.example/ap/u/s/1#main-key",algorithm="rsa-sha256",headers="(request-target) host date",signature=""#));
        assert_eq!(req.header("signature"), Some(value.as_str()));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_date() {
        let a = identity().sign(&mut get_request()).unwrap();
        let b = identity().sign(&mut get_request()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_path_method_or_header() {
        let base = signature_field(&identity().sign(&mut get_request()).unwrap());

        let mut other_path = get_request();
        other_path.path = "/users/bob".into();
        assert_ne!(base, signature_field(&identity().sign(&mut other_path).unwrap()));

        let mut other_method = get_request();
        other_method.method = "HEAD".into();
        assert_ne!(base, signature_field(&identity().sign(&mut other_method).unwrap()));

        let mut other_date = get_request();
        other_date.set_header("Date", "Wed, 08 Jun 2026 20:51:35 GMT");
        assert_ne!(base, signature_field(&identity().sign(&mut other_date).unwrap()));
    }

    #[test]
    fn host_and_date_are_synthesized_when_absent() {
        let mut req = SignableRequest::new("GET", "/", "server.example:8443");
        identity().sign(&mut req).unwrap();
        assert_eq!(req.header("host"), Some("server.example:8443"));
        let date = req.header("date").unwrap();
        assert!(httpdate::parse_http_date(date).is_ok(), "bad date {date:?}");
    }

    #[test]
    fn existing_date_is_preserved() {
        let mut req = get_request();
        identity().sign(&mut req).unwrap();
        assert_eq!(req.header("Date"), Some(DATE));
    }

    #[test]
    fn digest_is_added_for_bodies() {
        let mut req = post_request(r#"{"type":"Follow"}"#);
        let value = identity().sign(&mut req).unwrap();
        assert!(value.contains(r#"headers="(request-target) host date digest""#));
        assert_eq!(
            req.header("digest").map(str::to_string),
            Some(digest_header(br#"{"type":"Follow"}"#))
        );
        assert!(req.header("digest").unwrap().starts_with("SHA-256="));
    }

    #[test]
    fn digest_of_known_input() {
        // SHA-256("") base64
        assert_eq!(
            digest_header(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn digest_without_body_is_an_error() {
        let mut req = get_request();
        let names: Vec<String> = DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect();
        assert_eq!(
            identity().sign_with(&mut req, &names),
            Err(SigningError::DigestWithoutBody)
        );
        assert!(req.header("signature").is_none());
    }

    #[test]
    fn unresolvable_header_is_an_error() {
        let id = identity().with_headers(["host", "date", "x-custom"]);
        let err = id.sign(&mut get_request()).unwrap_err();
        assert_eq!(err, SigningError::UnresolvableHeader("x-custom".into()));
    }

    #[test]
    fn request_target_is_always_signed() {
        let id = identity().with_headers(["Date"]);
        assert_eq!(id.header_names(), &["(request-target)".to_string(), "date".to_string()]);
        let value = id.sign(&mut get_request()).unwrap();
        assert!(value.contains(r#"headers="(request-target) date""#));
    }

    #[test]
    fn signing_string_layout() {
        let req = post_request("{}").with_header("Host", "server.example:8443");
        let names: Vec<String> = ["(request-target)", "host"].iter().map(|h| h.to_string()).collect();
        let (text, used) = build_signing_string(&req, &names).unwrap();
        assert_eq!(
            text,
            "(request-target): post /users/alice/inbox\nhost: server.example:8443"
        );
        assert_eq!(used, "(request-target) host");
    }

    #[test]
    fn signed_request_verifies() {
        let mut req = post_request(r#"{"type":"Note"}"#);
        identity().sign(&mut req).unwrap();
        let parsed = verify_request(&req, keypair().public_key()).unwrap();
        assert_eq!(parsed.key_id, "https://suite.example/ap/u/s/1#main-key");
    }

    #[test]
    fn tampered_body_fails_digest_check() {
        let mut req = post_request(r#"{"type":"Note"}"#);
        identity().sign(&mut req).unwrap();
        req.body = Some(br#"{"type":"Tombstone"}"#.to_vec());
        assert_eq!(
            verify_request(&req, keypair().public_key()),
            Err(VerifyError::DigestMismatch)
        );
    }

    #[test]
    fn tampered_path_fails_verification() {
        let mut req = get_request();
        identity().sign(&mut req).unwrap();
        req.path = "/users/mallory".into();
        assert_eq!(
            verify_request(&req, keypair().public_key()),
            Err(VerifyError::BadSignature)
        );
    }

    #[test]
    fn public_key_pem_round_trips() {
        let pem = keypair().public_key_pem().to_string();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        let decoded = public_key_from_pem(&pem).unwrap();
        assert_eq!(&decoded, keypair().public_key());
    }

    #[test]
    fn parse_handles_commas_inside_quotes() {
        let parsed = parse_signature_header(
            r#"keyId="https://x.example/a,b#k",algorithm="rsa-sha256",headers="(request-target) date",signature="abc=""#,
        )
        .unwrap();
        assert_eq!(parsed.key_id, "https://x.example/a,b#k");
        assert_eq!(parsed.headers, vec!["(request-target)", "date"]);
        assert_eq!(parsed.signature, "abc=");
    }

    #[test]
    fn parse_requires_key_id_and_signature() {
        assert!(parse_signature_header(r#"algorithm="rsa-sha256""#).is_err());
        assert!(parse_signature_header("").is_err());
    }
}
