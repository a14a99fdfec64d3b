//! Token envelope primitives: XChaCha20-Poly1305 under an HKDF-derived,
//! purpose-bound subkey.
//!
//! All functions are pure - random bytes must be provided by the caller.
//! This keeps sealing deterministic under test.
//!
//! Wire layout of a token (before base64url):
//!
//! ```text
//! byte 0        format version (0x02, "v2")
//! bytes 1..17   key id (decryption hint)
//! bytes 17..41  XChaCha20 nonce
//! bytes 41..    ciphertext + 16-byte Poly1305 tag
//! ```
//!
//! The purpose chain never travels with the token. It enters the derivation
//! `info` and the AAD, so a token sealed under purpose P cannot open under
//! purpose Q even with identical raw key material. The version byte and key
//! id are covered by the AAD as well; no byte of the envelope is malleable.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;

/// Format version, "v2" of the token envelope.
pub const FORMAT_VERSION: u8 = 0x02;

/// XChaCha20 nonce size.
pub const NONCE_LEN: usize = 24;

const KEY_ID_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + KEY_ID_LEN + NONCE_LEN;

/// Domain separator for the HKDF expansion.
const DERIVE_LABEL: &[u8] = b"session-token/v2/";

/// Parsed view over a raw token.
#[derive(Debug)]
pub struct ParsedToken<'a> {
    pub key_id: Uuid,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: &'a [u8],
}

/// Derive the per-purpose AEAD subkey from raw key material.
pub fn derive_key(material: &[u8], purpose_chain: &str) -> Key {
    let hk = Hkdf::<Sha256>::new(None, material);
    let mut info = Vec::with_capacity(DERIVE_LABEL.len() + purpose_chain.len());
    info.extend_from_slice(DERIVE_LABEL);
    info.extend_from_slice(purpose_chain.as_bytes());

    let mut okm = [0u8; 32];
    let Ok(()) = hk.expand(&info, &mut okm) else {
        unreachable!("32-byte HKDF expansion cannot fail");
    };
    Key::from(okm)
}

/// Seal `plaintext` into a complete token byte string.
pub fn seal(
    material: &[u8],
    purpose_chain: &str,
    key_id: &Uuid,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(&derive_key(material, purpose_chain));
    let aad = build_aad(purpose_chain, key_id);

    let Ok(ciphertext) = cipher.encrypt(
        XNonce::from_slice(nonce),
        Payload {
            msg: plaintext,
            aad: &aad,
        },
    ) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    token.push(FORMAT_VERSION);
    token.extend_from_slice(key_id.as_bytes());
    token.extend_from_slice(nonce);
    token.extend_from_slice(&ciphertext);
    token
}

/// Split a raw token into its envelope fields.
///
/// Returns `None` for an unknown version or a token too short to carry a
/// tag; both are integrity failures to the caller.
pub fn parse(token: &[u8]) -> Option<ParsedToken<'_>> {
    if token.len() < HEADER_LEN + TAG_LEN || token[0] != FORMAT_VERSION {
        return None;
    }

    let key_id = Uuid::from_slice(&token[1..1 + KEY_ID_LEN]).ok()?;
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&token[1 + KEY_ID_LEN..HEADER_LEN]);

    Some(ParsedToken {
        key_id,
        nonce,
        ciphertext: &token[HEADER_LEN..],
    })
}

/// Attempt to open a parsed token with one candidate key.
///
/// `None` means the authentication tag did not verify under this key - the
/// caller moves on to the next candidate or fails the token.
pub fn open(material: &[u8], purpose_chain: &str, parsed: &ParsedToken<'_>) -> Option<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(&derive_key(material, purpose_chain));
    let aad = build_aad(purpose_chain, &parsed.key_id);

    cipher
        .decrypt(
            XNonce::from_slice(&parsed.nonce),
            Payload {
                msg: parsed.ciphertext,
                aad: &aad,
            },
        )
        .ok()
}

/// AAD covers the purpose chain plus every envelope header byte.
fn build_aad(purpose_chain: &str, key_id: &Uuid) -> Vec<u8> {
    let mut aad = Vec::with_capacity(purpose_chain.len() + 1 + KEY_ID_LEN);
    aad.extend_from_slice(purpose_chain.as_bytes());
    aad.push(FORMAT_VERSION);
    aad.extend_from_slice(key_id.as_bytes());
    aad
}
