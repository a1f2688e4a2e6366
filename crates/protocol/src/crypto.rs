//! Cryptographic building blocks of the hybrid message protocol.
//!
//! - RSA keys, freshly generated for every exchange, serialized as PKCS#1 DER.
//! - RSA-OAEP (SHA-256) protects the [`Envelope`].
//! - AES-256-CFB with a random IV protects the payload.
//! - RSA PKCS#1 v1.5 signatures over SHA-256 bind envelope and ciphertext.

use crate::ProtocolError;
use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use rsa::{
    Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey},
    rand_core::OsRng,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Length of the shared-secret digest.
pub const SECRET_LEN: usize = 32;
/// Length of the per-message AES key.
pub const SYMMETRIC_KEY_LEN: usize = 32;
/// AES block size, used as the CFB IV length.
pub const IV_LEN: usize = 16;
/// Plaintext length of a serialized [`Envelope`].
pub const ENVELOPE_LEN: usize = SECRET_LEN + SYMMETRIC_KEY_LEN + 4;
/// Smallest accepted RSA modulus.
pub const MIN_KEY_BITS: usize = 2048;
/// Largest accepted RSA modulus.
pub const MAX_KEY_BITS: usize = 8192;
/// Default RSA modulus; 4096 is the hardened setting.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// SHA-256 digest of the fleet password.
///
/// Carried inside every envelope; the only authentication between
/// controller and workers.
#[derive(Clone)]
pub struct SharedSecret([u8; SECRET_LEN]);

impl SharedSecret {
    /// Hash a password into a shared secret.
    pub fn from_password(password: &str) -> Self {
        let digest = Sha256::digest(password.as_bytes());
        let mut bytes = [0u8; SECRET_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wrap an already-hashed secret.
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Constant-time comparison against a recovered digest.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        self.0.as_slice().ct_eq(candidate).into()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Everything one side needs to open sessions: the shared secret and the
/// RSA modulus size.
#[derive(Debug, Clone)]
pub struct Credentials {
    secret: SharedSecret,
    key_bits: usize,
}

impl Credentials {
    /// Validate the key size and wrap the secret.
    pub fn new(secret: SharedSecret, key_bits: usize) -> Result<Self, ProtocolError> {
        if key_bits < MIN_KEY_BITS {
            return Err(ProtocolError::Credentials("key size below 2048 bits"));
        }
        if key_bits > MAX_KEY_BITS || key_bits % 8 != 0 {
            return Err(ProtocolError::Credentials("unsupported key size"));
        }
        Ok(Self { secret, key_bits })
    }

    /// Hash `password` and validate the key size.
    pub fn from_password(password: &str, key_bits: usize) -> Result<Self, ProtocolError> {
        if password.is_empty() {
            return Err(ProtocolError::Credentials("empty password"));
        }
        Self::new(SharedSecret::from_password(password), key_bits)
    }

    /// The shared secret.
    pub fn secret(&self) -> &SharedSecret {
        &self.secret
    }

    /// RSA modulus size in bits.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }
}

/// Plaintext of the RSA-protected envelope.
///
/// Layout: `secret (32) ‖ symmetric key (32) ‖ ciphertext length (u32 BE)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender's shared-secret digest.
    pub secret: [u8; SECRET_LEN],
    /// AES key protecting the accompanying ciphertext.
    pub key: [u8; SYMMETRIC_KEY_LEN],
    /// Length of the ciphertext, IV included.
    pub ciphertext_len: u32,
}

impl Envelope {
    /// Serialize into the fixed wire layout.
    pub fn to_bytes(&self) -> [u8; ENVELOPE_LEN] {
        let mut out = [0u8; ENVELOPE_LEN];
        out[..SECRET_LEN].copy_from_slice(&self.secret);
        out[SECRET_LEN..SECRET_LEN + SYMMETRIC_KEY_LEN].copy_from_slice(&self.key);
        out[SECRET_LEN + SYMMETRIC_KEY_LEN..].copy_from_slice(&self.ciphertext_len.to_be_bytes());
        out
    }

    /// Parse the fixed wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != ENVELOPE_LEN {
            return Err(ProtocolError::Integrity("malformed envelope"));
        }
        let (secret, rest) = bytes.split_at(SECRET_LEN);
        let (key, len) = rest.split_at(SYMMETRIC_KEY_LEN);
        let mut envelope = Self {
            secret: [0u8; SECRET_LEN],
            key: [0u8; SYMMETRIC_KEY_LEN],
            ciphertext_len: 0,
        };
        envelope.secret.copy_from_slice(secret);
        envelope.key.copy_from_slice(key);
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(len);
        envelope.ciphertext_len = u32::from_be_bytes(len_buf);
        Ok(envelope)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("ciphertext_len", &self.ciphertext_len)
            .finish_non_exhaustive()
    }
}

/// Generate an RSA keypair. CPU-heavy; call from a blocking context.
pub fn generate_keypair(bits: usize) -> Result<RsaPrivateKey, ProtocolError> {
    RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| ProtocolError::Handshake(format!("key generation failed: {e}")))
}

/// Serialize a public key as PKCS#1 DER. The length is fixed per modulus size.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<Vec<u8>, ProtocolError> {
    key.to_pkcs1_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| ProtocolError::Handshake(format!("failed to encode public key: {e}")))
}

/// Parse a PKCS#1 DER public key received from the peer.
pub fn decode_public_key(bytes: &[u8]) -> Result<RsaPublicKey, ProtocolError> {
    RsaPublicKey::from_pkcs1_der(bytes)
        .map_err(|e| ProtocolError::Handshake(format!("failed to decode peer key: {e}")))
}

/// A fresh random AES-256 key.
pub fn symmetric_key() -> [u8; SYMMETRIC_KEY_LEN] {
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    key
}

/// AES-256-CFB encrypt with a random IV. Output: `IV ‖ ciphertext`.
pub fn encrypt_symmetric(key: &[u8; SYMMETRIC_KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(IV_LEN + plaintext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);
    Aes256CfbEnc::new(&(*key).into(), &iv.into()).encrypt(&mut out[IV_LEN..]);
    out
}

/// Reverse [`encrypt_symmetric`].
pub fn decrypt_symmetric(
    key: &[u8; SYMMETRIC_KEY_LEN],
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    if data.len() < IV_LEN {
        return Err(ProtocolError::Integrity("ciphertext shorter than iv"));
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);
    let mut iv_buf = [0u8; IV_LEN];
    iv_buf.copy_from_slice(iv);

    let mut plaintext = ciphertext.to_vec();
    Aes256CfbDec::new(&(*key).into(), &iv_buf.into()).decrypt(&mut plaintext);
    Ok(plaintext)
}

/// RSA-OAEP encrypt an envelope under the receiver's public key.
pub fn seal_envelope(peer: &RsaPublicKey, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    Ok(peer.encrypt(&mut OsRng, Oaep::new::<Sha256>(), &envelope.to_bytes())?)
}

/// RSA-OAEP decrypt an envelope with the local private key.
pub fn open_envelope(local: &RsaPrivateKey, sealed: &[u8]) -> Result<Envelope, ProtocolError> {
    let plaintext = local
        .decrypt(Oaep::new::<Sha256>(), sealed)
        .map_err(|_| ProtocolError::Integrity("envelope decryption failed"))?;
    Envelope::from_bytes(&plaintext)
}

/// Sign SHA-256(`data`) with PKCS#1 v1.5.
pub fn sign(local: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let digest = Sha256::digest(data);
    Ok(local.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?)
}

/// Verify a signature produced by [`sign`].
pub fn verify(peer: &RsaPublicKey, data: &[u8], signature: &[u8]) -> Result<(), ProtocolError> {
    let digest = Sha256::digest(data);
    peer.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| ProtocolError::Integrity("signature verification failed"))
}
