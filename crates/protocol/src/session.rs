//! Per-exchange crypto session: RSA handshake plus hybrid frames.
//!
//! Handshake: each side writes its PKCS#1 DER public key (fixed length for a
//! given modulus size, no framing) and reads the peer's key of equal length.
//!
//! Frame: `signature ‖ envelope ‖ ciphertext`. The signature and the envelope
//! are exactly one modulus long; the ciphertext length travels inside the
//! envelope. The signature covers `envelope ‖ ciphertext`.

use crate::{
    ProtocolError,
    crypto::{self, Credentials, Envelope, IV_LEN, SharedSecret},
};
use rsa::{RsaPrivateKey, RsaPublicKey, traits::PublicKeyParts};
use serde::{Serialize, de::DeserializeOwned};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum symmetric ciphertext size: 16 MiB.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Largest command output a [`TaskResult`](crate::TaskResult) may carry.
///
/// JSON escapes a control byte as six bytes (`\u0000`), so a result whose
/// output stays under this limit always fits in one frame.
pub const MAX_OUTPUT_SIZE: usize = (MAX_FRAME_SIZE as usize - 64 * 1024) / 6;

/// Keys for a single send/receive exchange.
///
/// Never reused: both sides run [`Session::handshake`] again at the top of
/// every exchange.
pub struct Session {
    local: RsaPrivateKey,
    peer: RsaPublicKey,
    secret: SharedSecret,
}

impl Session {
    /// Assemble a session from already-exchanged keys.
    pub fn new(local: RsaPrivateKey, peer: RsaPublicKey, secret: SharedSecret) -> Self {
        Self {
            local,
            peer,
            secret,
        }
    }

    /// Generate a fresh keypair and swap public keys with the peer.
    ///
    /// Any failure leaves the stream in an unknown state; the caller must
    /// close the connection.
    pub async fn handshake<S>(
        stream: &mut S,
        credentials: &Credentials,
    ) -> Result<Self, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let bits = credentials.key_bits();
        let local = tokio::task::spawn_blocking(move || crypto::generate_keypair(bits))
            .await
            .map_err(|e| ProtocolError::Handshake(format!("key generation task failed: {e}")))??;

        let encoded = crypto::encode_public_key(&local.to_public_key())?;
        stream.write_all(&encoded).await.map_err(handshake_io)?;
        stream.flush().await.map_err(handshake_io)?;

        let mut peer_bytes = vec![0u8; encoded.len()];
        stream.read_exact(&mut peer_bytes).await.map_err(handshake_io)?;
        let peer = crypto::decode_public_key(&peer_bytes)?;
        if peer.size() != local.size() {
            return Err(ProtocolError::Handshake("peer key size mismatch".into()));
        }

        tracing::trace!("handshake complete ({bits}-bit keys)");
        Ok(Self::new(local, peer, credentials.secret().clone()))
    }

    /// This side's public key.
    pub fn public_key(&self) -> RsaPublicKey {
        self.local.to_public_key()
    }

    /// The public key received during the handshake.
    pub fn peer_key(&self) -> &RsaPublicKey {
        &self.peer
    }

    /// Encrypt, envelope and sign a payload into a complete frame.
    pub fn seal(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let ciphertext_len = payload.len() + IV_LEN;
        if ciphertext_len > MAX_FRAME_SIZE as usize {
            return Err(ProtocolError::TooLarge {
                size: u32::try_from(ciphertext_len).unwrap_or(u32::MAX),
                max: MAX_FRAME_SIZE,
            });
        }

        let key = crypto::symmetric_key();
        let ciphertext = crypto::encrypt_symmetric(&key, payload);
        let envelope = Envelope {
            secret: *self.secret.as_bytes(),
            key,
            ciphertext_len: ciphertext_len as u32,
        };

        let mut signed = crypto::seal_envelope(&self.peer, &envelope)?;
        signed.extend_from_slice(&ciphertext);
        let mut frame = crypto::sign(&self.local, &signed)?;
        frame.extend_from_slice(&signed);
        Ok(frame)
    }

    /// Seal `payload` and write the frame.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.seal(payload)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one frame and return the authenticated plaintext.
    ///
    /// The shared secret is checked as soon as the envelope is opened, before
    /// the ciphertext is read. The signature is verified before decryption.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Vec<u8>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut signature = vec![0u8; self.peer.size()];
        match reader.read_exact(&mut signature).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(e) => return Err(ProtocolError::Transport(e)),
        }

        let mut signed = vec![0u8; self.local.size()];
        reader.read_exact(&mut signed).await?;
        let envelope = crypto::open_envelope(&self.local, &signed)?;
        if !self.secret.matches(&envelope.secret) {
            return Err(ProtocolError::Authentication);
        }
        if envelope.ciphertext_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::TooLarge {
                size: envelope.ciphertext_len,
                max: MAX_FRAME_SIZE,
            });
        }

        let offset = signed.len();
        signed.resize(offset + envelope.ciphertext_len as usize, 0);
        reader.read_exact(&mut signed[offset..]).await?;

        crypto::verify(&self.peer, &signed, &signature)?;
        crypto::decrypt_symmetric(&envelope.key, &signed[offset..])
    }

    /// Serialize a message as JSON and send it as one frame.
    pub async fn send<W, T>(&self, writer: &mut W, msg: &T) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let data = serde_json::to_vec(msg)?;
        self.write_frame(writer, &data).await
    }

    /// Receive one frame and deserialize its JSON payload.
    pub async fn recv<R, T>(&self, reader: &mut R) -> Result<T, ProtocolError>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let data = self.read_frame(reader).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key_bytes", &self.local.size())
            .finish_non_exhaustive()
    }
}

fn handshake_io(e: io::Error) -> ProtocolError {
    ProtocolError::Handshake(format!("key exchange failed: {e}"))
}
