//! Per-session crypto envelope: nonce discipline and replay protection on
//! top of the raw [`crate::aead::AeadCipher`] primitive.
//!
//! A nonce is 24 bytes composed as `direction_tag(1) || counter(8) || zero_pad(15)`.
//! Each side of a session keeps an independent send counter and an
//! independent receive replay window; wire frames are `nonce || ciphertext`
//! (see the wire grammar in the protocol spec).

use crate::CryptoError;
use crate::aead::AeadCipher;
use crate::hash::Kdf;

/// Size of a sealed-frame nonce.
pub const NONCE_SIZE: usize = 24;

/// Width of the sliding replay window, in accepted-counter slots.
const REPLAY_WINDOW_BITS: u64 = 64;

const SESSION_KEY_CONTEXT: &str = "umbral-chat-session-key-v1";

/// Direction tag distinguishing client→server frames from server→client frames.
/// Prevents a frame sealed for one direction from being replayed as if sent in
/// the other.
///
/// Tag values start at 1, not 0: the datagram codec reserves a leading
/// `0x00` byte on the wire to mark a pre-handshake cleartext frame (see
/// `chat_core::frame`), and a sealed frame's first byte is always this tag.
/// Starting the direction tags at 0 would make every client→server sealed
/// frame indistinguishable from that marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Frame travels from client to server.
    ClientToServer = 1,
    /// Frame travels from server to client.
    ServerToClient = 2,
}

impl Direction {
    fn tag(self) -> u8 {
        self as u8
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Direction::ClientToServer),
            2 => Some(Direction::ServerToClient),
            _ => None,
        }
    }
}

fn compose_nonce(direction: Direction, counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0] = direction.tag();
    nonce[1..9].copy_from_slice(&counter.to_be_bytes());
    nonce
}

fn parse_nonce(nonce: &[u8; NONCE_SIZE]) -> Option<(Direction, u64)> {
    let direction = Direction::from_tag(nonce[0])?;
    let mut counter_bytes = [0u8; 8];
    counter_bytes.copy_from_slice(&nonce[1..9]);
    Some((direction, u64::from_be_bytes(counter_bytes)))
}

/// Sliding anti-replay window anchored at the highest accepted counter.
#[derive(Debug, Default)]
struct ReplayWindow {
    ceiling: Option<u64>,
    bitmap: u64,
}

impl ReplayWindow {
    /// Returns `true` and updates state if `counter` is newly accepted.
    fn accept(&mut self, counter: u64) -> bool {
        let Some(ceiling) = self.ceiling else {
            self.ceiling = Some(counter);
            self.bitmap = 1;
            return true;
        };

        if counter > ceiling {
            let shift = counter - ceiling;
            self.bitmap = if shift >= REPLAY_WINDOW_BITS {
                0
            } else {
                self.bitmap << shift
            };
            self.bitmap |= 1;
            self.ceiling = Some(counter);
            true
        } else {
            let diff = ceiling - counter;
            if diff >= REPLAY_WINDOW_BITS {
                return false;
            }
            let bit = 1u64 << diff;
            if self.bitmap & bit != 0 {
                false
            } else {
                self.bitmap |= bit;
                true
            }
        }
    }
}

/// A sealed-frame envelope bound to one session's shared key.
///
/// Holds independent send/receive nonce state; `seal` always uses `send_dir`,
/// `open` always expects `recv_dir`, so the two ends of a session construct
/// their envelope with the tags swapped.
pub struct Envelope {
    cipher: AeadCipher,
    send_dir: Direction,
    recv_dir: Direction,
    send_counter: u64,
    recv_window: ReplayWindow,
}

impl Envelope {
    /// Derive the session AEAD key from a raw X25519 shared secret and build
    /// an envelope for one side of the session.
    #[must_use]
    pub fn from_shared_secret(shared_secret: &[u8; 32], send_dir: Direction) -> Self {
        let key = Kdf::new(SESSION_KEY_CONTEXT).derive_key(shared_secret);
        Self::from_key(key, send_dir)
    }

    /// Build an envelope directly from a derived 32-byte key (used in tests).
    #[must_use]
    pub fn from_key(key: [u8; 32], send_dir: Direction) -> Self {
        let recv_dir = match send_dir {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        };
        Self {
            cipher: AeadCipher::new(&key),
            send_dir,
            recv_dir,
            send_counter: 0,
            recv_window: ReplayWindow::default(),
        }
    }

    /// Seal a plaintext payload, returning the wire-ready `nonce || ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NonceOverflow`] if the send counter would wrap.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let counter = self.send_counter;
        let next = counter
            .checked_add(1)
            .ok_or(CryptoError::NonceOverflow)?;

        let nonce = compose_nonce(self.send_dir, counter);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext, &[])?;

        self.send_counter = next;

        let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wire.extend_from_slice(&nonce);
        wire.extend_from_slice(&ciphertext);
        Ok(wire)
    }

    /// Open a wire frame of the form `nonce || ciphertext`, verifying
    /// direction and replay state.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on a truncated frame, wrong
    /// direction tag, or MAC failure, and [`CryptoError::ReplayRejected`] if
    /// the nonce counter falls outside the accepted replay window.
    pub fn open(&mut self, wire: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if wire.len() < NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&wire[..NONCE_SIZE]);
        let ciphertext = &wire[NONCE_SIZE..];

        let (direction, counter) = parse_nonce(&nonce).ok_or(CryptoError::DecryptionFailed)?;
        if direction != self.recv_dir {
            return Err(CryptoError::DecryptionFailed);
        }

        // Decrypt before mutating replay state: a frame that fails
        // authentication must never advance or consume a replay-window slot.
        let plaintext = self.cipher.decrypt(&nonce, ciphertext, &[])?;

        if !self.recv_window.accept(counter) {
            return Err(CryptoError::ReplayRejected);
        }

        Ok(plaintext)
    }
}
