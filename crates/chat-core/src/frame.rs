//! Wire codec for the chat protocol: frame headers, primitive encoding, and
//! the outer datagram envelope that distinguishes pre-handshake cleartext
//! frames from post-handshake sealed ones.
//!
//! All multi-byte integers are big-endian. Encoding is deterministic: two
//! equal values always serialize to the same bytes, which the proptest
//! suite below leans on for roundtrip checks.

use crate::error::FrameError;

/// Upper bound on a single encoded frame, matching one UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Size of an X25519 public key as carried in the handshake.
pub const PUBKEY_SIZE: usize = 32;

/// Which logical channel a plaintext frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Caller-initiated request awaiting a response.
    Request = 0,
    /// Reply to a previously sent request.
    Response = 1,
    /// Unsolicited, not correlated to any request (`corr_id` is 0).
    Event = 2,
}

impl TryFrom<u8> for Direction {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::Event),
            other => Err(FrameError::InvalidDirection(other)),
        }
    }
}

/// One-byte operation discriminant, shared by requests, responses, and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Authenticate an existing user.
    Login = 0x10,
    /// Create a new user and authenticate as them.
    Register = 0x11,
    /// End the authenticated session.
    Logout = 0x12,
    /// Change the authenticated user's password.
    ChangePassword = 0x13,
    /// Send a public or private chat message.
    Say = 0x20,
    /// Fetch chat history for a peer (or the public log).
    GetChats = 0x21,
    /// Fetch the known user roster.
    GetUsers = 0x22,
    /// Fetch a chatroom status summary.
    FetchStatus = 0x23,
    /// Liveness ping.
    Heartbeat = 0x30,
    /// Push: a user came online.
    EventOnline = 0x40,
    /// Push: a user went offline.
    EventOffline = 0x41,
    /// Push: a new chat message arrived.
    EventNewMsg = 0x42,
    /// Push: the roster changed.
    EventUsersUpdated = 0x43,
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::Login),
            0x11 => Ok(Self::Register),
            0x12 => Ok(Self::Logout),
            0x13 => Ok(Self::ChangePassword),
            0x20 => Ok(Self::Say),
            0x21 => Ok(Self::GetChats),
            0x22 => Ok(Self::GetUsers),
            0x23 => Ok(Self::FetchStatus),
            0x30 => Ok(Self::Heartbeat),
            0x40 => Ok(Self::EventOnline),
            0x41 => Ok(Self::EventOffline),
            0x42 => Ok(Self::EventNewMsg),
            0x43 => Ok(Self::EventUsersUpdated),
            other => Err(FrameError::InvalidOpCode(other)),
        }
    }
}

/// A decoded plaintext frame: `dir(1) corr_id(4) op(1) body`.
///
/// This is the payload that travels *inside* the crypto envelope once a
/// session is sealed (or, during the handshake, is never used — the
/// handshake itself is carried by [`ClearFrame`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request, response, or event.
    pub direction: Direction,
    /// Correlates a response to its request; zero for events.
    pub corr_id: u32,
    /// Which operation this frame carries.
    pub op: OpCode,
    /// Opcode-specific encoded payload.
    pub body: Vec<u8>,
}

impl Frame {
    /// Build a new frame.
    #[must_use]
    pub fn new(direction: Direction, corr_id: u32, op: OpCode, body: Vec<u8>) -> Self {
        Self {
            direction,
            corr_id,
            op,
            body,
        }
    }

    /// Encode to the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadOverflow`] if the encoded frame would
    /// exceed [`MAX_DATAGRAM_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::with_capacity(6 + self.body.len());
        buf.push(self.direction as u8);
        buf.extend_from_slice(&self.corr_id.to_be_bytes());
        buf.push(self.op as u8);
        buf.extend_from_slice(&self.body);

        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::PayloadOverflow);
        }
        Ok(buf)
    }

    /// Decode from the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooShort`] on truncated input,
    /// [`FrameError::InvalidDirection`] / [`FrameError::InvalidOpCode`] on
    /// unknown discriminants, and [`FrameError::PayloadOverflow`] if `data`
    /// exceeds [`MAX_DATAGRAM_SIZE`].
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::PayloadOverflow);
        }
        if data.len() < 6 {
            return Err(FrameError::TooShort {
                expected: 6,
                actual: data.len(),
            });
        }

        let direction = Direction::try_from(data[0])?;
        let corr_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        let op = OpCode::try_from(data[5])?;
        let body = data[6..].to_vec();

        Ok(Self {
            direction,
            corr_id,
            op,
            body,
        })
    }
}

/// The pre-handshake cleartext exchange. Carried at the outer datagram
/// layer, never inside a sealed [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearFrame {
    /// Client → server: offer an ephemeral public key.
    Hello {
        /// The client's ephemeral X25519 public key.
        client_pub_key: [u8; PUBKEY_SIZE],
    },
    /// Server → client: the server's ephemeral public key.
    HelloAck {
        /// The server's ephemeral X25519 public key.
        server_pub_key: [u8; PUBKEY_SIZE],
    },
}

const CLEAR_TAG_HELLO: u8 = 0x01;
const CLEAR_TAG_HELLO_ACK: u8 = 0x02;

impl ClearFrame {
    /// Encode the `cleartext` production (without the outer `0x00` marker;
    /// see [`Datagram::encode`]).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + PUBKEY_SIZE);
        match self {
            Self::Hello { client_pub_key } => {
                buf.push(CLEAR_TAG_HELLO);
                buf.extend_from_slice(client_pub_key);
            }
            Self::HelloAck { server_pub_key } => {
                buf.push(CLEAR_TAG_HELLO_ACK);
                buf.extend_from_slice(server_pub_key);
            }
        }
        buf
    }

    /// Decode the `cleartext` production.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooShort`] if the public key is truncated, and
    /// [`FrameError::InvalidOpCode`] for an unrecognized tag.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::TooShort {
                expected: 1,
                actual: 0,
            });
        }
        let tag = data[0];
        let rest = &data[1..];
        if rest.len() != PUBKEY_SIZE {
            return Err(FrameError::TooShort {
                expected: 1 + PUBKEY_SIZE,
                actual: data.len(),
            });
        }
        let mut key = [0u8; PUBKEY_SIZE];
        key.copy_from_slice(rest);

        match tag {
            CLEAR_TAG_HELLO => Ok(Self::Hello {
                client_pub_key: key,
            }),
            CLEAR_TAG_HELLO_ACK => Ok(Self::HelloAck {
                server_pub_key: key,
            }),
            other => Err(FrameError::InvalidOpCode(other)),
        }
    }
}

const DATAGRAM_CLEAR_MARKER: u8 = 0x00;

/// The full outer wire unit: one UDP datagram.
///
/// ```text
/// datagram := nonce(24) ciphertext   -- post-handshake (Sealed)
///          |  0x00 cleartext         -- pre-handshake (Clear)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Pre-handshake Hello/HelloAck exchange.
    Clear(ClearFrame),
    /// Post-handshake sealed frame: `nonce || ciphertext`, opaque at this
    /// layer (the crypto envelope owns the nonce format).
    Sealed(Vec<u8>),
}

impl Datagram {
    /// Encode to the bytes that go on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadOverflow`] if the result would exceed
    /// [`MAX_DATAGRAM_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let buf = match self {
            Self::Clear(clear) => {
                let mut buf = Vec::with_capacity(1 + 1 + PUBKEY_SIZE);
                buf.push(DATAGRAM_CLEAR_MARKER);
                buf.extend_from_slice(&clear.encode());
                buf
            }
            Self::Sealed(wire) => wire.clone(),
        };

        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::PayloadOverflow);
        }
        Ok(buf)
    }

    /// Decode a raw datagram. A leading `0x00` byte always marks a
    /// cleartext handshake frame; anything else is assumed sealed (a sealed
    /// frame's leading byte is the crypto envelope's direction tag, which
    /// starts at 1 — see `chat_crypto::envelope::Direction` — so the two
    /// forms never collide on the wire).
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooShort`] on an empty datagram, and
    /// propagates [`ClearFrame::decode`] errors for a malformed handshake
    /// frame.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::TooShort {
                expected: 1,
                actual: 0,
            });
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::PayloadOverflow);
        }

        if data[0] == DATAGRAM_CLEAR_MARKER {
            Ok(Self::Clear(ClearFrame::decode(&data[1..])?))
        } else {
            Ok(Self::Sealed(data.to_vec()))
        }
    }
}

/// Write a length-prefixed (u32 big-endian) UTF-8 string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Read a length-prefixed (u32 big-endian) UTF-8 string, advancing `pos`.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if the length prefix or string body is
/// truncated, [`FrameError::PayloadOverflow`] if the declared length exceeds
/// [`MAX_DATAGRAM_SIZE`], and [`FrameError::InvalidUtf8`] if the bytes are
/// not valid UTF-8.
pub fn read_string(buf: &[u8], pos: &mut usize) -> Result<String, FrameError> {
    let len = read_u32(buf, pos)? as usize;
    if len > MAX_DATAGRAM_SIZE {
        return Err(FrameError::PayloadOverflow);
    }
    if buf.len() < *pos + len {
        return Err(FrameError::TooShort {
            expected: *pos + len,
            actual: buf.len(),
        });
    }
    let s = std::str::from_utf8(&buf[*pos..*pos + len])
        .map_err(|_| FrameError::InvalidUtf8)?
        .to_owned();
    *pos += len;
    Ok(s)
}

/// Write a length-prefixed (u32 big-endian) optional string: `0x00` for
/// `None`, `0x01` followed by the string for `Some`.
pub fn write_opt_string(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => buf.push(0),
        Some(s) => {
            buf.push(1);
            write_string(buf, s);
        }
    }
}

/// Read an optional length-prefixed string written by [`write_opt_string`].
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] on truncated input and
/// [`FrameError::InvalidUtf8`] if the inner tag byte is neither 0 nor 1.
pub fn read_opt_string(buf: &[u8], pos: &mut usize) -> Result<Option<String>, FrameError> {
    let tag = read_u8(buf, pos)?;
    match tag {
        0 => Ok(None),
        1 => Ok(Some(read_string(buf, pos)?)),
        _ => Err(FrameError::InvalidUtf8),
    }
}

/// Write a length-prefixed (u32 big-endian) byte string.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Read a length-prefixed (u32 big-endian) byte string, advancing `pos`.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if truncated or
/// [`FrameError::PayloadOverflow`] if the declared length exceeds
/// [`MAX_DATAGRAM_SIZE`].
pub fn read_bytes(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, FrameError> {
    let len = read_u32(buf, pos)? as usize;
    if len > MAX_DATAGRAM_SIZE {
        return Err(FrameError::PayloadOverflow);
    }
    if buf.len() < *pos + len {
        return Err(FrameError::TooShort {
            expected: *pos + len,
            actual: buf.len(),
        });
    }
    let out = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(out)
}

/// Write a big-endian `u32`.
pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Read a big-endian `u32`, advancing `pos`.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if fewer than 4 bytes remain.
pub fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, FrameError> {
    if buf.len() < *pos + 4 {
        return Err(FrameError::TooShort {
            expected: *pos + 4,
            actual: buf.len(),
        });
    }
    let value = u32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    Ok(value)
}

/// Write a big-endian `u64`.
pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Read a big-endian `u64`, advancing `pos`.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if fewer than 8 bytes remain.
pub fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64, FrameError> {
    if buf.len() < *pos + 8 {
        return Err(FrameError::TooShort {
            expected: *pos + 8,
            actual: buf.len(),
        });
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[*pos..*pos + 8]);
    *pos += 8;
    Ok(u64::from_be_bytes(bytes))
}

/// Write a single byte.
pub fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

/// Read a single byte, advancing `pos`.
///
/// # Errors
///
/// Returns [`FrameError::TooShort`] if no bytes remain.
pub fn read_u8(buf: &[u8], pos: &mut usize) -> Result<u8, FrameError> {
    if buf.len() < *pos + 1 {
        return Err(FrameError::TooShort {
            expected: *pos + 1,
            actual: buf.len(),
        });
    }
    let value = buf[*pos];
    *pos += 1;
    Ok(value)
}
