//! Opcode-specific request, response, and event payloads, layered on top of
//! the generic primitives in [`crate::frame`].
//!
//! A [`Frame`]'s `op` field says *which* operation a body belongs to; this
//! module is where that body's fields are actually laid out on the wire.

use crate::chat_entry::{ChatEntry, ChatKind};
use crate::error::FrameError;
use crate::frame::{
    self, Direction, Frame, OpCode, read_opt_string, read_string, read_u64, read_u8, write_opt_string,
    write_string, write_u64, write_u8,
};
use crate::time::WallClock;

/// A request body, one variant per request opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `0x10 Login`
    Login { username: String, password: String },
    /// `0x11 Register`
    Register { username: String, password: String },
    /// `0x12 Logout`
    Logout,
    /// `0x13 ChangePassword`
    ChangePassword { old: String, new: String },
    /// `0x20 Say`
    Say {
        recipient: Option<String>,
        text: String,
    },
    /// `0x21 GetChats`
    GetChats { peer: Option<String> },
    /// `0x22 GetUsers`
    GetUsers,
    /// `0x23 FetchStatus`
    FetchStatus,
    /// `0x30 Heartbeat`
    Heartbeat,
}

impl RequestBody {
    /// The opcode this body is carried under.
    #[must_use]
    pub fn op(&self) -> OpCode {
        match self {
            Self::Login { .. } => OpCode::Login,
            Self::Register { .. } => OpCode::Register,
            Self::Logout => OpCode::Logout,
            Self::ChangePassword { .. } => OpCode::ChangePassword,
            Self::Say { .. } => OpCode::Say,
            Self::GetChats { .. } => OpCode::GetChats,
            Self::GetUsers => OpCode::GetUsers,
            Self::FetchStatus => OpCode::FetchStatus,
            Self::Heartbeat => OpCode::Heartbeat,
        }
    }

    /// Encode the opcode-specific body (without the shared frame header).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Login { username, password } | Self::Register { username, password } => {
                write_string(&mut buf, username);
                write_string(&mut buf, password);
            }
            Self::Logout | Self::GetUsers | Self::FetchStatus | Self::Heartbeat => {}
            Self::ChangePassword { old, new } => {
                write_string(&mut buf, old);
                write_string(&mut buf, new);
            }
            Self::Say { recipient, text } => {
                write_opt_string(&mut buf, recipient.as_deref());
                write_string(&mut buf, text);
            }
            Self::GetChats { peer } => {
                write_opt_string(&mut buf, peer.as_deref());
            }
        }
        buf
    }

    /// Wrap this body into a full frame with the given direction and
    /// correlation id.
    #[must_use]
    pub fn into_frame(self, direction: Direction, corr_id: u32) -> Frame {
        let op = self.op();
        Frame::new(direction, corr_id, op, self.encode())
    }

    /// Decode a request body for the given opcode.
    ///
    /// # Errors
    ///
    /// Propagates [`FrameError`] from the underlying primitive readers.
    pub fn decode(op: OpCode, body: &[u8]) -> Result<Self, FrameError> {
        let mut pos = 0;
        Ok(match op {
            OpCode::Login => Self::Login {
                username: read_string(body, &mut pos)?,
                password: read_string(body, &mut pos)?,
            },
            OpCode::Register => Self::Register {
                username: read_string(body, &mut pos)?,
                password: read_string(body, &mut pos)?,
            },
            OpCode::Logout => Self::Logout,
            OpCode::ChangePassword => Self::ChangePassword {
                old: read_string(body, &mut pos)?,
                new: read_string(body, &mut pos)?,
            },
            OpCode::Say => Self::Say {
                recipient: read_opt_string(body, &mut pos)?,
                text: read_string(body, &mut pos)?,
            },
            OpCode::GetChats => Self::GetChats {
                peer: read_opt_string(body, &mut pos)?,
            },
            OpCode::GetUsers => Self::GetUsers,
            OpCode::FetchStatus => Self::FetchStatus,
            OpCode::Heartbeat => Self::Heartbeat,
            other => return Err(FrameError::InvalidOpCode(other as u8)),
        })
    }
}

/// Roster entry as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoWire {
    pub name: String,
    pub online: bool,
}

/// A chatroom status summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfoWire {
    pub online_count: u32,
    pub public_log_len: u32,
}

const CHAT_KIND_ONLINE: u8 = 0;
const CHAT_KIND_OFFLINE: u8 = 1;
const CHAT_KIND_MESSAGE: u8 = 2;

fn write_chat_entry(buf: &mut Vec<u8>, entry: &ChatEntry) {
    write_u64(buf, entry.timestamp.unix_seconds as u64);
    buf.extend_from_slice(&entry.timestamp.offset_seconds.to_be_bytes());
    write_string(buf, &entry.speaker);
    match &entry.kind {
        ChatKind::Online => write_u8(buf, CHAT_KIND_ONLINE),
        ChatKind::Offline => write_u8(buf, CHAT_KIND_OFFLINE),
        ChatKind::Message(text) => {
            write_u8(buf, CHAT_KIND_MESSAGE);
            write_string(buf, text);
        }
    }
}

fn read_chat_entry(buf: &[u8], pos: &mut usize) -> Result<ChatEntry, FrameError> {
    let unix_seconds = read_u64(buf, pos)? as i64;
    if buf.len() < *pos + 4 {
        return Err(FrameError::TooShort {
            expected: *pos + 4,
            actual: buf.len(),
        });
    }
    let offset_seconds =
        i32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    let speaker = read_string(buf, pos)?;
    let tag = read_u8(buf, pos)?;
    let kind = match tag {
        CHAT_KIND_ONLINE => ChatKind::Online,
        CHAT_KIND_OFFLINE => ChatKind::Offline,
        CHAT_KIND_MESSAGE => ChatKind::Message(read_string(buf, pos)?),
        other => return Err(FrameError::InvalidOpCode(other)),
    };
    Ok(ChatEntry {
        timestamp: WallClock {
            unix_seconds,
            offset_seconds,
        },
        speaker,
        kind,
    })
}

/// A response body. The leading tag distinguishes success shapes (which
/// vary per request opcode) from a generic structured error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// A structured failure; `kind` is the machine-readable taxonomy name
    /// from the error handling design (e.g. `"CredentialInvalid"`).
    Error { kind: String, message: String },
    /// A bare acknowledgement (Login/Register/Logout/ChangePassword/Say/Heartbeat).
    Ok,
    /// Reply to `GetUsers`.
    Users(Vec<UserInfoWire>),
    /// Reply to `GetChats`.
    Chats(Vec<ChatEntry>),
    /// Reply to `FetchStatus`.
    Status(StatusInfoWire),
}

const RESP_TAG_ERROR: u8 = 0;
const RESP_TAG_OK: u8 = 1;
const RESP_TAG_USERS: u8 = 2;
const RESP_TAG_CHATS: u8 = 3;
const RESP_TAG_STATUS: u8 = 4;

impl ResponseBody {
    /// Encode the opcode-specific body (without the shared frame header).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Error { kind, message } => {
                write_u8(&mut buf, RESP_TAG_ERROR);
                write_string(&mut buf, kind);
                write_string(&mut buf, message);
            }
            Self::Ok => write_u8(&mut buf, RESP_TAG_OK),
            Self::Users(users) => {
                write_u8(&mut buf, RESP_TAG_USERS);
                frame::write_u32(&mut buf, users.len() as u32);
                for user in users {
                    write_string(&mut buf, &user.name);
                    write_u8(&mut buf, u8::from(user.online));
                }
            }
            Self::Chats(entries) => {
                write_u8(&mut buf, RESP_TAG_CHATS);
                frame::write_u32(&mut buf, entries.len() as u32);
                for entry in entries {
                    write_chat_entry(&mut buf, entry);
                }
            }
            Self::Status(status) => {
                write_u8(&mut buf, RESP_TAG_STATUS);
                frame::write_u32(&mut buf, status.online_count);
                frame::write_u32(&mut buf, status.public_log_len);
            }
        }
        buf
    }

    /// Wrap this body into a full response frame.
    #[must_use]
    pub fn into_frame(self, op: OpCode, corr_id: u32) -> Frame {
        Frame::new(Direction::Response, corr_id, op, self.encode())
    }

    /// Decode a response body.
    ///
    /// # Errors
    ///
    /// Propagates [`FrameError`] from the underlying primitive readers.
    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        let mut pos = 0;
        let tag = read_u8(body, &mut pos)?;
        Ok(match tag {
            RESP_TAG_ERROR => Self::Error {
                kind: read_string(body, &mut pos)?,
                message: read_string(body, &mut pos)?,
            },
            RESP_TAG_OK => Self::Ok,
            RESP_TAG_USERS => {
                let count = frame::read_u32(body, &mut pos)? as usize;
                let mut users = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = read_string(body, &mut pos)?;
                    let online = read_u8(body, &mut pos)? != 0;
                    users.push(UserInfoWire { name, online });
                }
                Self::Users(users)
            }
            RESP_TAG_CHATS => {
                let count = frame::read_u32(body, &mut pos)? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(read_chat_entry(body, &mut pos)?);
                }
                Self::Chats(entries)
            }
            RESP_TAG_STATUS => Self::Status(StatusInfoWire {
                online_count: frame::read_u32(body, &mut pos)?,
                public_log_len: frame::read_u32(body, &mut pos)?,
            }),
            other => return Err(FrameError::InvalidOpCode(other)),
        })
    }
}

/// A pushed event body, one variant per event opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    /// `0x40 Event_Online`
    Online { username: String },
    /// `0x41 Event_Offline`
    Offline { username: String },
    /// `0x42 Event_NewMsg`. `from` is the mirror log key the message
    /// belongs to (`None` for the public log, `Some(sender)` for a private
    /// one); `entry` is the posted message itself, so a receiver can merge
    /// it into an already-fetched log without a round trip.
    NewMsg {
        from: Option<String>,
        entry: ChatEntry,
    },
    /// `0x43 Event_UsersUpdated`
    UsersUpdated,
}

impl EventBody {
    /// The opcode this event is carried under.
    #[must_use]
    pub fn op(&self) -> OpCode {
        match self {
            Self::Online { .. } => OpCode::EventOnline,
            Self::Offline { .. } => OpCode::EventOffline,
            Self::NewMsg { .. } => OpCode::EventNewMsg,
            Self::UsersUpdated => OpCode::EventUsersUpdated,
        }
    }

    /// Encode the opcode-specific body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Online { username } | Self::Offline { username } => {
                write_string(&mut buf, username);
            }
            Self::NewMsg { from, entry } => {
                write_opt_string(&mut buf, from.as_deref());
                write_chat_entry(&mut buf, entry);
            }
            Self::UsersUpdated => {}
        }
        buf
    }

    /// Wrap this event into a full frame. Events always carry `corr_id = 0`.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        let op = self.op();
        Frame::new(Direction::Event, 0, op, self.encode())
    }

    /// Decode an event body for the given opcode.
    ///
    /// # Errors
    ///
    /// Propagates [`FrameError`] from the underlying primitive readers.
    pub fn decode(op: OpCode, body: &[u8]) -> Result<Self, FrameError> {
        let mut pos = 0;
        Ok(match op {
            OpCode::EventOnline => Self::Online {
                username: read_string(body, &mut pos)?,
            },
            OpCode::EventOffline => Self::Offline {
                username: read_string(body, &mut pos)?,
            },
            OpCode::EventNewMsg => Self::NewMsg {
                from: read_opt_string(body, &mut pos)?,
                entry: read_chat_entry(body, &mut pos)?,
            },
            OpCode::EventUsersUpdated => Self::UsersUpdated,
            other => return Err(FrameError::InvalidOpCode(other as u8)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_login_roundtrip() {
        let req = RequestBody::Login {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        let frame = req.clone().into_frame(Direction::Request, 7);
        let decoded = RequestBody::decode(frame.op, &frame.body).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn request_say_with_public_recipient_roundtrip() {
        let req = RequestBody::Say {
            recipient: None,
            text: "hello room".into(),
        };
        let encoded = req.encode();
        let decoded = RequestBody::decode(OpCode::Say, &encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_error_roundtrip() {
        let resp = ResponseBody::Error {
            kind: "CredentialInvalid".into(),
            message: "bad password".into(),
        };
        let encoded = resp.encode();
        assert_eq!(ResponseBody::decode(&encoded).unwrap(), resp);
    }

    #[test]
    fn response_users_roundtrip() {
        let resp = ResponseBody::Users(vec![
            UserInfoWire {
                name: "alice".into(),
                online: true,
            },
            UserInfoWire {
                name: "bob".into(),
                online: false,
            },
        ]);
        let encoded = resp.encode();
        assert_eq!(ResponseBody::decode(&encoded).unwrap(), resp);
    }

    #[test]
    fn response_chats_roundtrip() {
        let entry = ChatEntry::new(
            WallClock::from_unix_seconds(1_700_000_000),
            "alice",
            ChatKind::Message("hi".into()),
        );
        let resp = ResponseBody::Chats(vec![entry]);
        let encoded = resp.encode();
        assert_eq!(ResponseBody::decode(&encoded).unwrap(), resp);
    }

    #[test]
    fn event_new_msg_roundtrip() {
        let event = EventBody::NewMsg {
            from: Some("alice".into()),
            entry: ChatEntry::new(
                WallClock::from_unix_seconds(1_700_000_000),
                "alice",
                ChatKind::Message("hi".into()),
            ),
        };
        let frame = event.clone().into_frame();
        assert_eq!(frame.direction, Direction::Event);
        assert_eq!(frame.corr_id, 0);
        assert_eq!(EventBody::decode(frame.op, &frame.body).unwrap(), event);
    }
}
