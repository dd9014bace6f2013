//! TFTP 패킷 정의
//!
//! 모든 패킷은 2바이트 opcode로 시작하며, 다중 바이트 정수는 빅엔디언이다.
//! 파일명, 모드, 에러 메시지는 NUL 종료 문자열.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result, BLOCK_SIZE};

/// 패킷 opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// 읽기 요청 (RRQ)
    ReadRequest = 1,

    /// 쓰기 요청 (WRQ)
    WriteRequest = 2,

    Data = 3,

    Ack = 4,

    Error = 5,
}

impl TryFrom<u16> for Opcode {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Opcode::ReadRequest),
            2 => Ok(Opcode::WriteRequest),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            _ => Err(Error::Malformed("알 수 없는 opcode")),
        }
    }
}

/// 전송 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 줄바꿈 변환 텍스트 모드
    NetAscii,

    /// 원시 바이트
    Octet,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::NetAscii => "netascii",
            Mode::Octet => "octet",
        }
    }

    /// 대소문자 구분 없이 모드 문자열 파싱
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "netascii" => Ok(Mode::NetAscii),
            "octet" => Ok(Mode::Octet),
            _ => Err(Error::Malformed("지원하지 않는 전송 모드")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 전송 방향 (서버 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 서버가 파일을 보냄 (상대방의 RRQ)
    Send,

    /// 서버가 파일을 받음 (상대방의 WRQ)
    Receive,
}

impl Direction {
    /// 로그용 요청 이름
    pub fn request_name(&self) -> &'static str {
        match self {
            Direction::Send => "read",
            Direction::Receive => "write",
        }
    }
}

/// 에러 코드 (RFC 1350)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Undefined = 0,
    NotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// 고정 메시지 테이블
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Undefined => "Undefined error code",
            ErrorCode::NotFound => "File not found",
            ErrorCode::AccessViolation => "Access violation",
            ErrorCode::DiskFull => "Disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "Illegal TFTP operation",
            ErrorCode::UnknownTransferId => "Unknown transfer ID",
            ErrorCode::FileExists => "File already exists",
            ErrorCode::NoSuchUser => "No such user",
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Undefined),
            1 => Some(ErrorCode::NotFound),
            2 => Some(ErrorCode::AccessViolation),
            3 => Some(ErrorCode::DiskFull),
            4 => Some(ErrorCode::IllegalOperation),
            5 => Some(ErrorCode::UnknownTransferId),
            6 => Some(ErrorCode::FileExists),
            7 => Some(ErrorCode::NoSuchUser),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// RRQ/WRQ 본문
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    pub mode: Mode,
}

impl Request {
    pub fn new(filename: impl Into<String>, mode: Mode) -> Self {
        Self {
            filename: filename.into(),
            mode,
        }
    }
}

/// 통합 패킷 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest(Request),
    WriteRequest(Request),
    Data { block: u16, payload: Bytes },
    Ack { block: u16 },
    Error { code: u16, message: String },
}

impl Packet {
    /// 패킷 opcode 반환
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::ReadRequest(_) => Opcode::ReadRequest,
            Packet::WriteRequest(_) => Opcode::WriteRequest,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack { .. } => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    /// 에러 코드 테이블 메시지로 에러 패킷 생성
    pub fn error(code: ErrorCode) -> Self {
        Packet::Error {
            code: code.as_u16(),
            message: code.message().to_string(),
        }
    }

    /// 요청 패킷이면 방향과 요청 본문으로 분해
    pub fn into_request(self) -> Option<(Direction, Request)> {
        match self {
            Packet::ReadRequest(req) => Some((Direction::Send, req)),
            Packet::WriteRequest(req) => Some((Direction::Receive, req)),
            _ => None,
        }
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + BLOCK_SIZE);
        buf.put_u16(self.opcode() as u16);

        match self {
            Packet::ReadRequest(req) | Packet::WriteRequest(req) => {
                put_cstr(&mut buf, &req.filename);
                put_cstr(&mut buf, req.mode.as_str());
            }
            Packet::Data { block, payload } => {
                buf.put_u16(*block);
                buf.put_slice(payload);
            }
            Packet::Ack { block } => buf.put_u16(*block),
            Packet::Error { code, message } => {
                buf.put_u16(*code);
                put_cstr(&mut buf, message);
            }
        }

        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// 실패는 모두 [`Error::Malformed`] (IllegalOperation).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.remaining() < 2 {
            return Err(Error::Malformed("opcode 없음"));
        }

        match Opcode::try_from(buf.get_u16())? {
            op @ (Opcode::ReadRequest | Opcode::WriteRequest) => {
                let filename = take_cstr(&mut buf)?;
                let mode = Mode::parse(&take_cstr(&mut buf)?)?;
                let req = Request { filename, mode };

                Ok(if op == Opcode::ReadRequest {
                    Packet::ReadRequest(req)
                } else {
                    Packet::WriteRequest(req)
                })
            }
            Opcode::Data => {
                if buf.remaining() < 2 {
                    return Err(Error::Malformed("블록 번호 없음"));
                }
                let block = buf.get_u16();
                if buf.remaining() > BLOCK_SIZE {
                    return Err(Error::Malformed("데이터 크기 초과"));
                }
                Ok(Packet::Data {
                    block,
                    payload: Bytes::copy_from_slice(buf),
                })
            }
            Opcode::Ack => {
                if buf.remaining() < 2 {
                    return Err(Error::Malformed("블록 번호 없음"));
                }
                Ok(Packet::Ack {
                    block: buf.get_u16(),
                })
            }
            Opcode::Error => {
                if buf.remaining() < 2 {
                    return Err(Error::Malformed("에러 코드 없음"));
                }
                let code = buf.get_u16();
                // 종료 NUL이 빠진 메시지도 허용
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                let message = String::from_utf8_lossy(&buf[..end]).into_owned();
                Ok(Packet::Error { code, message })
            }
        }
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// NUL 종료 문자열 하나를 읽고 커서를 NUL 다음으로 이동
fn take_cstr(buf: &mut &[u8]) -> Result<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::Malformed("NUL 종료 문자 없음"))?;

    let s = std::str::from_utf8(&buf[..end])
        .map_err(|_| Error::Malformed("UTF-8이 아닌 문자열"))?
        .to_string();
    buf.advance(end + 1);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decode() {
        let raw = b"\x00\x01boot/pxelinux.0\x00OcTeT\x00";
        let packet = Packet::decode(raw).unwrap();

        assert_eq!(
            packet,
            Packet::ReadRequest(Request::new("boot/pxelinux.0", Mode::Octet))
        );

        let raw = b"\x00\x02upload.txt\x00NETASCII\x00";
        let (direction, req) = Packet::decode(raw).unwrap().into_request().unwrap();
        assert_eq!(direction, Direction::Receive);
        assert_eq!(req.mode, Mode::NetAscii);
    }

    #[test]
    fn test_request_missing_terminator() {
        // 모드 문자열의 NUL 누락
        let err = Packet::decode(b"\x00\x01file\x00octet").unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::IllegalOperation));

        // 파일명부터 NUL 누락
        let err = Packet::decode(b"\x00\x01file").unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::IllegalOperation));
    }

    #[test]
    fn test_unknown_mode() {
        let err = Packet::decode(b"\x00\x01file\x00mail\x00").unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::IllegalOperation));
    }

    #[test]
    fn test_data_roundtrip() {
        let payload: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        let packet = Packet::Data {
            block: 0xBEEF,
            payload: Bytes::from(payload.clone()),
        };

        let bytes = packet.encode();
        assert_eq!(&bytes[..4], &[0x00, 0x03, 0xBE, 0xEF]);

        match Packet::decode(&bytes).unwrap() {
            Packet::Data { block, payload: p } => {
                assert_eq!(block, 0xBEEF);
                assert_eq!(p.as_ref(), payload.as_slice());
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_empty_data_is_valid() {
        let packet = Packet::decode(&[0, 3, 0, 3]).unwrap();
        assert_eq!(
            packet,
            Packet::Data {
                block: 3,
                payload: Bytes::new()
            }
        );
    }

    #[test]
    fn test_oversized_data_rejected() {
        let mut raw = vec![0, 3, 0, 1];
        raw.extend(std::iter::repeat(0xAA).take(BLOCK_SIZE + 1));
        assert!(Packet::decode(&raw).is_err());
    }

    #[test]
    fn test_error_encode() {
        let bytes = Packet::error(ErrorCode::AccessViolation).encode();
        assert_eq!(&bytes[..4], &[0, 5, 0, 2]);
        assert_eq!(&bytes[4..], b"Access violation\0");
    }

    #[test]
    fn test_short_packets() {
        assert!(Packet::decode(&[]).is_err());
        assert!(Packet::decode(&[0, 4, 0]).is_err());
        assert!(Packet::decode(&[0, 9, 0, 0]).is_err());
    }
}
