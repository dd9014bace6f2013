//! 에러 타입 정의

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::packet::ErrorCode;

/// TFTP 서버 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    /// 요청 거부 (검증 실패, 디스크 부족 등)
    #[error("요청 거부: {}", .0.message())]
    Refused(ErrorCode),

    #[error("잘못된 패킷: {0}")]
    Malformed(&'static str),

    /// 대상 파일 I/O 실패 (호스트 에러 그대로 전달)
    #[error("파일 IO 에러: {0}")]
    Io(#[from] io::Error),

    #[error("소켓 에러: {0}")]
    Socket(#[source] io::Error),

    #[error("전송 타임아웃: block={block}, elapsed={elapsed:?}")]
    Timeout { block: u16, elapsed: Duration },

    #[error("상대방 에러 수신: code={code}, message={message:?}")]
    Peer { code: u16, message: String },
}

impl Error {
    /// 상대방에게 보낼 에러 코드
    ///
    /// 소켓 에러, 타임아웃, 상대방 에러는 응답하지 않으므로 `None`.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Refused(code) => Some(*code),
            Error::Malformed(_) => Some(ErrorCode::IllegalOperation),
            Error::Io(e) => Some(classify_io(e)),
            Error::Socket(_) | Error::Timeout { .. } | Error::Peer { .. } => None,
        }
    }

    /// 에러 패킷으로 보고해야 하는지 여부
    pub fn is_reportable(&self) -> bool {
        self.error_code().is_some()
    }

    /// 파일 쓰기 실패를 디스크 부족과 호스트 에러로 구분
    pub(crate) fn from_write(e: io::Error) -> Self {
        match classify_io(&e) {
            ErrorCode::DiskFull => Error::Refused(ErrorCode::DiskFull),
            _ => Error::Io(e),
        }
    }
}

fn classify_io(e: &io::Error) -> ErrorCode {
    match e.kind() {
        io::ErrorKind::StorageFull | io::ErrorKind::WriteZero => ErrorCode::DiskFull,
        _ => ErrorCode::Undefined,
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
