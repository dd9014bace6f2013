//! 에러 패킷 보고
//!
//! 종료 사유 하나당 ERROR 패킷 하나. 재전송하지 않으며, 이후 다른 패킷도 보내지 않는다.

use std::io;

use tracing::{debug, warn};

use crate::link::PeerLink;
use crate::packet::{ErrorCode, Packet};
use crate::Error;

/// 에러에 해당하는 ERROR 패킷
///
/// 호스트 에러는 코드 0 (Undefined)에 호스트 에러 문구를 싣는다.
/// 보고 대상이 아니면 `None`.
pub fn error_packet(err: &Error) -> Option<Packet> {
    match err {
        Error::Io(e) => match err.error_code()? {
            ErrorCode::Undefined => Some(Packet::Error {
                code: ErrorCode::Undefined.as_u16(),
                message: host_message(e),
            }),
            code => Some(Packet::error(code)),
        },
        _ => err.error_code().map(Packet::error),
    }
}

/// 상대방에게 에러 보고
///
/// 패킷을 보냈으면 `true`. 전송 실패는 로그만 남긴다.
pub async fn report(link: &PeerLink, err: &Error) -> bool {
    let Some(packet) = error_packet(err) else {
        debug!("보고하지 않는 에러: {}", err);
        return false;
    };

    match link.send(&packet).await {
        Ok(()) => {
            debug!("ERROR 전송 → {}: {:?}", link.peer(), packet);
            true
        }
        Err(e) => {
            warn!("ERROR 전송 실패 → {}: {}", link.peer(), e);
            false
        }
    }
}

/// `(os error N)` 접미사를 뗀 호스트 에러 문구
fn host_message(e: &io::Error) -> String {
    let text = e.to_string();
    let Some(code) = e.raw_os_error() else {
        return text;
    };
    let suffix = format!(" (os error {})", code);
    match text.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}
