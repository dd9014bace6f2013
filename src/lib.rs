//! # tftpd
//!
//! UDP 기반 lock-step 파일 전송 (TFTP, RFC 1350) 엔진
//!
//! ## 핵심 특징
//! - **Lock-step**: 블록마다 ACK를 받은 뒤 다음 블록 전송
//! - **재동기화**: 중복 ACK/DATA 수신 시 전진 없이 재전송
//! - **제한된 타임아웃**: 블록당 누적 대기 시간 초과 시 전송 중단
//! - **경로 검증**: 디렉터리 허용 목록 + 권한 비트 검사
//! - **전송 모드**: octet (원시 바이트), netascii (줄바꿈 변환)

pub mod config;
pub mod convert;
pub mod error;
pub mod link;
pub mod packet;
pub mod report;
pub mod retry;
pub mod server;
pub mod session;
pub mod stats;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use link::PeerLink;
pub use packet::{Direction, ErrorCode, Mode, Packet, Request};
pub use retry::RetryTimer;
pub use server::{serve, Server};
pub use session::Session;
pub use stats::TransferStats;
pub use validate::{AllowList, ValidatedFile};

/// DATA 패킷 최대 페이로드 (바이트)
///
/// 이보다 짧은 페이로드는 전송 종료를 뜻한다.
pub const BLOCK_SIZE: usize = 512;

/// 최대 패킷 크기 (opcode + 블록 번호 + 페이로드)
pub const MAX_PACKET_SIZE: usize = BLOCK_SIZE + 4;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 69;

/// 기본 재전송 간격 (초)
pub const DEFAULT_REXMT_SECS: u64 = 5;
