//! 서버 설정

use std::time::Duration;

use crate::validate::AllowList;
use crate::DEFAULT_REXMT_SECS;

/// TFTP 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 재전송 간격
    pub rexmt_interval: Duration,

    /// 블록당 누적 타임아웃 한도
    /// 이 값에 도달하면 전송 중단
    pub max_timeout: Duration,

    /// 마지막 ACK 전송 후 중복 DATA 대기 시간
    pub final_ack_wait: Duration,

    /// 접근 허용 디렉터리 목록
    pub allow_list: AllowList,

    /// 상대 경로 요청의 NotFound 에러 패킷 생략
    /// (디스크리스 클라이언트의 브로드캐스트 RRQ에 대한 에러 폭주 방지)
    pub suppress_naks: bool,

    /// 요청마다 info 레벨 로그 기록
    pub log_requests: bool,
}

impl Default for Config {
    fn default() -> Self {
        let rexmt = Duration::from_secs(DEFAULT_REXMT_SECS);
        Self {
            rexmt_interval: rexmt,
            max_timeout: rexmt * 5,           // 25초
            final_ack_wait: rexmt,
            allow_list: AllowList::default(),
            suppress_naks: false,
            log_requests: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 허용 디렉터리 지정
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// 재전송 간격과 누적 한도 지정
    pub fn with_timeouts(mut self, rexmt_interval: Duration, max_timeout: Duration) -> Self {
        self.rexmt_interval = rexmt_interval;
        self.max_timeout = max_timeout;
        self.final_ack_wait = rexmt_interval;
        self
    }

    /// 블록당 최대 전송 횟수 (최초 전송 포함)
    pub fn max_attempts(&self) -> u32 {
        if self.rexmt_interval.is_zero() {
            return 1;
        }
        let ratio = self.max_timeout.as_nanos() / self.rexmt_interval.as_nanos();
        ratio.max(1).min(u32::MAX as u128) as u32
    }

    /// 지연이 짧은 LAN용 설정
    pub fn lan() -> Self {
        Self::default().with_timeouts(Duration::from_secs(1), Duration::from_secs(5))
    }

    /// 손실이 많은 링크용 설정
    pub fn lossy_link() -> Self {
        Self::default().with_timeouts(Duration::from_secs(5), Duration::from_secs(60))
    }
}
