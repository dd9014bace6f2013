//! 전송 통계

use std::fmt;
use std::time::{Duration, Instant};

use crate::packet::{Direction, Mode};

/// 한 세션의 전송 통계 (완료 시 호출자에게 반환)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 전송 방향
    pub direction: Direction,

    /// 전송 모드
    pub mode: Mode,

    /// 시작 시간
    pub start_time: Instant,

    /// 완료된 블록 수
    pub blocks: u64,

    /// 총 페이로드 바이트 (변환 후 wire 기준)
    pub total_bytes: u64,

    /// 타임아웃으로 인한 재전송 수
    pub retransmits: u64,

    /// 중복 ACK/DATA로 인한 재동기화 수
    pub duplicates: u64,

    /// 종료 시간 (진행 중이면 None)
    pub end_time: Option<Instant>,
}

impl TransferStats {
    pub fn new(direction: Direction, mode: Mode) -> Self {
        Self {
            direction,
            mode,
            start_time: Instant::now(),
            blocks: 0,
            total_bytes: 0,
            retransmits: 0,
            duplicates: 0,
            end_time: None,
        }
    }

    /// 블록 완료 기록
    pub fn record_block(&mut self, payload_len: usize) {
        self.blocks += 1;
        self.total_bytes += payload_len as u64;
    }

    pub fn record_retransmit(&mut self) {
        self.retransmits += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    /// 전송 종료 표시
    pub fn finish(&mut self) {
        self.end_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "{} {} | Elapsed: {:.2}s | Blocks: {} | Bytes: {} | Throughput: {:.1} KB/s | Retransmits: {} | Duplicates: {}",
            self.direction.request_name(),
            self.mode,
            self.elapsed().as_secs_f64(),
            self.blocks,
            self.total_bytes,
            self.throughput() / 1000.0,
            self.retransmits,
            self.duplicates,
        )
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
