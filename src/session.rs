//! 전송 세션 (상태 머신)
//!
//! 세션 하나는 한 상대방의 한 파일을 한 방향으로 끝까지 처리한다.
//!
//! 송신 (상대방 RRQ):
//! `DATA(n)` 전송 → `ACK(n)` 대기 → 페이로드가 512바이트면 `n+1`, 아니면 완료.
//! `ACK(n-1)`은 중복으로 보고 `DATA(n)` 재전송.
//!
//! 수신 (상대방 WRQ):
//! `ACK(0)` 전송 → `DATA(1)` 대기 → 기록 후 `ACK(n)` → 짧은 페이로드면 마지막 ACK를
//! 보내고 중복 `DATA(n)`을 한 번 더 기다린다. `DATA(n-1)`은 `ACK(n-1)` 재전송.
//!
//! 블록 번호는 65536을 법으로 비교하며 65535 다음은 0이다.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::convert::{BlockReader, BlockWriter};
use crate::link::PeerLink;
use crate::packet::{Direction, Mode, Packet};
use crate::report;
use crate::retry::{RetryTimer, Verdict};
use crate::stats::TransferStats;
use crate::validate::ValidatedFile;
use crate::{Config, Error, Result, BLOCK_SIZE};

/// 방향별 파일 핸들 (모드 변환 포함)
enum FileIo {
    Read(BlockReader<File>),
    Write(BlockWriter<File>),
}

/// 전송 세션
///
/// 상태는 전부 세션이 소유하며 다른 태스크와 공유하지 않는다.
pub struct Session {
    link: PeerLink,
    direction: Direction,
    file: FileIo,

    /// 현재 블록 번호
    block: u16,

    retry: RetryTimer,
    final_ack_wait: Duration,
    stats: TransferStats,
}

impl Session {
    pub fn new(link: PeerLink, validated: ValidatedFile, mode: Mode, config: &Config) -> Self {
        let direction = validated.direction;
        let file = File::from_std(validated.file);
        let file = match direction {
            Direction::Send => FileIo::Read(BlockReader::new(file, mode)),
            Direction::Receive => FileIo::Write(BlockWriter::new(file, mode)),
        };

        Self {
            link,
            direction,
            file,
            block: 0,
            retry: RetryTimer::from_config(config),
            final_ack_wait: config.final_ack_wait,
            stats: TransferStats::new(direction, mode),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.link.peer()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 세션을 끝까지 실행
    ///
    /// 파일 I/O 실패는 에러 패킷 하나로 보고하고 중단한다.
    /// 타임아웃이나 상대방 에러로 끝나면 아무것도 보내지 않는다.
    pub async fn run(mut self) -> Result<TransferStats> {
        let result = match self.direction {
            Direction::Send => self.send_file().await,
            Direction::Receive => self.receive_file().await,
        };

        if let Err(e) = &result {
            warn!("전송 중단 ({}): {}", self.link.peer(), e);
            report::report(&self.link, e).await;
        }
        result
    }

    /// 송신 루프
    async fn send_file(&mut self) -> Result<TransferStats> {
        let FileIo::Read(reader) = &mut self.file else {
            return Err(Error::Malformed("읽기 세션이 아님"));
        };
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.block = 1;

        loop {
            let size = reader.read_converted(&mut buf).await?;
            let data = Packet::Data {
                block: self.block,
                payload: Bytes::copy_from_slice(&buf[..size]),
            };

            let block = self.block;
            self.retry.reset();
            self.retry
                .exchange(&self.link, &mut self.stats, &data, block, |p| {
                    classify_ack(block, p)
                })
                .await?;

            self.stats.record_block(size);
            debug!("DATA({}) 확인: {} bytes", block, size);

            if size < BLOCK_SIZE {
                break;
            }
            self.block = self.block.wrapping_add(1);
        }

        self.stats.finish();
        info!("전송 완료 → {}: {}", self.link.peer(), self.stats);
        Ok(self.stats.clone())
    }

    /// 수신 루프
    async fn receive_file(&mut self) -> Result<TransferStats> {
        let FileIo::Write(writer) = &mut self.file else {
            return Err(Error::Malformed("쓰기 세션이 아님"));
        };
        self.block = 0;

        loop {
            let ack = Packet::Ack { block: self.block };
            let current = self.block;
            let expected = current.wrapping_add(1);

            self.retry.reset();
            let reply = self
                .retry
                .exchange(&self.link, &mut self.stats, &ack, current, |p| {
                    classify_data(current, p)
                })
                .await?;

            let Packet::Data { payload, .. } = reply else {
                return Err(Error::Malformed("DATA가 아닌 응답"));
            };

            self.block = expected;
            writer
                .write_converted(&payload)
                .await
                .map_err(Error::from_write)?;
            self.stats.record_block(payload.len());
            debug!("DATA({}) 기록: {} bytes", expected, payload.len());

            if payload.len() < BLOCK_SIZE {
                break;
            }
        }

        writer.finish().await.map_err(Error::from_write)?;
        self.send_final_ack().await?;

        self.stats.finish();
        info!("수신 완료 ← {}: {}", self.link.peer(), self.stats);
        Ok(self.stats.clone())
    }

    /// 마지막 ACK 전송 후 중복 DATA 한 번 더 대기
    ///
    /// 상대방이 마지막 ACK를 못 받았다면 마지막 DATA를 다시 보낸다.
    async fn send_final_ack(&mut self) -> Result<()> {
        let ack = Packet::Ack { block: self.block };
        self.link.send(&ack).await?;

        let deadline = Instant::now() + self.final_ack_wait;
        while let Some(packet) = self.link.recv_until(deadline).await? {
            if let Packet::Data { block, .. } = packet {
                if block == self.block {
                    debug!("마지막 ACK 유실: ACK({}) 재전송", block);
                    self.stats.record_duplicate();
                    self.link.send(&ack).await?;
                    break;
                }
            }
        }
        Ok(())
    }
}

/// 송신측: `DATA(block)`에 대한 응답 분류
///
/// `ACK(block - 1)`은 직전 ACK의 중복이다 (65536을 법으로).
fn classify_ack(block: u16, packet: &Packet) -> Verdict {
    match packet {
        Packet::Ack { block: b } if *b == block => Verdict::Accept,
        Packet::Ack { block: b } if *b == block.wrapping_sub(1) => Verdict::Resend,
        Packet::Ack { .. } => Verdict::Stale,
        _ => Verdict::Ignore,
    }
}

/// 수신측: `ACK(current)`에 대한 응답 분류
///
/// `DATA(current + 1)`을 기다리고, `DATA(current)`는 중복으로 본다.
fn classify_data(current: u16, packet: &Packet) -> Verdict {
    match packet {
        Packet::Data { block: b, .. } if *b == current.wrapping_add(1) => Verdict::Accept,
        Packet::Data { block: b, .. } if *b == current => Verdict::Resend,
        Packet::Data { .. } => Verdict::Stale,
        _ => Verdict::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(block: u16) -> Packet {
        Packet::Data {
            block,
            payload: Bytes::new(),
        }
    }

    #[test]
    fn test_classify_ack_in_sequence() {
        assert_eq!(classify_ack(7, &Packet::Ack { block: 7 }), Verdict::Accept);
        assert_eq!(classify_ack(7, &Packet::Ack { block: 6 }), Verdict::Resend);
        assert_eq!(classify_ack(7, &Packet::Ack { block: 3 }), Verdict::Stale);
        assert_eq!(classify_ack(7, &data(7)), Verdict::Ignore);
    }

    #[test]
    fn test_classify_ack_wraparound() {
        // 65535 다음 블록은 0, 그 직전 ACK는 65535
        assert_eq!(classify_ack(0, &Packet::Ack { block: 0 }), Verdict::Accept);
        assert_eq!(classify_ack(0, &Packet::Ack { block: 65535 }), Verdict::Resend);
        assert_eq!(classify_ack(65535, &Packet::Ack { block: 65535 }), Verdict::Accept);
        assert_eq!(classify_ack(65535, &Packet::Ack { block: 65534 }), Verdict::Resend);
        assert_eq!(classify_ack(65535, &Packet::Ack { block: 0 }), Verdict::Stale);
    }

    #[test]
    fn test_classify_data_in_sequence() {
        assert_eq!(classify_data(0, &data(1)), Verdict::Accept);
        assert_eq!(classify_data(0, &data(0)), Verdict::Resend);
        assert_eq!(classify_data(4, &data(9)), Verdict::Stale);
        assert_eq!(classify_data(4, &Packet::Ack { block: 5 }), Verdict::Ignore);
    }

    #[test]
    fn test_classify_data_wraparound() {
        assert_eq!(classify_data(65535, &data(0)), Verdict::Accept);
        assert_eq!(classify_data(65535, &data(65535)), Verdict::Resend);
        assert_eq!(classify_data(0, &data(1)), Verdict::Accept);
        assert_eq!(classify_data(0, &data(65535)), Verdict::Stale);
    }
}
