//! 재전송 타이머
//!
//! 한 번의 "전송 후 응답 대기" 단계를 감싼다.
//! - 시도마다 `rexmt_interval` 만큼 기다리고, 응답이 없으면 누적 시간에 더한 뒤 재전송
//! - 누적 시간이 `max_timeout`에 도달하면 전송 전체 중단
//! - 선형 증가 (지수 백오프 아님)
//!
//! 타이머가 만료되면 현재 단계의 처음(전송)으로 돌아갈 뿐, 세션 상태는 그대로 유지된다.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::link::PeerLink;
use crate::packet::Packet;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 수신 패킷 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 기다리던 응답
    Accept,

    /// 직전 블록의 중복: 대기 패킷을 비우고 마지막 패킷 재전송
    Resend,

    /// 같은 종류지만 블록이 어긋난 패킷: 대기 패킷을 비우고 같은 deadline으로 계속 대기
    Stale,

    /// 무관한 패킷: 같은 deadline으로 계속 대기
    Ignore,
}

/// 블록 단위 재전송 타이머
#[derive(Debug, Clone)]
pub struct RetryTimer {
    interval: Duration,
    max_timeout: Duration,

    /// 현재 블록에서 누적된 대기 시간
    elapsed: Duration,

    /// 현재 블록의 타임아웃 재전송 횟수
    retries: u32,
}

impl RetryTimer {
    pub fn new(interval: Duration, max_timeout: Duration) -> Self {
        Self {
            interval,
            max_timeout,
            elapsed: Duration::ZERO,
            retries: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rexmt_interval, config.max_timeout)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// 새 블록 시작 시 누적 시간 초기화
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.retries = 0;
    }

    /// 이번 시도의 응답 deadline
    pub fn arm(&self) -> Instant {
        Instant::now() + self.interval
    }

    /// 타이머 만료 처리
    ///
    /// 한도에 도달하면 [`Error::Timeout`], 아니면 재전송해도 된다.
    pub fn expire(&mut self, block: u16) -> Result<()> {
        self.elapsed += self.interval;
        if self.elapsed >= self.max_timeout {
            return Err(Error::Timeout {
                block,
                elapsed: self.elapsed,
            });
        }
        self.retries += 1;
        Ok(())
    }

    /// `outgoing`을 보내고 `classify`가 받아들이는 응답이 올 때까지 대기
    ///
    /// 상대방의 ERROR 패킷은 곧바로 [`Error::Peer`]로 끝난다.
    pub async fn exchange<F>(
        &mut self,
        link: &PeerLink,
        stats: &mut TransferStats,
        outgoing: &Packet,
        block: u16,
        mut classify: F,
    ) -> Result<Packet>
    where
        F: FnMut(&Packet) -> Verdict,
    {
        let bytes = outgoing.encode();

        'send: loop {
            link.send_raw(&bytes).await?;
            let deadline = self.arm();

            loop {
                let packet = match link.recv_until(deadline).await? {
                    Some(packet) => packet,
                    None => {
                        self.expire(block)?;
                        stats.record_retransmit();
                        debug!(
                            "타임아웃 재전송: block={}, elapsed={:?}",
                            block, self.elapsed
                        );
                        continue 'send;
                    }
                };

                if let Packet::Error { code, message } = packet {
                    return Err(Error::Peer { code, message });
                }

                match classify(&packet) {
                    Verdict::Accept => return Ok(packet),
                    Verdict::Resend => {
                        link.drain();
                        stats.record_duplicate();
                        debug!("중복 패킷 재동기화: block={}", block);
                        continue 'send;
                    }
                    Verdict::Stale => {
                        link.drain();
                        debug!("어긋난 블록 패킷 무시: {:?} (block={})", packet, block);
                    }
                    Verdict::Ignore => {
                        debug!("예상 밖 패킷 무시: {:?}", packet.opcode());
                    }
                }
            }
        }
    }
}
