//! 요청 처리와 수신 대기 루프
//!
//! 잘 알려진 포트로 들어온 첫 요청마다 새 소켓과 태스크를 만들어 세션을 돌린다.
//! 세션끼리 공유하는 가변 상태는 없다 (설정은 읽기 전용).

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::link::PeerLink;
use crate::packet::{Direction, ErrorCode, Packet, Request};
use crate::report;
use crate::session::Session;
use crate::stats::TransferStats;
use crate::{Config, Error, Result, MAX_PACKET_SIZE};

/// 이미 해석된 요청 하나를 끝까지 처리
///
/// 검증 실패는 ERROR 패킷 하나로 보고한다. 단, `suppress_naks`가 켜져 있으면
/// 상대 경로의 NotFound는 조용히 끝낸다.
pub async fn serve(
    link: PeerLink,
    direction: Direction,
    request: Request,
    config: &Config,
) -> Result<TransferStats> {
    let validated = config
        .allow_list
        .validate_async(&request.filename, direction)
        .await;
    log_request(&link, direction, &request, &validated, config);

    let validated = match validated {
        Ok(v) => v,
        Err(e) => {
            let silent = config.suppress_naks
                && !request.filename.starts_with('/')
                && e.error_code() == Some(ErrorCode::NotFound);
            if !silent {
                report::report(&link, &e).await;
            }
            return Err(e);
        }
    };

    Session::new(link, validated, request.mode, config).run().await
}

/// 요청 로그: `<peer> (<family>): <read|write> request for <file>: <outcome>`
fn log_request<T>(
    link: &PeerLink,
    direction: Direction,
    request: &Request,
    outcome: &Result<T>,
    config: &Config,
) {
    let peer = link.peer();
    let family = if peer.is_ipv4() { "IPv4" } else { "IPv6" };
    let status = match outcome {
        Ok(_) => "success".to_string(),
        Err(e) => match e.error_code() {
            Some(code) => code.message().to_string(),
            None => e.to_string(),
        },
    };

    if config.log_requests {
        info!(
            "{} ({}): {} request for {}: {}",
            peer.ip(),
            family,
            direction.request_name(),
            request.filename,
            status
        );
    } else {
        debug!(
            "{} ({}): {} request for {} ({}): {}",
            peer.ip(),
            family,
            direction.request_name(),
            request.filename,
            request.mode,
            status
        );
    }
}

/// 진행 중인 세션 표시 (태스크 종료 시 제거)
struct ActiveGuard {
    active: Arc<DashMap<SocketAddr, Direction>>,
    peer: SocketAddr,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.peer);
    }
}

/// TFTP 서버 (수신 대기)
pub struct Server {
    config: Arc<Config>,
    socket: UdpSocket,

    /// 상대 주소별 진행 중 세션
    active: Arc<DashMap<SocketAddr, Direction>>,
}

impl Server {
    /// 서버 소켓 바인딩
    pub async fn bind(addr: SocketAddr, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(Error::Socket)?;
        Ok(Self {
            config: Arc::new(config),
            socket,
            active: Arc::new(DashMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Socket)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 진행 중인 세션 수
    pub fn active_sessions(&self) -> usize {
        self.active.len()
    }

    /// 수신 대기 루프
    pub async fn run(&self) -> Result<()> {
        info!("TFTP server listening on {}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };
            self.dispatch(&buf[..len], peer).await;
        }
    }

    /// 첫 패킷 하나 처리: 새 소켓에서 세션 시작
    async fn dispatch(&self, datagram: &[u8], peer: SocketAddr) {
        if self.active.contains_key(&peer) {
            debug!("진행 중인 세션의 중복 요청 무시: {}", peer);
            return;
        }

        let link = match PeerLink::bind(self.socket_ip(), peer).await {
            Ok(link) => link,
            Err(e) => {
                warn!("세션 소켓 생성 실패 ({}): {}", peer, e);
                return;
            }
        };

        let (direction, request) = match Packet::decode(datagram).map(Packet::into_request) {
            Ok(Some(request)) => request,
            Ok(None) => {
                report::report(&link, &Error::Malformed("요청이 아닌 첫 패킷")).await;
                return;
            }
            Err(e) => {
                debug!("잘못된 요청 ({}): {}", peer, e);
                report::report(&link, &e).await;
                return;
            }
        };

        let _ = self.active.insert(peer, direction);
        let guard = ActiveGuard {
            active: self.active.clone(),
            peer,
        };
        let config = self.config.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match serve(link, direction, request, &config).await {
                Ok(stats) => info!("세션 종료 {}: {}", peer, stats.summary()),
                Err(e) => debug!("세션 실패 {}: {}", peer, e),
            }
        });
    }

    fn socket_ip(&self) -> std::net::IpAddr {
        match self.socket.local_addr() {
            Ok(addr) => addr.ip(),
            Err(_) => std::net::Ipv4Addr::UNSPECIFIED.into(),
        }
    }
}
