//! 전송 전용 소켓 (상대방 하나)
//!
//! 요청마다 새 소켓을 쓰므로 (소켓 주소, 상대 주소) 쌍이 곧 transfer ID다.
//! 다른 주소에서 온 패킷은 UnknownTransferId로 거절한다.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::packet::{ErrorCode, Packet};
use crate::{Error, Result, MAX_PACKET_SIZE};

/// 한 상대방에 묶인 UDP 소켓
#[derive(Debug)]
pub struct PeerLink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl PeerLink {
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    /// `local` 주소의 임시 포트에 바인딩
    ///
    /// `local`이 미지정 주소면 상대방 주소 계열에 맞춘다.
    pub async fn bind(local: IpAddr, peer: SocketAddr) -> Result<Self> {
        let local = match (local.is_unspecified(), peer) {
            (true, SocketAddr::V4(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (true, SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            (false, _) => local,
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0))
            .await
            .map_err(Error::Socket)?;
        Ok(Self::new(socket, peer))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// 패킷 전송
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        self.send_raw(&packet.encode()).await
    }

    pub(crate) async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let sent = self
            .socket
            .send_to(bytes, self.peer)
            .await
            .map_err(Error::Socket)?;

        if sent != bytes.len() {
            return Err(Error::Socket(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("부분 전송: {}/{} bytes", sent, bytes.len()),
            )));
        }
        Ok(())
    }

    /// `deadline`까지 상대방 패킷 하나를 기다림
    ///
    /// 시간이 다 되면 `None`. 해석할 수 없는 패킷과 다른 주소의 패킷은
    /// 응답으로 치지 않고 같은 deadline으로 계속 기다린다.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Option<Packet>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        loop {
            let (len, from) = match time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result.map_err(Error::Socket)?,
                Err(_) => return Ok(None),
            };

            if from != self.peer {
                self.reject_stranger(from).await;
                continue;
            }

            match Packet::decode(&buf[..len]) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => debug!("패킷 무시 ({} bytes): {}", len, e),
            }
        }
    }

    /// 이미 도착해 있는 패킷 모두 버리기 (재동기화)
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut dropped = 0;
        while self.socket.try_recv_from(&mut buf).is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("재동기화: 대기 중인 패킷 {}개 폐기", dropped);
        }
        dropped
    }

    async fn reject_stranger(&self, from: SocketAddr) {
        warn!("알 수 없는 transfer ID: {} (peer {})", from, self.peer);
        let packet = Packet::error(ErrorCode::UnknownTransferId).encode();
        if let Err(e) = self.socket.send_to(&packet, from).await {
            debug!("UnknownTransferId 전송 실패: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn pair() -> (PeerLink, UdpSocket) {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let link = PeerLink::new(server, client.local_addr().unwrap());
        (link, client)
    }

    #[tokio::test]
    async fn test_recv_until_deadline() {
        let (link, _client) = pair().await;
        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(link.recv_until(deadline).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stranger_rejected() {
        let (link, client) = pair().await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = link.local_addr().unwrap();

        stranger
            .send_to(&Packet::Ack { block: 1 }.encode(), server_addr)
            .await
            .unwrap();
        client
            .send_to(&Packet::Ack { block: 7 }.encode(), server_addr)
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let packet = link.recv_until(deadline).await.unwrap();
        assert_eq!(packet, Some(Packet::Ack { block: 7 }));

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (len, _) = stranger.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            Packet::decode(&buf[..len]).unwrap(),
            Packet::error(ErrorCode::UnknownTransferId)
        );
    }

    #[tokio::test]
    async fn test_garbage_ignored() {
        let (link, client) = pair().await;
        let server_addr = link.local_addr().unwrap();

        client.send_to(&[0xFF], server_addr).await.unwrap();
        client
            .send_to(&Packet::Ack { block: 2 }.encode(), server_addr)
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        assert_eq!(
            link.recv_until(deadline).await.unwrap(),
            Some(Packet::Ack { block: 2 })
        );
    }
}
