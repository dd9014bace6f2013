//! tftpd - Trivial File Transfer Protocol 서버
//!
//! lock-step 방식 RFC 1350 서버
//! - 절대 경로는 허용 디렉터리 아래에서만, 상대 경로는 허용 디렉터리에서 검색
//! - 누구나 읽을 수 있는(RRQ) / 쓸 수 있는(WRQ) 파일만 제공
//!
//! 사용법:
//!   cargo run --release --bin tftpd -- [OPTIONS] [DIRECTORY]...
//!
//! 예시:
//!   # /srv/tftp 아래 파일 제공
//!   cargo run --release --bin tftpd -- --bind 0.0.0.0:69 /srv/tftp
//!
//!   # 요청 로그 + 없는 상대 경로 파일에 에러 응답 생략
//!   RUST_LOG=tftpd=debug cargo run --release --bin tftpd -- -l -n /srv/tftp /srv/boot

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tftpd::{AllowList, Config, Server, DEFAULT_PORT, DEFAULT_REXMT_SECS};

/// 서버 명령행 옵션
#[derive(Debug, Parser)]
#[command(name = "tftpd", version, about = "Trivial File Transfer Protocol server")]
struct Args {
    /// 바인드 주소
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,

    /// 요청마다 로그 기록
    #[arg(short, long)]
    logging: bool,

    /// 없는 상대 경로 파일 요청에 에러 패킷 생략
    #[arg(short = 'n', long)]
    nonexistent: bool,

    /// 디렉터리 목록이 비었을 때 모든 절대 경로 허용
    #[arg(long)]
    unrestricted: bool,

    /// 재전송 간격 (초)
    #[arg(long, default_value_t = DEFAULT_REXMT_SECS)]
    timeout: u64,

    /// 블록당 누적 타임아웃 (초, 기본: 재전송 간격 × 5)
    #[arg(long)]
    max_timeout: Option<u64>,

    /// 허용 디렉터리 (절대 경로)
    #[arg(value_name = "DIRECTORY")]
    dirs: Vec<String>,
}

impl Args {
    fn into_config(self) -> Config {
        let rexmt = Duration::from_secs(self.timeout.max(1));
        let max_timeout = self
            .max_timeout
            .map(Duration::from_secs)
            .unwrap_or(rexmt * 5);

        let mut config = Config::new()
            .with_timeouts(rexmt, max_timeout)
            .with_allow_list(AllowList::new(&self.dirs).unrestricted(self.unrestricted));
        config.suppress_naks = self.nonexistent;
        config.log_requests = self.logging;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG 우선)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let bind = args.bind;
    let config = args.into_config();

    info!("tftpd starting...");
    info!("Bind address: {}", bind);
    info!(
        "Retransmit: {:?}, max timeout: {:?} ({} attempts per block)",
        config.rexmt_interval,
        config.max_timeout,
        config.max_attempts()
    );
    if config.allow_list.is_empty() {
        let policy = if config.allow_list.is_unrestricted() {
            "unrestricted"
        } else {
            "denied"
        };
        info!("Allow list: (empty, absolute paths {})", policy);
    } else {
        info!("Allow list: {:?}", config.allow_list.dirs());
    }

    let server = Server::bind(bind, config).await?;
    server.run().await?;
    Ok(())
}
