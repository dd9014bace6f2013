//! 전송 모드별 파일 변환
//!
//! - octet: 그대로 읽고 쓴다
//! - netascii: 보낼 때 `\n` → `\r\n`, `\r` → `\r\0`;
//!   받을 때 `\r\n` → `\n`, `\r\0` → `\r`
//!
//! 변환 결과는 블록 경계를 넘을 수 있으므로 남은 바이트를 다음 블록으로 넘긴다.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::packet::Mode;

/// 파일 → 블록 (송신측)
pub struct BlockReader<R> {
    inner: BufReader<R>,
    mode: Mode,

    /// 직전 블록에서 넘어온 변환 바이트
    pending: Option<u8>,
}

impl<R: AsyncRead + Unpin> BlockReader<R> {
    pub fn new(inner: R, mode: Mode) -> Self {
        Self {
            inner: BufReader::new(inner),
            mode,
            pending: None,
        }
    }

    /// 다음 블록을 `buf`에 채우고 길이를 반환
    ///
    /// `buf.len()`보다 짧으면 파일 끝.
    pub async fn read_converted(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.mode {
            Mode::Octet => self.read_raw(buf).await,
            Mode::NetAscii => self.read_netascii(buf).await,
        }
    }

    async fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn read_netascii(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            if let Some(c) = self.pending.take() {
                buf[filled] = c;
                filled += 1;
                continue;
            }

            let chunk = self.inner.fill_buf().await?;
            if chunk.is_empty() {
                break;
            }

            let mut used = 0;
            for &c in chunk {
                if filled == buf.len() {
                    break;
                }
                used += 1;
                match c {
                    b'\n' => {
                        buf[filled] = b'\r';
                        self.pending = Some(b'\n');
                    }
                    b'\r' => {
                        buf[filled] = b'\r';
                        self.pending = Some(b'\0');
                    }
                    _ => buf[filled] = c,
                }
                filled += 1;
                if self.pending.is_some() {
                    break;
                }
            }
            self.inner.consume(used);
        }

        Ok(filled)
    }
}

/// 블록 → 파일 (수신측)
pub struct BlockWriter<W> {
    inner: BufWriter<W>,
    mode: Mode,

    /// 직전 블록이 `\r`로 끝났는지 여부
    cr_pending: bool,

    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> BlockWriter<W> {
    pub fn new(inner: W, mode: Mode) -> Self {
        Self {
            inner: BufWriter::new(inner),
            mode,
            cr_pending: false,
            scratch: Vec::new(),
        }
    }

    /// 블록 하나를 변환해서 기록
    pub async fn write_converted(&mut self, data: &[u8]) -> io::Result<()> {
        match self.mode {
            Mode::Octet => self.inner.write_all(data).await,
            Mode::NetAscii => {
                self.scratch.clear();
                for &c in data {
                    if self.cr_pending {
                        self.cr_pending = false;
                        match c {
                            b'\n' => {
                                self.scratch.push(b'\n');
                                continue;
                            }
                            b'\0' => {
                                self.scratch.push(b'\r');
                                continue;
                            }
                            _ => self.scratch.push(b'\r'),
                        }
                    }
                    if c == b'\r' {
                        self.cr_pending = true;
                    } else {
                        self.scratch.push(c);
                    }
                }
                self.inner.write_all(&self.scratch).await
            }
        }
    }

    /// 남은 `\r`을 기록하고 flush
    pub async fn finish(&mut self) -> io::Result<()> {
        if self.cr_pending {
            self.cr_pending = false;
            self.inner.write_all(b"\r").await?;
        }
        self.inner.flush().await
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}
