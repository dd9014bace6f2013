//! 파일 접근 검증
//!
//! 서버에는 로그인 디렉터리도 사용자 권한도 없으므로, 파일은 반드시 존재해야 하고
//! 누구나 읽을 수 있거나(RRQ) 쓸 수 있어야(WRQ) 한다.
//! 허용 목록이 주어지면 절대 경로는 그 디렉터리 아래에 있어야 하고,
//! 상대 경로는 목록의 디렉터리들에서 차례로 찾는다.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::debug;

use crate::packet::{Direction, ErrorCode};
use crate::{Error, Result};

/// other 읽기 권한 비트
const S_IROTH: u32 = 0o004;

/// other 쓰기 권한 비트
const S_IWOTH: u32 = 0o002;

/// 디렉터리 허용 목록
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    /// 절대 경로 디렉터리 (순서 유지)
    dirs: Vec<String>,

    /// 목록이 비었을 때 모든 절대 경로 허용
    unrestricted: bool,
}

impl AllowList {
    /// 새 허용 목록 생성
    ///
    /// 상대 경로 항목은 건너뛰고, 끝의 `/`는 제거한다 (루트 제외).
    pub fn new<I, S>(dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dirs = dirs
            .into_iter()
            .filter_map(|d| {
                let d = d.as_ref();
                if !d.starts_with('/') {
                    debug!("상대 경로 디렉터리 무시: {}", d);
                    return None;
                }
                let trimmed = d.trim_end_matches('/');
                Some(if trimmed.is_empty() { "/" } else { trimmed }.to_string())
            })
            .collect();

        Self {
            dirs,
            unrestricted: false,
        }
    }

    /// 목록이 비었을 때 제한 없음 여부 지정
    pub fn unrestricted(mut self, unrestricted: bool) -> Self {
        self.unrestricted = unrestricted;
        self
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    /// 절대 경로가 허용 디렉터리 아래에 있는지 확인
    ///
    /// 접두어는 디렉터리 경계에서만 일치한다 (`/srv/tftp`는 `/srv/tftpx/a`와 불일치).
    fn permits_absolute(&self, filename: &str) -> bool {
        if self.dirs.is_empty() {
            return self.unrestricted;
        }
        self.dirs.iter().any(|dir| {
            dir.len() == 1
                || (filename.starts_with(dir.as_str())
                    && filename.as_bytes().get(dir.len()) == Some(&b'/'))
        })
    }

    /// 요청 파일 검증 후 열기
    pub fn validate(&self, filename: &str, direction: Direction) -> Result<ValidatedFile> {
        // 디렉터리 제한 우회 방지
        if filename.contains("/../") {
            return Err(Error::Refused(ErrorCode::AccessViolation));
        }

        let path = if filename.starts_with('/') {
            self.check_absolute(filename, direction)?
        } else {
            self.search_relative(filename, direction)?
        };

        let file = match direction {
            Direction::Send => File::open(&path),
            Direction::Receive => OpenOptions::new().write(true).truncate(true).open(&path),
        }?;

        Ok(ValidatedFile {
            path,
            file,
            direction,
        })
    }

    /// [`validate`](Self::validate)를 블로킹 스레드에서 실행
    ///
    /// 파일 검사와 열기는 동기 시스템 콜이므로 비동기 태스크에서는 이쪽을 쓴다.
    pub async fn validate_async(
        &self,
        filename: &str,
        direction: Direction,
    ) -> Result<ValidatedFile> {
        let list = self.clone();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || list.validate(&filename, direction))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }

    fn check_absolute(&self, filename: &str, direction: Direction) -> Result<PathBuf> {
        if !self.permits_absolute(filename) {
            return Err(Error::Refused(ErrorCode::AccessViolation));
        }

        let meta = fs::metadata(filename).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Refused(ErrorCode::NotFound),
            _ => Error::Refused(ErrorCode::AccessViolation),
        })?;

        if !meta.is_file() {
            return Err(Error::Refused(ErrorCode::NotFound));
        }
        if !world_permits(&meta, direction) {
            return Err(Error::Refused(ErrorCode::AccessViolation));
        }

        Ok(PathBuf::from(filename))
    }

    /// 상대 경로: 허용 디렉터리를 순서대로 검색 (읽기 전용)
    ///
    /// 존재하지만 읽을 수 없는 파일을 만나면 검색은 계속하되,
    /// 끝내 못 찾으면 NotFound 대신 AccessViolation을 돌려준다.
    fn search_relative(&self, filename: &str, direction: Direction) -> Result<PathBuf> {
        if direction != Direction::Send || filename.starts_with("../") {
            return Err(Error::Refused(ErrorCode::AccessViolation));
        }

        let mut err = ErrorCode::NotFound;
        for dir in &self.dirs {
            let candidate = PathBuf::from(format!("{}/{}", dir, filename));
            let Ok(meta) = fs::metadata(&candidate) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            if world_permits(&meta, Direction::Send) {
                debug!("상대 경로 일치: {} -> {}", filename, candidate.display());
                return Ok(candidate);
            }
            err = ErrorCode::AccessViolation;
        }

        Err(Error::Refused(err))
    }
}

fn world_permits(meta: &Metadata, direction: Direction) -> bool {
    let mode = meta.permissions().mode();
    match direction {
        Direction::Send => mode & S_IROTH != 0,
        Direction::Receive => mode & S_IWOTH != 0,
    }
}

/// 검증을 통과하고 열린 파일
#[derive(Debug)]
pub struct ValidatedFile {
    /// 실제로 연 경로 (상대 경로 검색 결과 포함)
    pub path: PathBuf,
    pub file: File,
    pub direction: Direction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn make_file(dir: &TempDir, name: &str, mode: u32) -> String {
        let path = dir.path().join(name);
        fs::write(&path, b"hello tftp").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn allow(dir: &TempDir) -> AllowList {
        AllowList::new([dir.path().to_str().unwrap()])
    }

    fn refused(result: Result<ValidatedFile>) -> ErrorCode {
        match result {
            Err(Error::Refused(code)) => code,
            other => panic!("expected refusal, got {:?}", other),
        }
    }

    #[test]
    fn test_absolute_read_permission_bit() {
        let dir = TempDir::new().unwrap();
        let path = make_file(&dir, "image.bin", 0o644);
        let list = allow(&dir);

        let mut validated = list.validate(&path, Direction::Send).unwrap();
        let mut content = String::new();
        validated.file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello tftp");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        assert_eq!(
            refused(list.validate(&path, Direction::Send)),
            ErrorCode::AccessViolation
        );
    }

    #[test]
    fn test_absolute_write_permission_bit() {
        let dir = TempDir::new().unwrap();
        let path = make_file(&dir, "upload.bin", 0o666);
        let list = allow(&dir);

        let validated = list.validate(&path, Direction::Receive).unwrap();
        drop(validated);
        // 쓰기용으로 열면 잘림
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(
            refused(list.validate(&path, Direction::Receive)),
            ErrorCode::AccessViolation
        );
    }

    #[test]
    fn test_traversal_always_denied() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap();

        for list in [AllowList::new(["/"]), allow(&dir), AllowList::default().unrestricted(true)] {
            assert_eq!(
                refused(list.validate(&format!("{}/../etc/passwd", base), Direction::Send)),
                ErrorCode::AccessViolation
            );
            assert_eq!(
                refused(list.validate("pub/../../secret", Direction::Send)),
                ErrorCode::AccessViolation
            );
        }
    }

    #[test]
    fn test_prefix_needs_directory_boundary() {
        let dir = TempDir::new().unwrap();
        let sibling = format!("{}x", dir.path().to_str().unwrap());
        fs::create_dir_all(&sibling).unwrap();
        let path = format!("{}/file", sibling);
        fs::write(&path, b"x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(
            refused(allow(&dir).validate(&path, Direction::Send)),
            ErrorCode::AccessViolation
        );
        fs::remove_dir_all(&sibling).unwrap();
    }

    #[test]
    fn test_empty_list_policy() {
        let dir = TempDir::new().unwrap();
        let path = make_file(&dir, "open.bin", 0o644);

        assert_eq!(
            refused(AllowList::default().validate(&path, Direction::Send)),
            ErrorCode::AccessViolation
        );
        assert!(AllowList::default()
            .unrestricted(true)
            .validate(&path, Direction::Send)
            .is_ok());
    }

    #[test]
    fn test_absolute_missing_or_not_regular() {
        let dir = TempDir::new().unwrap();
        let list = allow(&dir);
        let base = dir.path().to_str().unwrap();

        assert_eq!(
            refused(list.validate(&format!("{}/missing", base), Direction::Send)),
            ErrorCode::NotFound
        );
        fs::create_dir(dir.path().join("subdir")).unwrap();
        assert_eq!(
            refused(list.validate(&format!("{}/subdir", base), Direction::Send)),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_relative_search_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        make_file(&first, "boot.img", 0o600);
        make_file(&second, "boot.img", 0o644);

        let list = AllowList::new([
            first.path().to_str().unwrap(),
            second.path().to_str().unwrap(),
        ]);
        let validated = list.validate("boot.img", Direction::Send).unwrap();
        assert_eq!(validated.path, second.path().join("boot.img"));
    }

    #[test]
    fn test_relative_not_found_vs_forbidden() {
        let dir = TempDir::new().unwrap();
        let list = allow(&dir);

        assert_eq!(
            refused(list.validate("secret", Direction::Send)),
            ErrorCode::NotFound
        );

        make_file(&dir, "secret", 0o600);
        assert_eq!(
            refused(list.validate("secret", Direction::Send)),
            ErrorCode::AccessViolation
        );
    }

    #[test]
    fn test_relative_write_and_parent_denied() {
        let dir = TempDir::new().unwrap();
        make_file(&dir, "upload.bin", 0o666);
        let list = allow(&dir);

        assert_eq!(
            refused(list.validate("upload.bin", Direction::Receive)),
            ErrorCode::AccessViolation
        );
        assert_eq!(
            refused(list.validate("../upload.bin", Direction::Send)),
            ErrorCode::AccessViolation
        );
    }

    #[test]
    fn test_allow_list_normalization() {
        let list = AllowList::new(["/srv/tftp/", "relative/dir", "/", "/var/lib//"]);
        assert_eq!(list.dirs(), &["/srv/tftp", "/", "/var/lib"]);
    }

    #[tokio::test]
    async fn test_validate_async_matches_sync() {
        let dir = TempDir::new().unwrap();
        let path = make_file(&dir, "initrd.img", 0o644);
        let list = allow(&dir);

        let validated = list.validate_async(&path, Direction::Send).await.unwrap();
        assert_eq!(validated.path, PathBuf::from(&path));

        assert!(matches!(
            list.validate_async("missing.img", Direction::Send).await,
            Err(Error::Refused(ErrorCode::NotFound))
        ));
        assert!(matches!(
            list.validate_async("initrd.img", Direction::Receive).await,
            Err(Error::Refused(ErrorCode::AccessViolation))
        ));
    }
}
