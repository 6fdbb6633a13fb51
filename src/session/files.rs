//! Local file content for engine `GetLocalFileContent` requests.

use crate::connection::message::{GetLocalFileContentRequest, GetLocalFileContentResponse};
use bytes::Bytes;
use log::error;
use std::io;
use std::path::{Path, PathBuf};

/// Source of local file content.
pub trait LocalFiles: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Files of a local workspace. Relative paths are resolved against the workspace root.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceFiles {
    root: Option<PathBuf>,
}

impl WorkspaceFiles {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl LocalFiles for WorkspaceFiles {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }
}

const ADLER_MOD: u32 = 65521;

/// Adler-32 checksum, used by the engine to describe its copy of a file.
pub fn adler32(data: &[u8]) -> u32 {
    let (mut a, mut b) = (1u32, 0u32);
    // 5552 is the largest n such that the sums don't overflow before the modulo
    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }
    (b << 16) | a
}

/// True if the engine copy (`size` and `checksum`) matches local `content`.
pub fn is_remote_content_equal(size: i32, checksum: i32, content: &[u8]) -> bool {
    usize::try_from(size).is_ok_and(|size| size == content.len())
        && adler32(content) == checksum as u32
}

/// Answer an engine request for file content. `local_path` is the request file
/// translated into the local workspace.
pub fn local_file_content(
    files: &dyn LocalFiles,
    request: &GetLocalFileContentRequest,
    local_path: &str,
) -> GetLocalFileContentResponse {
    let content = match files.read(local_path) {
        Ok(content) => content,
        Err(e) => {
            error!(target: "session", "could not find local file for {}: {e}", request.file_name);
            return GetLocalFileContentResponse::new(
                request.id,
                GetLocalFileContentResponse::STATUS_FAILURE,
                Bytes::new(),
            );
        }
    };

    if is_remote_content_equal(request.size, request.checksum, &content) {
        return GetLocalFileContentResponse::new(
            request.id,
            GetLocalFileContentResponse::STATUS_FILES_IDENTICAL,
            Bytes::new(),
        );
    }
    GetLocalFileContentResponse::new(
        request.id,
        GetLocalFileContentResponse::STATUS_SUCCESS,
        Bytes::from(content),
    )
}
