//! Streaming file transfer with resume support.
//!
//! One call downloads one direct file URL to one destination path. The
//! byte-range header used for resumption lives on the shared client, so
//! it is set behind a guard that clears it on every exit path,
//! including errors and interrupts.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info};

use crate::base_system::interrupt;
use crate::site::{SiteClient, SiteError};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Resume was requested but there is no partial file to resume into.
    #[error("cannot resume: no partial file at {0}")]
    ResumeTargetMissing(PathBuf),

    /// The server reports no bytes left beyond what is already on disk.
    #[error("file is already fully downloaded")]
    AlreadyComplete,

    /// A fresh download whose body is empty; the link is dead.
    #[error("server returned an empty file")]
    EmptyContent,

    #[error("transfer interrupted")]
    Interrupted,

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub resume: bool,
    pub timeout: Duration,
    pub progress_bar: bool,
    pub quiet: bool,
}

/// Clears the client's pending byte-range header when dropped, so no
/// later request can accidentally inherit a stale resume offset.
struct RangeGuard<'a> {
    client: &'a SiteClient,
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        self.client.clear_resume_offset();
    }
}

/// Download `url` to `dest`, resuming from the existing partial file
/// when asked. Returns the destination path on success.
pub fn download(
    client: &SiteClient,
    url: &str,
    dest: &Path,
    options: &TransferOptions,
) -> Result<PathBuf, TransferError> {
    // The resume target is checked before any request goes out.
    let offset = if options.resume {
        match fs::metadata(dest) {
            Ok(meta) => meta.len(),
            Err(_) => return Err(TransferError::ResumeTargetMissing(dest.to_path_buf())),
        }
    } else {
        0
    };

    let _guard = RangeGuard { client };
    if offset > 0 {
        debug!(offset, "resuming transfer");
        client.set_resume_offset(offset);
    }

    let mut resp = client.get_stream(url, options.timeout)?;
    let remaining = resp.content_length();
    match remaining {
        Some(0) if options.resume => return Err(TransferError::AlreadyComplete),
        Some(0) => return Err(TransferError::EmptyContent),
        // A server that ignores the range request reports the full file
        // length; when that equals what is already on disk there is
        // nothing left to transfer, and appending the body would
        // duplicate it.
        Some(len) if options.resume && len == offset => {
            return Err(TransferError::AlreadyComplete);
        }
        _ => {}
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = if offset > 0 {
        OpenOptions::new().append(true).open(dest)?
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dest)?
    };

    let bar = transfer_bar(dest, offset, remaining, options);
    let mut buf = vec![0u8; options.chunk_size.max(1)];
    loop {
        if interrupt::interrupted() {
            bar.abandon();
            return Err(TransferError::Interrupted);
        }
        let n = resp.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        bar.inc(n as u64);
    }
    file.flush()?;
    bar.finish();

    info!(path = %dest.display(), "transfer complete");
    Ok(dest.to_path_buf())
}

fn transfer_bar(
    dest: &Path,
    offset: u64,
    remaining: Option<u64>,
    options: &TransferOptions,
) -> ProgressBar {
    if options.quiet || !options.progress_bar {
        return ProgressBar::hidden();
    }
    let bar = match remaining {
        Some(len) => ProgressBar::new(offset + len),
        None => ProgressBar::no_length(),
    };
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    bar.set_prefix(
        dest.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    bar.set_position(offset);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::Config;

    /// Serve one canned HTTP response on a local socket.
    fn serve_once(response: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = Read::read(&mut stream, &mut buf);
                let _ = Write::write_all(&mut stream, response.as_bytes());
            }
        });
        format!("http://{addr}/x.mp4")
    }

    fn options(resume: bool) -> TransferOptions {
        TransferOptions {
            chunk_size: 1024,
            resume,
            timeout: Duration::from_secs(1),
            progress_bar: false,
            quiet: true,
        }
    }

    #[test]
    fn resume_without_partial_file_fails_before_any_request() {
        let client = SiteClient::new(Config::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.mp4");
        // An unroutable URL: reaching the network at all would error
        // differently than ResumeTargetMissing.
        let err = download(&client, "http://127.0.0.1:9/x.mp4", &dest, &options(true)).unwrap_err();
        assert!(matches!(err, TransferError::ResumeTargetMissing(path) if path == dest));
        assert!(client.resume_range().is_none());
    }

    #[test]
    fn range_header_is_cleared_after_a_failed_attempt() {
        let client = SiteClient::new(Config::default()).unwrap();
        client.mark_session_ready();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.mp4");
        fs::write(&dest, b"01234").unwrap();

        let err = download(&client, "http://127.0.0.1:9/x.mp4", &dest, &options(true)).unwrap_err();
        assert!(matches!(err, TransferError::Site(SiteError::Http(_))));
        // The guard must have removed the range header on the error path.
        assert!(client.resume_range().is_none());
    }

    #[test]
    fn full_length_equal_to_partial_size_is_already_complete() {
        let client = SiteClient::new(Config::default()).unwrap();
        client.mark_session_ready();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.mp4");
        fs::write(&dest, b"01234").unwrap();

        // A server ignoring the range request: plain 200 with the whole
        // 5-byte file, which is exactly what is on disk already.
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\n01234");
        let err = download(&client, &url, &dest, &options(true)).unwrap_err();
        assert!(matches!(err, TransferError::AlreadyComplete));
        assert_eq!(fs::metadata(&dest).unwrap().len(), 5);
        assert!(client.resume_range().is_none());
    }
}
