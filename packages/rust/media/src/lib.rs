//! External media stages: retrieval (`yt-dlp`) and fixed-interval
//! segmenting (`ffmpeg`), both invoked as subprocesses under hard
//! timeouts, plus the optional proxy-resolution policy for retrieval.

pub mod downloader;
pub mod proxy;
pub mod segmenter;

pub use downloader::{DownloadOptions, Downloader, watch_url};
pub use proxy::{ProxyResolver, PublicListResolver};
pub use segmenter::{SegmentOptions, Segmenter};

/// Last `max` bytes of subprocess stderr, trimmed, for error messages.
pub(crate) fn stderr_tail(text: &str, max: usize) -> &str {
    let mut start = text.len().saturating_sub(max);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_bounds_output() {
        assert_eq!(stderr_tail("short", 300), "short");
        let long = "x".repeat(500);
        assert_eq!(stderr_tail(&long, 300).len(), 300);
    }
}
