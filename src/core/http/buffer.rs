use super::parser::HEADER_SEPARATOR;
use super::types::Progress;

/// 单次尝试的响应累积缓冲区；每次尝试独占一个，不跨尝试共享。
///
/// 头部结束前 `expected` 为空；一旦看到 `\r\n\r\n` 就尝试读取 Content-Length，
/// 用于进度回调。
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    scanned: usize,
    header_end: Option<usize>,
    expected_body: Option<u64>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
        if self.header_end.is_none() {
            self.scan_headers();
        }
    }

    fn scan_headers(&mut self) {
        let from = self.scanned.saturating_sub(HEADER_SEPARATOR.len() - 1);
        match find(&self.data[from..], HEADER_SEPARATOR) {
            Some(pos) => {
                let end = from + pos;
                self.header_end = Some(end);
                let head = String::from_utf8_lossy(&self.data[..end]);
                self.expected_body = head.split("\r\n").skip(1).find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.trim().eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<u64>().ok()
                    } else {
                        None
                    }
                });
            }
            None => self.scanned = self.data.len(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn headers_complete(&self) -> bool {
        self.header_end.is_some()
    }

    /// 已接收的 body 字节数（头部未结束时为 0）
    pub fn body_received(&self) -> u64 {
        match self.header_end {
            Some(end) => (self.data.len() - end - HEADER_SEPARATOR.len()) as u64,
            None => 0,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            received: self.body_received(),
            expected: self.expected_body,
        }
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
