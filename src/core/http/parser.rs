//! HTTP/1.1 响应解析：状态行、头部、Content-Length 校验、chunked 解码与 gzip 解压。
//!
//! 输入是一次连接读到的全部字节（请求使用 `Connection: close`），
//! 因此解析是纯函数，不涉及任何 IO。

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;

use super::buffer::find;
use super::errors::DirectError;
use super::types::ParsedResponse;

pub const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// 状态行无法解析出状态码时使用的默认值
const DEFAULT_STATUS: u16 = 200;

pub fn parse_response(data: &[u8], host: &str) -> Result<ParsedResponse, DirectError> {
    let header_end = find(data, HEADER_SEPARATOR).ok_or(DirectError::EmptyResponse)?;
    let head = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = head.split("\r\n");
    let status = parse_status_line(lines.next().unwrap_or_default());
    let headers = parse_header_lines(lines);
    let raw_body = &data[header_end + HEADER_SEPARATOR.len()..];

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")))
        .unwrap_or(false);

    let mut body = if chunked {
        decode_chunked(raw_body)?
    } else {
        match content_length(&headers) {
            Some(expected) if status_has_body(status) => {
                if raw_body.len() < expected {
                    tracing::warn!(
                        target = "direct",
                        host,
                        expected,
                        received = raw_body.len(),
                        "response body shorter than content-length"
                    );
                    return Err(DirectError::IncompleteData {
                        expected,
                        received: raw_body.len(),
                    });
                }
                raw_body[..expected].to_vec()
            }
            _ => raw_body.to_vec(),
        }
    };

    let gzipped = headers
        .get("content-encoding")
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
        .unwrap_or(false);
    if gzipped && !body.is_empty() {
        body = gunzip(&body)?;
    }

    tracing::debug!(target = "direct", host, status, body_len = body.len(), chunked, gzipped, "response parsed");
    Ok(ParsedResponse { status, headers, body })
}

/// `HTTP/1.1 200 OK` 取第二段；缺失或非数字时回退为 200。
fn parse_status_line(line: &str) -> u16 {
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(DEFAULT_STATUS)
}

/// 头部名称统一小写；重复头部以 ", " 合并；以空白开头的续行拼接到上一个头部。
fn parse_header_lines<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last: Option<String> = None;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(value) = last.as_ref().and_then(|name| headers.get_mut(name)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        headers
            .entry(name.clone())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
        last = Some(name);
    }
    headers
}

fn content_length(headers: &HashMap<String, String>) -> Option<usize> {
    let raw = headers.get("content-length")?;
    // 合并后的重复头部取第一个值
    raw.split(',').next()?.trim().parse::<usize>().ok()
}

fn status_has_body(status: u16) -> bool {
    !(100..200).contains(&status) && status != 204 && status != 304
}

/// 解码 chunked 传输编码；忽略 chunk 扩展与 trailer。
pub fn decode_chunked(data: &[u8]) -> Result<Vec<u8>, DirectError> {
    let mut out = Vec::with_capacity(data.len());
    let mut offset = 0usize;
    loop {
        let line_end = find(&data[offset..], CRLF)
            .map(|p| offset + p)
            .ok_or_else(|| DirectError::ChunkedDecode("missing terminating chunk".into()))?;
        let line = String::from_utf8_lossy(&data[offset..line_end]);
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| DirectError::ChunkedDecode(format!("invalid chunk size '{size_text}'")))?;
        offset = line_end + CRLF.len();
        if size == 0 {
            return Ok(out);
        }
        let available = data.len() - offset;
        let chunk_end = offset
            .checked_add(size)
            .filter(|end| *end <= data.len())
            .ok_or(DirectError::IncompleteData {
                expected: size,
                received: available,
            })?;
        out.extend_from_slice(&data[offset..chunk_end]);
        offset = chunk_end;
        let rest = &data[offset..];
        if rest.starts_with(CRLF) {
            offset += CRLF.len();
        } else if rest.len() >= CRLF.len() {
            return Err(DirectError::ChunkedDecode("missing chunk delimiter".into()));
        }
    }
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, DirectError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DirectError::Gzip(e.to_string()))?;
    Ok(out)
}
