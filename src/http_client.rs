//! Shared HTTP agent and size-bounded response helpers used by every service client.

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(300);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// User agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("quast-verify/", env!("CARGO_PKG_VERSION"));

/// Return a shared HTTP agent with consistent timeouts.
///
/// The read timeout is generous because `run_QUAST` blocks until the remote
/// job has finished and uploaded its archive.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
    })
}

/// Response body reader that fails once more than `remaining` bytes arrive.
///
/// A declared `Content-Length` over the cap is rejected before any bytes are read.
struct CappedBody {
    inner: Box<dyn Read + Send + Sync + 'static>,
    cap: usize,
    remaining: usize,
}

impl CappedBody {
    fn open(response: ureq::Response, cap: usize) -> io::Result<Self> {
        let declared = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        if let Some(declared) = declared.filter(|len| *len > cap as u64) {
            return Err(too_large(format!(
                "server declared {declared} bytes, limit is {cap}"
            )));
        }
        Ok(Self {
            inner: response.into_reader(),
            cap,
            remaining: cap,
        })
    }
}

impl Read for CappedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // One byte of headroom tells "exactly at the cap" apart from "over it".
        let want = buf.len().min(self.remaining.saturating_add(1));
        let read = self.inner.read(&mut buf[..want])?;
        if read > self.remaining {
            return Err(too_large(format!("body exceeded {} bytes", self.cap)));
        }
        self.remaining -= read;
        Ok(read)
    }
}

fn too_large(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Buffer a whole response body, failing past `max_bytes`.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    max_bytes: usize,
) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    CappedBody::open(response, max_bytes)?.read_to_end(&mut body)?;
    Ok(body)
}

/// Buffer a whole response body as UTF-8 text, failing past `max_bytes`.
pub(crate) fn read_response_text(response: ureq::Response, max_bytes: usize) -> io::Result<String> {
    String::from_utf8(read_response_bytes(response, max_bytes)?)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Stream a response body into `writer`, returning the bytes written.
pub(crate) fn copy_response_to_writer(
    response: ureq::Response,
    writer: &mut impl Write,
    max_bytes: usize,
) -> io::Result<u64> {
    let mut body = CappedBody::open(response, max_bytes)?;
    let written = io::copy(&mut body, writer)?;
    writer.flush()?;
    Ok(written)
}
