//! Debugger bridge: a thin client for Mesen2's JSON-line debug socket.
//! No teacher module covers this; the socket-discovery idiom (`glob` over a
//! directory, most-recently-modified wins) is the same one
//! `lang::merlin::diagnostics::workspace::gather_docs` uses to find workspace
//! sources, adapted here to find a `/tmp/mesen2-*.sock` instead of `*.s` files.

use super::AsmError;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

// Unix domain socket connects are local and resolve immediately (either a
// listener is there or ECONNREFUSED comes back at once), so there's no
// connect-timeout knob to set; only the read side can hang, hence READ_TIMEOUT.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
struct ReadRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    addr: String,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    success: bool,
    data: Option<i64>,
}

/// Finds the newest `/tmp/mesen2-*.sock`, if any, matching the discovery rule
/// the emulator's socket naming convention assumes: one live session at a
/// time, named with a timestamp suffix, so "most recently modified" picks the
/// current one even if a stale socket from a crashed session is still around.
pub fn discover_socket() -> Option<std::path::PathBuf> {
    let mut best: Option<(std::time::SystemTime, std::path::PathBuf)> = None;
    let Ok(paths) = glob::glob("/tmp/mesen2-*.sock") else {
        return None;
    };
    for entry in paths.flatten() {
        let Ok(meta) = std::fs::metadata(&entry) else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        match &best {
            Some((best_time, _)) if *best_time >= modified => {}
            _ => best = Some((modified, entry)),
        }
    }
    best.map(|(_, path)| path)
}

/// A connection to the emulator's debug socket. Any I/O failure tears the
/// connection down; the next call transparently reconnects rather than
/// surfacing a half-broken stream to the caller.
pub struct DebuggerBridge {
    socket_path: Option<std::path::PathBuf>,
    stream: Option<BufReader<UnixStream>>,
}

impl DebuggerBridge {
    pub fn new() -> Self {
        Self { socket_path: None, stream: None }
    }

    pub fn with_socket(path: std::path::PathBuf) -> Self {
        Self { socket_path: Some(path), stream: None }
    }

    fn ensure_connected(&mut self) -> Result<(), AsmError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let path = self
            .socket_path
            .clone()
            .or_else(discover_socket)
            .ok_or_else(|| AsmError::DebuggerIo("no mesen2 debug socket found".to_string()))?;
        let stream = UnixStream::connect(&path).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        stream.set_read_timeout(Some(READ_TIMEOUT)).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        log::debug!("connected to debug socket {}", path.display());
        self.socket_path = Some(path);
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Reads one byte from a SNES address. On any failure, drops the
    /// connection so the next call reconnects from scratch.
    pub fn read_byte(&mut self, addr: u32) -> Result<u8, AsmError> {
        match self.read_byte_inner(addr) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    fn read_byte_inner(&mut self, addr: u32) -> Result<u8, AsmError> {
        self.ensure_connected()?;
        let stream = self.stream.as_mut().expect("connected above");
        let req = ReadRequest { kind: "READ", addr: format!("{:#08x}", addr) };
        let line = serde_json::to_string(&req).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        stream.get_mut().write_all(line.as_bytes()).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        stream.get_mut().write_all(b"\n").map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        let mut resp_line = String::new();
        stream.read_line(&mut resp_line).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        if resp_line.is_empty() {
            return Err(AsmError::DebuggerIo("debug socket closed".to_string()));
        }
        let resp: ReadResponse = serde_json::from_str(resp_line.trim()).map_err(|e| AsmError::DebuggerIo(e.to_string()))?;
        if !resp.success {
            return Err(AsmError::DebuggerIo(format!("read at {:#08x} rejected by emulator", addr)));
        }
        resp.data.map(|v| v as u8).ok_or_else(|| AsmError::DebuggerIo("missing data field".to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    #[test]
    fn read_request_serializes_as_expected_protocol() {
        let req = ReadRequest { kind: "READ", addr: "0x808000".to_string() };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"READ""#));
        assert!(json.contains("0x808000"));
    }

    #[test]
    fn round_trips_a_read_over_a_real_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("mesen2-test.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            let n = conn.read(&mut buf).unwrap();
            let _req: ReadRequest = serde_json::from_slice(&buf[..n]).unwrap();
            conn.write_all(br#"{"success":true,"data":170}"#).unwrap();
            conn.write_all(b"\n").unwrap();
        });
        let mut bridge = DebuggerBridge::with_socket(sock_path);
        let byte = bridge.read_byte(0x808000).unwrap();
        assert_eq!(byte, 170);
        server.join().unwrap();
    }

    #[test]
    fn missing_socket_reports_debugger_io_error() {
        let mut bridge = DebuggerBridge::with_socket(std::path::PathBuf::from("/tmp/does-not-exist-mesen2.sock"));
        let err = bridge.read_byte(0x808000).unwrap_err();
        assert_eq!(err.code(), "debugger_io");
    }
}
