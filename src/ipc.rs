use crate::pipeline::PipelineState;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::{env, io};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Initialize,
    Enable,
    Disable,
    Toggle,
    Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlReply {
    pub state: PipelineState,
    pub accepted: bool,
    pub detail: Option<String>,
}

pub fn socket_path() -> PathBuf {
    if let Some(path) = env::var_os("GESTURE_OVERLAY_SOCKET") {
        return PathBuf::from(path);
    }
    env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join("gesture-overlay.sock")
}

/// Sends `msg` to the running daemon and waits for its reply.
pub fn send_command(msg: ControlMessage) -> io::Result<ControlReply> {
    let path = socket_path();
    let mut stream = UnixStream::connect(&path)?;
    serde_json::to_writer(&mut stream, &msg)?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Write);

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}
