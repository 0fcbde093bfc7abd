//! Wire format of the worker control protocol.

use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed size of every worker response, payload or not.
pub const RESPONSE_SIZE: usize = 201;

pub const OPCODE_KILL: u8 = 0;
pub const OPCODE_RUN: u8 = 1;

pub const STATUS_ERROR: u8 = 0;
pub const STATUS_SUCCESS: u8 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot reach worker at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker i/o failed")]
    Io(#[from] io::Error),

    #[error("truncated worker response ({got} of {RESPONSE_SIZE} bytes)")]
    Truncated { got: usize },

    #[error("worker reported: {0}")]
    WorkerReported(String),

    #[error("unknown status byte {0:#x} in worker response")]
    BadStatus(u8),
}

fn connect(socket: &Path) -> Result<UnixStream, ProtocolError> {
    UnixStream::connect(socket).map_err(|source| ProtocolError::Connect {
        path: socket.to_path_buf(),
        source,
    })
}

/// Ask the worker behind `socket` to load `library` and replay its recorded
/// invocations, returning the measured elapsed time.
///
/// Request: opcode byte 1 followed by the NUL-terminated absolute library
/// path. Response: a status byte, then on success a native-endian `f32` in
/// the next four bytes; on error the rest of the response is a message.
pub fn run_candidate(socket: &Path, library: &Path) -> Result<f32, ProtocolError> {
    let mut stream = connect(socket)?;

    let path_bytes = library.as_os_str().as_bytes();
    let mut request = Vec::with_capacity(path_bytes.len() + 2);
    request.push(OPCODE_RUN);
    request.extend_from_slice(path_bytes);
    request.push(0);
    stream.write_all(&request)?;

    let mut response = [0u8; RESPONSE_SIZE];
    let mut got = 0;
    while got < RESPONSE_SIZE {
        let n = stream.read(&mut response[got..])?;
        if n == 0 {
            return Err(ProtocolError::Truncated { got });
        }
        got += n;
    }

    match response[0] {
        STATUS_SUCCESS => {
            let elapsed = f32::from_ne_bytes(response[1..5].try_into().expect("4 bytes"));
            Ok(elapsed)
        }
        STATUS_ERROR => {
            let body = &response[1..];
            let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
            Err(ProtocolError::WorkerReported(
                String::from_utf8_lossy(&body[..end]).into_owned(),
            ))
        }
        other => Err(ProtocolError::BadStatus(other)),
    }
}

/// Instruct the worker behind `socket` to terminate. No response follows.
pub fn kill_worker(socket: &Path) -> Result<(), ProtocolError> {
    let mut stream = connect(socket)?;
    stream.write_all(&[OPCODE_KILL])?;
    Ok(())
}
