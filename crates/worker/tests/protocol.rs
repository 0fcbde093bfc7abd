//! Protocol round trips against an in-process fake worker.

use looptune_worker::protocol::{
    self, ProtocolError, OPCODE_KILL, OPCODE_RUN, RESPONSE_SIZE, STATUS_ERROR, STATUS_SUCCESS,
};
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::thread;

fn socket_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("socket")
}

/// Serve one request: read it, hand it to `respond`, write the reply.
fn serve_once(
    listener: UnixListener,
    respond: impl FnOnce(&[u8]) -> Option<Vec<u8>> + Send + 'static,
) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = vec![0u8; 256];
        let n = stream.read(&mut request).unwrap();
        request.truncate(n);
        if let Some(reply) = respond(&request) {
            stream.write_all(&reply).unwrap();
        }
        request
    })
}

fn success_response(elapsed: f32) -> Vec<u8> {
    let mut reply = vec![0u8; RESPONSE_SIZE];
    reply[0] = STATUS_SUCCESS;
    reply[1..5].copy_from_slice(&elapsed.to_ne_bytes());
    reply
}

#[test]
fn run_request_carries_terminated_path_and_parses_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let listener = UnixListener::bind(&path).unwrap();
    let server = serve_once(listener, |_| Some(success_response(2.5)));

    let elapsed = protocol::run_candidate(&path, Path::new("/tmp/candidate.so")).unwrap();
    assert!((elapsed - 2.5).abs() < f32::EPSILON);

    let request = server.join().unwrap();
    assert_eq!(request[0], OPCODE_RUN);
    assert_eq!(&request[1..], b"/tmp/candidate.so\0");
}

#[test]
fn error_response_surfaces_worker_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let listener = UnixListener::bind(&path).unwrap();
    let server = serve_once(listener, |_| {
        let mut reply = vec![0u8; RESPONSE_SIZE];
        reply[0] = STATUS_ERROR;
        reply[1..1 + 22].copy_from_slice(b"unable to open library");
        Some(reply)
    });

    let err = protocol::run_candidate(&path, Path::new("/tmp/candidate.so")).unwrap_err();
    match err {
        ProtocolError::WorkerReported(message) => {
            assert_eq!(message, "unable to open library");
        }
        other => panic!("unexpected error: {other}"),
    }
    server.join().unwrap();
}

#[test]
fn truncated_response_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let listener = UnixListener::bind(&path).unwrap();
    let server = serve_once(listener, |_| Some(vec![STATUS_SUCCESS; 5]));

    let err = protocol::run_candidate(&path, Path::new("/tmp/candidate.so")).unwrap_err();
    assert!(matches!(err, ProtocolError::Truncated { got: 5 }));
    server.join().unwrap();
}

#[test]
fn kill_then_run_fails_with_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let listener = UnixListener::bind(&path).unwrap();

    // worker loop: exit on the kill opcode, leaving the socket file behind
    let worker = {
        let path = path.clone();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut opcode = [0u8; 1];
            stream.read_exact(&mut opcode).unwrap();
            assert_eq!(opcode[0], OPCODE_KILL);
            drop(listener);
            let _ = path; // socket path intentionally not unlinked
        })
    };

    protocol::kill_worker(&path).unwrap();
    worker.join().unwrap();

    let err = protocol::run_candidate(&path, Path::new("/tmp/candidate.so")).unwrap_err();
    assert!(matches!(err, ProtocolError::Connect { .. }));
}
