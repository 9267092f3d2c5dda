//! In-process fake browser: a thread that owns the "child" side of the pipe
//! transport and speaks null-terminated JSON back at `cdpdrive`'s
//! reader/writer tasks, so the scenarios in spec §8 can run without an
//! actual Chromium binary.
//!
//! Grounded in the `cdp_pipe` reference implementation's single-exchange
//! pipe client, generalized here into a long-lived responder loop plus an
//! out-of-band channel for pushing unsolicited events.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::fd::FromRawFd;
use std::sync::{Arc, Mutex};

use cdpdrive::pipe;

/// A fake Chromium process: reads commands from the client, replies with
/// canned results, and can push unsolicited events at any time.
pub struct FakeBrowser {
    writer: Arc<Mutex<std::fs::File>>,
    _reader_thread: std::thread::JoinHandle<()>,
}

impl FakeBrowser {
    /// Push an event frame (`{method, params}`, no `id`) to the client.
    pub fn push_event(&self, method: &str, params: serde_json::Value) {
        let frame = serde_json::json!({ "method": method, "params": params });
        write_frame(&self.writer, &frame);
    }
}

fn write_frame(writer: &Arc<Mutex<std::fs::File>>, value: &serde_json::Value) {
    let mut bytes = serde_json::to_vec(value).expect("canned value always serializes");
    bytes.push(0);
    writer
        .lock()
        .unwrap()
        .write_all(&bytes)
        .expect("fake browser write");
}

/// What the fake browser sends back for one command.
#[derive(Clone)]
pub enum Canned {
    Result(serde_json::Value),
    Error { code: i32, message: String },
}

impl From<serde_json::Value> for Canned {
    fn from(value: serde_json::Value) -> Self {
        Canned::Result(value)
    }
}

/// Spawn a fake browser seeded with `canned` (`method -> reply`) entries.
/// `Browser.getVersion` gets a default reply if the caller didn't supply
/// one, since every `Session::launch` performs that handshake.
///
/// Returns the parent-side transport (hand to
/// `cdpdrive::session::Session::launch_over_transport`) and a handle for
/// pushing events mid-test.
pub fn spawn(mut canned: HashMap<String, Canned>) -> (pipe::PipeReader, pipe::PipeWriter, FakeBrowser) {
    canned.entry("Browser.getVersion".to_string()).or_insert_with(|| {
        Canned::Result(serde_json::json!({
            "protocolVersion": "1.3",
            "product": "HeadlessChrome/test",
            "revision": "test",
            "userAgent": "cdpdrive-test",
            "jsVersion": "test",
        }))
    });

    let halves = pipe::create().expect("pipe creation");
    let pipe::PipeHalves {
        reader,
        writer,
        child,
    } = halves;

    // No real child process: this test harness owns both ends directly, so
    // the browser side is these raw fds read/written from a plain thread
    // rather than dup2'd onto fd 3/4 of a forked process.
    let browser_writer = Arc::new(Mutex::new(unsafe { std::fs::File::from_raw_fd(child.write_fd) }));
    let ack_writer = browser_writer.clone();

    let reader_thread = std::thread::spawn(move || {
        let mut incoming = unsafe { std::fs::File::from_raw_fd(child.read_fd) };
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match incoming.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            while let Some(pos) = buf.iter().position(|&b| b == 0) {
                let frame: Vec<u8> = buf.drain(..=pos).collect();
                let frame = &frame[..frame.len() - 1];
                let Ok(value) = serde_json::from_slice::<serde_json::Value>(frame) else {
                    continue;
                };
                let Some(id) = value.get("id").cloned() else {
                    continue;
                };
                let method = value
                    .get("method")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                let reply = match canned.get(method).cloned() {
                    Some(Canned::Result(result)) => serde_json::json!({ "id": id, "result": result }),
                    Some(Canned::Error { code, message }) => {
                        serde_json::json!({ "id": id, "error": { "code": code, "message": message } })
                    }
                    None => serde_json::json!({ "id": id, "result": {} }),
                };
                write_frame(&ack_writer, &reply);
            }
        }
    });

    (
        reader,
        writer,
        FakeBrowser {
            writer: browser_writer,
            _reader_thread: reader_thread,
        },
    )
}
