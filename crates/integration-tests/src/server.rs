//! Minimal scripted HTTP fixture for exercising the REST client.
//!
//! Binds a local listener and serves a fixed sequence of canned responses,
//! one per request in arrival order, recording each request's method, path,
//! and anti-forgery header. Responses carry `connection: close`, so every
//! request arrives on its own connection and the arrival order matches the
//! client's call order.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One response in the scripted sequence.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
}

impl CannedResponse {
    #[must_use]
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A request the fixture observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Value of the `X-CSRF-Token` header, when the request carried one.
    pub csrf_token: Option<String>,
}

/// Local HTTP server replaying a scripted response sequence.
///
/// Requests beyond the script get a 500 with an empty body. The accept loop
/// is aborted on drop.
pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ScriptedServer {
    /// Bind on an ephemeral local port and start serving the script.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture listener address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

        let log = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let response = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let _ = serve_one(stream, response, &log).await;
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request observed so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Handle one connection: parse the request head, drain the body, record
/// the request, write the canned response, close.
///
/// The request is recorded before the response bytes go out, so by the
/// time the client sees a reply the log already holds its request.
async fn serve_one(
    mut stream: TcpStream,
    response: Option<CannedResponse>,
    log: &Mutex<Vec<RecordedRequest>>,
) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => {
                buf.extend_from_slice(chunk.get(..n)?);
                if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                    break pos + 4;
                }
                if buf.len() > 64 * 1024 {
                    return None;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(buf.get(..header_end)?).to_string();
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut csrf_token = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("x-csrf-token") {
                csrf_token = Some(value.to_string());
            }
        }
    }

    // Drain the body so the client finishes writing before the response.
    while buf.len().saturating_sub(header_end) < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(chunk.get(..n)?),
        }
    }

    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(RecordedRequest {
            method,
            path,
            csrf_token,
        });

    let (status, body) = response.map_or((500, String::new()), |r| (r.status, r.body));
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Error",
    };
    let payload = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(payload.as_bytes()).await;
    let _ = stream.shutdown().await;

    Some(())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
