use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boring::ssl::SslAcceptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

/// A request as the server saw it on the wire.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct CapturedRequest {
    /// Request line and header block, CRLF separated, without the blank line.
    pub head: String,
    pub body: Vec<u8>,
    /// Negotiated TLS version for HTTPS connections.
    pub tls_version: Option<String>,
}

#[allow(dead_code)]
impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.request_line().split(' ').nth(1).unwrap_or_default()
    }

    /// Header names in transmission order, exactly as sent.
    pub fn header_names(&self) -> Vec<String> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':').map(|(k, _)| k.to_string()))
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.eq_ignore_ascii_case(name).then(|| v.trim().to_string())
        })
    }
}

type Responder = dyn Fn(&CapturedRequest) -> Vec<u8> + Send + Sync;

/// Build a response with Content-Length set. Add `("Connection", "close")` to
/// make the server hang up after it.
#[allow(dead_code)]
pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {} Mock\r\n", status).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Scripted HTTP/1.1 server handling keep-alive connections.
///
/// A responder returning an empty reply makes the server drop the
/// connection without answering.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
}

/// Running server: captured requests and accepted connection count.
#[derive(Clone)]
#[allow(dead_code)]
pub struct ServerHandle {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    connections: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ServerHandle {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[allow(dead_code)]
impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for plain HTTP.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Base URL for HTTPS.
    pub fn url_tls(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    /// Serve plain HTTP, answering every request with `responder`.
    pub fn start<F>(self, responder: F) -> ServerHandle
    where
        F: Fn(&CapturedRequest) -> Vec<u8> + Send + Sync + 'static,
    {
        self.run(None, Arc::new(responder))
    }

    /// Serve HTTPS with `acceptor`.
    pub fn start_tls<F>(self, acceptor: SslAcceptor, responder: F) -> ServerHandle
    where
        F: Fn(&CapturedRequest) -> Vec<u8> + Send + Sync + 'static,
    {
        self.run(Some(Arc::new(acceptor)), Arc::new(responder))
    }

    fn run(self, acceptor: Option<Arc<SslAcceptor>>, responder: Arc<Responder>) -> ServerHandle {
        let handle = ServerHandle {
            requests: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(AtomicUsize::new(0)),
        };
        let server = handle.clone();
        let listener = self.listener;

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                };
                server.connections.fetch_add(1, Ordering::SeqCst);
                let requests = Arc::clone(&server.requests);
                let responder = Arc::clone(&responder);
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => match tokio_boring::accept(&acceptor, stream).await {
                            Ok(tls) => {
                                let version = Some(tls.ssl().version_str().to_string());
                                serve(tls, version, responder, requests).await
                            }
                            Err(e) => tracing::warn!("TLS accept failed: {}", e),
                        },
                        None => serve(stream, None, responder, requests).await,
                    }
                });
            }
        });

        handle
    }
}

/// Handle one connection, processing requests until the peer or the responder closes it.
async fn serve<S>(
    mut stream: S,
    tls_version: Option<String>,
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end - 4]).into_owned();
        let content_length = head
            .lines()
            .skip(1)
            .find_map(|line| {
                let (k, v) = line.split_once(':')?;
                k.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        }
        let body = buf[header_end..header_end + content_length].to_vec();
        buf.drain(..header_end + content_length);

        let request = CapturedRequest {
            head,
            body,
            tls_version: tls_version.clone(),
        };
        let reply = responder(&request);
        requests.lock().unwrap().push(request);
        if reply.is_empty() {
            // Hang up without answering.
            return;
        }

        let close = String::from_utf8_lossy(&reply)
            .split("\r\n\r\n")
            .next()
            .map(|h| h.to_ascii_lowercase().contains("connection: close"))
            .unwrap_or(false);

        if stream.write_all(&reply).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        if close {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

async fn read_more<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 8192];
    match timeout(Duration::from_secs(5), stream.read(&mut chunk)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
        _ => false,
    }
}
