use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

/// Canned response for one path on the stub server.
pub struct StubRoute {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl StubRoute {
    pub fn json(status: u16, body: serde_json::Value) -> StubRoute {
        StubRoute {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub fn jpeg(body: &[u8]) -> StubRoute {
        StubRoute {
            status: 200,
            content_type: "image/jpeg",
            body: body.to_vec(),
        }
    }
}

/// Minimal HTTP/1.1 server for exercising the agent's collaborators
/// without the network. Counts hits per path so tests can assert which
/// endpoints were (not) reached.
pub struct StubServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl StubServer {
    pub async fn start(routes: HashMap<String, StubRoute>) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let routes = Arc::new(routes);
        let accept_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle(stream, routes.clone(), accept_hits.clone()));
            }
        });
        StubServer { addr, hits }
    }

    pub fn url(&self, path: &str) -> Url {
        format!("http://{}{}", self.addr, path).parse().unwrap()
    }

    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

async fn handle(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, StubRoute>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    // drain the request body so the client never sees a reset mid-write
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    let response = match routes.get(&path) {
        Some(route) => {
            let mut response = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                route.status,
                route.content_type,
                route.body.len()
            )
            .into_bytes();
            response.extend_from_slice(&route.body);
            response
        }
        None => b"HTTP/1.1 404 Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    };
    let _ = stream.write_all(&response).await;
    let _ = stream.shutdown().await;
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
