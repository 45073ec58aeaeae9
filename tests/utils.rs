#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// NDJSON body the way the backend streams it.
pub fn ndjson(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

/// A port nothing is listening on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

/// A backend that answers one request with a chunked body, sends `chunk`,
/// and then closes the connection without finishing the body.
pub async fn truncating_backend(chunk: &str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
    let port = listener.local_addr().expect("local addr").port();
    let chunk = chunk.to_string();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");

        // Drain the whole request so closing the socket is a clean FIN.
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.expect("read request");
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.ends_with(b"}") {
                break;
            }
        }

        let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n";
        let body = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        socket.write_all(head.as_bytes()).await.expect("write head");
        socket.write_all(body.as_bytes()).await.expect("write chunk");
        socket.flush().await.expect("flush");

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    });

    port
}

/// Data payloads of a server-sent event body.
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}
