use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_test::assert_ok;

use torcheck::{Client, FetchError, SocksProxy};

#[derive(Debug)]
struct SocksTrace {
    atyp: u8,
    host: String,
    port: u16,
}

/// Minimal no-auth SOCKS5 server for one connection. On `reply_code` 0 it
/// dials the requested target itself and relays bytes both ways; any other
/// code is sent back as the connect reply and the tunnel never opens.
async fn spawn_socks5(reply_code: u8) -> (SocketAddr, tokio::task::JoinHandle<SocksTrace>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut client_side, _) = listener.accept().await.unwrap();

        let mut greeting = [0u8; 2];
        client_side.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 5);
        let mut methods = vec![0u8; greeting[1] as usize];
        client_side.read_exact(&mut methods).await.unwrap();
        assert!(methods.contains(&0), "client must offer no-auth");
        client_side.write_all(&[5, 0]).await.unwrap();

        let mut request = [0u8; 4];
        client_side.read_exact(&mut request).await.unwrap();
        assert_eq!(request[0], 5);
        assert_eq!(request[1], 1, "expected CONNECT");
        let atyp = request[3];
        let (host, port) = match atyp {
            1 => {
                let mut rest = [0u8; 6];
                client_side.read_exact(&mut rest).await.unwrap();
                let ip = Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
                (ip.to_string(), u16::from_be_bytes([rest[4], rest[5]]))
            }
            3 => {
                let mut len = [0u8; 1];
                client_side.read_exact(&mut len).await.unwrap();
                let mut name = vec![0u8; len[0] as usize];
                client_side.read_exact(&mut name).await.unwrap();
                let mut port = [0u8; 2];
                client_side.read_exact(&mut port).await.unwrap();
                (String::from_utf8(name).unwrap(), u16::from_be_bytes(port))
            }
            other => panic!("unexpected address type {}", other),
        };

        client_side
            .write_all(&[5, reply_code, 0, 1, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();

        if reply_code == 0 {
            let mut upstream = TcpStream::connect((host.as_str(), port)).await.unwrap();
            let _ = tokio::io::copy_bidirectional(&mut client_side, &mut upstream).await;
        }

        SocksTrace { atyp, host, port }
    });
    (addr, handle)
}

async fn serve_http_once(body: &str) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let mut request = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    (addr, handle)
}

#[tokio::test]
async fn fetch_through_socks_matches_direct() {
    let body = "same bytes either way";

    let (direct_addr, _h1) = serve_http_once(body).await;
    let direct = assert_ok!(Client::new().get(&format!("http://{}/", direct_addr)).await);

    let (target_addr, _h2) = serve_http_once(body).await;
    let (proxy_addr, proxy_handle) = spawn_socks5(0).await;
    let proxy = SocksProxy::new(&format!("socks5://{}", proxy_addr)).unwrap();
    let proxied = assert_ok!(Client::with_proxy(proxy)
        .get(&format!("http://{}/", target_addr))
        .await);

    assert_eq!(direct.body, proxied.body);

    let trace = proxy_handle.await.unwrap();
    assert_eq!(trace.atyp, 1);
    assert_eq!(trace.port, target_addr.port());
}

#[tokio::test]
async fn hostname_is_passed_to_proxy_unresolved() {
    let body = "resolved at the proxy";
    let (target_addr, _server) = serve_http_once(body).await;
    let (proxy_addr, proxy_handle) = spawn_socks5(0).await;

    let proxy = SocksProxy::new(&format!("socks5://{}", proxy_addr)).unwrap();
    let response = assert_ok!(Client::with_proxy(proxy)
        .get(&format!("http://localhost:{}/", target_addr.port()))
        .await);
    assert_eq!(response.text(), body);

    let trace = proxy_handle.await.unwrap();
    assert_eq!(trace.atyp, 3, "hostnames must go out as DOMAIN addresses");
    assert_eq!(trace.host, "localhost");
    assert_eq!(trace.port, target_addr.port());
}

#[tokio::test]
async fn unreachable_proxy_fails_before_any_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_server = hits.clone();
    let _server = tokio::spawn(async move {
        loop {
            let _ = listener.accept().await;
            hits_in_server.fetch_add(1, Ordering::SeqCst);
        }
    });

    // Grab a port and free it so the proxy address refuses connections.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let proxy = SocksProxy::new(&format!("socks5://{}", dead_addr)).unwrap();
    let err = Client::with_proxy(proxy)
        .get(&format!("http://{}/", target_addr))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::ConnectionFailed(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0, "target must never be dialed");
}

#[tokio::test]
async fn socks_reply_error_is_surfaced() {
    // 0x05: connection refused by the destination.
    let (proxy_addr, _handle) = spawn_socks5(5).await;

    let proxy = SocksProxy::new(&format!("socks5://{}", proxy_addr)).unwrap();
    let err = Client::with_proxy(proxy)
        .get("http://127.0.0.1:9/")
        .await
        .unwrap_err();

    match err {
        FetchError::ConnectionFailed(msg) => assert!(msg.contains("connection refused")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn auth_demanding_proxy_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut greeting = [0u8; 2];
        socket.read_exact(&mut greeting).await.unwrap();
        let mut methods = vec![0u8; greeting[1] as usize];
        socket.read_exact(&mut methods).await.unwrap();
        // Demand username/password, which the client never offers.
        socket.write_all(&[5, 2]).await.unwrap();
    });

    let proxy = SocksProxy::new(&format!("socks5://{}", proxy_addr)).unwrap();
    let err = Client::with_proxy(proxy)
        .get("http://127.0.0.1:9/")
        .await
        .unwrap_err();

    match err {
        FetchError::ConnectionFailed(msg) => assert!(msg.contains("unsupported method")),
        other => panic!("unexpected error: {:?}", other),
    }
}
