#![cfg(unix)]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use nndab_sp::codec::{protocol_header, write_message, PROTO_REQ};
use nndab_sp::{Endpoint, ReplySocket, RequestSocket, SocketConfig, SpError, Transport};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/nndab-sp-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn bind_pair(dir: &std::path::Path) -> ReplySocket {
    ReplySocket::bind_with_config(
        &[
            Endpoint::ipc(dir.join("rep.sock")),
            Endpoint::tcp("127.0.0.1:0"),
        ],
        SocketConfig {
            recv_timeout: Some(Duration::from_secs(5)),
            ..SocketConfig::default()
        },
    )
    .expect("rep socket should bind")
}

fn serve(mut socket: ReplySocket, count: usize, reply: fn(&[u8]) -> Vec<u8>) -> thread::JoinHandle<ReplySocket> {
    thread::spawn(move || {
        for _ in 0..count {
            let request = socket
                .recv()
                .expect("recv should succeed")
                .expect("request should arrive before timeout");
            socket.send(&reply(&request)).expect("reply should send");
        }
        socket
    })
}

#[test]
fn request_reply_over_ipc_and_tcp() {
    let dir = unique_temp_dir("both");
    let socket = bind_pair(&dir);
    let endpoints = socket.endpoints().to_vec();
    let server = serve(socket, 4, |req| {
        let mut out = b"re:".to_vec();
        out.extend_from_slice(req);
        out
    });

    for endpoint in &endpoints {
        let mut client = RequestSocket::connect(endpoint).expect("client should connect");
        client.set_timeout(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(client.request(b"one").unwrap().as_ref(), b"re:one");
        assert_eq!(client.request(b"").unwrap().as_ref(), b"re:");
    }

    server.join().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn replies_route_to_the_requesting_peer() {
    let dir = unique_temp_dir("route");
    let socket = bind_pair(&dir);
    let endpoints = socket.endpoints().to_vec();
    let server = serve(socket, 2, |req| req.to_vec());

    let mut ipc = RequestSocket::connect(&endpoints[0]).unwrap();
    let mut tcp = RequestSocket::connect(&endpoints[1]).unwrap();
    ipc.set_timeout(Some(Duration::from_secs(5))).unwrap();
    tcp.set_timeout(Some(Duration::from_secs(5))).unwrap();

    let ipc_thread = thread::spawn(move || ipc.request(b"from-ipc").unwrap());
    let tcp_reply = tcp.request(b"from-tcp").unwrap();

    assert_eq!(tcp_reply.as_ref(), b"from-tcp");
    assert_eq!(ipc_thread.join().unwrap().as_ref(), b"from-ipc");
    server.join().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn wrong_protocol_peer_is_rejected() {
    let dir = unique_temp_dir("reject");
    let socket = bind_pair(&dir);
    let endpoint = socket.endpoints()[0].clone();
    let Endpoint::Ipc(path) = endpoint else {
        panic!("first endpoint should be ipc");
    };

    let mut raw = std::os::unix::net::UnixStream::connect(&path).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&protocol_header(0x0031)).unwrap();

    let mut header = [0u8; 8];
    raw.read_exact(&mut header).unwrap();
    let mut rest = Vec::new();
    // server closes after reading a REP header from a would-be REQ peer
    let n = raw.read_to_end(&mut rest).unwrap_or(0);
    assert_eq!(n, 0);

    drop(socket);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_request_is_ignored_and_connection_survives() {
    let dir = unique_temp_dir("malformed");
    let mut socket = bind_pair(&dir);
    let Endpoint::Tcp(addr) = socket.endpoints()[1].clone() else {
        panic!("second endpoint should be tcp");
    };

    let mut raw = std::net::TcpStream::connect(&addr).unwrap();
    raw.write_all(&protocol_header(PROTO_REQ)).unwrap();
    let mut header = [0u8; 8];
    raw.read_exact(&mut header).unwrap();

    // no request id: dropped by the socket
    write_message(&mut raw, Transport::Tcp, &[&[0u8, 0, 0, 1][..]]).unwrap();
    // well-formed request on the same connection
    write_message(&mut raw, Transport::Tcp, &[&[0x80u8, 0, 0, 9][..], &b"ok"[..]]).unwrap();

    let request = socket.recv().unwrap().expect("valid request should arrive");
    assert_eq!(request.as_ref(), b"ok");
    socket.send(b"fine").unwrap();

    let mut reply = [0u8; 8 + 4 + 4];
    raw.read_exact(&mut reply).unwrap();
    assert_eq!(&reply[8..12], &[0x80, 0, 0, 9]);
    assert_eq!(&reply[12..], b"fine");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reply_to_departed_peer_reports_disconnect() {
    let dir = unique_temp_dir("departed");
    let mut socket = bind_pair(&dir);
    let endpoint = socket.endpoints()[1].clone();

    {
        let mut client = RequestSocket::connect(&endpoint).unwrap();
        client.set_timeout(Some(Duration::from_millis(50))).unwrap();
        let err = client.request(b"bye").unwrap_err();
        assert!(matches!(err, SpError::Timeout(_)));
    }

    let request = socket.recv().unwrap().expect("request should be queued");
    assert_eq!(request.as_ref(), b"bye");

    let deadline = Instant::now() + Duration::from_secs(5);
    while socket.peer_count() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(matches!(socket.send(b"late"), Err(SpError::Disconnected)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn socket_file_removed_on_drop() {
    let dir = unique_temp_dir("cleanup");
    let socket = bind_pair(&dir);
    let sock_path = dir.join("rep.sock");
    assert!(sock_path.exists());

    drop(socket);
    assert!(!sock_path.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn tcp_port_released_on_drop() {
    let socket = ReplySocket::bind(&[Endpoint::tcp("127.0.0.1:0")]).unwrap();
    let Endpoint::Tcp(addr) = socket.endpoints()[0].clone() else {
        panic!("endpoint should be tcp");
    };

    drop(socket);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match std::net::TcpListener::bind(&addr) {
            Ok(_) => break,
            Err(err) => {
                assert!(Instant::now() < deadline, "{addr} still bound: {err}");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[test]
fn connected_peers_are_closed_on_drop() {
    let dir = unique_temp_dir("close-peers");
    let socket = bind_pair(&dir);
    let endpoint = socket.endpoints()[1].clone();

    let mut client = RequestSocket::connect(&endpoint).unwrap();
    client.set_timeout(Some(Duration::from_secs(5))).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while socket.peer_count() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(socket.peer_count(), 1);

    drop(socket);
    assert!(matches!(client.request(b"anyone"), Err(SpError::Disconnected)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn one_request_per_peer_is_queued() {
    let mut socket = ReplySocket::bind_with_config(
        &[Endpoint::tcp("127.0.0.1:0")],
        SocketConfig {
            recv_timeout: Some(Duration::from_millis(200)),
            ..SocketConfig::default()
        },
    )
    .unwrap();
    let Endpoint::Tcp(addr) = socket.endpoints()[0].clone() else {
        panic!("endpoint should be tcp");
    };

    let mut eager = std::net::TcpStream::connect(&addr).unwrap();
    eager.write_all(&protocol_header(PROTO_REQ)).unwrap();
    let mut header = [0u8; 8];
    eager.read_exact(&mut header).unwrap();
    for id in 1..=3u8 {
        write_message(&mut eager, Transport::Tcp, &[&[0x80u8, 0, 0, id][..], &[id][..]]).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let first = loop {
        if let Some(request) = socket.recv().unwrap() {
            break request;
        }
        assert!(Instant::now() < deadline, "first request never arrived");
    };
    assert_eq!(first.as_ref(), &[1]);

    // the second request is held until the first is answered
    assert!(socket.recv().unwrap().is_none());
    socket.send(b"one").unwrap();

    let second = socket.recv().unwrap().expect("second request should follow the reply");
    assert_eq!(second.as_ref(), &[2]);
}
