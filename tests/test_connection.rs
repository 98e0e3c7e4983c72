mod common;

use common::{Call, connect, context, context_with, write_file};
use lantern::config::Limits;
use lantern::http::connection::{ConnectionError, Progress, WriteStatus};
use lantern::http::parser::ParseStage;
use lantern::http::response::StatusCode;
use lantern::server::Interest;

fn response_head(status: &str, content_length: usize, connection: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        status, content_length, connection
    )
}

#[test]
fn test_init_registers_and_counts() {
    let root = tempfile::tempdir().unwrap();
    let (ctx, readiness) = context(root.path());

    let (mut conn, socket) = connect(&ctx, 7);

    assert!(socket.wire.lock().unwrap().nonblocking);
    assert_eq!(readiness.calls(), vec![(7, Call::Register(Interest::Readable))]);
    assert_eq!(ctx.live_connections(), 1);

    conn.close();
    conn.close();
    assert!(conn.is_closed());
    assert_eq!(ctx.live_connections(), 0);
    assert_eq!(readiness.count(Call::Deregister), 1);
}

#[test]
fn test_drop_closes_connection() {
    let root = tempfile::tempdir().unwrap();
    let (ctx, readiness) = context(root.path());

    let (conn, _socket) = connect(&ctx, 8);
    drop(conn);

    assert_eq!(ctx.live_connections(), 0);
    assert_eq!(readiness.last(), Some(Call::Deregister));
}

#[test]
fn test_serves_file_with_two_segments() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "index.html", b"<h1>hello</h1>");
    let (ctx, readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 9);

    socket.push(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    conn.read().unwrap();
    let progress = conn.process().unwrap();

    assert_eq!(progress, Progress::ResponseReady(StatusCode::Ok));
    assert!(conn.has_file_mapping());
    assert_eq!(readiness.last(), Some(Call::Rearm(Interest::Writable)));

    let status = conn.write().unwrap();
    assert_eq!(status, WriteStatus::Close);
    assert!(!conn.has_file_mapping());

    let expected = response_head("200 OK", 14, "close") + "<h1>hello</h1>";
    assert_eq!(socket.take_output(), expected.as_bytes());
}

#[test]
fn test_missing_file_is_404() {
    let root = tempfile::tempdir().unwrap();
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 10);

    socket.push(b"GET /missing.html HTTP/1.1\r\nHost: x\r\n\r\n");
    conn.read().unwrap();

    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::NotFound)
    );
    conn.write().unwrap();

    let output = String::from_utf8(socket.take_output()).unwrap();
    assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(output.ends_with("The requested file was not found on this server.\n"));
}

#[test]
fn test_post_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "index.html", b"data");
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 11);

    socket.push(b"POST /index.html HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc");
    conn.read().unwrap();

    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::BadRequest)
    );
    assert!(!conn.has_file_mapping());

    conn.write().unwrap();
    let output = String::from_utf8(socket.take_output()).unwrap();
    assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn test_incomplete_request_rearms_for_read() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "a.txt", b"A");
    let (ctx, readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 12);

    socket.push(b"GET /a.txt HTTP/1.1\r\nHo");
    conn.read().unwrap();
    assert_eq!(conn.process().unwrap(), Progress::NeedMoreData);
    assert_eq!(conn.stage(), ParseStage::Headers);
    assert_eq!(readiness.last(), Some(Call::Rearm(Interest::Readable)));

    socket.push(b"st: x\r\n\r\n");
    conn.read().unwrap();
    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::Ok)
    );
}

#[test]
fn test_keep_alive_resets_for_next_request() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "one.txt", b"first");
    write_file(root.path(), "two.txt", b"second");
    let (ctx, readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 13);

    socket.push(b"GET /one.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
    conn.read().unwrap();
    conn.process().unwrap();
    assert!(conn.keep_alive());

    assert_eq!(conn.write().unwrap(), WriteStatus::KeepAlive);
    assert_eq!(conn.stage(), ParseStage::RequestLine);
    assert_eq!(conn.buffered(), 0);
    assert_eq!(conn.pending_output(), 0);
    assert!(!conn.has_file_mapping());
    assert_eq!(readiness.last(), Some(Call::Rearm(Interest::Readable)));

    let first = response_head("200 OK", 5, "keep-alive") + "first";
    assert_eq!(socket.take_output(), first.as_bytes());

    socket.push(b"GET /two.txt HTTP/1.1\r\n\r\n");
    conn.read().unwrap();
    conn.process().unwrap();
    assert_eq!(conn.write().unwrap(), WriteStatus::Close);

    let second = response_head("200 OK", 6, "close") + "second";
    assert_eq!(socket.take_output(), second.as_bytes());
    assert_eq!(ctx.live_connections(), 1);
}

#[test]
fn test_partial_write_resumes_without_loss() {
    let root = tempfile::tempdir().unwrap();
    let body: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    write_file(root.path(), "blob.bin", &body);
    let (ctx, readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 14);

    socket.push(b"GET /blob.bin HTTP/1.1\r\n\r\n");
    conn.read().unwrap();
    conn.process().unwrap();

    let total = conn.pending_output();
    socket.set_write_budget(Some(100));
    assert_eq!(conn.write().unwrap(), WriteStatus::Pending);
    assert!(conn.has_file_mapping());
    assert_eq!(conn.pending_output(), total - 100);
    assert_eq!(readiness.last(), Some(Call::Rearm(Interest::Writable)));

    socket.set_write_budget(Some(1000));
    assert_eq!(conn.write().unwrap(), WriteStatus::Pending);
    assert!(conn.has_file_mapping());

    socket.set_write_budget(None);
    assert_eq!(conn.write().unwrap(), WriteStatus::Close);
    assert!(!conn.has_file_mapping());

    let output = socket.take_output();
    let head = response_head("200 OK", body.len(), "close");
    assert_eq!(output.len(), total);
    assert_eq!(&output[..head.len()], head.as_bytes());
    assert_eq!(&output[head.len()..], &body[..]);
}

#[test]
fn test_body_is_awaited() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "a.txt", b"A");
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 15);

    socket.push(b"GET /a.txt HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc");
    conn.read().unwrap();
    assert_eq!(conn.process().unwrap(), Progress::NeedMoreData);
    assert_eq!(conn.stage(), ParseStage::Body);

    socket.push(b"de");
    conn.read().unwrap();
    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::Ok)
    );
}

#[test]
fn test_peer_close_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 16);

    socket.push(b"GET / HTT");
    socket.close_peer();

    assert!(matches!(conn.read(), Err(ConnectionError::PeerClosed)));
}

#[test]
fn test_full_buffer_refuses_read() {
    let root = tempfile::tempdir().unwrap();
    let limits = Limits {
        read_buffer_size: 16,
        ..Limits::default()
    };
    let (ctx, _readiness) = context_with(root.path(), limits);
    let (mut conn, socket) = connect(&ctx, 17);

    socket.push(b"GET /aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    assert_eq!(conn.read().unwrap(), 16);
    assert_eq!(conn.buffered(), 16);

    assert!(matches!(conn.read(), Err(ConnectionError::BufferFull)));
    assert_eq!(conn.buffered(), 16);
}

#[test]
fn test_response_overflow_is_build_error() {
    let root = tempfile::tempdir().unwrap();
    let limits = Limits {
        write_buffer_size: 32,
        ..Limits::default()
    };
    let (ctx, _readiness) = context_with(root.path(), limits);
    let (mut conn, socket) = connect(&ctx, 18);

    socket.push(b"BREW /pot HTTP/1.1\r\n\r\n");
    conn.read().unwrap();

    assert!(matches!(conn.process(), Err(ConnectionError::Build(_))));
}

#[test]
fn test_unterminated_head_filling_buffer_is_400() {
    let root = tempfile::tempdir().unwrap();
    let limits = Limits {
        read_buffer_size: 32,
        ..Limits::default()
    };
    let (ctx, readiness) = context_with(root.path(), limits);
    let (mut conn, socket) = connect(&ctx, 19);

    socket.push(b"GET /aaaaaaaaaaaaaaaaaaaaaaaaaaa");
    assert_eq!(conn.read().unwrap(), 32);

    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::BadRequest)
    );
    assert_eq!(readiness.last(), Some(Call::Rearm(Interest::Writable)));

    assert_eq!(conn.write().unwrap(), WriteStatus::Close);
    let page = StatusCode::BadRequest.error_page().unwrap();
    let expected = response_head("400 Bad Request", page.len(), "close") + page;
    assert_eq!(socket.take_output(), expected.as_bytes());
}

#[test]
fn test_directory_is_400() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("assets");
    std::fs::create_dir(&dir).unwrap();
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 20);

    socket.push(b"GET /assets HTTP/1.1\r\nHost: x\r\n\r\n");
    conn.read().unwrap();

    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::BadRequest)
    );
    assert!(!conn.has_file_mapping());
    assert_eq!(conn.write().unwrap(), WriteStatus::Close);

    let page = StatusCode::BadRequest.error_page().unwrap();
    let expected = response_head("400 Bad Request", page.len(), "close") + page;
    assert_eq!(socket.take_output(), expected.as_bytes());
}

#[test]
fn test_unreadable_file_is_403() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("private.txt");
    std::fs::write(&path, b"secret").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
    let (ctx, _readiness) = context(root.path());
    let (mut conn, socket) = connect(&ctx, 21);

    socket.push(b"GET /private.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
    conn.read().unwrap();

    assert_eq!(
        conn.process().unwrap(),
        Progress::ResponseReady(StatusCode::Forbidden)
    );
    assert_eq!(conn.write().unwrap(), WriteStatus::KeepAlive);

    let page = StatusCode::Forbidden.error_page().unwrap();
    let expected = response_head("403 Forbidden", page.len(), "keep-alive") + page;
    assert_eq!(socket.take_output(), expected.as_bytes());
}
