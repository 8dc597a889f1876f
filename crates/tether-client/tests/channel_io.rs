//! Transport-level tests for the stdio channel.
//!
//! These run the real line framing over an in-memory duplex pipe: outbound
//! request lines, the bounded reply wait (with the clock paused), the prefix
//! check and the line length cap.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tether_client::channel::{
    ChannelError, Command, InboundLine, RESPONSE_TIMEOUT, StdioChannel, spawn_line_reader,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
use tokio::sync::mpsc;

#[tokio::test]
async fn exchange_round_trip() {
    let (client_out, controller_in) = duplex(64 * 1024);
    let (tx, rx) = mpsc::channel(4);

    let reply_frame = [0x02u8, 0x01, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    tx.send(InboundLine::Line(format!("/resp:read:{}", BASE64.encode(reply_frame))))
        .await
        .expect("queue reply");

    let mut channel = StdioChannel::from_parts(rx, client_out);
    let request = [0x01u8, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00];
    let reply = channel.exchange(Command::Read, &request).await.expect("exchange");
    assert_eq!(reply, reply_frame);

    let mut sent = String::new();
    BufReader::new(controller_in).read_line(&mut sent).await.expect("read request line");
    assert_eq!(sent, format!("/read:{}\r\n", BASE64.encode(request)));
}

#[tokio::test(start_paused = true)]
async fn receive_times_out_after_bound() {
    let (client_out, _controller_in) = duplex(1024);
    let (_keep_sender, rx) = mpsc::channel::<InboundLine>(1);

    let mut channel = StdioChannel::from_parts(rx, client_out);
    let started = tokio::time::Instant::now();
    let err = channel.exchange(Command::Read, &[0x01]).await.expect_err("should time out");
    assert_eq!(err, ChannelError::Timeout);
    assert!(started.elapsed() >= RESPONSE_TIMEOUT);
}

#[tokio::test]
async fn closed_stdin_is_reported() {
    let (client_out, _controller_in) = duplex(1024);
    let (tx, rx) = mpsc::channel::<InboundLine>(1);
    drop(tx);

    let mut channel = StdioChannel::from_parts(rx, client_out);
    let err = channel.exchange(Command::Read, &[0x01]).await.expect_err("should fail");
    assert_eq!(err, ChannelError::Closed);
}

#[tokio::test]
async fn reply_for_other_command_is_rejected() {
    let (client_out, _controller_in) = duplex(1024);
    let (tx, rx) = mpsc::channel(1);
    tx.send(InboundLine::Line("/resp:write:AAA=".to_owned())).await.expect("queue reply");

    let mut channel = StdioChannel::from_parts(rx, client_out);
    let err = channel.exchange(Command::Read, &[0x01]).await.expect_err("should fail");
    assert!(matches!(err, ChannelError::PrefixMismatch { .. }));
}

#[tokio::test]
async fn oversize_reply_is_rejected() {
    let (client_out, _controller_in) = duplex(1024);
    let (tx, rx) = mpsc::channel(1);
    tx.send(InboundLine::Oversize(70_000)).await.expect("queue marker");

    let mut channel = StdioChannel::from_parts(rx, client_out);
    let err = channel.exchange(Command::Read, &[0x01]).await.expect_err("should fail");
    assert_eq!(err, ChannelError::Oversize(70_000));
}

#[tokio::test]
async fn notification_lines_are_verbatim() {
    let (client_out, controller_in) = duplex(1024);
    let (_tx, rx) = mpsc::channel(1);

    let mut channel = StdioChannel::from_parts(rx, client_out);
    channel.notify_state("STATE_READY").await.expect("notify");
    channel.poll_observed().await.expect("poll");

    let mut reader = BufReader::new(controller_in);
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read state line");
    assert_eq!(line, "/stateChanged:U1RBVEVfUkVBRFk=\r\n");
    line.clear();
    reader.read_line(&mut line).await.expect("read observe line");
    assert_eq!(line, "/observe:\r\n");
}

#[tokio::test]
async fn line_reader_splits_lines_and_enforces_cap() {
    let (mut writer, reader) = duplex(1 << 20);
    let mut lines = spawn_line_reader(reader);

    writer.write_all(b"/resp:read:AQ==\r\n").await.expect("write line");
    assert_eq!(lines.recv().await, Some(InboundLine::Line("/resp:read:AQ==".to_owned())));

    // One line far past the cap, then a normal one right behind it.
    writer.write_all(&vec![b'a'; 70_000]).await.expect("write oversize");
    writer.write_all(b"\n/resp:read:Ag==\r\n").await.expect("write tail");

    let oversize = lines.recv().await;
    assert!(
        matches!(oversize, Some(InboundLine::Oversize(n)) if n >= 70_000),
        "expected oversize marker, got {oversize:?}"
    );
    assert_eq!(lines.recv().await, Some(InboundLine::Line("/resp:read:Ag==".to_owned())));

    drop(writer);
    assert_eq!(lines.recv().await, None);
}
