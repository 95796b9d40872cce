//! File transfer against the fake console.

mod common;

use common::{Behavior, connected_session};
use serial_shell::session::CHUNK_SIZE;
use serial_shell::{Error, FileContent, TransferDirection};

fn logged_in() -> Behavior {
    Behavior {
        logged_in: true,
        ..Behavior::default()
    }
}

fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
}

#[tokio::test]
async fn test_binary_upload_in_chunks() {
    let (session, device) = connected_session(logged_in()).await;
    let data = sample_bytes(10_000);

    let report = session
        .write_binary_file("/tmp/blob.bin", &data)
        .await
        .expect("upload");

    assert_eq!(report.bytes, 10_000);
    assert_eq!(report.chunks, report.encoded_len.div_ceil(CHUNK_SIZE));
    assert_eq!(device.file("/tmp/blob.bin"), Some(data));

    let log = device.log.lock();
    assert_eq!(log.chunks, report.chunks);
    assert_eq!(log.interrupts, 1);
    assert_eq!(log.end_of_inputs, 1);
    assert!(log.lines.iter().any(|l| l == "base64 -d > /tmp/blob.bin"));
}

#[tokio::test]
async fn test_empty_upload_sends_no_chunks() {
    let (session, device) = connected_session(logged_in()).await;

    let report = session
        .write_binary_file("/tmp/empty.bin", &[])
        .await
        .expect("upload");

    assert_eq!(report.chunks, 0);
    assert_eq!(device.file("/tmp/empty.bin"), Some(Vec::new()));
}

#[tokio::test]
async fn test_stalled_upload_names_chunk() {
    let (session, _device) = connected_session(Behavior {
        stall_after_chunks: Some(2),
        ..logged_in()
    })
    .await;

    let err = session
        .write_binary_file("/tmp/blob.bin", &sample_bytes(4_000))
        .await
        .expect_err("stalled");

    match err {
        Error::Transfer {
            direction,
            chunk,
            source,
        } => {
            assert_eq!(direction, TransferDirection::Upload);
            assert_eq!(chunk, Some(2));
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_split_echo_upload_awaits_each_chunk() {
    let (session, device) = connected_session(Behavior {
        split_echo: true,
        ..logged_in()
    })
    .await;
    let data = sample_bytes(10_000);

    let report = session
        .write_binary_file("/tmp/blob.bin", &data)
        .await
        .expect("upload");

    assert_eq!(report.chunks, report.encoded_len.div_ceil(CHUNK_SIZE));
    assert_eq!(device.file("/tmp/blob.bin"), Some(data));
    assert_eq!(device.log.lock().chunks, report.chunks);
}

#[tokio::test]
async fn test_split_echo_stall_names_first_silent_chunk() {
    for stall_after in [0, 2] {
        let (session, device) = connected_session(Behavior {
            split_echo: true,
            stall_after_chunks: Some(stall_after),
            ..logged_in()
        })
        .await;

        let err = session
            .write_binary_file("/tmp/blob.bin", &sample_bytes(4_000))
            .await
            .expect_err("stalled");

        match err {
            Error::Transfer {
                direction: TransferDirection::Upload,
                chunk,
                source,
            } => {
                assert_eq!(chunk, Some(stall_after), "stall after {stall_after}");
                assert!(source.is_timeout());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Nothing is sent past the chunk that went unanswered
        assert_eq!(device.log.lock().chunks, stall_after + 1);
    }
}

#[tokio::test]
async fn test_download_text_and_binary() {
    let (session, device) = connected_session(logged_in()).await;
    let script = "#!/usr/bin/env python3\nprint('hello')\n".repeat(20);
    let image = sample_bytes(3_000);
    device.put_file("/home/pi/run.py", script.as_bytes());
    device.put_file("/home/pi/image.png", &image);

    match session.read_file("/home/pi/run.py").await.expect("text") {
        FileContent::Text(text) => assert_eq!(text, script),
        other => panic!("expected text, got {other:?}"),
    }

    let binary = session.read_file("/home/pi/image.png").await.expect("binary");
    assert!(matches!(binary, FileContent::Binary(_)));
    assert_eq!(binary.into_bytes(), image);
}

#[tokio::test]
async fn test_download_missing_file_fails() {
    let (session, _device) = connected_session(logged_in()).await;

    let err = session
        .read_file("/home/pi/missing.bin")
        .await
        .expect_err("missing");

    assert!(matches!(
        err,
        Error::Transfer {
            direction: TransferDirection::Download,
            chunk: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_write_then_append_text() {
    let (session, device) = connected_session(logged_in()).await;

    session
        .write_text_file("/tmp/log.txt", "line one")
        .await
        .expect("write");
    session
        .append_text_file("/tmp/log.txt", "line two\n")
        .await
        .expect("append");

    assert_eq!(
        device.file("/tmp/log.txt").as_deref(),
        Some(b"line one\nline two\n".as_slice())
    );

    match session.read_file("/tmp/log.txt").await.expect("read back") {
        FileContent::Text(text) => assert_eq!(text, "line one\nline two\n"),
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heredoc_marker_in_content_rejected() {
    let (session, device) = connected_session(logged_in()).await;

    let err = session
        .write_text_file("/tmp/a.txt", "first\nEOL\nlast\n")
        .await
        .expect_err("marker");

    match err {
        Error::Transfer { source, .. } => {
            assert!(matches!(*source, Error::InvalidArgument { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(device.lines().is_empty());
}

#[tokio::test]
async fn test_empty_path_rejected() {
    let (session, _device) = connected_session(logged_in()).await;

    assert!(matches!(
        session.read_file("").await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        session.write_binary_file("", b"x").await,
        Err(Error::InvalidArgument { .. })
    ));
}
