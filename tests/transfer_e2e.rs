use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tcpdrop::logger::NoopLogger;
use tcpdrop::progress::{NoopProgress, ProgressFactory, ProgressSink};
use tcpdrop::receiver::{self, ReceiverConfig};
use tcpdrop::{sender, ProgressEvent, TransferError, TransferHeader};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug)]
enum Outcome {
    Done { name: String, bytes: u64 },
    Failed { name: String, message: String },
}

struct Notify {
    name: String,
    tx: mpsc::UnboundedSender<Outcome>,
}

impl ProgressSink for Notify {
    fn update(&mut self, _event: ProgressEvent) {}

    fn finish(&mut self, total_bytes: u64, _label: &str, _elapsed: Duration) {
        let _ = self.tx.send(Outcome::Done {
            name: self.name.clone(),
            bytes: total_bytes,
        });
    }

    fn fail(&mut self, message: &str) {
        let _ = self.tx.send(Outcome::Failed {
            name: self.name.clone(),
            message: message.to_string(),
        });
    }
}

fn notify_config(base: &Path) -> (ReceiverConfig, mpsc::UnboundedReceiver<Outcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let factory: ProgressFactory = Arc::new(move |header: &TransferHeader| {
        Box::new(Notify {
            name: header.file_name().to_string(),
            tx: tx.clone(),
        }) as Box<dyn ProgressSink>
    });
    let config = ReceiverConfig::new(Some(base.join("out.bin"))).with_progress(factory);
    (config, rx)
}

async fn start_server(base: &Path) -> Result<(u16, mpsc::UnboundedReceiver<Outcome>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (config, rx) = notify_config(base);
    let task = tokio::spawn(receiver::serve(listener, config));
    Ok((port, rx, task))
}

async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<Outcome>) -> Outcome {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("receiver did not finish in time")
        .expect("receiver channel closed")
}

fn write_file(path: &Path, size: usize, seed: u8) -> Result<Vec<u8>> {
    let mut f = std::fs::File::create(path)?;
    let mut val = seed;
    let data: Vec<u8> = (0..size)
        .map(|_| {
            val = val.wrapping_mul(31).wrapping_add(7);
            val
        })
        .collect();
    f.write_all(&data)?;
    Ok(data)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_file_round_trip() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let path = src.path().join("empty.txt");
    std::fs::File::create(&path)?;

    let (port, mut rx, server) = start_server(dst.path()).await?;
    let stats = sender::send("127.0.0.1", port, &path, &mut NoopProgress, &NoopLogger).await?;
    assert_eq!(stats.bytes, 0);

    match next_outcome(&mut rx).await {
        Outcome::Done { name, bytes } => {
            assert_eq!(name, "empty.txt");
            assert_eq!(bytes, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let out = dst.path().join("received_empty.txt");
    assert_eq!(std::fs::metadata(&out)?.len(), 0);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hundred_kilobyte_round_trip_is_identical() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let path = src.path().join("payload.bin");
    let data = write_file(&path, 100_000, 3)?;

    let (port, mut rx, server) = start_server(dst.path()).await?;
    let stats = sender::send("127.0.0.1", port, &path, &mut NoopProgress, &NoopLogger).await?;
    assert_eq!(stats.bytes, 100_000);

    assert!(matches!(next_outcome(&mut rx).await, Outcome::Done { bytes: 100_000, .. }));
    let received = std::fs::read(dst.path().join("received_payload.bin"))?;
    assert_eq!(received.len(), 100_000);
    assert_eq!(received, data);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_produce_separate_files() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let path_a = src.path().join("alpha.bin");
    let path_b = src.path().join("beta.bin");
    let data_a = write_file(&path_a, 2 * 1024 * 1024 + 17, 11)?;
    let data_b = write_file(&path_b, 3 * 1024 * 1024 + 5, 97)?;

    let (port, mut rx, server) = start_server(dst.path()).await?;

    let (mut progress_a, mut progress_b) = (NoopProgress, NoopProgress);
    let (a, b) = tokio::join!(
        sender::send("127.0.0.1", port, &path_a, &mut progress_a, &NoopLogger),
        sender::send("127.0.0.1", port, &path_b, &mut progress_b, &NoopLogger),
    );
    a?;
    b?;

    let mut done = Vec::new();
    for _ in 0..2 {
        match next_outcome(&mut rx).await {
            Outcome::Done { name, .. } => done.push(name),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    done.sort();
    assert_eq!(done, vec!["alpha.bin".to_string(), "beta.bin".to_string()]);

    assert_eq!(std::fs::read(dst.path().join("received_alpha.bin"))?, data_a);
    assert_eq!(std::fs::read(dst.path().join("received_beta.bin"))?, data_b);

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn early_close_is_reported_as_truncation() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let client = tokio::spawn(async move {
        let mut s = TcpStream::connect(addr).await?;
        s.write_all(b"1000\nshort.bin\n").await?;
        s.write_all(&[7u8; 10]).await?;
        s.shutdown().await?;
        Ok::<(), std::io::Error>(())
    });

    let (stream, peer) = listener.accept().await?;
    let config = ReceiverConfig::new(Some(dst.path().join("out.bin")));
    let result = timeout(
        Duration::from_secs(10),
        receiver::handle_connection(stream, &peer.to_string(), &config),
    )
    .await
    .expect("handler hung on a closed connection");

    match result {
        Err(TransferError::Truncated { received, expected }) => {
            assert_eq!(received, 10);
            assert_eq!(expected, 1000);
        }
        other => panic!("expected truncation, got {other:?}"),
    }
    // partial output is kept
    assert_eq!(std::fs::read(dst.path().join("received_short.bin"))?, vec![7u8; 10]);

    client.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncated_peer_notifies_failure_through_serve() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let (port, mut rx, server) = start_server(dst.path()).await?;

    let mut s = TcpStream::connect(("127.0.0.1", port)).await?;
    s.write_all(b"50\ncut.bin\nabc").await?;
    drop(s);

    match next_outcome(&mut rx).await {
        Outcome::Failed { name, message } => {
            assert_eq!(name, "cut.bin");
            assert!(message.contains("3 of 50"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_peer_does_not_stop_listener() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let (port, mut rx, server) = start_server(dst.path()).await?;

    let mut bad = TcpStream::connect(("127.0.0.1", port)).await?;
    bad.write_all(b"not-a-number\nx.txt\n").await?;
    drop(bad);

    let path = src.path().join("after.txt");
    let data = write_file(&path, 4096, 5)?;
    sender::send("127.0.0.1", port, &path, &mut NoopProgress, &NoopLogger).await?;

    // the malformed header never reaches the progress stage
    match next_outcome(&mut rx).await {
        Outcome::Done { name, bytes } => {
            assert_eq!(name, "after.txt");
            assert_eq!(bytes, 4096);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(std::fs::read(dst.path().join("received_after.txt"))?, data);
    assert!(!dst.path().join("received_x.txt").exists());

    server.abort();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listen_serves_and_reports_bind_conflicts() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;

    // Pick a free port
    let port = {
        let sock = std::net::TcpListener::bind("0.0.0.0:0")?;
        let p = sock.local_addr()?.port();
        drop(sock);
        p
    };
    let (config, mut rx) = notify_config(dst.path());
    let server_task = tokio::spawn(receiver::listen(port, config));

    // Wait for the listener, then send a real file
    let path = src.path().join("via-listen.txt");
    let data = write_file(&path, 1234, 9)?;
    let mut sent = None;
    for _ in 0..50u32 {
        match sender::send("127.0.0.1", port, &path, &mut NoopProgress, &NoopLogger).await {
            Ok(stats) => {
                sent = Some(stats);
                break;
            }
            Err(TransferError::Connect { .. }) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(sent.expect("listener never came up").bytes, 1234);
    assert!(matches!(next_outcome(&mut rx).await, Outcome::Done { bytes: 1234, .. }));
    assert_eq!(std::fs::read(dst.path().join("received_via-listen.txt"))?, data);

    // Same port again: bind must fail instead of serving
    let err = receiver::listen(port, ReceiverConfig::new(None))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Bind { .. }));
    assert_eq!(err.stage(), "bind");

    server_task.abort();
    Ok(())
}
