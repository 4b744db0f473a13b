use execctx::{
    CancellationToken, Command, CommandSpec, ExecError, ExitOutcome, GracefulShutdown,
    InputSource, OutputSink, ProcessSignaller, ShutdownConfig, Signal, StreamKind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn spec(program: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::builder()
        .program(program)
        .args(args)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_cancel_without_policy_kills() -> anyhow::Result<()> {
    init_tracing();
    let token = CancellationToken::new();
    let mut cmd = execctx::command(token.clone(), &spec("sleep", &["99999"]), None);

    cmd.start()?;
    token.cancel();

    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await?
        .unwrap_err();
    assert!(err.is_killed(), "unexpected error: {err}");
    assert!(err.to_string().contains("killed"));
    Ok(())
}

/// Running and not yet a zombie
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state follows the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| !rest.starts_with('Z') && !rest.starts_with('X')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_drop_while_running_kills_process() -> anyhow::Result<()> {
    init_tracing();
    let token = CancellationToken::new();
    let mut cmd = execctx::command(token.clone(), &spec("sleep", &["99999"]), None);

    cmd.start()?;
    let pid = cmd.id().expect("running process has a pid");
    assert!(is_running(pid));

    drop(cmd);
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while is_running(pid) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "process {pid} survived drop"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

#[tokio::test]
async fn test_start_after_cancel_spawns_nothing() {
    init_tracing();
    let token = CancellationToken::new();
    token.cancel();

    let marker = std::env::temp_dir().join(format!("execctx-not-run-{}", std::process::id()));
    let touch = spec("touch", &[marker.to_str().unwrap()]);
    let mut cmd = execctx::command(token, &touch, None);

    assert!(matches!(cmd.start(), Err(ExecError::AlreadyCancelled)));
    assert_eq!(cmd.id(), None);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_natural_exit_skips_policy() -> anyhow::Result<()> {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let token = CancellationToken::new();
    let policy_calls = calls.clone();
    let mut cmd = execctx::command(
        token.clone(),
        &spec("true", &[]),
        Some(Box::new(move |_target: ProcessSignaller| async move {
            policy_calls.fetch_add(1, Ordering::SeqCst);
        })),
    );

    assert_eq!(cmd.run().await?, ExitOutcome::Exited(0));
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

/// The policy talks to the process before killing it: it writes to stdin,
/// closes it, and waits for the echo on stdout.
#[tokio::test]
async fn test_custom_policy_handshake() -> anyhow::Result<()> {
    init_tracing();
    let (stdin_writer, stdin_reader) = tokio::io::duplex(64);
    let (stdout_writer, mut stdout_reader) = tokio::io::duplex(64);

    let token = CancellationToken::new();
    let (handler_done_tx, handler_done) = oneshot::channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let policy_calls = calls.clone();

    let policy = move |target: ProcessSignaller| async move {
        policy_calls.fetch_add(1, Ordering::SeqCst);
        let mut stdin_writer = stdin_writer;
        stdin_writer.write_all(b"hello\n").await.unwrap();
        drop(stdin_writer);

        let mut buf = [0u8; 6];
        stdout_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
        assert!(!target.has_exited(), "process exited unexpectedly");

        target.kill().unwrap();
        let _ = handler_done_tx.send(());
    };

    let handshake = spec("/bin/sh", &["-c", "cat -; exec sleep 99999"]);
    let mut cmd = execctx::command(token.clone(), &handshake, Some(Box::new(policy)));
    cmd.command_mut().set_stdin(InputSource::new(stdin_reader));
    cmd.command_mut().set_stdout(OutputSink::new(stdout_writer));

    cmd.start()?;
    token.cancel();

    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await?
        .unwrap_err();
    assert!(err.is_killed(), "unexpected error: {err}");
    tokio::time::timeout(TEST_TIMEOUT, handler_done).await??;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_graceful_shutdown_lets_process_clean_up() -> anyhow::Result<()> {
    init_tracing();
    let token = CancellationToken::new();
    let trapping = spec(
        "/bin/sh",
        &["-c", "trap 'exit 3' TERM; while true; do sleep 0.1; done"],
    );
    let policy = GracefulShutdown::new(ShutdownConfig {
        signal: Signal::Terminate,
        grace_period_ms: 10_000,
    });
    let mut cmd = execctx::command(token.clone(), &trapping, Some(Box::new(policy)));

    cmd.start()?;
    // give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();

    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await?
        .unwrap_err();
    assert_eq!(err.exit_outcome(), Some(ExitOutcome::Exited(3)));
    Ok(())
}

#[tokio::test]
async fn test_graceful_shutdown_escalates_to_kill() -> anyhow::Result<()> {
    init_tracing();
    let token = CancellationToken::new();
    let stubborn = spec("/bin/sh", &["-c", "trap '' TERM; exec sleep 99999"]);
    let policy = GracefulShutdown::new(ShutdownConfig {
        signal: Signal::Terminate,
        grace_period_ms: 200,
    });
    let mut cmd = execctx::command(token.clone(), &stubborn, Some(Box::new(policy)));

    cmd.start()?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();

    let err = tokio::time::timeout(TEST_TIMEOUT, cmd.wait())
        .await?
        .unwrap_err();
    assert!(err.is_killed(), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn test_run_reports_spawn_failure() {
    init_tracing();
    let mut cmd = execctx::command(
        CancellationToken::new(),
        &spec("/nonexistent/execctx-missing", &[]),
        None,
    );

    match cmd.run().await {
        Err(ExecError::Spawn(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected spawn failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_combined_output() -> anyhow::Result<()> {
    init_tracing();
    let script = spec("/bin/sh", &["-c", "echo out; sleep 0.1; echo err 1>&2"]);
    let mut cmd = execctx::command(CancellationToken::new(), &script, None);

    let output = cmd.combined_output().await?;
    assert_eq!(String::from_utf8(output)?, "out\nerr\n");
    Ok(())
}

#[tokio::test]
async fn test_combined_output_rejects_bound_stream() {
    init_tracing();
    let mut cmd = execctx::command(CancellationToken::new(), &spec("true", &[]), None);
    cmd.command_mut()
        .set_stderr(OutputSink::new(tokio::io::sink()));

    for _ in 0..2 {
        assert!(matches!(
            cmd.combined_output().await,
            Err(ExecError::StreamAlreadyBound(StreamKind::Stderr))
        ));
    }
    assert_eq!(cmd.id(), None);
}

#[tokio::test]
async fn test_capture_output_returns_stdout() -> anyhow::Result<()> {
    init_tracing();
    let mut cmd = execctx::command(CancellationToken::new(), &spec("echo", &["hello"]), None);
    assert_eq!(cmd.capture_output().await?, b"hello\n".to_vec());
    Ok(())
}

#[tokio::test]
async fn test_capture_output_attaches_stderr() {
    init_tracing();
    let failing = spec("/bin/sh", &["-c", "echo partial; echo boom 1>&2; exit 2"]);
    let mut cmd = execctx::command(CancellationToken::new(), &failing, None);

    match cmd.capture_output().await {
        Err(ExecError::Exit(e)) => {
            assert_eq!(e.code(), Some(2));
            assert_eq!(e.stderr_lossy(), "boom\n");
        }
        other => panic!("expected exit error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_capture_output_truncates_large_stderr() {
    init_tracing();
    let noisy = spec(
        "/bin/sh",
        &["-c", "head -c 100000 /dev/zero | tr '\\0' a 1>&2; exit 1"],
    );
    let mut cmd = execctx::command(CancellationToken::new(), &noisy, None);

    match cmd.capture_output().await {
        Err(ExecError::Exit(e)) => {
            let skipped = 100_000 - 2 * execctx::DEFAULT_CAPTURE_LIMIT;
            let marker = format!("\n... omitting {skipped} bytes ...\n");
            assert_eq!(
                e.stderr.len(),
                2 * execctx::DEFAULT_CAPTURE_LIMIT + marker.len()
            );
            assert!(e.stderr_lossy().contains(&marker));
        }
        other => panic!("expected exit error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_describe() {
    let cmd = execctx::command(CancellationToken::new(), &spec("sleep", &["99999"]), None);
    assert_eq!(cmd.describe(), "sleep 99999");
    assert_eq!(cmd.command().describe(), "sleep 99999");
}
