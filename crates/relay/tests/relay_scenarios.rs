//! End-to-end relay tests against small `sh` child processes.

#![cfg(unix)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nx_domain::config::RelayConfig;
use nx_relay::{ProtocolRelay, RelayError, RelayIo, RelaySignal};
use tokio::sync::mpsc;

struct Captured {
    exit_code: i32,
    signalled: Option<RelaySignal>,
    stdout: String,
    stderr: String,
}

async fn relay_sh(script: &str, input: &[u8], config: &RelayConfig) -> Captured {
    let (_tx, rx) = mpsc::channel(1);
    relay_sh_with_signals(script, input, config, rx).await
}

async fn relay_sh_with_signals(
    script: &str,
    input: &[u8],
    config: &RelayConfig,
    signals: mpsc::Receiver<RelaySignal>,
) -> Captured {
    let relay = ProtocolRelay::spawn(
        "sh",
        &["-c".to_string(), script.to_string()],
        &HashMap::new(),
        config,
    )
    .expect("sh should spawn");

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = relay
        .run(
            RelayIo {
                stdin: input,
                stdout: &mut stdout,
                stderr: &mut stderr,
            },
            signals,
        )
        .await
        .expect("relay should run");

    Captured {
        exit_code: exit.exit_code,
        signalled: exit.signalled,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[tokio::test]
async fn mixed_stdout_is_separated() {
    let script = r#"
printf '%s\n' '{"jsonrpc":"2.0","result":{}}'
printf '%s\n' 'hello world'
printf '%s\n' '{"foo":"bar"}'
"#;
    let out = relay_sh(script, b"", &RelayConfig::default()).await;

    assert_eq!(out.stdout, "{\"jsonrpc\":\"2.0\",\"result\":{}}\n");
    assert!(out.stderr.contains("[NON-PARSEABLE] hello world\n"));
    assert!(out.stderr.contains("[NON-PROTOCOL] {\"foo\":\"bar\"}\n"));
    assert!(!out.stdout.contains("hello world"));
    assert_eq!(out.exit_code, 0);
}

#[tokio::test]
async fn line_written_in_two_pieces_is_forwarded_once() {
    let script = r#"
printf '{"jsonrpc":"2.0",'
sleep 0.1
printf '"method":"notify"}\n'
"#;
    let out = relay_sh(script, b"", &RelayConfig::default()).await;
    assert_eq!(out.stdout, "{\"jsonrpc\":\"2.0\",\"method\":\"notify\"}\n");
    assert!(out.stderr.is_empty());
}

#[tokio::test]
async fn stdin_is_forwarded_to_child() {
    let request = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
    let out = relay_sh("cat", request, &RelayConfig::default()).await;
    assert_eq!(out.stdout.as_bytes(), request);
}

#[tokio::test]
async fn child_stderr_passes_through_untagged() {
    let out = relay_sh("echo 'boot: loading' >&2", b"", &RelayConfig::default()).await;
    assert_eq!(out.stderr, "boot: loading\n");
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn exit_code_is_mirrored() {
    let out = relay_sh("exit 3", b"", &RelayConfig::default()).await;
    assert_eq!(out.exit_code, 3);
}

#[tokio::test]
async fn mode_variable_is_set_on_child() {
    let config = RelayConfig {
        mode_var: "NX_TEST_MODE".into(),
        mode_value: "stdio".into(),
        ..RelayConfig::default()
    };
    let script = r#"printf '{"result":"%s"}\n' "$NX_TEST_MODE""#;
    let out = relay_sh(script, b"", &config).await;
    assert_eq!(out.stdout, "{\"result\":\"stdio\"}\n");
}

#[tokio::test]
async fn missing_executable_fails_to_spawn() {
    let err = ProtocolRelay::spawn(
        "/definitely/not/a/real/binary",
        &[],
        &HashMap::new(),
        &RelayConfig::default(),
    )
    .err()
    .expect("spawn must fail");
    assert!(matches!(err, RelayError::Spawn { .. }));
    assert_eq!(err.exit_code(), 127);
}

#[tokio::test]
async fn terminate_is_forwarded_to_child() {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(RelaySignal::Terminate).await;
    });

    let script = "trap 'exit 7' TERM; while :; do sleep 0.05; done";
    let out = relay_sh_with_signals(script, b"", &RelayConfig::default(), rx).await;

    assert_eq!(out.exit_code, 7);
    assert_eq!(out.signalled, Some(RelaySignal::Terminate));
}

#[tokio::test]
async fn interrupt_is_forwarded_to_child() {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(RelaySignal::Interrupt).await;
    });

    let script = "trap 'echo interrupted >&2; exit 9' INT; while :; do sleep 0.05; done";
    let out = relay_sh_with_signals(script, b"", &RelayConfig::default(), rx).await;

    assert_eq!(out.exit_code, 9);
    assert_eq!(out.signalled, Some(RelaySignal::Interrupt));
    assert!(out.stderr.contains("interrupted"));
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn child_ignoring_signal_is_killed_after_grace() {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(RelaySignal::Interrupt).await;
    });

    let config = RelayConfig {
        shutdown_grace_ms: 200,
        ..RelayConfig::default()
    };
    let started = Instant::now();
    let out = relay_sh_with_signals("trap '' INT; exec sleep 10", b"", &config, rx).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    // Killed by a signal: no exit code, mirrored as 0.
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.signalled, Some(RelaySignal::Interrupt));
}
