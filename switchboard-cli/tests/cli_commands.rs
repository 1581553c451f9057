use std::path::Path;
use std::process::{Command, Output};

fn switchboard(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_switchboard"))
        .arg("--config-dir")
        .arg(config_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .env("SWITCHBOARD_LOG_LEVEL", "warn")
        .env("SWITCHBOARD_LOG_DIR", config_dir.join("logs"))
        .output()
        .expect("failed to run switchboard")
}

#[test]
fn send_prints_the_echoed_reply() {
    let dir = tempfile::tempdir().unwrap();
    let output = switchboard(dir.path(), &["send", "--message", "hello bus"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("hello bus"), "stdout: {}", stdout);
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();

    assert!(switchboard(dir.path(), &["init"]).status.success());
    assert!(dir.path().join("config.json").exists());

    assert!(!switchboard(dir.path(), &["init"]).status.success());
    assert!(switchboard(dir.path(), &["init", "--force"]).status.success());
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"bus": {"dispatch_interval_ms": 0}}"#,
    )
    .unwrap();

    let output = switchboard(dir.path(), &["status"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("dispatch_interval_ms"));
}

#[cfg(unix)]
#[test]
fn gateway_stops_on_interrupt_while_stdin_stays_open() {
    use std::io::{BufRead, BufReader, Write};
    use std::process::Stdio;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_switchboard"))
        .arg("--config-dir")
        .arg(dir.path())
        .arg("gateway")
        .env_remove("RUST_LOG")
        .env("SWITCHBOARD_LOG_LEVEL", "info")
        .env("SWITCHBOARD_LOG_DIR", dir.path().join("logs"))
        .env("SWITCHBOARD__BUS__DISPATCH_INTERVAL_MS", "50")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start gateway");

    let mut stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut lines = Vec::new();
    let wait_for = |expected: &str, lines: &mut Vec<String>| {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) => {
                    let found = line.contains(expected);
                    lines.push(line);
                    if found {
                        return;
                    }
                }
                Err(_) => panic!("no {:?} on stdout, got {:?}", expected, lines),
            }
        }
    };

    wait_for("Gateway is running", &mut lines);
    writeln!(stdin, "ping from the console").unwrap();
    stdin.flush().unwrap();
    wait_for("ping from the console", &mut lines);

    // Let the gateway reach its interrupt wait before signalling
    std::thread::sleep(Duration::from_millis(300));
    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("gateway still running after interrupt");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    drop(stdin);

    assert!(status.success(), "gateway exited with {:?}", status);
    wait_for("Gateway stopped", &mut lines);
    assert!(
        lines.iter().all(|line| !line.contains(" INFO ")),
        "log lines on stdout: {:?}",
        lines
    );
}
