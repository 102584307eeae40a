use std::fs;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_should_exit_with_failure_when_interrupted_at_a_prompt() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("a.py"), "x = 1\n").expect("should write source");

    let mut child = Command::new(env!("CARGO_BIN_EXE_skye"))
        .arg("improve")
        .arg(dir.path())
        .env_remove("SKYE_MODEL_PATH")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("should start skye");
    // Held open so the session blocks waiting for input.
    let _stdin = child.stdin.take();
    let mut stdout = child.stdout.take().expect("stdout should be piped");

    let mut seen = String::new();
    let mut buf = [0u8; 512];
    while !seen.contains("Select number") {
        let n = stdout.read(&mut buf).expect("should read stdout");
        assert!(n > 0, "skye exited before prompting: {seen}");
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    thread::sleep(Duration::from_millis(300));

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("should run kill");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().expect("should poll child") {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("skye still running after interrupt");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(exit.code(), Some(1));

    let mut rest = String::new();
    stdout.read_to_string(&mut rest).expect("should read remaining output");
    assert!(rest.contains("Improvement session cancelled."));
}
