use assert_cmd::Command;

#[test]
fn test_help_lists_server_options() {
    let output = Command::cargo_bin("ytconv-server")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--port", "--environment", "--static-dir", "--ffmpeg", "--yt-dlp"] {
        assert!(help.contains(flag), "missing {} in help", flag);
    }
}

#[test]
fn test_rejects_invalid_port() {
    Command::cargo_bin("ytconv-server")
        .unwrap()
        .args(["--port", "not-a-port"])
        .assert()
        .failure();
}
