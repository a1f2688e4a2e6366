//! Config resolution tests.

use drover_cli::config::{locate, resolve_control, resolve_worker};

#[test]
fn explicit_flag_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(
        &path,
        "[server]\nbind = \"127.0.0.1:4321\"\n[security]\npassword = \"fleet\"\n",
    )
    .unwrap();

    assert_eq!(locate(Some(path.as_path()), "control.toml"), Some(path.clone()));
    let config = resolve_control(Some(path.as_path())).unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:4321");
    assert_eq!(config.security.password, "fleet");
}

#[test]
fn worker_flag_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker.toml");
    std::fs::write(
        &path,
        "[server]\naddress = \"10.1.1.1:1234\"\n[exec]\ntimeout_secs = 5\n",
    )
    .unwrap();

    let config = resolve_worker(Some(path.as_path())).unwrap();
    assert_eq!(config.server.address, "10.1.1.1:1234");
    assert_eq!(config.exec.timeout_secs, 5);
    assert_eq!(config.exec.max_output_bytes, 1024 * 1024);
    assert_eq!(config.security.key_bits, 2048);
}

#[test]
fn missing_flagged_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_control(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("nope.toml"));
}
