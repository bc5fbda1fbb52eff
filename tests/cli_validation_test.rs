//! End-to-end smoke tests of the binary's configuration validation.

use assert_cmd::Command;
use predicates::prelude::*;

fn bare_command() -> Command {
    let mut cmd = Command::cargo_bin("xfinity-usage").expect("binary builds");
    // Scrub ambient credentials so validation runs against flags only.
    for var in [
        "CLIENT_SECRET",
        "REFRESH_TOKEN",
        "ACCESS_TOKEN",
        "APPLICATION_ID",
        "MQTT_URL",
        "MQTT_USERNAME",
        "MQTT_PASSWORD",
        "PROMETHEUS_ENDPOINT",
        "QUERY",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn missing_client_secret_fails_before_any_network() {
    bare_command()
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("missing --client-secret"));
}

#[test]
fn missing_token_fails_validation() {
    bare_command()
        .args(["--client-secret", "secret"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains(
            "either --refresh-token or --access-token",
        ));
}

#[test]
fn missing_mqtt_url_fails_validation() {
    bare_command()
        .args([
            "--client-secret",
            "secret",
            "--refresh-token",
            "refrtok",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("missing --mqtt-url"));
}

#[test]
fn help_lists_mqtt_flags() {
    bare_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--mqtt-state-topic"))
        .stdout(predicate::str::contains("--prometheus-endpoint"));
}
