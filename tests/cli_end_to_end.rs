#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ap_sweep::OutcomeKind;
use common::{init_tracing, test_config};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const FAKE_OPENSTACK: &str = r#"#!/bin/sh
shift 16
case "$1 $2" in
  "domain list") echo '[{"ID": "d1", "Name": "tenant-a"}]' ;;
  "user list") echo '[{"ID": "u1", "Name": "backup-admin"}]' ;;
  "project list") echo '[{"ID": "p1", "Name": "web"}]' ;;
  "server list") echo '[{"ID": "vm-1", "Name": "web-1"}, {"ID": "vm-2", "Name": "db-1"}]' ;;
  "server show")
    if [ "$3" = "vm-2" ]; then
      echo '{"id": "vm-2", "name": "db-1", "created": "2023-01-01T00:00:00Z", "properties": {"workload_id": "w1"}}'
    else
      echo '{"id": "vm-1", "name": "web-1", "created": "2023-01-01T00:00:00Z", "properties": {}}'
    fi ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#;

fn fake_workloadmgr(log: &Path) -> String {
    format!(
        r#"#!/bin/sh
printf '%s\n' "$@" > '{}'
cat <<'EOF'
+----------+--------------------------------------+
| Property | Value                                |
+----------+--------------------------------------+
| id       | 5d3a9b0e-1c2f-4a8b-9e7d-0f1e2d3c4b5a |
+----------+--------------------------------------+
EOF
"#,
        log.display()
    )
}

#[tokio::test]
async fn test_sweep_through_cli_adapters() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("workloadmgr.args");

    let mut config = test_config(0);
    config.cloud.openstack_bin = write_script(dir.path(), "openstack", FAKE_OPENSTACK);
    config.cloud.workloadmgr_bin =
        write_script(dir.path(), "workloadmgr", &fake_workloadmgr(&log));
    config.sweep.lease_path = Some(dir.path().join("sweep.lease"));

    let report = ap_cli::run_sweep(&config, false).await.unwrap();

    assert_eq!(report.count(OutcomeKind::Enrolled), 1);
    assert_eq!(report.count(OutcomeKind::Protected), 1);
    let enrolled = report.for_instance("vm-1").next().unwrap();
    assert_eq!(
        enrolled.job_id.as_deref(),
        Some("5d3a9b0e-1c2f-4a8b-9e7d-0f1e2d3c4b5a")
    );

    let args: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let after = |flag: &str| {
        let i = args.iter().position(|a| a == flag).unwrap();
        args[i + 1].clone()
    };
    assert_eq!(after("--os-username"), "backup-admin");
    assert_eq!(after("--os-password"), "op-pass");
    assert_eq!(after("--os-tenant-id"), "p1");
    assert_eq!(after("--instance"), "instance-id=vm-1");
    assert!(args.contains(&"start_time=02:00 AM".to_string()));
    assert!(args.contains(&"interval=24hrs".to_string()));

    // Lease is released once the sweep finishes.
    assert!(!dir.path().join("sweep.lease").exists());
}

#[tokio::test]
async fn test_dry_run_never_invokes_workloadmgr() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("workloadmgr.args");

    let mut config = test_config(0);
    config.cloud.openstack_bin = write_script(dir.path(), "openstack", FAKE_OPENSTACK);
    config.cloud.workloadmgr_bin =
        write_script(dir.path(), "workloadmgr", &fake_workloadmgr(&log));

    let report = ap_cli::run_sweep(&config, true).await.unwrap();

    assert_eq!(report.count(OutcomeKind::Planned), 1);
    assert!(!log.exists());
}

#[tokio::test]
async fn test_missing_openstack_binary_aborts() {
    init_tracing();
    let mut config = test_config(0);
    config.cloud.openstack_bin = PathBuf::from("/nonexistent/openstack");

    let err = ap_cli::run_sweep(&config, false).await.unwrap_err();
    assert!(err.to_string().contains("Domain listing failed"));
}
