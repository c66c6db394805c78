//! Script execution through `skills.run`: closed-by-default policy, skill and
//! glob allow-listing, successful runs, and honest timeout reporting.
//!
//! Process-spawning tests are `#[cfg(unix)]` since they shell out to `/bin/sh`.

use skillrt::{ExecutionPolicy, RepositoryConfig, SkillRuntime, WorkdirMode};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

fn write_skill_with_script(root: &std::path::Path, name: &str, script_rel: &str, script: &str) {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("scripts")).unwrap();
    fs::write(
        dir.join("SKILL.md"),
        format!("---\nname: {name}\ndescription: d\n---\nbody\n"),
    )
    .unwrap();
    let script_path = dir.join(script_rel);
    fs::write(&script_path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
    }
}

#[test]
fn execution_disabled_by_default_rejects_every_run() {
    let root = TempDir::new().unwrap();
    write_skill_with_script(root.path(), "demo", "scripts/run.sh", "#!/bin/sh\necho hi\n");
    let runtime = SkillRuntime::new(RepositoryConfig::new(vec![root.path().to_path_buf()]));

    let resp = runtime.run("demo", "scripts/run.sh", &[], None, None);
    assert!(!resp.ok);
    assert_eq!(
        resp.meta.get("error_type"),
        Some(&serde_json::Value::String("ScriptExecutionDisabledError".to_string()))
    );
}

#[test]
fn script_outside_the_glob_allowlist_is_rejected() {
    let root = TempDir::new().unwrap();
    write_skill_with_script(root.path(), "demo", "scripts/run.sh", "#!/bin/sh\necho hi\n");

    let mut config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
    config.execution_policy = ExecutionPolicy {
        enabled: true,
        allow_skills: HashSet::from(["demo".to_string()]),
        allow_scripts_glob: vec!["scripts/*.py".to_string()],
        ..ExecutionPolicy::default()
    };
    let runtime = SkillRuntime::new(config);

    let resp = runtime.run("demo", "scripts/run.sh", &[], None, None);
    assert!(!resp.ok);
    assert_eq!(
        resp.meta.get("error_type"),
        Some(&serde_json::Value::String("PolicyViolationError".to_string()))
    );
}

#[test]
#[cfg(unix)]
fn allowlisted_script_runs_and_captures_stdout() {
    let root = TempDir::new().unwrap();
    write_skill_with_script(root.path(), "demo", "scripts/run.sh", "#!/bin/sh\necho hello-from-script\n");

    let mut config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
    config.execution_policy = ExecutionPolicy {
        enabled: true,
        allow_skills: HashSet::from(["demo".to_string()]),
        allow_scripts_glob: vec!["scripts/*.sh".to_string()],
        ..ExecutionPolicy::default()
    };
    let runtime = SkillRuntime::new(config);

    let resp = runtime.run("demo", "scripts/run.sh", &[], None, None);
    assert!(resp.ok, "{:?}", resp.content);
    assert_eq!(resp.content["stdout"], serde_json::json!("hello-from-script\n"));
    assert_eq!(resp.content["exit_code"], serde_json::json!(0));
    assert_eq!(
        resp.meta.get("sandbox_backend"),
        Some(&serde_json::Value::String("local_subprocess".to_string()))
    );
}

#[test]
#[cfg(unix)]
fn timeout_is_enforced_and_reported_honestly() {
    let root = TempDir::new().unwrap();
    write_skill_with_script(root.path(), "demo", "scripts/slow.sh", "#!/bin/sh\nsleep 5\n");

    let mut config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
    config.execution_policy = ExecutionPolicy {
        enabled: true,
        allow_skills: HashSet::from(["demo".to_string()]),
        allow_scripts_glob: vec!["scripts/*.sh".to_string()],
        ..ExecutionPolicy::default()
    };
    let runtime = SkillRuntime::new(config);

    let resp = runtime.run("demo", "scripts/slow.sh", &[], None, Some(1));
    // A timed-out run is still a successful `execution_result` envelope per
    // the runtime's contract: the timeout is reported honestly in
    // `content.exit_code`/`meta.timeout`, not raised as an error envelope.
    assert!(resp.ok, "{:?}", resp.content);
    assert_eq!(resp.content["exit_code"], serde_json::json!(-1));
    assert_eq!(resp.meta.get("timeout"), Some(&serde_json::Value::Bool(true)));
    assert!(resp.content["duration_ms"].as_u64().unwrap() >= 1000);
}

#[test]
#[cfg(unix)]
fn tempdir_workdir_mode_stages_scripts_subtree() {
    let root = TempDir::new().unwrap();
    write_skill_with_script(
        root.path(),
        "demo",
        "scripts/run.sh",
        "#!/bin/sh\ntest -f scripts/run.sh && echo staged\n",
    );

    let mut config = RepositoryConfig::new(vec![root.path().to_path_buf()]);
    config.execution_policy = ExecutionPolicy {
        enabled: true,
        allow_skills: HashSet::from(["demo".to_string()]),
        allow_scripts_glob: vec!["scripts/*.sh".to_string()],
        workdir_mode: WorkdirMode::Tempdir,
        ..ExecutionPolicy::default()
    };
    let runtime = SkillRuntime::new(config);

    let resp = runtime.run("demo", "scripts/run.sh", &[], None, None);
    assert!(resp.ok, "{:?}", resp.content);
}
