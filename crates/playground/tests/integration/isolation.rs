//! Jailed workers
//!
//! These need unprivileged user namespaces. On hosts without them every
//! jailed worker fails to start, and the tests return early.

use std::fs;
use std::path::Path;
use std::time::Duration;

use playground::{Config, Engine, Submission};

use super::shell_config;

fn jailed_config() -> Config {
    let mut config = shell_config();
    config.security.isolation = true;
    config.security.network_namespace = true;
    config
}

async fn jailed_engine() -> Option<Engine> {
    let engine = Engine::new(jailed_config()).expect("Failed to create engine");
    let submission = Submission::classes(["echo ok"]).build().unwrap();
    let result = engine.run(&submission).await;
    if result.executed {
        Some(engine)
    } else {
        eprintln!("skipping: jailed workers unavailable here: {result:?}");
        None
    }
}

fn host_has_process_with(needle: &str) -> bool {
    let Ok(entries) = fs::read_dir("/proc") else {
        return false;
    };
    entries.flatten().any(|entry| {
        fs::read(entry.path().join("cmdline"))
            .map(|cmdline| {
                let cmdline = String::from_utf8_lossy(&cmdline).replace('\0', " ");
                cmdline.contains(needle)
            })
            .unwrap_or(false)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guest_cannot_read_other_workspaces() {
    let Some(engine) = jailed_engine().await else {
        return;
    };
    let victim = Submission::classes(["# SECRET_OF_VICTIM\nsleep 2; echo victim"])
        .timeout_ms(5000)
        .build()
        .unwrap();
    let attacker = Submission::classes([
        "sleep 0.5\n\
         cat ../../playground-*/src/* 2>/dev/null || true\n\
         cat ../../playground-*/out/*/* 2>/dev/null | grep -v attacker || true\n\
         echo attacker done",
    ])
    .timeout_ms(5000)
    .build()
    .unwrap();

    let results = engine.run_all(vec![victim, attacker]).await;

    assert!(results[0].executed, "{:?}", results[0]);
    let attacker = &results[1];
    assert!(attacker.executed, "{attacker:?}");
    assert!(attacker.output.contains("attacker done"), "{attacker:?}");
    assert!(!attacker.output.contains("SECRET_OF_VICTIM"), "{attacker:?}");
}

#[tokio::test]
async fn test_guest_writes_only_inside_run_dir() {
    let Some(engine) = jailed_engine().await else {
        return;
    };
    let host_file = std::env::temp_dir().join(format!("playground-escape-{}", std::process::id()));
    let program = format!(
        "echo leaked > {host} 2>/dev/null || echo host write refused\n\
         echo kept > ./scratch && cat ./scratch\n\
         head -n 1 /etc/passwd 2>/dev/null || echo no passwd",
        host = host_file.display()
    );
    let submission = Submission::classes([program]).build().unwrap();

    let result = engine.run(&submission).await;

    assert!(result.executed, "{result:?}");
    assert!(result.output.contains("host write refused"), "{result:?}");
    assert!(result.output.contains("kept"), "{result:?}");
    assert!(result.output.contains("no passwd"), "{result:?}");
    assert!(!result.output.contains("root:"), "{result:?}");
    assert!(!Path::new(&host_file).exists());
}

#[tokio::test]
async fn test_detached_descendants_die_with_worker() {
    let Some(engine) = jailed_engine().await else {
        return;
    };
    let lingering = format!("sleep 300.{}", std::process::id());
    let program = format!("setsid {lingering} &\necho spawned\nwhile :; do :; done");
    let submission = Submission::classes([program])
        .timeout_ms(300)
        .build()
        .unwrap();

    let result = engine.run(&submission).await;

    assert!(result.timed_out, "{result:?}");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!host_has_process_with(&lingering));
}
