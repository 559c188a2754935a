use std::collections::HashSet;

use playground::Submission;

use super::shell_engine;

const SUBMISSIONS: usize = 32;
const REPEATS: usize = 50;

fn marker_program(marker: usize) -> String {
    format!(
        "i=0; while [ $i -lt {REPEATS} ]; do echo marker-{marker}; i=$((i + 1)); done"
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outputs_are_isolated() {
    let engine = shell_engine();
    let submissions = (0..SUBMISSIONS)
        .map(|i| Submission::classes([marker_program(i)]).build().unwrap())
        .collect();

    let results = engine.run_all(submissions).await;

    assert_eq!(results.len(), SUBMISSIONS);
    for (i, result) in results.iter().enumerate() {
        assert!(result.executed, "submission {i}: {result:?}");
        let expected = format!("marker-{i}");
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines.len(), REPEATS, "submission {i}");
        assert!(lines.iter().all(|l| *l == expected), "submission {i}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_on_cloned_engines() {
    let engine = shell_engine();
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..SUBMISSIONS {
        let engine = engine.clone();
        tasks.spawn(async move {
            let submission = Submission::classes([format!("echo task-{i}")])
                .build()
                .unwrap();
            engine.run(&submission).await.output
        });
    }

    let mut outputs = HashSet::new();
    while let Some(output) = tasks.join_next().await {
        outputs.insert(output.unwrap());
    }

    let expected: HashSet<String> = (0..SUBMISSIONS).map(|i| format!("task-{i}\n")).collect();
    assert_eq!(outputs, expected);
    assert_eq!(engine.pool().available(), engine.pool().capacity());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_does_not_disturb_neighbours() {
    let engine = shell_engine();
    let mut submissions = vec![
        Submission::classes(["while :; do :; done"])
            .timeout_ms(300)
            .build()
            .unwrap(),
    ];
    submissions.extend((0..8).map(|i| Submission::classes([format!("echo {i}")]).build().unwrap()));

    let results = engine.run_all(submissions).await;

    assert!(results[0].timed_out);
    for (i, result) in results[1..].iter().enumerate() {
        assert_eq!(result.output, format!("{i}\n"));
    }
}
