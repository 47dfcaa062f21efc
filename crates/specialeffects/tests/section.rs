use std::sync::Arc;
use std::time::Duration;

use specialeffects::{Effect, Error, LightEffect, PlayContext, Repeat, Section};
use specialeffects_testing::{step, EventLog};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn arc(effect: impl Effect + 'static) -> Arc<dyn Effect> {
    Arc::new(effect)
}

fn failing(target: &'static str) -> LightEffect {
    LightEffect::new(move || async move { Err::<(), _>(Error::TargetNotFound(target.to_string())) })
}

#[tokio::test(start_paused = true)]
async fn sequential_repeat_runs_children_in_order_without_interleaving() {
    let log = EventLog::new();
    let section = Section::new(vec![
        arc(step(&log, "a", ms(10))),
        arc(step(&log, "b", ms(10))),
    ])
    .with_repeat(Repeat::times(3).unwrap());

    section.run(&PlayContext::default()).await.unwrap();

    let pass = ["a:start", "a:end", "b:start", "b:end"];
    let expected: Vec<String> = pass.iter().cycle().take(12).map(|s| s.to_string()).collect();
    assert_eq!(log.entries(), expected);
}

#[tokio::test(start_paused = true)]
async fn parallel_children_all_start_before_any_finishes() {
    let log = EventLog::new();
    let section = Section::new(vec![
        arc(step(&log, "a", ms(30))),
        arc(step(&log, "b", ms(10))),
        arc(step(&log, "c", ms(20))),
    ])
    .with_parallel(true);

    section.run(&PlayContext::default()).await.unwrap();

    let entries = log.entries();
    assert_eq!(entries.len(), 6, "run returned before every child finished");
    assert!(entries[..3].iter().all(|e| e.ends_with(":start")));
    assert_eq!(&entries[3..], ["b:end", "c:end", "a:end"]);
}

#[tokio::test(start_paused = true)]
async fn parallel_pass_takes_as_long_as_its_slowest_child() {
    let log = EventLog::new();
    let section = Section::new(vec![
        arc(step(&log, "slow", ms(500))),
        arc(step(&log, "fast", ms(100))),
    ])
    .with_parallel(true)
    .with_repeat(Repeat::times(2).unwrap());

    let begin = tokio::time::Instant::now();
    section.run(&PlayContext::default()).await.unwrap();

    assert!(begin.elapsed() >= ms(1000));
    assert_eq!(log.count("fast:start"), 2);
    // The second pass only starts once the slow child of the first finished.
    let first_slow_end = log.position("slow:end").unwrap();
    let starts: Vec<usize> = log
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| *e == "fast:start")
        .map(|(i, _)| i)
        .collect();
    assert!(starts[1] > first_slow_end);
}

#[tokio::test(start_paused = true)]
async fn unbounded_child_runs_in_the_background() {
    let log = EventLog::new();
    let strobe = Section::new(vec![arc(step(&log, "strobe", ms(100)))])
        .with_name(Some("strobe".into()))
        .with_repeat(Repeat::Forever);
    let parent = Section::new(vec![arc(strobe), arc(step(&log, "after", ms(10)))]);

    let ctx = PlayContext::default();
    parent.run(&ctx).await.unwrap();

    assert_eq!(ctx.tasks().len(), 1);
    let strobe_start = log.position("strobe:start").unwrap();
    let after_start = log.position("after:start").unwrap();
    assert!(strobe_start < after_start, "background section did not begin first");

    tokio::time::sleep(ms(1000)).await;
    assert!(log.count("strobe:start") >= 10);

    ctx.tasks().cancel_all();
    let before = log.len();
    tokio::time::sleep(ms(1000)).await;
    assert!(log.len() <= before + 1);
}

#[tokio::test(start_paused = true)]
async fn unbounded_child_of_a_parallel_section_is_backgrounded_too() {
    let log = EventLog::new();
    let forever = Section::new(vec![arc(step(&log, "loop", ms(50)))]).with_repeat(Repeat::Forever);
    let parent = Section::new(vec![arc(forever), arc(step(&log, "once", ms(10)))])
        .with_parallel(true);

    let ctx = PlayContext::default();
    tokio::time::timeout(ms(100), parent.run(&ctx))
        .await
        .expect("parallel parent waited on an unbounded child")
        .unwrap();
    assert_eq!(ctx.tasks().len(), 1);
    ctx.tasks().cancel_all();
}

#[tokio::test(start_paused = true)]
async fn sequential_failure_skips_the_remaining_children() {
    let log = EventLog::new();
    let section = Section::new(vec![
        arc(step(&log, "first", ms(10))),
        arc(failing("attic")),
        arc(step(&log, "never", ms(10))),
    ]);

    let err = section.run(&PlayContext::default()).await.unwrap_err();
    assert!(matches!(err, Error::TargetNotFound(name) if name == "attic"));
    assert_eq!(log.count("never:start"), 0);
    assert_eq!(log.count("first:end"), 1);
}

#[tokio::test(start_paused = true)]
async fn parallel_failure_waits_for_siblings() {
    let log = EventLog::new();
    let section = Section::new(vec![
        arc(failing("attic")),
        arc(step(&log, "slow", ms(200))),
    ])
    .with_parallel(true);

    let err = section.run(&PlayContext::default()).await.unwrap_err();
    assert!(matches!(err, Error::TargetNotFound(_)));
    assert_eq!(log.count("slow:end"), 1);
}

#[tokio::test(start_paused = true)]
async fn parallel_failures_are_reported_together() {
    let section = Section::new(vec![
        arc(failing("attic")),
        arc(LightEffect::delay(ms(10))),
        arc(failing("cellar")),
    ])
    .with_parallel(true);

    let err = section.run(&PlayContext::default()).await.unwrap_err();
    let Error::FanOut(failures) = err else {
        panic!("expected a fan-out error");
    };
    let names: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        names,
        ["light or group 'attic' not found", "light or group 'cellar' not found"]
    );
}

#[tokio::test]
async fn empty_sections_complete() {
    Section::new(Vec::new())
        .with_parallel(true)
        .run(&PlayContext::default())
        .await
        .unwrap();
    Section::new(Vec::new())
        .with_repeat(Repeat::times(5).unwrap())
        .run(&PlayContext::default())
        .await
        .unwrap();
}
