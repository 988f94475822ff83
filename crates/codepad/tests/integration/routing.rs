use std::time::Duration;

use codepad::config::{Config, LanguageDescriptor};
use codepad::environment::{EnvironmentState, LiveOutcome};
use codepad::runner::{RunError, RunOutcome};
use codepad::sandbox::{ResourceStore, RuntimeErrorEvent};
use codepad::services::{CompileServiceError, JudgeError};
use codepad::types::{ExecutionStrategy, Framework, JudgeStatus};

use super::Harness;
use super::fakes::{FAILING_SOURCE, FakeHost};

fn python() -> LanguageDescriptor {
    Config::default().descriptor("python3").unwrap()
}

fn react() -> LanguageDescriptor {
    Config::default().descriptor("react").unwrap()
}

fn react_live() -> LanguageDescriptor {
    LanguageDescriptor::new(
        "react-live",
        ExecutionStrategy::LiveEnvironment {
            framework: Framework::React,
        },
    )
}

#[tokio::test]
async fn test_remote_result_is_published() {
    let h = Harness::new();
    h.router.select_language(python());

    let outcome = h.router.run("hello\n").await.unwrap();
    let RunOutcome::Executed(result) = outcome else {
        panic!("expected an executed result, got {outcome:?}");
    };
    assert_eq!(result.stdout.as_deref(), Some("hello\n"));
    assert_eq!(h.output.snapshot(), "hello\n");
    assert!(!h.router.is_running());
    assert_eq!(h.judge.submissions(), 1);
}

#[tokio::test]
async fn test_remote_failure_shows_error_and_synthetic_result() {
    let h = Harness::new();
    h.router.select_language(python());

    let result = h.router.run(FAILING_SOURCE).await;
    assert!(matches!(
        result,
        Err(RunError::Judge(JudgeError::Status { status: 503, .. }))
    ));
    assert_eq!(
        h.output.snapshot(),
        "Error: judge responded with HTTP 503: busy"
    );

    let synthetic = h.router.artifacts().result.unwrap();
    assert_eq!(synthetic.status.id, JudgeStatus::INTERNAL_ERROR);
    assert_eq!(
        synthetic.stderr.as_deref(),
        Some("judge responded with HTTP 503: busy")
    );
    // Never retried
    assert_eq!(h.judge.submissions(), 1);
}

#[tokio::test]
async fn test_stale_remote_completion_is_discarded() {
    let h = Harness::new();
    h.router.select_language(python());
    h.judge.delay_next(Duration::from_millis(200));

    let (first, second) = tokio::join!(h.router.run("first"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.router.run("second").await
    });

    assert_eq!(first.unwrap(), RunOutcome::Superseded);
    assert!(matches!(second.unwrap(), RunOutcome::Executed(_)));
    assert_eq!(h.output.snapshot(), "second");
    assert_eq!(
        h.router.artifacts().result.unwrap().stdout.as_deref(),
        Some("second")
    );
    assert!(!h.router.is_running());
}

#[tokio::test]
async fn test_language_change_discards_pending_run() {
    let h = Harness::new();
    h.router.select_language(python());
    h.judge.delay_next(Duration::from_millis(100));

    let (pending, ()) = tokio::join!(h.router.run("print(1)"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.router.is_running());
        h.router.select_language(react());
    });

    assert_eq!(pending.unwrap(), RunOutcome::Superseded);
    assert_eq!(h.output.snapshot(), "");
    assert!(h.router.artifacts().result.is_none());
    assert!(!h.router.is_running());
    assert_eq!(h.router.descriptor().unwrap().id, "react");
}

#[tokio::test]
async fn test_static_compile_renders_preview() {
    let h = Harness::new();
    h.router.select_language(react());

    let outcome = h.router.run("<App />").await.unwrap();
    let RunOutcome::Rendered { handle } = outcome else {
        panic!("expected a rendered preview, got {outcome:?}");
    };
    assert_eq!(h.output.snapshot(), "✓ Rendered Successfully");
    assert_eq!(h.surface.address().as_deref(), Some(handle.url()));

    let document = h.router.artifacts().preview.unwrap();
    assert_eq!(h.store.resolve(handle.url()).as_deref(), Some(document.html()));
    assert!(document.html().contains(r#"<div id="root"></div>"#));
    assert!(document.html().contains("console.log(\"<App />\");"));
}

#[tokio::test]
async fn test_compile_failure_shows_summary_and_keeps_log() {
    let h = Harness::new();
    h.router.select_language(react());

    let result = h.router.run(FAILING_SOURCE).await;
    assert!(matches!(
        result,
        Err(RunError::Compile(CompileServiceError::Compilation(_)))
    ));
    assert_eq!(h.output.snapshot(), "❌ Error: Unexpected token (1:4)");

    let artifacts = h.router.artifacts();
    assert!(artifacts.preview.is_none());
    assert!(artifacts.compile_error.unwrap().log.contains("at parse"));
    assert!(h.surface.address().is_none());
}

#[tokio::test]
async fn test_many_runs_keep_one_live_document() {
    let h = Harness::new();
    h.router.select_language(react());

    for i in 0..10 {
        h.router.run(&format!("v{i}")).await.unwrap();
        assert!(h.store.live_count() <= 1);
    }
    assert_eq!(h.store.live_count(), 1);

    // A failed run drops the previous document too
    let _ = h.router.run(FAILING_SOURCE).await;
    assert_eq!(h.store.live_count(), 0);
}

#[tokio::test]
async fn test_stale_compile_does_not_replace_newer_preview() {
    let h = Harness::new();
    h.router.select_language(react());
    h.compiler.delay_next(Duration::from_millis(150));

    let (first, second) = tokio::join!(h.router.run("old"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.router.run("new").await
    });

    assert_eq!(first.unwrap(), RunOutcome::Superseded);
    let RunOutcome::Rendered { handle } = second.unwrap() else {
        panic!("newer run should render");
    };
    assert_eq!(h.store.live_count(), 1);
    assert!(h.store.resolve(handle.url()).unwrap().contains("\"new\""));
}

#[tokio::test]
async fn test_runtime_error_in_preview_is_trapped() {
    let h = Harness::new();
    h.router.select_language(react());
    h.router.run("<App />").await.unwrap();

    h.surface.complete_load();
    h.surface
        .raise_error(&RuntimeErrorEvent::new("x is undefined", 12, 4))
        .unwrap();
    assert_eq!(
        h.output.snapshot(),
        "❌ Runtime Error: x is undefined\nLine: 12, Column: 4"
    );
}

#[tokio::test]
async fn test_live_runs_start_then_hot_update() {
    let h = Harness::new();
    h.router.select_language(react_live());

    let started = h.router.run("export default () => 1;").await.unwrap();
    assert_eq!(
        started,
        RunOutcome::Live(LiveOutcome::Started {
            url: "http://localhost:5173/".to_owned()
        })
    );
    assert!(h.output.snapshot().contains("✓ Dev server ready at http://localhost:5173/"));

    let updated = h.router.run("export default () => 2;").await.unwrap();
    assert_eq!(
        updated,
        RunOutcome::Live(LiveOutcome::Updated {
            path: "src/App.tsx",
            rebound: false
        })
    );
    assert!(h.output.snapshot().ends_with("✓ Updated src/App.tsx\n"));
}

#[tokio::test]
async fn test_live_url_is_rebound_after_language_round_trip() {
    let h = Harness::new();
    h.router.select_language(react_live());
    h.router.run("v1").await.unwrap();

    // Leaving the language blanks the surface; the environment stays up
    h.router.select_language(python());
    assert!(!h.sandbox.is_showing("http://localhost:5173/"));

    h.router.select_language(react_live());
    let outcome = h.router.run("v2").await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Live(LiveOutcome::Updated {
            path: "src/App.tsx",
            rebound: true
        })
    );
    assert!(h.sandbox.is_showing("http://localhost:5173/"));
    assert_eq!(h.host.boots(), 1);
    assert_eq!(h.host.machine().mounts().len(), 1);
}

#[tokio::test]
async fn test_language_change_cancels_live_lifecycle() {
    let h = Harness::with_host(FakeHost::new().with_boot_delay(Duration::from_millis(100)));
    h.router.select_language(react_live());

    let (live, remote) = tokio::join!(h.router.run("export default () => 1;"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.router.select_language(python());
        h.router.run("print('hi')").await
    });

    assert_eq!(live.unwrap(), RunOutcome::Superseded);
    assert!(matches!(remote.unwrap(), RunOutcome::Executed(_)));
    assert_eq!(h.router.descriptor().unwrap().id, "python3");
    assert_eq!(h.surface.address(), None);
    assert_eq!(h.output.snapshot(), "print('hi')");
    assert_eq!(h.environment.state(), EnvironmentState::Idle);
    assert!(h.host.machine().spawns().is_empty());
}
