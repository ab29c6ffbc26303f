//! Integration tests for whole-file pipeline runs
//!
//! Covers atomicity, no-op tolerance, write-back and known non-idempotence.

use std::fs;
use tempfile::TempDir;
use text_patcher::{
    EditStep, InsertPosition, PatternError, PatternFlags, Pipeline, PipelineError, Replacement,
    RunOptions, Step, StepOutcome, WorkspaceGuard,
};

fn write_target(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn import_step() -> Step {
    Step::new(
        "import-extra",
        EditStep::AnchoredInsert {
            anchor: "import { useParams } from 'module';".into(),
            text: "import { useExtra } from 'other';".into(),
            position: InsertPosition::After,
            separator: "\n".into(),
        },
    )
}

#[test]
fn test_run_writes_transformed_buffer() {
    let dir = TempDir::new().unwrap();
    let target = write_target(
        &dir,
        "page.tsx",
        "const [flag, setFlag] = useState(false);\n\nfunction go() {\n  doSomething(flag);\n}\n",
    );

    let pipeline = Pipeline::new(
        "flag",
        &[
            Step::new(
                "drop-flag-state",
                EditStep::PatternDelete {
                    pattern: r"const \[flag, setFlag\] = useState\(false\);\n".into(),
                    flags: PatternFlags::default(),
                },
            ),
            Step::new(
                "call-without-flag",
                EditStep::PatternSubstitute {
                    pattern: r"doSomething\(flag\)".into(),
                    replacement: Replacement::Fixed("doSomething()".into()),
                    flags: PatternFlags::default(),
                },
            ),
        ],
    )
    .unwrap();

    let report = pipeline.run(&target, &RunOptions::default()).unwrap();

    assert!(report.written);
    assert!(report.changed());
    assert_eq!(report.applied_count(), 2);

    let content = fs::read_to_string(&target).unwrap();
    assert!(!content.contains("flag"));
    assert_eq!(content.matches("doSomething()").count(), 1);
    assert_eq!(content, "\nfunction go() {\n  doSomething();\n}\n");
}

#[test]
fn test_invalid_pattern_aborts_before_io() {
    let steps = [
        import_step(),
        Step::new(
            "broken",
            EditStep::PatternDelete {
                pattern: r"const \[unbalanced".into(),
                flags: PatternFlags::default(),
            },
        ),
    ];

    let err = Pipeline::new("broken", &steps).unwrap_err();
    assert!(matches!(err, PatternError::Syntax { ref step_id, .. } if step_id == "broken"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();

    let err = pipeline
        .run(dir.path().join("missing.tsx"), &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(!dir.path().join("missing.tsx").exists());
}

#[test]
fn test_missing_file_with_guard_is_io_error() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();
    let options = RunOptions {
        dry_run: false,
        guard: Some(WorkspaceGuard::new(dir.path()).unwrap()),
    };

    let err = pipeline.run("missing.tsx", &options).unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
}

#[test]
fn test_non_utf8_target_is_left_untouched() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("binary.tsx");
    let bytes = vec![0x69, 0x6d, 0xff, 0xfe, 0x70];
    fs::write(&target, &bytes).unwrap();

    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();
    let err = pipeline.run(&target, &RunOptions::default()).unwrap_err();

    assert!(matches!(err, PipelineError::Io { .. }));
    assert_eq!(fs::read(&target).unwrap(), bytes);
}

#[test]
fn test_guard_rejection_leaves_file_identical() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("workspace");
    fs::create_dir_all(&workspace).unwrap();
    let outside = root.path().join("outside.tsx");
    let original = "import { useParams } from 'module';\n";
    fs::write(&outside, original).unwrap();

    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();
    let options = RunOptions {
        dry_run: false,
        guard: Some(WorkspaceGuard::new(&workspace).unwrap()),
    };

    let err = pipeline.run(&outside, &options).unwrap_err();
    assert!(matches!(err, PipelineError::Safety(_)));
    assert_eq!(fs::read_to_string(&outside).unwrap(), original);
}

#[test]
fn test_all_noop_run_still_completes_and_writes() {
    let dir = TempDir::new().unwrap();
    let original = "nothing to see here\n";
    let target = write_target(&dir, "page.tsx", original);

    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();
    let report = pipeline.run(&target, &RunOptions::default()).unwrap();

    assert!(report.written);
    assert!(!report.changed());
    assert_eq!(report.steps[0].outcome, StepOutcome::NoMatch);
    assert_eq!(fs::read_to_string(&target).unwrap(), original);
}

#[test]
fn test_dry_run_does_not_write() {
    let dir = TempDir::new().unwrap();
    let original = "import { useParams } from 'module';\n";
    let target = write_target(&dir, "page.tsx", original);

    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();
    let options = RunOptions {
        dry_run: true,
        guard: None,
    };
    let report = pipeline.run(&target, &options).unwrap();

    assert!(!report.written);
    assert!(report.changed());
    assert!(report.transformed.contains("useExtra"));
    assert_eq!(fs::read_to_string(&target).unwrap(), original);
}

#[test]
fn test_anchored_insert_twice_duplicates() {
    let dir = TempDir::new().unwrap();
    let target = write_target(&dir, "page.tsx", "import { useParams } from 'module';\n");
    let pipeline = Pipeline::new("p", &[import_step()]).unwrap();

    pipeline.run(&target, &RunOptions::default()).unwrap();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "import { useParams } from 'module';\nimport { useExtra } from 'other';\n"
    );

    pipeline.run(&target, &RunOptions::default()).unwrap();
    let content = fs::read_to_string(&target).unwrap();
    assert_eq!(content.matches("import { useExtra } from 'other';").count(), 2);
    assert!(content.starts_with("import { useParams } from 'module';\n"));
}

#[test]
fn test_guarded_insert_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let target = write_target(&dir, "page.tsx", "import { useParams } from 'module';\n");
    let step = import_step().unless_present("import { useExtra } from 'other';");
    let pipeline = Pipeline::new("p", &[step]).unwrap();

    pipeline.run(&target, &RunOptions::default()).unwrap();
    let second = pipeline.run(&target, &RunOptions::default()).unwrap();

    assert_eq!(second.steps[0].outcome, StepOutcome::Guarded);
    let content = fs::read_to_string(&target).unwrap();
    assert_eq!(content.matches("useExtra").count(), 1);
}

#[test]
fn test_bounded_delete_stops_at_first_closing_anchor() {
    let dir = TempDir::new().unwrap();
    let target = write_target(
        &dir,
        "page.tsx",
        "  // Save draft\n  const handleSave = async () => {\n    if (x) {\n      go();\n    }\n  };\n\n  const handleSend = async () => {\n    send();\n  };\n\n",
    );

    let pipeline = Pipeline::new(
        "p",
        &[Step::new(
            "drop-save",
            EditStep::PatternDelete {
                pattern: r"  // Save draft\n  const handleSave = async \(\) => \{.*?\n  \};\n\n".into(),
                flags: PatternFlags {
                    dot_all: true,
                    ..PatternFlags::default()
                },
            },
        )],
    )
    .unwrap();

    pipeline.run(&target, &RunOptions::default()).unwrap();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "  const handleSend = async () => {\n    send();\n  };\n\n"
    );
}

#[test]
fn test_crlf_and_bom_survive_untouched_regions() {
    let dir = TempDir::new().unwrap();
    let target = write_target(&dir, "page.tsx", "\u{feff}first\r\nsecond\r\n");

    let pipeline = Pipeline::new(
        "p",
        &[Step::new(
            "rename",
            EditStep::LiteralSwap {
                find: "second".into(),
                replace: "2nd".into(),
            },
        )],
    )
    .unwrap();

    pipeline.run(&target, &RunOptions::default()).unwrap();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "\u{feff}first\r\n2nd\r\n"
    );
}
