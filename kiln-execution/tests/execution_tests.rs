//! Integration tests for executing work through the identity cache

use kiln_execution::prelude::*;
use kiln_execution::{
    BoxError, InMemoryExecutionHistory, OutputProperty, RelevantInputListener,
    RelevantInputListeners,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A compile step writing two class files into its workspace
struct CompileWork {
    identity: Identity,
    sources: FileCollection,
    runs: AtomicUsize,
}

impl CompileWork {
    fn new(source: &Path) -> Self {
        CompileWork {
            identity: Identity::from_components(&[b"compile", source.to_string_lossy().as_bytes()]),
            sources: FileCollection::of([source]),
            runs: AtomicUsize::new(0),
        }
    }

    fn execute(&self, workspace: &Path) -> Vec<PathBuf> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let classes = workspace.join("classes");
        std::fs::create_dir_all(&classes).unwrap();
        let outputs = vec![classes.join("Main.class"), classes.join("Util.class")];
        for out in &outputs {
            std::fs::write(out, "bytecode").unwrap();
        }
        std::fs::create_dir_all(workspace.join("resources")).unwrap();
        outputs
    }
}

impl UnitOfWork for CompileWork {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn display_name(&self) -> String {
        "compileJava".to_string()
    }

    fn visit_outputs(&self, workspace: &Path, visitor: &mut dyn FnMut(OutputProperty<'_>)) {
        let classes = workspace.join("classes");
        let resources = workspace.join("resources");
        visitor(OutputProperty {
            name: "resources",
            tree_type: TreeType::Directory,
            root: &resources,
            contents: &FileCollection::empty(),
        });
        visitor(OutputProperty {
            name: "classes",
            tree_type: TreeType::Directory,
            root: &classes,
            contents: &FileCollection::of([&classes]),
        });
    }
}

#[test]
fn test_broadcast_execute_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Main.java");
    std::fs::write(&source, "class Main {}").unwrap();

    let provider = MutableWorkspaceProvider::new(
        dir.path().join("workspaces"),
        Arc::new(InMemoryExecutionHistory::new()),
    );
    let listeners = RelevantInputListeners::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_listener = seen.clone();
    let listener: Arc<dyn RelevantInputListener> = Arc::new(
        move |_: &Identity, inputs: &FileCollection| -> Result<(), BoxError> {
            seen_in_listener.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(())
        },
    );
    listeners.add_listener(listener);

    let work = CompileWork::new(&source);
    let snapshotter = OutputSnapshotter::default();

    for _ in 0..3 {
        listeners
            .broadcast_relevant_inputs_of(work.identity(), &work.sources)
            .unwrap();
        let outputs = provider
            .identity_cache()
            .get_or_compute(work.identity(), || {
                provider
                    .with_workspace(work.identity(), |ws| work.execute(ws.dir()))
                    .map_err(Failure::new)
            })
            .unwrap();
        assert_eq!(outputs.len(), 2);
    }

    assert_eq!(work.runs.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 3);

    let workspace = provider.workspace_for(work.identity()).unwrap();
    let snapshot = snapshotter
        .snapshot_outputs(&work, workspace.dir())
        .unwrap();
    assert_eq!(snapshot.property_names().collect::<Vec<_>>(), vec!["classes", "resources"]);
    assert_eq!(snapshot.get("classes").unwrap().files().count(), 2);
    assert!(snapshot.get("resources").unwrap().is_empty());
}

#[test]
fn test_snapshot_before_execution_reports_missing_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Main.java");
    std::fs::write(&source, "class Main {}").unwrap();
    let work = CompileWork::new(&source);

    let result = OutputSnapshotter::default().snapshot_outputs(&work, &dir.path().join("fresh"));

    assert!(matches!(
        result,
        Err(kiln_execution::SnapshotError::MissingRoot { .. })
    ));
    assert_eq!(work.runs.load(Ordering::SeqCst), 0);
}
