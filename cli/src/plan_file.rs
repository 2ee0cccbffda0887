//! Agent-file loading and scaffolding for the `run`/`plan`/`init` subcommands
//! (spec §6). The engine treats `rerender()` as an opaque host callback; this
//! module is the host's half: read a `.smithers.xml` plan file from disk and
//! parse it into a [`smithers::Node`] tree via [`smithers::parse_plan_xml`].

use std::path::{Path, PathBuf};

use smithers::{Node, SmithersError};

/// Default plan-file template written by `smithers init`.
const INIT_TEMPLATE: &str = r#"<phase key="main">
  <claude prompt="Describe the task here." />
  <smithers-stop />
</phase>
"#;

/// Reads and parses a plan file. Wraps I/O failures as [`SmithersError::Usage`]
/// (file not found is a usage error, not a parse error) and syntax failures
/// as [`SmithersError::Load`] (already line/column-annotated by the parser).
pub fn load_plan(path: &Path) -> Result<Node, SmithersError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| SmithersError::Usage(format!("cannot read {}: {e}", path.display())))?;
    smithers::parse_plan_xml(&source)
}

/// Builds the `rerender()` callback the engine calls every frame. For a
/// static plan file this just re-reads and re-parses the file each time,
/// which is cheap and lets an operator edit the plan mid-run (the engine
/// diffs by content hash, so an unchanged file is a no-op).
pub fn rerender_from_file(path: PathBuf) -> smithers::RerenderFn {
    std::sync::Arc::new(move || {
        let path = path.clone();
        Box::pin(async move { load_plan(&path).map_err(|e| e.to_string()) })
    })
}

/// Writes a starter plan file to `dir/plan.smithers.xml`, failing if one
/// already exists (never silently overwrite an operator's work).
pub fn init_project(dir: &Path) -> Result<PathBuf, SmithersError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| SmithersError::Usage(format!("cannot create {}: {e}", dir.display())))?;
    let target = dir.join("plan.smithers.xml");
    if target.exists() {
        return Err(SmithersError::Usage(format!(
            "{} already exists, refusing to overwrite",
            target.display()
        )));
    }
    std::fs::write(&target, INIT_TEMPLATE)
        .map_err(|e| SmithersError::Usage(format!("cannot write {}: {e}", target.display())))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_plan_parses_a_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.smithers.xml");
        std::fs::write(&path, INIT_TEMPLATE).unwrap();
        let node = load_plan(&path).unwrap();
        assert_eq!(node.children[0].node_type, "phase");
    }

    #[test]
    fn load_plan_missing_file_is_usage_error() {
        let err = load_plan(Path::new("/nonexistent/plan.smithers.xml")).unwrap_err();
        assert!(matches!(err, SmithersError::Usage(_)));
    }

    #[test]
    fn load_plan_malformed_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.smithers.xml");
        std::fs::write(&path, "<phase><claude /></phaze>").unwrap();
        let err = load_plan(&path).unwrap_err();
        assert!(matches!(err, SmithersError::Load { .. }));
    }

    #[test]
    fn init_project_writes_template_and_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let written = init_project(dir.path()).unwrap();
        assert!(written.exists());
        let err = init_project(dir.path()).unwrap_err();
        assert!(matches!(err, SmithersError::Usage(_)));
    }
}
