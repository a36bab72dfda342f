//! Sandboxed script executor
//!
//! Each run gets a scratch directory holding the script and a generated
//! runner. The runner executes the script with a reduced set of builtins and
//! an import hook limited to the healing allow-list. The newest STL the
//! script leaves in the scratch directory is moved to the output directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::Command;
use tracing::{debug, info, warn};

use sculpt_core::{
    ExecutionOutcome, Executor, ExecutorConfig, HealingConfig, Result, SculptConfig, SculptError,
};

const SCRIPT_FILE: &str = "script.py";
const RUNNER_FILE: &str = "runner.py";

/// Builtins the script may use
const SAFE_BUILTINS: &[&str] = &[
    "abs", "min", "max", "range", "len", "float", "int", "pow", "sum", "zip", "enumerate",
    "print", "list", "dict", "set", "tuple", "round", "Exception", "BaseException",
    "ValueError", "TypeError", "ZeroDivisionError", "any", "str", "open", "bytes", "bool",
    "isinstance", "type", "iter", "next", "hasattr", "getattr", "setattr", "dir", "format",
    "ord", "chr", "hex", "bin", "oct", "sorted", "reversed", "map", "filter", "all", "repr",
    "hash", "id", "callable", "True", "False", "None", "__build_class__",
];

const RUNNER_TEMPLATE: &str = r#"import builtins
import math
import struct
import sys
from pathlib import Path

ALLOWED = set(__ALLOWED__)
SAFE = __SAFE__
_real_import = builtins.__import__


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    if level != 0 or name.split(".")[0] not in ALLOWED:
        raise ImportError("import of '%s' is not allowed" % name)
    return _real_import(name, globals, locals, fromlist, level)


def show_object(obj, name=None, options=None):
    pass


safe = {k: getattr(builtins, k) for k in SAFE if hasattr(builtins, k)}
safe["__import__"] = _guarded_import
ns = {
    "__builtins__": safe,
    "__name__": "__main__",
    "__file__": str(Path(sys.argv[1]).resolve()),
    "math": math,
    "struct": struct,
    "Path": Path,
    "show_object": show_object,
}
try:
    import numpy
    ns["np"] = numpy
    ns["numpy"] = numpy
except ImportError:
    pass

try:
    with open(sys.argv[1]) as handle:
        source = handle.read()
    exec(compile(source, "<cad>", "exec"), ns)
except BaseException as e:
    sys.stderr.write("Execution: %s: %s\n" % (type(e).__name__, e))
    sys.exit(1)
"#;

/// Reject artifact paths that could escape the output directory
///
/// Accepts relative `.stl` paths without parent components.
pub fn validate_artifact_name(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);

    if path.is_absolute() {
        return Err(SculptError::PathValidation(format!(
            "Absolute paths not allowed: {}",
            path.display()
        )));
    }

    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(SculptError::PathValidation(format!(
            "Path traversal not allowed: {}",
            path.display()
        )));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("stl") => Ok(path.to_path_buf()),
        _ => Err(SculptError::PathValidation(format!(
            "Artifacts must be STL files: {}",
            path.display()
        ))),
    }
}

/// Runs scripts with a local Python interpreter
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    config: ExecutorConfig,
    allowed_imports: Vec<String>,
}

impl PythonExecutor {
    pub fn new(config: ExecutorConfig, healing: &HealingConfig) -> Self {
        Self {
            config,
            allowed_imports: healing.allowed_imports.clone(),
        }
    }

    pub fn from_config(config: &SculptConfig) -> Self {
        Self::new(config.executor.clone(), &config.healing)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Python source of the sandbox runner
    pub fn runner_script(&self) -> Result<String> {
        Ok(RUNNER_TEMPLATE
            .replace("__ALLOWED__", &serde_json::to_string(&self.allowed_imports)?)
            .replace("__SAFE__", &serde_json::to_string(SAFE_BUILTINS)?))
    }

    async fn run(&self, code: &str) -> Result<ExecutionOutcome> {
        let scratch = tempfile::tempdir()?;
        let script = scratch.path().join(SCRIPT_FILE);
        let runner = scratch.path().join(RUNNER_FILE);
        tokio::fs::write(&script, code).await?;
        tokio::fs::write(&runner, self.runner_script()?).await?;

        let child = Command::new(&self.config.python)
            .arg(RUNNER_FILE)
            .arg(SCRIPT_FILE)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SculptError::Execution(format!(
                    "failed to start '{}': {}",
                    self.config.python, e
                ))
            })?;

        let timeout = self.config.timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "script timed out");
                return Ok(ExecutionOutcome::failed(vec![format!(
                    "Execution: TimeoutError: script exceeded {}s",
                    timeout.as_secs()
                )]));
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(target: "sculpt::script", "{}", line);
        }

        if !output.status.success() {
            let errors = error_lines(&String::from_utf8_lossy(&output.stderr));
            warn!(errors = errors.len(), "script execution failed");
            return Ok(ExecutionOutcome::failed(errors));
        }

        match newest_stl(scratch.path()).await? {
            Some(stl) => {
                let artifact = self.store_artifact(&stl).await?;
                info!(artifact = %artifact.display(), "artifact exported");
                Ok(ExecutionOutcome::succeeded(artifact.display().to_string()))
            }
            None => Ok(ExecutionOutcome::failed(vec![
                "Execution: script finished without exporting an STL file".to_string(),
            ])),
        }
    }

    async fn store_artifact(&self, stl: &Path) -> Result<PathBuf> {
        let stem = stl
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = validate_artifact_name(&format!("{}-{}.stl", stem, &id[..8]))?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let target = self.config.output_dir.join(name);
        tokio::fs::copy(stl, &target).await?;
        Ok(target)
    }
}

#[async_trait]
impl Executor for PythonExecutor {
    async fn execute(&self, code: &str) -> Result<ExecutionOutcome> {
        self.run(code).await
    }
}

/// Runner error lines, or the stderr tail when the runner itself crashed
fn error_lines(stderr: &str) -> Vec<String> {
    let tagged: Vec<String> = stderr
        .lines()
        .filter(|l| l.starts_with("Execution: "))
        .map(str::to_string)
        .collect();
    if !tagged.is_empty() {
        return tagged;
    }
    match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(last) => vec![format!("Execution: {}", last.trim())],
        None => vec!["Execution: script exited with an error".to_string()],
    }
}

async fn newest_stl(dir: &Path) -> Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_stl = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("stl"));
        if !is_stl {
            continue;
        }
        let modified = entry
            .metadata()
            .await?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn executor(output: &TempDir) -> PythonExecutor {
        let config = ExecutorConfig {
            output_dir: output.path().to_path_buf(),
            timeout_secs: 20,
            ..ExecutorConfig::default()
        };
        PythonExecutor::new(config, &HealingConfig::default())
    }

    #[test]
    fn test_validate_artifact_name() {
        assert!(validate_artifact_name("part-1234.stl").is_ok());
        assert!(validate_artifact_name("/tmp/part.stl").is_err());
        assert!(validate_artifact_name("../part.stl").is_err());
        assert!(validate_artifact_name("part.py").is_err());
    }

    #[test]
    fn test_runner_embeds_allow_list() {
        let output = TempDir::new().unwrap();
        let runner = executor(&output).runner_script().unwrap();
        assert!(runner.contains(r#"ALLOWED = set(["cadquery","math","pathlib","numpy","struct"])"#));
        assert!(runner.contains("\"open\""));
    }

    #[test]
    fn test_error_lines() {
        assert_eq!(
            error_lines("noise\nExecution: ValueError: bad radius\n"),
            vec!["Execution: ValueError: bad radius".to_string()]
        );
        assert_eq!(
            error_lines("Traceback\n  File x\nSegfault\n"),
            vec!["Execution: Segfault".to_string()]
        );
    }

    #[tokio::test]
    async fn test_runtime_error_is_reported() {
        if !python_available() {
            return;
        }
        let output = TempDir::new().unwrap();
        let outcome = executor(&output)
            .execute("raise ValueError('bad radius')\n")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.errors, vec!["Execution: ValueError: bad radius".to_string()]);
    }

    #[tokio::test]
    async fn test_stl_is_collected() {
        if !python_available() {
            return;
        }
        let output = TempDir::new().unwrap();
        let code = "with open('part.stl', 'w') as f:\n    f.write('solid part\\nendsolid part\\n')\n";
        let outcome = executor(&output).execute(code).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.errors);
        let artifact = PathBuf::from(outcome.artifact_reference.unwrap());
        assert!(artifact.starts_with(output.path()));
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_disallowed_import_is_rejected() {
        if !python_available() {
            return;
        }
        let output = TempDir::new().unwrap();
        let outcome = executor(&output).execute("import os\n").await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("Execution: ImportError:"));
    }

    #[tokio::test]
    async fn test_missing_stl_fails() {
        if !python_available() {
            return;
        }
        let output = TempDir::new().unwrap();
        let outcome = executor(&output).execute("x = 1\n").await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let output = TempDir::new().unwrap();
        let config = ExecutorConfig {
            python: "/nonexistent/python".to_string(),
            output_dir: output.path().to_path_buf(),
            ..ExecutorConfig::default()
        };
        let executor = PythonExecutor::new(config, &HealingConfig::default());
        assert!(matches!(
            executor.execute("x = 1\n").await,
            Err(SculptError::Execution(_))
        ));
    }
}
