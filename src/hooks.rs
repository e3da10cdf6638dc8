use crate::error::{PymetaError, Result};
use crate::ui;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// File name of the optional bump hook, looked up at the project root.
pub const BUMP_HOOK_FILE: &str = "bump-hook";

/// Context information passed to the bump hook.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Version being bumped to, e.g. "1.2.0"
    pub version: String,
    /// Tag that is (or would be) applied, e.g. "v1.2.0"
    pub tag: String,
    /// Branch the bump runs on
    pub branch: String,
    /// Whether this is a dry run
    pub dry_run: bool,
}

impl HookContext {
    /// Convert context to environment variables for the hook script
    ///
    /// Maps context fields to PYMETA_* environment variables
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert("PYMETA_VERSION".to_string(), self.version.clone());
        env.insert("PYMETA_TAG".to_string(), self.tag.clone());
        env.insert("PYMETA_BRANCH".to_string(), self.branch.clone());
        env.insert(
            "PYMETA_DRY_RUN".to_string(),
            if self.dry_run { "1" } else { "0" }.to_string(),
        );

        env
    }
}

/// Locate an executable bump hook at the project root, if one exists.
pub fn find_bump_hook(root: &Path) -> Option<PathBuf> {
    let path = root.join(BUMP_HOOK_FILE);
    if !path.is_file() {
        return None;
    }
    if !is_executable(&path) {
        return None;
    }
    Some(path)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Executes bump hook scripts
pub struct HookExecutor;

impl HookExecutor {
    /// Execute a hook script with the given context
    ///
    /// The script is executed from the directory containing it, with
    /// environment variables set from the context. If the script exits with
    /// code 0, the hook succeeds. Any non-zero exit code is treated as a
    /// failure.
    ///
    /// # Arguments
    /// * `script_path` - Path to the hook script (must be executable)
    /// * `context` - Hook context with environment variables
    ///
    /// # Returns
    /// * `Ok(())` if hook succeeds (exit code 0)
    /// * `Err` if script not found, not executable, or returns non-zero exit code
    pub fn execute(script_path: &Path, context: &HookContext) -> Result<()> {
        if !script_path.exists() {
            return Err(PymetaError::hook(format!(
                "Hook script not found: {}",
                script_path.display()
            )));
        }

        if !script_path.is_file() {
            return Err(PymetaError::hook(format!(
                "Hook path is not a file: {}",
                script_path.display()
            )));
        }

        let env_vars = context.to_env_vars();

        let mut cmd = Command::new(script_path);
        if let Some(dir) = script_path.parent() {
            cmd.current_dir(dir);
        }

        for (key, value) in env_vars {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|e| {
            PymetaError::hook(format!(
                "Failed to execute hook {}: {}",
                script_path.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(PymetaError::hook(format!(
                "Hook {} failed with exit code {}\nStdout: {}\nStderr: {}",
                script_path.display(),
                output.status.code().unwrap_or(-1),
                stdout,
                stderr
            )));
        }

        Ok(())
    }

    /// Try to execute a hook, reporting errors but not failing
    ///
    /// A bump hook is advisory: by the time it runs, the version files, commit
    /// and tag are already in place, so a hook failure must not retroactively
    /// fail the bump.
    ///
    /// # Arguments
    /// * `script_path` - Path to the hook script
    /// * `context` - Hook context
    pub fn execute_permissive(script_path: &Path, context: &HookContext) {
        match Self::execute(script_path, context) {
            Ok(()) => {
                ui::display_success(&format!("Hook executed: {}", script_path.display()));
            }
            Err(e) => {
                ui::display_warning(&e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HookContext {
        HookContext {
            version: "1.2.0".to_string(),
            tag: "v1.2.0".to_string(),
            branch: "main".to_string(),
            dry_run: false,
        }
    }

    #[test]
    fn test_context_to_env_vars() {
        let env = context().to_env_vars();
        assert_eq!(env.get("PYMETA_VERSION"), Some(&"1.2.0".to_string()));
        assert_eq!(env.get("PYMETA_TAG"), Some(&"v1.2.0".to_string()));
        assert_eq!(env.get("PYMETA_BRANCH"), Some(&"main".to_string()));
        assert_eq!(env.get("PYMETA_DRY_RUN"), Some(&"0".to_string()));
    }

    #[test]
    fn test_context_dry_run_env_var() {
        let mut ctx = context();
        ctx.dry_run = true;
        let env = ctx.to_env_vars();
        assert_eq!(env.get("PYMETA_DRY_RUN"), Some(&"1".to_string()));
    }

    #[test]
    fn test_nonexistent_hook_fails() {
        let result = HookExecutor::execute(Path::new("/nonexistent/path/to/hook.sh"), &context());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Hook script not found"));
    }

    #[test]
    fn test_hook_directory_fails() {
        let result = HookExecutor::execute(Path::new("/tmp"), &context());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a file"));
    }

    #[test]
    fn test_find_bump_hook_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_bump_hook(dir.path()).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_bump_hook_requires_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUMP_HOOK_FILE);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(find_bump_hook(dir.path()).is_none());

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_bump_hook(dir.path()), Some(path));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_passes_environment() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUMP_HOOK_FILE);
        let marker = dir.path().join("seen");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$PYMETA_VERSION $PYMETA_TAG\" > {}\n",
                marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        HookExecutor::execute(&path, &context()).unwrap();
        let seen = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(seen.trim(), "1.2.0 v1.2.0");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_hook_reports_exit_code() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUMP_HOOK_FILE);
        std::fs::write(&path, "#!/bin/sh\necho boom >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = HookExecutor::execute(&path, &context()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 3"));
        assert!(msg.contains("boom"));
    }
}
