//! Filesystem tool: `list`, `read`, `write` confined to the sandbox root.

use std::path::Path;

use pilot_core::error::ToolError;
use pilot_core::tool::ToolResult;
use pilot_security::resolve_in_sandbox;
use serde_json::{Map, Value};

use crate::executor::Invocation;
use crate::param_str;

pub(crate) async fn run(
    call: &Invocation<'_>,
    params: &Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let action = param_str(params, "action").unwrap_or("read");
    let target = param_str(params, "path").unwrap_or(".");

    // Resolution happens before any I/O on the target.
    let resolved = resolve_in_sandbox(call.root, target)
        .map_err(|e| ToolError::SandboxViolation(e.to_string()))?;

    match action {
        "list" => list(call, &resolved).await,
        "read" => read(call, &resolved).await,
        "write" => {
            if !call.tool.allow_write {
                return Err(call.denied("write access is disabled for this tool"));
            }
            let content = param_str(params, "content").unwrap_or("");
            write(call, &resolved, content).await
        }
        other => Err(ToolError::InvalidArguments(format!(
            "unknown filesystem action '{other}' (expected list, read or write)"
        ))),
    }
}

/// Path shown to the model: relative to the root, never absolute.
fn display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

async fn list(call: &Invocation<'_>, path: &Path) -> Result<ToolResult, ToolError> {
    let id = &call.tool.id;
    let shown = display(call.root, path);

    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return Ok(ToolResult::failure(id, format!("path not found: {shown}"))),
    };
    if !meta.is_dir() {
        return Ok(ToolResult::failure(id, format!("not a directory: {shown}")));
    }

    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| call.failed(format!("cannot list {shown}: {e}")))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| call.failed(format!("cannot list {shown}: {e}")))?
    {
        let entry_path = entry.path();
        let rel = display(call.root, &entry_path);
        let line = match entry.metadata().await {
            Ok(m) if m.is_dir() => format!("{rel}/"),
            Ok(m) => format!("{rel}  ({} bytes)", m.len()),
            Err(_) => rel.clone(),
        };
        entries.push((rel, line));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let output = if entries.is_empty() {
        "(empty directory)".to_string()
    } else {
        entries
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(ToolResult::ok(id, output))
}

async fn read(call: &Invocation<'_>, path: &Path) -> Result<ToolResult, ToolError> {
    let id = &call.tool.id;
    let shown = display(call.root, path);

    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return Ok(ToolResult::failure(id, format!("file not found: {shown}"))),
    };
    if !meta.is_file() {
        return Ok(ToolResult::failure(id, format!("not a file: {shown}")));
    }

    let max = call.tool.max_read_bytes;
    if meta.len() > max {
        return Ok(ToolResult::failure(
            id,
            format!("file too large ({} bytes, max {max})", meta.len()),
        ));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| call.failed(format!("cannot read {shown}: {e}")))?;
    Ok(ToolResult::ok(id, String::from_utf8_lossy(&bytes)))
}

async fn write(call: &Invocation<'_>, path: &Path, content: &str) -> Result<ToolResult, ToolError> {
    let id = &call.tool.id;
    let shown = display(call.root, path);

    if path == call.root || tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return Ok(ToolResult::failure(id, format!("not a file: {shown}")));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| call.failed(format!("cannot create parent of {shown}: {e}")))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| call.failed(format!("cannot write {shown}: {e}")))?;

    Ok(ToolResult::ok(
        id,
        format!("wrote {} bytes to {shown}", content.len()),
    ))
}

#[cfg(test)]
mod tests {
    use crate::SandboxExecutor;
    use pilot_config::PilotConfig;
    use serde_json::{Map, Value, json};
    use std::path::Path;
    use std::sync::Arc;

    fn executor(dir: &Path, allow_write: bool) -> SandboxExecutor {
        let mut config = PilotConfig::default();
        config.sandbox.fs_root = dir.join("sandbox");
        if let Some(fs) = config.tools.iter_mut().find(|t| t.id == "fs") {
            fs.allow_write = allow_write;
            fs.max_read_bytes = 64;
        }
        SandboxExecutor::new(Arc::new(config)).unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn list_is_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), false);
        std::fs::create_dir(exec.root().join("sub")).unwrap();
        std::fs::write(exec.root().join("b.txt"), "12345").unwrap();
        std::fs::write(exec.root().join("a.txt"), "").unwrap();

        let result = exec.execute("fs", &params(json!({"action": "list"}))).await;
        assert!(result.success(), "{}", result.error());
        assert_eq!(result.output(), "a.txt  (0 bytes)\nb.txt  (5 bytes)\nsub/");

        let empty = exec
            .execute("fs", &params(json!({"action": "list", "path": "sub"})))
            .await;
        assert_eq!(empty.output(), "(empty directory)");
    }

    #[tokio::test]
    async fn read_defaults_and_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), false);
        std::fs::write(exec.root().join("note.txt"), "ciao").unwrap();
        std::fs::write(exec.root().join("big.txt"), "x".repeat(100)).unwrap();

        let ok = exec.execute("fs", &params(json!({"path": "note.txt"}))).await;
        assert_eq!(ok.output(), "ciao");

        let big = exec.execute("fs", &params(json!({"path": "big.txt"}))).await;
        assert!(!big.success());
        assert!(big.error().contains("too large"));

        let missing = exec.execute("fs", &params(json!({"path": "nope.txt"}))).await;
        assert!(!missing.success());
        assert!(!missing.error().contains(dir.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn traversal_rejected_for_every_action() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), true);
        std::fs::write(dir.path().join("outside.txt"), "secret").unwrap();

        for action in ["read", "write", "list"] {
            for path in ["../outside.txt", "sub/../../outside.txt", "..\\outside.txt"] {
                let result = exec
                    .execute(
                        "fs",
                        &params(json!({"action": action, "path": path, "content": "pwned"})),
                    )
                    .await;
                assert!(!result.success(), "{action} {path} should fail");
            }
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("outside.txt")).unwrap(),
            "secret"
        );
    }

    #[tokio::test]
    async fn absolute_path_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), false);
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, "secret").unwrap();

        let result = exec
            .execute("fs", &params(json!({"path": outside.to_str().unwrap()})))
            .await;
        assert!(!result.success());
    }

    #[tokio::test]
    async fn write_requires_policy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let denied = executor(dir.path(), false);
        let result = denied
            .execute(
                "fs",
                &params(json!({"action": "write", "path": "out.txt", "content": "hi"})),
            )
            .await;
        assert!(!result.success());
        assert!(!denied.root().join("out.txt").exists());

        let allowed = executor(dir.path(), true);
        let result = allowed
            .execute(
                "fs",
                &params(json!({"action": "write", "path": "deep/out.txt", "content": "hi"})),
            )
            .await;
        assert!(result.success(), "{}", result.error());
        assert_eq!(
            std::fs::read_to_string(allowed.root().join("deep/out.txt")).unwrap(),
            "hi"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_through_dangling_symlink_stays_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), true);
        let outside = dir.path().join("outside.txt");
        std::os::unix::fs::symlink(&outside, exec.root().join("link.txt")).unwrap();

        let result = exec
            .execute(
                "fs",
                &params(json!({"action": "write", "path": "link.txt", "content": "pwned"})),
            )
            .await;
        assert!(!result.success());
        assert!(!outside.exists());

        let read = exec.execute("fs", &params(json!({"path": "link.txt"}))).await;
        assert!(!read.success());
    }

    #[tokio::test]
    async fn unknown_action_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), false);
        let result = exec.execute("fs", &params(json!({"action": "delete"}))).await;
        assert!(!result.success());
        assert!(result.error().contains("delete"));
    }
}
