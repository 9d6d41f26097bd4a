//! Shared setup for protocol tests: a stub repomix and an in-process client.

use std::path::PathBuf;

use anyhow::{Context, Result};
use repomix_mcp::{AccessGuard, RepomixMcp, RunnerConfig};
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParams, CallToolResult},
    service::RunningService,
};
use tempfile::TempDir;

/// A project directory plus a shell script standing in for repomix.
///
/// The script finds `--output`, records that path in `artifact-path`, records
/// its argv (one per line) in `argv`, then runs the test-provided body with
/// `$out` set.
pub struct TestEnv {
    tmp: TempDir,
    pub root: PathBuf,
    script: PathBuf,
}

impl TestEnv {
    pub fn new(body: &str) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().join("project");
        std::fs::create_dir_all(root.join("src")).expect("create project dir");

        let script = tmp.path().join("repomix-stub.sh");
        let state = tmp.path().display().to_string();
        std::fs::write(
            &script,
            format!(
                ": > '{state}/argv'\n\
                 for arg in \"$@\"; do printf '%s\\n' \"$arg\" >> '{state}/argv'; done\n\
                 while [ $# -gt 0 ]; do\n\
                   if [ \"$1\" = --output ]; then out=\"$2\"; fi\n\
                   shift\n\
                 done\n\
                 printf '%s' \"$out\" > '{state}/artifact-path'\n\
                 {body}\n"
            ),
        )
        .expect("write stub script");

        Self { tmp, root, script }
    }

    pub fn config(&self) -> RunnerConfig {
        RunnerConfig::new(&format!("/bin/sh '{}'", self.script.display()))
            .expect("stub command parses")
    }

    pub fn server(&self) -> RepomixMcp {
        RepomixMcp::new(AccessGuard::new(&self.root), self.config())
    }

    /// Output path the stub saw on its last run.
    pub fn artifact(&self) -> PathBuf {
        PathBuf::from(
            std::fs::read_to_string(self.tmp.path().join("artifact-path"))
                .expect("stub recorded output path"),
        )
    }

    /// Arguments the stub saw on its last run.
    pub fn argv(&self) -> Vec<String> {
        std::fs::read_to_string(self.tmp.path().join("argv"))
            .expect("stub recorded argv")
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn ran(&self) -> bool {
        self.tmp.path().join("argv").exists()
    }
}

/// Serve `server` over an in-memory pipe and connect a client to it.
pub async fn connect(server: RepomixMcp) -> Result<RunningService<RoleClient, ()>> {
    let (server_io, client_io) = tokio::io::duplex(1 << 20);

    tokio::spawn(async move {
        let running = server.serve(tokio::io::split(server_io)).await?;
        running.waiting().await?;
        anyhow::Ok(())
    });

    ().serve(tokio::io::split(client_io))
        .await
        .context("start MCP client")
}

pub async fn call(
    client: &RunningService<RoleClient, ()>,
    name: &str,
    args: serde_json::Value,
) -> Result<CallToolResult, rmcp::service::ServiceError> {
    client
        .call_tool({
            let mut params = CallToolRequestParams::new(name.to_string());
            params.arguments = args.as_object().cloned();
            params
        })
        .await
}

pub fn text_of(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}
