//! MCP server exposing repomix.
//!
//! Provides two tools that pack a codebase into a single AI-friendly file:
//! `pack` returns the packed content, `pack-estimate` returns only its size
//! and an approximate token count so agents can check before pulling a large
//! repository into context.
//!
//! ## Module Structure
//!
//! - `guard`: confinement of local paths to the launch directory
//! - `models`: request types shared by both tools
//! - `runner`: repomix command construction, execution, and output retrieval
//! - `helpers`: estimate formatting

pub mod guard;
mod helpers;
pub mod models;
pub mod runner;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

// Re-export public types
pub use guard::AccessGuard;
pub use models::*;
pub use runner::{ConfigError, PackError, Runner, RunnerConfig};

// ============================================================================
// RepomixMcp Server
// ============================================================================

/// MCP server exposing repomix.
#[derive(Clone)]
pub struct RepomixMcp {
    guard: Arc<AccessGuard>,
    runner: Arc<Runner>,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for RepomixMcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepomixMcp")
            .field("root", &self.guard.root())
            .field("tool_router", &self.tool_router)
            .finish()
    }
}

impl RepomixMcp {
    /// Create a server confined to the guard's root.
    ///
    /// repomix runs with the root as its working directory, so relative
    /// paths mean the same thing to the guard and to repomix.
    pub fn new(guard: AccessGuard, config: RunnerConfig) -> Self {
        let runner = Runner::new(config, guard.root());
        Self {
            guard: Arc::new(guard),
            runner: Arc::new(runner),
            tool_router: Self::tool_router(),
        }
    }

    /// The directory local paths are confined to.
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    /// Shared body of both tools: access check, then one repomix run.
    ///
    /// Every outcome becomes a tool result; nothing here is a protocol error.
    async fn handle(&self, operation: Operation, request: PackRequest) -> CallToolResult {
        if let Some(path) = request.local_path() {
            if !self.guard.is_path_allowed(path) {
                tracing::warn!(
                    tool = %operation,
                    path = %path,
                    root = %self.guard.root().display(),
                    "Access denied"
                );
                return CallToolResult::error(vec![Content::text(format!(
                    "Access denied: Path \"{}\" is outside the allowed directory ({})",
                    path,
                    self.guard.root().display()
                ))]);
            }
        }

        tracing::info!(
            tool = %operation,
            path = ?request.path,
            remote = ?request.remote,
            style = ?request.style,
            compress = request.compress_enabled(),
            "Packing"
        );

        match self.runner.run(operation, &request).await {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(e) => {
                tracing::warn!(tool = %operation, error = %e, "Pack failed");
                CallToolResult::error(vec![Content::text(e.to_message())])
            }
        }
    }
}

#[tool_router]
impl RepomixMcp {
    #[tool(
        name = "pack",
        description = "Pack a local directory or remote repository into a single AI-friendly file with repomix and return its full content. Use pack-estimate first for large repositories."
    )]
    #[tracing::instrument(skip(self, req), name = "mcp.pack")]
    async fn pack(&self, Parameters(req): Parameters<PackRequest>) -> Result<CallToolResult, McpError> {
        Ok(self.handle(Operation::Pack, req).await)
    }

    #[tool(
        name = "pack-estimate",
        description = "Estimate the size and token count of repomix output without returning the content. Accepts the same parameters as pack."
    )]
    #[tracing::instrument(skip(self, req), name = "mcp.pack_estimate")]
    async fn pack_estimate(
        &self,
        Parameters(req): Parameters<PackRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.handle(Operation::PackEstimate, req).await)
    }
}

#[tool_handler]
impl ServerHandler for RepomixMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Repomix MCP server. 'pack' packs a local directory (inside the server's working directory) or a remote repository into one file and returns it; 'pack-estimate' returns only the size and approximate token count. Both accept path, style (xml, markdown, plain), compress, include, ignore, and remote.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Server rooted at `<tmp>/project` whose "repomix" writes `payload`.
    fn setup(payload: &str) -> (RepomixMcp, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(root.join("src")).unwrap();

        let script = dir.path().join("repomix-stub.sh");
        std::fs::write(
            &script,
            format!(
                "while [ $# -gt 0 ]; do\n\
                   if [ \"$1\" = --output ]; then out=\"$2\"; fi\n\
                   shift\n\
                 done\n\
                 printf '%s' '{payload}' > \"$out\"\n"
            ),
        )
        .unwrap();

        let config = RunnerConfig::new(&format!("/bin/sh '{}'", script.display())).unwrap();
        (RepomixMcp::new(AccessGuard::new(root), config), dir)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pack_returns_content() {
        let (mcp, _dir) = setup("<file path=\"src/lib.rs\"></file>");

        let result = mcp
            .pack(Parameters(PackRequest {
                path: Some(".".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(result.content.len(), 1);
        assert_eq!(text_of(&result), "<file path=\"src/lib.rs\"></file>");
    }

    #[tokio::test]
    async fn test_pack_denies_outside_path() {
        let (mcp, _dir) = setup("unused");
        let root = mcp.guard().root().display().to_string();

        let result = mcp
            .pack(Parameters(PackRequest {
                path: Some("/".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            text_of(&result),
            format!("Access denied: Path \"/\" is outside the allowed directory ({root})")
        );
    }

    #[tokio::test]
    async fn test_estimate_denies_traversal() {
        let (mcp, _dir) = setup("unused");

        let result = mcp
            .pack_estimate(Parameters(PackRequest {
                path: Some("../".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).starts_with("Access denied: Path \"../\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_skips_access_check() {
        let (mcp, _dir) = setup("remote content");

        let result = mcp
            .pack(Parameters(PackRequest {
                path: Some("/".to_string()),
                remote: Some("https://github.com/yamadashy/repomix".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(text_of(&result), "remote content");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_estimate_never_returns_content() {
        let (mcp, _dir) = setup("SECRET-PACKED-CONTENT");

        let result = mcp
            .pack_estimate(Parameters(PackRequest::default()))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        let text = text_of(&result);
        assert!(!text.contains("SECRET-PACKED-CONTENT"));
        assert!(text.contains("Estimated tokens: ~6"));
        assert!(text.contains("Compression: disabled"));
    }

    #[test]
    fn test_tools_listed() {
        let (mcp, _dir) = setup("unused");
        let mut names: Vec<String> = mcp
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["pack", "pack-estimate"]);
    }

    #[test]
    fn test_server_info_enables_tools() {
        let (mcp, _dir) = setup("unused");
        let info = mcp.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("pack-estimate"));
    }
}
