use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{context::RagContext, error, vector_index::Hit};

#[derive(Clone)]
pub struct BrochureMcpServer {
    context: Arc<RagContext>,
    tool_router: ToolRouter<Self>,
}

impl BrochureMcpServer {
    pub fn new(context: RagContext) -> Self {
        Self {
            context: Arc::new(context),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl BrochureMcpServer {
    /// Retrieve brochure passages relevant to a question.
    #[tool(
        name = "brochure_retrieve",
        description = "Find the brochure passages most relevant to a question. Each result carries its source file and page for citation."
    )]
    pub async fn brochure_retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = params.top_k.unwrap_or(self.context.settings().top_k);
        let min_score = params.min_score.unwrap_or(f32::MIN);

        let hits = match self.context.retrieve(&params.query, top_k) {
            Ok(hits) => hits,
            Err(e @ error::Error::InvalidArgument(_)) => {
                return Err(rmcp::ErrorData::invalid_params(
                    e.to_string(),
                    None,
                ));
            }
            Err(e) if e.is_recoverable() => {
                return Ok(CallToolResult::error(vec![Content::text(
                    e.to_string(),
                )]));
            }
            Err(e) => return Err(mcp_error("retrieval failed", e)),
        };

        let items: Vec<RetrieveResultItem> = hits
            .into_iter()
            .filter(|hit| hit.score >= min_score)
            .map(RetrieveResultItem::from)
            .collect();

        let summary = format_summary(&items, &params.query);
        let structured = serde_json::to_value(RetrieveResponse {
            query: params.query,
            result_count: items.len(),
            results: items,
        })
        .map_err(|e| mcp_error("failed to serialize results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for BrochureMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("brochure-rag", env!("CARGO_PKG_VERSION"))
                    .with_title("brochure-rag MCP"),
            )
            .with_instructions(
                "Use brochure_retrieve to ground answers about property brochures. Cite the source file and page of every passage you rely on.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveParams {
    /// The question to find passages for.
    pub query: String,
    /// Maximum number of passages (default: the configured top-k).
    pub top_k: Option<usize>,
    /// Drop passages scoring below this cosine similarity.
    pub min_score: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    query: String,
    result_count: usize,
    results: Vec<RetrieveResultItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResultItem {
    rank: usize,
    score: f32,
    source_file: String,
    page: u32,
    text: String,
}

impl From<Hit> for RetrieveResultItem {
    fn from(hit: Hit) -> Self {
        Self {
            rank: hit.rank,
            score: hit.score,
            source_file: hit.chunk.source_file,
            page: hit.chunk.page,
            text: hit.chunk.text,
        }
    }
}

fn format_summary(results: &[RetrieveResultItem], query: &str) -> String {
    if results.is_empty() {
        return format!("No relevant passages found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} passage{} for \"{query}\":",
        results.len(),
        suffix
    ));

    for item in results {
        lines.push(format!(
            "{}. {:.4} {} (page {})",
            item.rank, item.score, item.source_file, item.page
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(context: RagContext) -> error::Result<()> {
    let server = BrochureMcpServer::new(context);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
