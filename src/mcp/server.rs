use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ListResourceTemplatesResult, ListResourcesResult,
        PaginatedRequestParams, ProtocolVersion, RawResource, RawResourceTemplate,
        ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents,
        ResourceTemplate, ServerCapabilities, ServerInfo,
    },
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde::Serialize;

use crate::adapters::extract::{self, ExtractContext};
use crate::adapters::http::{fetch_jobs, job_id_from_url, job_url};
use crate::config::types::ScraperConfig;
use crate::domain::{Field, JobRecord};
use crate::ports::diagnostics::DiagnosticsSink;
use crate::ports::job_source::JobSource;

// ---------- Resource Store ----------

/// Job records produced by tool calls, exposed as MCP resources.
/// Keys are URIs like `upwork://job/01abc`, values are record JSON.
#[derive(Clone, Default)]
pub struct ResourceStore {
    entries: Arc<RwLock<HashMap<String, ResourceEntry>>>,
}

#[derive(Clone)]
struct ResourceEntry {
    name: String,
    text: String,
}

impl ResourceStore {
    async fn insert(&self, uri: impl Into<String>, name: impl Into<String>, text: String) {
        self.entries.write().await.insert(
            uri.into(),
            ResourceEntry {
                name: name.into(),
                text,
            },
        );
    }

    async fn get(&self, uri: &str) -> Option<ResourceEntry> {
        self.entries.read().await.get(uri).cloned()
    }

    async fn list(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(uri, entry)| (uri.clone(), entry.name.clone()))
            .collect()
    }

    async fn remember(&self, record: &JobRecord, text: &str) {
        let id = record.get_str(Field::JobId).unwrap_or("0");
        let title = record.get_str(Field::Title).unwrap_or("Untitled job");
        self.insert(
            format!("upwork://job/{id}"),
            format!("Job {id}: {title}"),
            text.to_string(),
        )
        .await;
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore").finish()
    }
}

// ---------- Tool parameter types ----------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ExtractJobToolParams {
    /// Full HTML of an Upwork job page (or a bare __NUXT_DATA__ JSON array)
    pub html: String,
    /// Job identifier to stamp on the record (default: taken from `url`, else "0")
    pub job_id: Option<String>,
    /// Page URL, used for the `url` field and to derive the job id
    pub url: Option<String>,
    /// Whether the page was captured by a logged-in session (default: server setting)
    pub authenticated: Option<bool>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct JobDetailsToolParams {
    /// Job URL (e.g. "https://www.upwork.com/jobs/~01abc") or bare job id ("~01abc")
    pub url: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct JobsBatchToolParams {
    /// Job URLs or ids to fetch concurrently
    pub urls: Vec<String>,
}

fn to_json_text(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize result: {e}"))
}

// ---------- MCP Server ----------

#[derive(Clone)]
pub struct UpworkMcpServer {
    source: Arc<dyn JobSource>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    config: Arc<ScraperConfig>,
    tool_router: ToolRouter<Self>,
    resources: ResourceStore,
}

impl std::fmt::Debug for UpworkMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpworkMcpServer")
            .field("base_url", &self.config.base_url)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

#[tool_router]
impl UpworkMcpServer {
    pub fn new(
        source: Arc<dyn JobSource>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        config: ScraperConfig,
    ) -> Self {
        Self {
            source,
            diagnostics,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
            resources: ResourceStore::default(),
        }
    }

    /// Extract a job record from HTML the caller already has.
    #[tool(
        name = "upwork_extract_job",
        description = "Extract a structured job record from the HTML of an Upwork job page. Reads the embedded page state first, then the rendered markup, then the raw __NUXT_DATA__ payload. Returns a JSON object with every known field; fields that could not be found are null. No network access.",
        annotations(read_only_hint = true, open_world_hint = false)
    )]
    async fn upwork_extract_job(
        &self,
        Parameters(params): Parameters<ExtractJobToolParams>,
    ) -> Result<CallToolResult, McpError> {
        let job_id = params
            .job_id
            .clone()
            .or_else(|| params.url.as_deref().map(job_id_from_url))
            .unwrap_or_else(|| "0".to_string());
        let ctx = ExtractContext {
            job_id: &job_id,
            authenticated: params.authenticated.unwrap_or(self.config.authenticated),
            origin: &self.config.base_url,
            diagnostics: self.diagnostics.as_ref(),
        };

        let mut record = match extract::extract(&params.html, &ctx) {
            Ok(record) => record,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to extract job '{job_id}': {e}. Pass the complete page HTML."
                ))]));
            }
        };
        if let Some(url) = params.url {
            record.set(Field::Url, url);
        }

        match to_json_text(&record) {
            Ok(text) => {
                self.resources.remember(&record, &text).await;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(msg) => Ok(CallToolResult::error(vec![Content::text(msg)])),
        }
    }

    /// Fetch one job page and extract its record.
    #[tool(
        name = "upwork_job_details",
        description = "Fetch an Upwork job page by URL or job id and extract its structured record: title, description, pricing (hourly range or fixed budget), skills, client history, and activity counters. Returns a JSON object; missing fields are null.",
        annotations(read_only_hint = true, open_world_hint = true)
    )]
    async fn upwork_job_details(
        &self,
        Parameters(params): Parameters<JobDetailsToolParams>,
    ) -> Result<CallToolResult, McpError> {
        let url = match job_url(&self.config.base_url, &params.url) {
            Ok(url) => url,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Invalid job reference '{}': {e}. Use a job URL or an id like '~01abc'.",
                    params.url
                ))]));
            }
        };

        match self.source.fetch_job(&url).await {
            Ok(record) => match to_json_text(&record) {
                Ok(text) => {
                    self.resources.remember(&record, &text).await;
                    Ok(CallToolResult::success(vec![Content::text(text)]))
                }
                Err(msg) => Ok(CallToolResult::error(vec![Content::text(msg)])),
            },
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Failed to get job '{url}': {e}. The posting may be closed or private."
            ))])),
        }
    }

    /// Fetch many job pages concurrently.
    #[tool(
        name = "upwork_jobs_batch",
        description = "Fetch and extract several Upwork job pages concurrently. Returns a JSON object with `records` (one per successful job, in completion order) and `failures` (url and error for each job that could not be fetched).",
        annotations(read_only_hint = true, open_world_hint = true)
    )]
    async fn upwork_jobs_batch(
        &self,
        Parameters(params): Parameters<JobsBatchToolParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.urls.is_empty() {
            return Ok(CallToolResult::error(vec![Content::text(
                "No job URLs given. Pass at least one URL or job id.",
            )]));
        }

        let mut urls = Vec::with_capacity(params.urls.len());
        let mut rejected = Vec::new();
        for input in params.urls {
            match job_url(&self.config.base_url, &input) {
                Ok(url) => urls.push(url),
                Err(e) => rejected.push(crate::adapters::http::BatchFailure {
                    url: input,
                    error: e.to_string(),
                }),
            }
        }

        let mut outcome =
            fetch_jobs(Arc::clone(&self.source), urls, self.config.max_concurrency).await;
        outcome.failures.extend(rejected);

        for record in &outcome.records {
            if let Ok(text) = to_json_text(record) {
                self.resources.remember(record, &text).await;
            }
        }

        match to_json_text(&outcome) {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(msg) => Ok(CallToolResult::error(vec![Content::text(msg)])),
        }
    }
}

#[tool_handler]
impl ServerHandler for UpworkMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Upwork MCP server for turning job pages into structured job records.\n\
                 \n\
                 ## Tools\n\
                 - upwork_job_details: fetch one job by URL or id (e.g. ~01abc) and extract it\n\
                 - upwork_jobs_batch: fetch many jobs concurrently; failures are listed separately\n\
                 - upwork_extract_job: extract from page HTML you already have (no network)\n\
                 \n\
                 ## Records\n\
                 Every record has the same keys in the same order; unknown values are null. \
                 `type` is \"Hourly\" or \"Fixed-price\". Hourly jobs carry hourly_min/hourly_max \
                 with fixed_budget_amount 0; fixed-price jobs the reverse.\n\
                 \n\
                 ## Resources\n\
                 Extracted records are kept as MCP resources under upwork://job/{id}."
                    .into(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let entries = self.resources.list().await;
        let resources: Vec<Resource> = entries
            .into_iter()
            .map(|(uri, name)| Resource {
                annotations: None,
                raw: RawResource {
                    uri,
                    name,
                    title: None,
                    description: None,
                    mime_type: Some("application/json".into()),
                    size: None,
                    icons: None,
                    meta: None,
                },
            })
            .collect();
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let templates = vec![ResourceTemplate {
            annotations: None,
            raw: RawResourceTemplate {
                uri_template: "upwork://job/{id}".into(),
                name: "Upwork Job".into(),
                title: Some("Job record".into()),
                description: Some(
                    "Extracted job record (via upwork_job_details, upwork_jobs_batch or upwork_extract_job)"
                        .into(),
                ),
                mime_type: Some("application/json".into()),
                icons: None,
            },
        }];
        Ok(ListResourceTemplatesResult {
            resource_templates: templates,
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match self.resources.get(&request.uri).await {
            Some(entry) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(entry.text, request.uri)],
            }),
            None => Err(McpError::resource_not_found(
                format!("resource not found: {}", request.uri),
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::diagnostics::NoopDiagnostics;
    use crate::error::UpworkError;
    use crate::test_helpers::*;
    use serde_json::Value;

    fn extract_text(result: &CallToolResult) -> &str {
        result.content[0]
            .raw
            .as_text()
            .expect("expected text content")
            .text
            .as_str()
    }

    fn make_server(mock: MockJobSource) -> UpworkMcpServer {
        UpworkMcpServer::new(
            Arc::new(mock),
            Arc::new(NoopDiagnostics),
            ScraperConfig::default(),
        )
    }

    #[tokio::test]
    async fn extract_job_returns_full_record() {
        let server = make_server(MockJobSource::new());
        let result = server
            .upwork_extract_job(Parameters(ExtractJobToolParams {
                html: nuxt_state_page("Rust API"),
                job_id: None,
                url: Some("https://www.upwork.com/jobs/Rust-API_~01feed".into()),
                authenticated: None,
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        let json: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(json["title"], "Rust API");
        assert_eq!(json["job_id"], "01feed");
        assert_eq!(json["type"], "Hourly");
        assert_eq!(json["hourly_min"], 30);
        assert_eq!(json["fixed_budget_amount"], 0);
        assert_eq!(json["client_country"], "Germany");
        assert!(json["connects_required"].is_null());
        assert_eq!(json.as_object().unwrap().len(), Field::COUNT);
    }

    #[tokio::test]
    async fn extract_job_rejects_empty_html() {
        let server = make_server(MockJobSource::new());
        let result = server
            .upwork_extract_job(Parameters(ExtractJobToolParams {
                html: "   ".into(),
                job_id: Some("01abc".into()),
                url: None,
                authenticated: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(extract_text(&result).contains("01abc"));
    }

    #[tokio::test]
    async fn job_details_accepts_bare_id() {
        let server = make_server(MockJobSource::new());
        let result = server
            .upwork_job_details(Parameters(JobDetailsToolParams {
                url: "~01abc".into(),
            }))
            .await
            .unwrap();
        let json: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(json["url"], "https://www.upwork.com/jobs/~01abc");
        assert_eq!(json["job_id"], "01abc");

        let stored = server.resources.get("upwork://job/01abc").await;
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn job_details_reports_errors() {
        let mock = MockJobSource::new().with_fetch(|_| Err(UpworkError::RateLimited));
        let server = make_server(mock);
        let result = server
            .upwork_job_details(Parameters(JobDetailsToolParams {
                url: "https://www.upwork.com/jobs/~01abc".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(extract_text(&result).contains("Rate limit"));
    }

    #[tokio::test]
    async fn job_details_rejects_bad_reference() {
        let server = make_server(MockJobSource::new());
        let result = server
            .upwork_job_details(Parameters(JobDetailsToolParams {
                url: "not a job".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn batch_lists_records_and_failures() {
        let mock = MockJobSource::new().with_fetch(|url| {
            if url.ends_with("~02") {
                Err(UpworkError::JobNotFound { id: "02".into() })
            } else {
                Ok(make_job_record(url, "Batch job"))
            }
        });
        let server = make_server(mock);
        let result = server
            .upwork_jobs_batch(Parameters(JobsBatchToolParams {
                urls: vec!["~01".into(), "~02".into(), "bad ref".into()],
            }))
            .await
            .unwrap();
        let json: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(json["records"].as_array().unwrap().len(), 1);
        assert_eq!(json["failures"].as_array().unwrap().len(), 2);
        assert_eq!(json["records"][0]["title"], "Batch job");
    }

    #[tokio::test]
    async fn batch_requires_urls() {
        let server = make_server(MockJobSource::new());
        let result = server
            .upwork_jobs_batch(Parameters(JobsBatchToolParams { urls: vec![] }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn server_info_advertises_tools_and_resources() {
        let server = make_server(MockJobSource::new());
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.instructions.unwrap().contains("upwork_job_details"));
    }
}
