//! Language server backend
//!
//! One backend serves one workspace through the shared [`RefactorEngine`].
//! Open buffers are tracked so edits are never computed against text the
//! user has changed but not saved.

use crate::actions::{self, APPLY_COMMAND};
use crate::commands::{Apply, Work};
use crate::convert::{path_of, rpc_error, workspace_edit};
use crate::navigation;
use dashmap::DashMap;
use refit_config::logging::request_span;
use refit_foundation::{PlanOptions, RefactoringPlan, RefitError, RefitResult};
use refit_services::RefactorEngine;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn, Instrument};

pub struct Backend {
    client: Client,
    engine: Arc<RefactorEngine>,
    /// Open buffers (uri -> current text)
    documents: DashMap<Url, String>,
}

impl Backend {
    pub fn new(client: Client, engine: Arc<RefactorEngine>) -> Self {
        Self {
            client,
            engine,
            documents: DashMap::new(),
        }
    }

    /// Open buffers whose text differs from the engine's snapshot
    async fn unsaved(&self) -> Vec<PathBuf> {
        let buffers: Vec<(PathBuf, String)> = self
            .documents
            .iter()
            .filter_map(|entry| Some((path_of(entry.key())?, entry.value().clone())))
            .collect();
        self.engine
            .read(|ws| {
                buffers
                    .into_iter()
                    .filter(|(path, text)| ws.file(path).is_some_and(|f| &f.content != text))
                    .map(|(path, _)| path)
                    .collect()
            })
            .await
    }

    /// Refuse plans touching files with unsaved edits
    async fn check_saved(&self, plan: &RefactoringPlan) -> RefitResult<()> {
        let dirty: Vec<PathBuf> = self
            .unsaved()
            .await
            .into_iter()
            .filter(|path| plan.affected_files.contains(path))
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = dirty.iter().map(|p| p.display().to_string()).collect();
        Err(RefitError::conflict(
            format!("save these files first: {}", names.join(", ")),
            Vec::new(),
        ))
    }

    async fn rename_plan(&self, params: &RenameParams) -> RefitResult<WorkspaceEdit> {
        let doc = &params.text_document_position;
        let path = path_of(&doc.text_document.uri)
            .ok_or_else(|| RefitError::usage(format!("not a file URI: {}", doc.text_document.uri)))?;
        let request = self
            .engine
            .read(|ws| navigation::rename_request(ws, &path, doc.position, &params.new_name))
            .await?;
        let options = PlanOptions::default();
        let plan = self.engine.plan(request, options).await?;
        self.engine.validate_plan(&plan, &options).await?;
        self.check_saved(&plan).await?;
        self.engine.read(|ws| workspace_edit(ws, &plan)).await
    }

    async fn apply(&self, apply: Apply) -> RefitResult<Value> {
        let plan = match apply.work {
            Work::Single(request) => self.engine.plan(request, apply.options).await?,
            Work::Batch(requests) => self.engine.plan_batch(requests, apply.options).await?,
        };
        if apply.dry_run {
            let preview = self.engine.preview_plan(&plan).await?;
            return Ok(json!({ "plan": plan, "preview": preview }));
        }
        self.check_saved(&plan).await?;
        let result = self.engine.execute_plan(&plan, apply.options).await?;
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "refit: {} modified {} and created {} files",
                    result.operation,
                    result.modified_files.len(),
                    result.created_files.len()
                ),
            )
            .await;
        Ok(serde_json::to_value(result)?)
    }
}

fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(false),
                })),
                ..Default::default()
            },
        )),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        references_provider: Some(OneOf::Left(true)),
        rename_provider: Some(OneOf::Right(RenameOptions {
            prepare_provider: Some(true),
            work_done_progress_options: WorkDoneProgressOptions::default(),
        })),
        code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
            code_action_kinds: Some(actions::advertised_kinds()),
            work_done_progress_options: WorkDoneProgressOptions::default(),
            resolve_provider: None,
        })),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![APPLY_COMMAND.to_string()],
            work_done_progress_options: WorkDoneProgressOptions::default(),
        }),
        ..Default::default()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    #[allow(deprecated)]
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let requested = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| folder.uri.clone())
            .or(params.root_uri);

        if let Some(root) = requested.as_ref().and_then(path_of) {
            let current = self.engine.read(|ws| ws.root.clone()).await;
            if root != current {
                info!(root = %root.display(), "Loading workspace requested by client");
                self.engine.load_workspace(&root).await.map_err(rpc_error)?;
            }
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "refit".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: capabilities(),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let summary = self.engine.summary().await;
        info!(
            root = %summary.root.display(),
            packages = summary.packages,
            files = summary.files,
            "Editor server initialized"
        );
        self.client
            .log_message(
                MessageType::INFO,
                format!("refit ready: {} packages, {} files", summary.packages, summary.files),
            )
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Editor server shutting down");
        self.engine.cancellation_token().cancel();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        debug!(uri = %params.text_document.uri, "did_open");
        self.documents
            .insert(params.text_document.uri, params.text_document.text);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change holds the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.insert(params.text_document.uri, change.text);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!(%uri, "did_save");
        if let Some(text) = params.text {
            self.documents.insert(uri, text);
        }
        if let Err(e) = self.engine.reload().await {
            warn!(error = %e, "Workspace reload after save failed");
            self.client
                .log_message(MessageType::WARNING, format!("refit: reload failed: {}", e))
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let doc = params.text_document_position_params;
        let Some(path) = path_of(&doc.text_document.uri) else {
            return Ok(None);
        };
        Ok(self
            .engine
            .read(|ws| navigation::hover(ws, &path, doc.position))
            .await)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let doc = params.text_document_position_params;
        let Some(path) = path_of(&doc.text_document.uri) else {
            return Ok(None);
        };
        Ok(self
            .engine
            .read(|ws| navigation::definition(ws, &path, doc.position))
            .await)
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let doc = params.text_document_position;
        let Some(path) = path_of(&doc.text_document.uri) else {
            return Ok(None);
        };
        let include_declaration = params.context.include_declaration;
        let found = self
            .engine
            .read(|ws| navigation::references(ws, &path, doc.position, include_declaration))
            .await;
        match found {
            Ok(locations) if locations.is_empty() => Ok(None),
            Ok(locations) => Ok(Some(locations)),
            Err(e) => {
                debug!(error = %e, "No references");
                Ok(None)
            }
        }
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let Some(path) = path_of(&params.text_document.uri) else {
            return Ok(None);
        };
        let range = params.range;
        let found = self
            .engine
            .read(|ws| actions::code_actions(ws, &path, range))
            .await;
        let found = actions::filter_only(found, params.context.only.as_deref());
        debug!(uri = %params.text_document.uri, actions = found.len(), "code_action");
        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            found.into_iter().map(CodeActionOrCommand::CodeAction).collect(),
        ))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let Some(path) = path_of(&params.text_document.uri) else {
            return Ok(None);
        };
        let range = self
            .engine
            .read(|ws| navigation::prepare_rename(ws, &path, params.position))
            .await;
        Ok(range.map(PrepareRenameResponse::Range))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let span = request_span("rename", "lsp");
        let edit = self.rename_plan(&params).instrument(span).await.map_err(rpc_error)?;
        Ok(Some(edit))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        if params.command != APPLY_COMMAND {
            return Err(rpc_error(RefitError::usage(format!(
                "unknown command '{}'",
                params.command
            ))));
        }
        let apply = Apply::parse(params.arguments).map_err(rpc_error)?;
        let span = request_span(apply.operation(), "lsp");
        let value = self.apply(apply).instrument(span).await.map_err(rpc_error)?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refit_config::AppConfig;
    use refit_workspace::Workspace;
    use tower_lsp::LspService;

    const LIB: &str = "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc Twice(x int) int {\n\treturn Add(x, x)\n}\n";

    fn service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
        let ws = Workspace::from_sources(
            "/ws",
            Some("example.com/m"),
            [(PathBuf::from("p/p.go"), LIB.to_string())],
        );
        let engine = Arc::new(RefactorEngine::new(ws, AppConfig::default()));
        LspService::new(move |client| Backend::new(client, engine))
    }

    fn at(line: u32, character: u32) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier {
                uri: Url::parse("file:///ws/p/p.go").unwrap(),
            },
            position: Position::new(line, character),
        }
    }

    #[tokio::test]
    async fn test_initialize_advertises_refactorings() {
        let (service, _socket) = service();
        let result = service
            .inner()
            .initialize(InitializeParams::default())
            .await
            .unwrap();
        let caps = result.capabilities;
        assert_eq!(
            caps.rename_provider,
            Some(OneOf::Right(RenameOptions {
                prepare_provider: Some(true),
                work_done_progress_options: WorkDoneProgressOptions::default(),
            }))
        );
        let Some(CodeActionProviderCapability::Options(options)) = caps.code_action_provider else {
            panic!("expected code action options");
        };
        assert!(options
            .code_action_kinds
            .unwrap()
            .contains(&CodeActionKind::new("refactor.safe.delete")));
        assert_eq!(
            caps.execute_command_provider.unwrap().commands,
            vec![APPLY_COMMAND.to_string()]
        );
    }

    #[tokio::test]
    async fn test_rename_returns_workspace_edit() {
        let (service, _socket) = service();
        let edit = service
            .inner()
            .rename(RenameParams {
                text_document_position: at(5, 9),
                new_name: "Sum".to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .unwrap()
            .unwrap();
        let changes = edit.changes.unwrap();
        let edits = &changes[&Url::parse("file:///ws/p/p.go").unwrap()];
        assert_eq!(edits.len(), 2);
        assert!(edits.iter().all(|e| e.new_text == "Sum"));
    }

    #[tokio::test]
    async fn test_rename_to_invalid_identifier_is_rejected() {
        let (service, _socket) = service();
        let err = service
            .inner()
            .rename(RenameParams {
                text_document_position: at(5, 9),
                new_name: "1bad".to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, tower_lsp::jsonrpc::ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_unsaved_buffer_blocks_rename() {
        let (service, _socket) = service();
        let backend = service.inner();
        backend
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: Url::parse("file:///ws/p/p.go").unwrap(),
                    language_id: "go".to_string(),
                    version: 1,
                    text: format!("{}// edited\n", LIB),
                },
            })
            .await;
        let err = backend
            .rename(RenameParams {
                text_document_position: at(5, 9),
                new_name: "Sum".to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.data.unwrap()["kind"], "conflict");
    }
}
