//! Handle incoming notifications, grounded on the teacher's
//! `server-applesoft::notification` dispatch, with `didChange` queuing a
//! debounced edit instead of launching analysis immediately.

use lsp_types as lsp;
use lsp::{notification::Notification, NumberOrString};
use lsp_server;
use serde_json;

use snes65816::lang::asm::checkpoint::CheckpointManager;
use snes65816::lang::normalize_client_uri;
use snes65816::lang::Document;

use super::logger;

pub fn handle_notification(connection: &lsp_server::Connection, note: lsp_server::Notification, tools: &mut super::Tools) {
    match note.method.as_str() {
        lsp::notification::DidChangeConfiguration::METHOD => {
            if super::request_configuration(connection).is_err() {
                logger(connection, "request for configuration failed");
            }
        }
        lsp::notification::DidOpenTextDocument::METHOD => {
            if let Ok(params) = serde_json::from_value::<lsp::DidOpenTextDocumentParams>(note.params) {
                let uri = normalize_client_uri(params.text_document.uri);
                let doc = Document::new(uri.clone(), params.text_document.text, Some(params.text_document.version));
                let mut chkpt = CheckpointManager::new();
                chkpt.update_doc(doc.clone(), 0);
                tools.doc_chkpts.insert(uri.to_string(), chkpt);
                tools.queue_analysis(doc);
            }
        }
        lsp::notification::DidCloseTextDocument::METHOD => {
            if let Ok(params) = serde_json::from_value::<lsp::DidCloseTextDocumentParams>(note.params) {
                let uri = normalize_client_uri(params.text_document.uri);
                tools.doc_chkpts.remove(&uri.to_string());
                tools.pending.remove(&uri.to_string());
            }
        }
        lsp::notification::DidChangeTextDocument::METHOD => {
            if let Ok(params) = serde_json::from_value::<lsp::DidChangeTextDocumentParams>(note.params) {
                let uri = normalize_client_uri(params.text_document.uri);
                for change in params.content_changes {
                    // full-document sync only, so there's exactly one change
                    let doc = Document::new(uri.clone(), change.text, Some(params.text_document.version));
                    if let Some(chkpt) = tools.doc_chkpts.get_mut(&uri.to_string()) {
                        chkpt.update_doc(doc.clone(), 0);
                    }
                    tools.queue_analysis(doc);
                }
            }
        }
        lsp::notification::Cancel::METHOD => {
            if let Ok(params) = serde_json::from_value::<lsp::CancelParams>(note.params) {
                let id = match params.id {
                    NumberOrString::Number(id) => lsp_server::RequestId::from(id),
                    NumberOrString::String(s) => lsp_server::RequestId::from(s),
                };
                logger(connection, &format!("request {} was canceled", id));
            }
        }
        lsp::notification::SetTrace::METHOD => {
            logger(connection, "ignoring the SetTrace notification");
        }
        lsp::notification::DidChangeWatchedFiles::METHOD => {
            logger(connection, "ignoring the DidChangeWatchedFiles notification");
        }
        which_method => {
            logger(connection, &format!("unhandled notification {}", which_method));
        }
    }
}
