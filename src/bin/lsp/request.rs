//! Provide our response to incoming requests, grounded on the
//! teacher's `server-merlin::request` dispatch: build a `chkpts` map once,
//! then hand off to the default `Checkpoint::*_response` helpers for every
//! feature the checkpoint/hover/completion/tokens providers implement.

use lsp_types as lsp;
use lsp::request::Request;
use lsp_server::{Connection, RequestId, Response};
use serde_json;
use std::collections::HashMap;
use std::sync::Arc;

use snes65816::lang::asm::AsmError;
use snes65816::lang::normalize_client_uri;
use snes65816::lang::server::Checkpoint;

use super::logger;
use super::rpc_error::PARSE_ERROR;

fn def_response(req_id: RequestId, meth: &str) -> Response {
    Response::new_err(req_id.clone(), PARSE_ERROR, format!("request {} ({}) not understood", req_id, meth))
}

/// Returns true if there was a shutdown request.
pub fn handle_request(connection: &Connection, req: lsp_server::Request, tools: &mut super::Tools) -> bool {
    let mut resp = def_response(req.id.clone(), &req.method);
    let mut chkpts = HashMap::new();
    for (k, v) in &tools.doc_chkpts {
        chkpts.insert(k.to_string(), Arc::new(v));
    }

    match req.method.as_str() {
        lsp::request::GotoDeclaration::METHOD => Checkpoint::goto_dec_response(chkpts, req.clone(), &mut resp),
        lsp::request::GotoDefinition::METHOD => Checkpoint::goto_def_response(chkpts, req.clone(), &mut resp),
        lsp::request::DocumentSymbolRequest::METHOD => Checkpoint::symbol_response(chkpts, req.clone(), &mut resp),
        lsp::request::References::METHOD => Checkpoint::goto_ref_response(chkpts, req.clone(), &mut resp),
        lsp::request::Rename::METHOD => Checkpoint::rename_response(chkpts, req.clone(), &mut resp),
        lsp::request::FoldingRangeRequest::METHOD => Checkpoint::folding_range_response(chkpts, req.clone(), &mut resp),
        lsp::request::InlayHintRequest::METHOD => Checkpoint::inlay_hint_response(chkpts, req.clone(), &mut resp),
        lsp::request::SignatureHelpRequest::METHOD => Checkpoint::signature_help_response(chkpts, req.clone(), &mut resp),
        lsp::request::HoverRequest::METHOD => Checkpoint::hover_response(chkpts, &mut tools.hover_provider, req.clone(), &mut resp),
        lsp::request::Completion::METHOD => Checkpoint::completion_response(chkpts, &mut tools.completion_provider, req.clone(), &mut resp),
        lsp::request::SemanticTokensFullRequest::METHOD => Checkpoint::sem_tok_response(chkpts, &mut tools.highlighter, req.clone(), &mut resp),

        lsp::request::Shutdown::METHOD => {
            logger(connection, "shutdown request");
            resp = Response::new_ok(req.id.clone(), ());
            connection.sender.send(resp.into()).expect("failed to respond to shutdown request");
            connection.receiver.recv_timeout(std::time::Duration::from_secs(30)).expect("failure while pausing");
            return true;
        }

        lsp::request::ExecuteCommand::METHOD => {
            if let Ok(params) = serde_json::from_value::<lsp::ExecuteCommandParams>(req.params) {
                match params.command.as_str() {
                    "snes65816.rescan" => {
                        if params.arguments.len() == 1 {
                            if let Ok(uri) = serde_json::from_value::<String>(params.arguments[0].clone()) {
                                if let Ok(parsed) = uri.parse::<lsp::Uri>() {
                                    let normalized = normalize_client_uri(parsed);
                                    if let Some(chk) = tools.doc_chkpts.get(&normalized.to_string()) {
                                        let handle = super::launch_analysis_thread(Arc::clone(&tools.analyzer), chk.get_doc());
                                        tools.thread_handles.push_back(handle);
                                    }
                                }
                            }
                        }
                        resp = Response::new_ok(req.id.clone(), serde_json::Value::Null);
                    }
                    "snes65816.debugger.readByte" => {
                        if params.arguments.len() == 1 {
                            resp = match parse_addr_arg(&params.arguments[0]) {
                                Some(addr) => match tools.debugger.read_byte(addr) {
                                    Ok(byte) => Response::new_ok(req.id.clone(), byte as i64),
                                    Err(e) => Response::new_err(req.id.clone(), PARSE_ERROR, debugger_error_message(&e)),
                                },
                                None => Response::new_err(req.id.clone(), PARSE_ERROR, "bad address argument".to_string()),
                            };
                        }
                    }
                    _ => {
                        logger(connection, &format!("unhandled command {}", params.command));
                    }
                }
            }
        }

        _ => {
            logger(connection, &format!("unhandled request: {}", req.method));
        }
    }

    if connection.sender.send(lsp_server::Message::Response(resp)).is_err() {
        logger(connection, &format!("could not send response to {}", req.method));
    }
    false
}

fn parse_addr_arg(v: &serde_json::Value) -> Option<u32> {
    if let Some(n) = v.as_u64() {
        return Some(n as u32);
    }
    let s = v.as_str()?;
    let s = s.trim_start_matches('$').trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).ok()
}

fn debugger_error_message(e: &AsmError) -> String {
    e.to_string()
}
