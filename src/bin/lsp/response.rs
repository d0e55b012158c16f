//! Handle incoming responses to our requests, grounded on the
//! teacher's `server-merlin::response`: the only response we ever expect is
//! the client's answer to our `workspace/configuration` pull.

use lsp_server;
use std::sync::Arc;

use super::logger;

pub fn handle_response(connection: &lsp_server::Connection, resp: lsp_server::Response, tools: &mut super::Tools) {
    match resp.id.to_string().as_str() {
        "\"snes65816-pull-config\"" => match super::parse_configuration(resp) {
            Ok(config) => {
                tools.config = config.clone();
                if let Ok(mut analyzer) = tools.analyzer.lock() {
                    analyzer.set_settings(config);
                }
                for chkpt in tools.doc_chkpts.values() {
                    let handle = super::launch_analysis_thread(Arc::clone(&tools.analyzer), chkpt.get_doc());
                    tools.thread_handles.push_back(handle);
                }
            }
            Err(_) => logger(connection, "could not parse config"),
        },
        "\"snes65816-reg-config\"" => {
            logger(connection, "registration response was received");
        }
        s => {
            logger(connection, &format!("unhandled response: {}", s));
        }
    }
}
