//! Loopback stand-in for auth, workspace, handle service, callback server and Shock.
//!
//! Every service lives under one listener at a different path prefix. Each
//! connection serves one request and closes.

use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader, Cursor, Read, Write},
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

use md5::{Digest, Md5};
use serde_json::{Value, json};

pub const GOOD_TOKEN: &str = "good-token";
pub const USER_ID: &str = "tester";
pub const ARCHIVE_NAME: &str = "quast_results.zip";

#[derive(Debug, Clone)]
pub struct StoredNode {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub md5: String,
}

/// Observable server state; tests read it and flip the behaviour knobs.
#[derive(Debug, Default)]
pub struct State {
    pub nodes: BTreeMap<String, StoredNode>,
    pub handles: BTreeMap<String, Value>,
    pub workspaces: BTreeMap<u64, String>,
    pub deleted_nodes: Vec<String>,
    pub deleted_hids: Vec<String>,
    /// Handle records exactly as delete_handles received them.
    pub deleted_handle_records: Vec<Value>,
    pub deleted_workspaces: Vec<u64>,
    pub run_quast_calls: usize,
    pub staging_calls: usize,
    /// run_QUAST answers with this JSON-RPC error message.
    pub fail_runs: Option<String>,
    /// hids_to_handles reports this url instead of the stored one.
    pub resolved_url_override: Option<String>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone)]
struct Handler {
    base_url: String,
    archive: Arc<Vec<u8>>,
    state: Arc<Mutex<State>>,
}

pub struct FakeKbase {
    handler: Handler,
}

impl FakeKbase {
    /// Start serving; run_QUAST will store a zip holding `entries`.
    pub fn start(entries: &[(&str, &[u8])]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake services");
        let addr = listener.local_addr().expect("local addr");
        let handler = Handler {
            base_url: format!("http://{addr}"),
            archive: Arc::new(build_zip(entries)),
            state: Arc::new(Mutex::new(State::default())),
        };
        let server = handler.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let server = server.clone();
                thread::spawn(move || server.serve(stream));
            }
        });
        Self { handler }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.handler.lock()
    }

    pub fn archive_len(&self) -> u64 {
        self.handler.archive.len() as u64
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.handler.base_url)
    }

    pub fn workspace_url(&self) -> String {
        format!("{}/ws", self.handler.base_url)
    }

    pub fn handle_url(&self) -> String {
        format!("{}/handle", self.handler.base_url)
    }

    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.handler.base_url)
    }

    pub fn shock_url(&self) -> String {
        self.handler.shock_url()
    }
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

struct Request {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    body: Vec<u8>,
}

struct Response {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }
}

impl Handler {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn shock_url(&self) -> String {
        format!("{}/shock", self.base_url)
    }

    fn serve(&self, stream: TcpStream) {
        let response = match read_request(&stream) {
            Ok(request) => self.route(&request),
            Err(err) => Response::json(400, json!({ "error": err.to_string() })),
        };
        let _ = write_response(&stream, &response);
    }

    fn route(&self, req: &Request) -> Response {
        match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/auth") => self.auth(req),
            ("POST", "/ws" | "/handle" | "/callback") => self.rpc(req),
            (method, path) if path.starts_with("/shock/node/") => {
                self.shock(method, &path["/shock/node/".len()..], req)
            }
            _ => Response::json(404, json!({ "error": "no route" })),
        }
    }

    fn auth(&self, req: &Request) -> Response {
        let body = String::from_utf8_lossy(&req.body);
        let token = body
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "token")
            .map(|(_, value)| value.to_string());
        if token.as_deref() == Some(GOOD_TOKEN) {
            Response::json(200, json!({ "user_id": USER_ID }))
        } else {
            Response::json(401, json!({ "error": "Invalid token" }))
        }
    }

    fn rpc(&self, req: &Request) -> Response {
        let call: Value = match serde_json::from_slice(&req.body) {
            Ok(call) => call,
            Err(err) => return rpc_error(Value::Null, &err.to_string()),
        };
        let id = call["id"].clone();
        if req.authorization.as_deref() != Some(GOOD_TOKEN) {
            return rpc_error(id, "Token validation failed");
        }
        let method = call["method"].as_str().unwrap_or_default();
        let params = &call["params"][0];
        let result = match (req.path.as_str(), method) {
            ("/ws", "Workspace.create_workspace") => self.create_workspace(params),
            ("/ws", "Workspace.delete_workspace") => self.delete_workspace(params),
            ("/handle", "AbstractHandle.hids_to_handles") => self.hids_to_handles(params),
            ("/handle", "AbstractHandle.delete_handles") => self.delete_handles(params),
            ("/callback", "kb_quast.run_QUAST") => self.run_quast(params),
            ("/callback", "DataFileUtil.shock_to_file") => self.shock_to_file(params),
            (path, method) => Err(format!("No method {method} at {path}")),
        };
        match result {
            Ok(result) => Response::json(
                200,
                json!({ "version": "1.1", "id": id, "result": result }),
            ),
            Err(message) => rpc_error(id, &message),
        }
    }

    fn create_workspace(&self, params: &Value) -> Result<Value, String> {
        let name = params["workspace"].as_str().ok_or("workspace name required")?;
        let mut state = self.lock();
        if state.workspaces.values().any(|existing| existing == name) {
            return Err(format!("Workspace {name} already exists"));
        }
        let id = state.next_id();
        state.workspaces.insert(id, name.to_string());
        Ok(json!([[id, name, USER_ID, "2026-01-01T00:00:00+0000", 0, "a", "n", "unlocked", {}]]))
    }

    fn delete_workspace(&self, params: &Value) -> Result<Value, String> {
        let id = params["id"].as_u64().ok_or("workspace id required")?;
        let mut state = self.lock();
        if state.workspaces.remove(&id).is_none() {
            return Err(format!("No workspace with id {id} exists"));
        }
        state.deleted_workspaces.push(id);
        Ok(json!([]))
    }

    fn hids_to_handles(&self, params: &Value) -> Result<Value, String> {
        let hids = params.as_array().ok_or("hid list required")?;
        let state = self.lock();
        let handles: Vec<Value> = hids
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|hid| state.handles.get(hid).cloned())
            .map(|mut handle| {
                if let Some(url) = &state.resolved_url_override {
                    handle["url"] = json!(url);
                }
                handle
            })
            .collect();
        Ok(json!([handles]))
    }

    fn delete_handles(&self, params: &Value) -> Result<Value, String> {
        let handles = params.as_array().ok_or("handle list required")?;
        let mut state = self.lock();
        let mut deleted = 0;
        state.deleted_handle_records.extend(handles.iter().cloned());
        for hid in handles.iter().filter_map(|handle| handle["hid"].as_str()) {
            if state.handles.remove(hid).is_some() {
                state.deleted_hids.push(hid.to_string());
                deleted += 1;
            }
        }
        Ok(json!([deleted]))
    }

    fn run_quast(&self, params: &Value) -> Result<Value, String> {
        let mut state = self.lock();
        state.run_quast_calls += 1;
        if let Some(message) = &state.fail_runs {
            return Err(message.clone());
        }
        let files = params["files"].as_array().ok_or("files required")?;
        for file in files {
            let path = file["path"].as_str().unwrap_or_default();
            if !Path::new(path).is_file() {
                return Err(format!("File {path} does not exist"));
            }
        }
        let n = state.next_id();
        let shock_id = uuid::Uuid::new_v4().to_string();
        let hid = format!("KBH_{n}");
        let md5 = md5_hex(&self.archive);
        let handle = json!({
            "hid": hid,
            "id": shock_id,
            "url": self.shock_url(),
            "file_name": ARCHIVE_NAME,
            "type": "shock",
            "remote_md5": md5,
            "remote_sha1": null,
            "created_by": USER_ID,
        });
        state.nodes.insert(
            shock_id.clone(),
            StoredNode {
                file_name: ARCHIVE_NAME.to_string(),
                bytes: self.archive.to_vec(),
                md5,
            },
        );
        state.handles.insert(hid, handle.clone());
        Ok(json!([{
            "shock_id": shock_id,
            "handle": handle,
            "node_file_name": ARCHIVE_NAME,
            "size": self.archive.len(),
            "quast_path": format!("/kb/module/work/tmp/quast_{n}"),
        }]))
    }

    fn shock_to_file(&self, params: &Value) -> Result<Value, String> {
        let shock_id = params["shock_id"].as_str().ok_or("shock_id required")?;
        let file_path = PathBuf::from(params["file_path"].as_str().ok_or("file_path required")?);
        let node = {
            let mut state = self.lock();
            state.staging_calls += 1;
            state
                .nodes
                .get(shock_id)
                .cloned()
                .ok_or_else(|| format!("Node {shock_id} not found"))?
        };
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
        std::fs::write(&file_path, &node.bytes).map_err(|err| err.to_string())?;
        if params["unpack"].as_str() == Some("unpack") {
            let dest = file_path.parent().unwrap_or(Path::new("."));
            quast_verify::verify::unzip_to_dir(&file_path, dest).map_err(|err| err.to_string())?;
        }
        Ok(json!([{
            "node_file_name": node.file_name,
            "file_path": file_path.to_string_lossy(),
            "size": node.bytes.len(),
        }]))
    }

    fn shock(&self, method: &str, id: &str, req: &Request) -> Response {
        if req.authorization.as_deref() != Some(format!("OAuth {GOOD_TOKEN}").as_str()) {
            return shock_error(401, "Invalid authorization header or content");
        }
        let mut state = self.lock();
        match method {
            "GET" => {
                let Some(node) = state.nodes.get(id) else {
                    return shock_error(404, "Node not found");
                };
                if req.query.as_deref() == Some("download") {
                    return Response {
                        status: 200,
                        content_type: "application/octet-stream",
                        body: node.bytes.clone(),
                    };
                }
                Response::json(
                    200,
                    json!({
                        "data": {
                            "id": id,
                            "file": {
                                "name": node.file_name,
                                "size": node.bytes.len(),
                                "checksum": { "md5": node.md5 },
                            },
                        },
                        "error": null,
                        "status": 200,
                    }),
                )
            }
            "DELETE" => {
                if state.nodes.remove(id).is_none() {
                    return shock_error(404, "Node not found");
                }
                state.deleted_nodes.push(id.to_string());
                Response::json(200, json!({ "data": null, "error": null, "status": 200 }))
            }
            _ => shock_error(405, "Method not allowed"),
        }
    }
}

fn rpc_error(id: Value, message: &str) -> Response {
    Response::json(
        500,
        json!({
            "version": "1.1",
            "id": id,
            "error": {
                "name": "JSONRPCError",
                "code": -32000,
                "message": message,
                "error": format!("Traceback: {message}"),
            },
        }),
    )
}

fn shock_error(status: u16, message: &str) -> Response {
    Response::json(
        status,
        json!({ "data": null, "error": [message], "status": status }),
    )
}

fn read_request(stream: &TcpStream) -> std::io::Result<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => authorization = Some(value.to_string()),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target, None),
    };
    Ok(Request {
        method,
        path,
        query,
        authorization,
        body,
    })
}

fn write_response(mut stream: &TcpStream, response: &Response) -> std::io::Result<()> {
    let reason = match response.status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    write!(
        stream,
        "HTTP/1.1 {} {reason}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    )?;
    stream.write_all(&response.body)?;
    stream.flush()
}
