#![allow(unused)]

//! Scripted sessions and connectors for exercising the supervisor, elector
//! and reporter without a database.

use async_trait::async_trait;
use replmgr_daemon::elector::ShellRunner;
use replmgr_daemon::error::SessionError;
use replmgr_daemon::session::{Connector, NodeSession, Rows, SessionStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub fn single(value: &str) -> Rows {
    vec![vec![Some(value.to_string())]]
}

pub fn row(cells: &[&str]) -> Vec<Option<String>> {
    cells.iter().map(|c| Some(c.to_string())).collect()
}

/// A session answering canned responses: the first scripted pattern found as
/// a substring of the query wins. Unscripted queries fail softly, like any
/// other query error.
pub struct ScriptedSession {
    responses: Vec<(String, Rows)>,
    connected: Arc<AtomicBool>,
    recover_after: Option<u32>,
    reset_count: Arc<AtomicU32>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            connected: Arc::new(AtomicBool::new(true)),
            recover_after: None,
            reset_count: Arc::new(AtomicU32::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn broken() -> Self {
        let session = Self::new();
        session.connected.store(false, Ordering::SeqCst);
        session
    }

    /// Let `reset()` succeed once it has been called `resets` times.
    pub fn recovers_after(mut self, resets: u32) -> Self {
        self.recover_after = Some(resets);
        self
    }

    /// Answer queries containing `pattern` with `rows`.
    pub fn on(mut self, pattern: &str, rows: Rows) -> Self {
        self.responses.push((pattern.to_string(), rows));
        self
    }

    /// Answer queries containing `pattern` with a single text cell.
    pub fn one(self, pattern: &str, value: &str) -> Self {
        self.on(pattern, single(value))
    }

    /// Answer queries containing `pattern` with no rows (commands).
    pub fn ok_on(self, pattern: &str) -> Self {
        self.on(pattern, Vec::new())
    }

    /// Shared view of every statement this session executed or sent.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }

    pub fn reset_count_handle(&self) -> Arc<AtomicU32> {
        self.reset_count.clone()
    }
}

#[async_trait]
impl NodeSession for ScriptedSession {
    fn status(&self) -> SessionStatus {
        if self.connected.load(Ordering::SeqCst) {
            SessionStatus::Ok
        } else {
            SessionStatus::Broken
        }
    }

    async fn reset(&mut self) {
        let count = self.reset_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(needed) = self.recover_after {
            if count >= needed {
                self.connected.store(true, Ordering::SeqCst);
            }
        }
    }

    async fn exec(&mut self, sql: &str) -> Result<Rows, SessionError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SessionError::Disconnected);
        }
        self.log.lock().unwrap().push(sql.to_string());
        for (pattern, rows) in &self.responses {
            if sql.contains(pattern.as_str()) {
                return Ok(rows.clone());
            }
        }
        Err(SessionError::BadResult(format!("unscripted query: {sql}")))
    }

    fn send_async(&mut self, sql: &str) {
        self.log.lock().unwrap().push(sql.to_string());
    }

    fn is_busy(&self) -> bool {
        false
    }

    async fn cancel_in_flight(&mut self) {}

    async fn drain_async(&mut self) {}

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Connector handing out queued sessions per conninfo. An exhausted or
/// unknown conninfo behaves like an unreachable node: a closed sentinel for
/// optional opens, an error for required ones.
pub struct ScriptedConnector {
    queues: Mutex<HashMap<String, VecDeque<ScriptedSession>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, conninfo: &str, session: ScriptedSession) {
        self.queues
            .lock()
            .unwrap()
            .entry(conninfo.to_string())
            .or_default()
            .push_back(session);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        conninfo: &str,
        required: bool,
    ) -> Result<Box<dyn NodeSession>, SessionError> {
        let session = self
            .queues
            .lock()
            .unwrap()
            .get_mut(conninfo)
            .and_then(VecDeque::pop_front);
        match session {
            Some(session) => Ok(Box::new(session)),
            None if required => Err(SessionError::Disconnected),
            None => Ok(Box::new(ScriptedSession::broken())),
        }
    }
}

/// Records commands instead of running them.
pub struct RecordingShell {
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ran(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellRunner for RecordingShell {
    async fn run(&self, command: &str) {
        self.commands.lock().unwrap().push(command.to_string());
    }
}
