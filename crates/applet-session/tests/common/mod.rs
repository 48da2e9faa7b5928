#![allow(dead_code)]

use applet_session::{EngineError, EngineReply, ExecutionEngine};
use async_trait::async_trait;
use launcher_ipc::OpCode;
use std::sync::Mutex;
use std::time::Duration;

/// Engine double that records calls and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<(OpCode, Vec<String>)>>,
    failing: Vec<OpCode>,
    delay: Option<Duration>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, op: OpCode) -> Self {
        self.failing.push(op);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(OpCode, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: OpCode) -> usize {
        self.calls().iter().filter(|(o, _)| *o == op).count()
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn invoke(&self, opcode: OpCode, params: Vec<String>) -> Result<EngineReply, EngineError> {
        self.calls.lock().unwrap().push((opcode, params));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&opcode) {
            return Err(EngineError::Unavailable("engine process exited".to_string()));
        }
        Ok(EngineReply {
            message: format!("{opcode} ok"),
            handle: None,
        })
    }
}

pub const LOAD: &str = r#"{"op":"load","className":"demo.Main","width":"200","height":"100"}"#;
