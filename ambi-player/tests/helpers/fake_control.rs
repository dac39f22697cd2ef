//! Scripted control plane

use ambi_player::session::{Book, ControlOutcome, ControlPlane, Prompt, RemoteStatus, StartedSession};
use ambi_player::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeControl {
    calls: Mutex<Vec<String>>,
    next_id: AtomicU32,
    pause_outcome: Mutex<ControlOutcome>,
    resume_outcome: Mutex<ControlOutcome>,
    /// None means the remote no longer knows the session
    remote_playing: Mutex<Option<bool>>,
    /// How long `status` takes to answer
    status_delay: Mutex<Duration>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            pause_outcome: Mutex::new(ControlOutcome::Ok),
            resume_outcome: Mutex::new(ControlOutcome::Ok),
            remote_playing: Mutex::new(Some(true)),
            status_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_pause_outcome(&self, outcome: ControlOutcome) {
        *self.pause_outcome.lock().unwrap() = outcome;
    }

    pub fn set_resume_outcome(&self, outcome: ControlOutcome) {
        *self.resume_outcome.lock().unwrap() = outcome;
    }

    pub fn set_remote_playing(&self, playing: Option<bool>) {
        *self.remote_playing.lock().unwrap() = playing;
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControlPlane for FakeControl {
    async fn start(&self, book: &Book) -> Result<StartedSession> {
        self.record(format!("start {}", book.title));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(StartedSession {
            session_id: format!("s-{}", id),
            prompts: vec![Prompt {
                text: format!("ambient music for {}", book.title),
                weight: 1.0,
            }],
        })
    }

    async fn pause(&self, session_id: &str) -> Result<ControlOutcome> {
        self.record(format!("pause {}", session_id));
        Ok(*self.pause_outcome.lock().unwrap())
    }

    async fn resume(&self, session_id: &str) -> Result<ControlOutcome> {
        self.record(format!("resume {}", session_id));
        Ok(*self.resume_outcome.lock().unwrap())
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        self.record(format!("stop {}", session_id));
        Ok(())
    }

    async fn status(&self, session_id: &str) -> Result<RemoteStatus> {
        self.record(format!("status {}", session_id));
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match *self.remote_playing.lock().unwrap() {
            Some(is_playing) => Ok(RemoteStatus {
                session_id: session_id.to_string(),
                is_playing,
                prompts: Vec::new(),
            }),
            None => Err(Error::SessionExpired(session_id.to_string())),
        }
    }
}
