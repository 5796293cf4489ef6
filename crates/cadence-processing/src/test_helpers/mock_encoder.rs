//! Encoder fake that records submissions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::transcode::{EncodeJob, EncodeRequest, Encoder, EncoderError};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct FakeEncoder {
    submissions: Mutex<Vec<EncodeRequest>>,
    fail: AtomicBool,
    before_next: Mutex<Option<Hook>>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` inside the next submission, before the job is returned.
    /// Lets a test change shared state the way a concurrent run would.
    pub fn on_next_submit(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_next.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn submissions(&self) -> Vec<EncodeRequest> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn submit(&self, request: &EncodeRequest) -> Result<EncodeJob, EncoderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EncoderError::Submission("queue is paused".to_string()));
        }
        let hook = self.before_next.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(request.clone());
        Ok(EncodeJob {
            job_id: format!("job-{}", submissions.len()),
            manifest_key: format!("{}master.m3u8", request.output_prefix),
        })
    }
}
