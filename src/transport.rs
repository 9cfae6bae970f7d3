//! Moving service calls off the panel's thread.
//!
//! The panel never blocks: it [`Transport::submit`]s a [`Job`] tagged with a
//! token and later drains [`Completion`]s from `tick`. [`ThreadedTransport`]
//! runs a [`MaskService`] on one background thread; tests substitute a
//! scripted transport that completes jobs in whatever order they like.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::error::{Error, ServiceError};
use crate::service::{DetectRequest, MaskService, PrepareRequest, UploadRequest, ViewRequest};
use crate::token::RequestToken;

/// A unit of work for the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Prepare {
        token: RequestToken,
        request: PrepareRequest,
    },
    Detect {
        token: RequestToken,
        request: DetectRequest,
    },
    Upload {
        token: RequestToken,
        request: UploadRequest,
    },
    /// Fetch the source image.
    LoadImage {
        token: RequestToken,
        request: ViewRequest,
    },
    /// Fetch a previously stored mask.
    LoadMask {
        token: RequestToken,
        request: ViewRequest,
    },
}

impl Job {
    pub fn token(&self) -> RequestToken {
        match self {
            Job::Prepare { token, .. }
            | Job::Detect { token, .. }
            | Job::Upload { token, .. }
            | Job::LoadImage { token, .. }
            | Job::LoadMask { token, .. } => *token,
        }
    }

    fn run(self, service: &dyn MaskService) -> Completion {
        match self {
            Job::Prepare { token, request } => Completion::Prepared {
                token,
                result: service.prepare(&request),
            },
            Job::Detect { token, request } => Completion::Detected {
                token,
                result: service.detect(&request),
            },
            Job::Upload { token, request } => Completion::Uploaded {
                token,
                result: service.upload(&request),
            },
            Job::LoadImage { token, request } => Completion::ImageLoaded {
                token,
                result: service.view(&request),
            },
            Job::LoadMask { token, request } => Completion::MaskLoaded {
                token,
                result: service.view(&request),
            },
        }
    }
}

/// The result of one [`Job`], carrying the job's token back.
#[derive(Debug)]
pub enum Completion {
    Prepared {
        token: RequestToken,
        result: Result<(), ServiceError>,
    },
    Detected {
        token: RequestToken,
        result: Result<Vec<u8>, ServiceError>,
    },
    Uploaded {
        token: RequestToken,
        result: Result<String, ServiceError>,
    },
    ImageLoaded {
        token: RequestToken,
        result: Result<Vec<u8>, ServiceError>,
    },
    MaskLoaded {
        token: RequestToken,
        result: Result<Vec<u8>, ServiceError>,
    },
}

/// Non-blocking job queue.
pub trait Transport {
    fn submit(&mut self, job: Job);

    /// Oldest finished completion, if any.
    fn try_take(&mut self) -> Option<Completion>;
}

enum ThreadMessage {
    Run(Job),
    Shutdown,
}

/// Runs service calls one at a time on a background thread.
pub struct ThreadedTransport {
    request_tx: Sender<ThreadMessage>,
    result_rx: Receiver<Completion>,
    thread_handle: Option<JoinHandle<()>>,
    pending: usize,
}

impl ThreadedTransport {
    pub fn spawn<S: MaskService + 'static>(service: S) -> Result<Self, Error> {
        let (request_tx, request_rx) = mpsc::channel::<ThreadMessage>();
        let (result_tx, result_rx) = mpsc::channel::<Completion>();

        let thread_handle = thread::Builder::new()
            .name("mask-service".to_string())
            .spawn(move || {
                log::debug!("Mask service thread started");
                Self::thread_loop(&service, request_rx, result_tx);
                log::debug!("Mask service thread exiting");
            })?;

        Ok(Self {
            request_tx,
            result_rx,
            thread_handle: Some(thread_handle),
            pending: 0,
        })
    }

    fn thread_loop(
        service: &dyn MaskService,
        request_rx: Receiver<ThreadMessage>,
        result_tx: Sender<Completion>,
    ) {
        loop {
            match request_rx.recv() {
                Ok(ThreadMessage::Run(job)) => {
                    if result_tx.send(job.run(service)).is_err() {
                        log::warn!("Result channel closed, mask service thread exiting");
                        break;
                    }
                }
                Ok(ThreadMessage::Shutdown) | Err(_) => break,
            }
        }
    }

    /// Jobs submitted but not yet taken.
    pub fn pending_count(&self) -> usize {
        self.pending
    }
}

impl Transport for ThreadedTransport {
    fn submit(&mut self, job: Job) {
        let token = job.token();
        if self.request_tx.send(ThreadMessage::Run(job)).is_err() {
            log::error!("Failed to submit job {}: service thread gone", token);
        } else {
            self.pending += 1;
        }
    }

    fn try_take(&mut self) -> Option<Completion> {
        match self.result_rx.try_recv() {
            Ok(completion) => {
                self.pending = self.pending.saturating_sub(1);
                Some(completion)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.pending > 0 {
                    log::warn!("Mask service thread disconnected with {} pending", self.pending);
                    self.pending = 0;
                }
                None
            }
        }
    }
}

impl Drop for ThreadedTransport {
    fn drop(&mut self) {
        let _ = self.request_tx.send(ThreadMessage::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                log::warn!("Mask service thread panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenCounter;
    use std::time::{Duration, Instant};

    struct EchoService;

    impl MaskService for EchoService {
        fn prepare(&self, request: &PrepareRequest) -> Result<(), ServiceError> {
            if request.model == "broken" {
                Err(ServiceError::Status {
                    code: 500,
                    body: "load failed".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn detect(&self, request: &DetectRequest) -> Result<Vec<u8>, ServiceError> {
            Ok(vec![request.positive_points.len() as u8])
        }

        fn upload(&self, request: &UploadRequest) -> Result<String, ServiceError> {
            Ok(request.name.clone())
        }

        fn view(&self, request: &ViewRequest) -> Result<Vec<u8>, ServiceError> {
            Ok(request.filename.as_bytes().to_vec())
        }
    }

    fn take_blocking(transport: &mut ThreadedTransport) -> Completion {
        let start = Instant::now();
        loop {
            if let Some(completion) = transport.try_take() {
                return completion;
            }
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_jobs_complete_in_order() {
        let mut tokens = TokenCounter::new();
        let mut transport = ThreadedTransport::spawn(EchoService).unwrap();

        let first = tokens.issue();
        transport.submit(Job::Prepare {
            token: first,
            request: PrepareRequest {
                model: "broken".to_string(),
                filename: "a.png".to_string(),
                kind: "input".to_string(),
                subfolder: String::new(),
            },
        });
        let second = tokens.issue();
        transport.submit(Job::Detect {
            token: second,
            request: DetectRequest {
                positive_points: vec![[1, 1], [2, 2]],
                negative_points: vec![],
                threshold: 0.5,
            },
        });
        assert_eq!(transport.pending_count(), 2);

        match take_blocking(&mut transport) {
            Completion::Prepared { token, result } => {
                assert_eq!(token, first);
                assert!(matches!(result, Err(ServiceError::Status { code: 500, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
        match take_blocking(&mut transport) {
            Completion::Detected { token, result } => {
                assert_eq!(token, second);
                assert_eq!(result.unwrap(), vec![2]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.pending_count(), 0);
    }
}
