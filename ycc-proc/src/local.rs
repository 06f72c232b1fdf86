//! In-process accelerator
//!
//! The "executable" is the accelerator session in `ycc-dsp`; `start` runs it
//! on a named thread against this processor's link.

use crate::error::ProcError;
use crate::Processor;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use ycc_dsp::{DspConfig, DspError};
use ycc_link::{Link, TransferStats, MAX_PROCESSORS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Detached,
    Attached,
    Loaded,
    Running,
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcState::Detached => "detached",
            ProcState::Attached => "attached",
            ProcState::Loaded => "loaded",
            ProcState::Running => "running",
        };
        f.write_str(s)
    }
}

struct Image {
    executable: String,
    config: DspConfig,
}

pub struct LocalProcessor {
    id: u8,
    state: ProcState,
    link: Arc<Link>,
    image: Option<Image>,
    thread_handle: Option<JoinHandle<Result<TransferStats, DspError>>>,
    last_run: Option<TransferStats>,
}

impl LocalProcessor {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            state: ProcState::Detached,
            link: Arc::new(Link::new(id)),
            image: None,
            thread_handle: None,
            last_run: None,
        }
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Configuration parsed from the loaded arguments
    pub fn config(&self) -> Option<&DspConfig> {
        self.image.as_ref().map(|image| &image.config)
    }

    /// Counters of the last accelerator run that finished cleanly
    pub fn last_run(&self) -> Option<TransferStats> {
        self.last_run
    }

    fn expect_state(&self, op: &'static str, allowed: &[ProcState]) -> Result<(), ProcError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ProcError::InvalidState {
                id: self.id,
                op,
                state: self.state,
            })
        }
    }

    /// Wake the accelerator out of any reclaim and wait for it
    fn shutdown(&mut self) -> Result<TransferStats, ProcError> {
        self.link.close_all();

        let Some(handle) = self.thread_handle.take() else {
            return Ok(TransferStats::default());
        };
        match handle.join() {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(source)) => Err(ProcError::Accelerator {
                id: self.id,
                source,
            }),
            Err(_) => Err(ProcError::Panicked(self.id)),
        }
    }
}

impl Processor for LocalProcessor {
    fn id(&self) -> u8 {
        self.id
    }

    fn link(&self) -> Arc<Link> {
        self.link.clone()
    }

    fn attach(&mut self) -> Result<(), ProcError> {
        if self.id >= MAX_PROCESSORS {
            return Err(ProcError::InvalidProcessor(self.id));
        }
        self.expect_state("attach", &[ProcState::Detached])?;

        self.state = ProcState::Attached;
        log::info!("proc {}: attached", self.id);
        Ok(())
    }

    fn load(&mut self, executable: &str, args: &[String]) -> Result<(), ProcError> {
        self.expect_state("load", &[ProcState::Attached, ProcState::Loaded])?;

        let load_error = |reason: String| ProcError::Load {
            id: self.id,
            executable: executable.to_string(),
            reason,
        };
        if executable.trim().is_empty() {
            return Err(load_error("empty executable path".into()));
        }
        let config = DspConfig::from_args(args).map_err(|e| load_error(e.to_string()))?;

        log::info!("proc {}: loaded {} {:?}", self.id, executable, args);
        self.image = Some(Image {
            executable: executable.to_string(),
            config,
        });
        self.state = ProcState::Loaded;
        Ok(())
    }

    fn start(&mut self) -> Result<(), ProcError> {
        self.expect_state("start", &[ProcState::Loaded])?;
        let Some(image) = self.image.as_ref() else {
            return Err(ProcError::InvalidState {
                id: self.id,
                op: "start",
                state: self.state,
            });
        };

        let link = self.link.clone();
        let config = image.config;
        let handle = thread::Builder::new()
            .name(format!("ycc-dsp-{}", self.id))
            .spawn(move || ycc_dsp::run(link, config))
            .map_err(|e| ProcError::Spawn {
                id: self.id,
                reason: e.to_string(),
            })?;

        self.thread_handle = Some(handle);
        self.state = ProcState::Running;
        log::info!("proc {}: started {}", self.id, image.executable);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProcError> {
        self.expect_state("stop", &[ProcState::Running])?;

        let result = self.shutdown();
        self.state = ProcState::Loaded;
        match result {
            Ok(stats) => {
                log::info!(
                    "proc {}: stopped after {} chunk(s), {} bytes",
                    self.id,
                    stats.chunks,
                    stats.bytes
                );
                self.last_run = Some(stats);
                Ok(())
            }
            Err(err) => {
                log::error!("{}", err);
                Err(err)
            }
        }
    }

    fn detach(&mut self) -> Result<(), ProcError> {
        self.expect_state("detach", &[ProcState::Attached, ProcState::Loaded])?;

        self.image = None;
        self.state = ProcState::Detached;
        log::info!("proc {}: detached", self.id);
        Ok(())
    }
}

impl Drop for LocalProcessor {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.shutdown().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ycc_dsp::WorkerKind;
    use ycc_link::{ChannelAttrs, Direction, LinkError, Timeout, FROM_ACCELERATOR, TO_ACCELERATOR};

    fn args(buffer_size: usize, iterations: u32) -> Vec<String> {
        DspConfig {
            buffer_size,
            iterations,
            ..DspConfig::default()
        }
        .to_args()
    }

    #[test]
    fn test_lifecycle_order() {
        let mut dsp = LocalProcessor::new(0);

        assert!(matches!(
            dsp.load("dsp.out", &args(64, 1)),
            Err(ProcError::InvalidState { op: "load", .. })
        ));
        dsp.attach().unwrap();
        assert!(matches!(
            dsp.start(),
            Err(ProcError::InvalidState {
                state: ProcState::Attached,
                ..
            })
        ));
        dsp.load("dsp.out", &args(64, 1)).unwrap();
        assert_eq!(dsp.state(), ProcState::Loaded);
        assert!(matches!(
            dsp.stop(),
            Err(ProcError::InvalidState { op: "stop", .. })
        ));
        dsp.detach().unwrap();
        assert_eq!(dsp.state(), ProcState::Detached);
    }

    #[test]
    fn test_out_of_range_processor() {
        let mut dsp = LocalProcessor::new(MAX_PROCESSORS);
        assert_eq!(
            dsp.attach().unwrap_err(),
            ProcError::InvalidProcessor(MAX_PROCESSORS)
        );
    }

    #[test]
    fn test_load_validates_arguments() {
        let mut dsp = LocalProcessor::new(1);
        dsp.attach().unwrap();

        assert!(matches!(
            dsp.load("dsp.out", &["0".to_string(), "1".to_string()]),
            Err(ProcError::Load { .. })
        ));
        assert!(matches!(
            dsp.load("", &args(64, 1)),
            Err(ProcError::Load { .. })
        ));
        assert_eq!(dsp.state(), ProcState::Attached);

        dsp.load("dsp.out", &args(64, 3)).unwrap();
        assert_eq!(dsp.config().unwrap().iterations, 3);
        assert_eq!(dsp.config().unwrap().worker, WorkerKind::Blocking);
    }

    #[test]
    fn test_accelerator_failure_reported_on_stop() {
        // No channels were created, so the accelerator session cannot open
        let mut dsp = LocalProcessor::new(2);
        dsp.attach().unwrap();
        dsp.load("dsp.out", &args(64, 1)).unwrap();
        dsp.start().unwrap();

        let err = dsp.stop().unwrap_err();
        assert!(matches!(err, ProcError::Accelerator { id: 2, .. }));
        assert_eq!(dsp.state(), ProcState::Loaded);
        dsp.detach().unwrap();
    }

    #[test]
    fn test_stop_wakes_blocked_accelerator() {
        let mut dsp = LocalProcessor::new(3);
        let link = dsp.link();
        let out = link
            .create_channel(TO_ACCELERATOR, Direction::Outbound, ChannelAttrs::default())
            .unwrap();
        let _input = link
            .create_channel(FROM_ACCELERATOR, Direction::Inbound, ChannelAttrs::default())
            .unwrap();

        dsp.attach().unwrap();
        // Unbounded: the accelerator waits for chunks until the channels close
        dsp.load("dsp.out", &args(64, 0)).unwrap();
        dsp.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        dsp.stop().unwrap();
        assert_eq!(dsp.last_run(), Some(TransferStats::default()));
        assert!(out.is_closed());
        assert!(matches!(
            out.reclaim(Timeout::NoWait),
            Err(LinkError::ChannelClosed(TO_ACCELERATOR))
        ));
    }
}
