//! Accelerator session configuration

use crate::error::DspError;
use std::fmt;
use std::str::FromStr;
use ycc_kernel::EdgePolicy;
use ycc_link::Timeout;

/// Which accelerator worker runs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerKind {
    /// One sequential task: read, transform, write, repeat
    #[default]
    Blocking,
    /// Reacts to read and write completions independently
    EventDriven,
}

impl WorkerKind {
    /// Pool buffers the worker holds for the whole session
    pub fn buffers_needed(self) -> usize {
        match self {
            WorkerKind::Blocking => 1,
            WorkerKind::EventDriven => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Blocking => "blocking",
            WorkerKind::EventDriven => "event",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = DspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" | "tsk" => Ok(WorkerKind::Blocking),
            "event" | "swi" => Ok(WorkerKind::EventDriven),
            _ => Err(DspError::InvalidArgument(format!("unknown worker kind {:?}", s))),
        }
    }
}

/// Accelerator session configuration
///
/// Arrives from the host as the `load` argument vector:
/// `[buffer_size, iterations, worker?, edge_policy?, timeout_ms?]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DspConfig {
    /// Chunk size in bytes; every read requests this much
    pub buffer_size: usize,
    /// Transforms to run; 0 runs until the channels close
    pub iterations: u32,
    pub worker: WorkerKind,
    pub edge_policy: EdgePolicy,
    pub reclaim_timeout: Timeout,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            iterations: 0,
            worker: WorkerKind::Blocking,
            edge_policy: EdgePolicy::Saturate,
            reclaim_timeout: Timeout::Forever,
        }
    }
}

impl DspConfig {
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, DspError> {
        let arg = |i: usize| args.get(i).map(|s| s.as_ref().trim());
        let mut config = Self::default();

        let size = arg(0).ok_or_else(|| DspError::InvalidArgument("missing buffer size".into()))?;
        config.buffer_size = size
            .parse()
            .map_err(|_| DspError::InvalidArgument(format!("bad buffer size {:?}", size)))?;

        let iterations =
            arg(1).ok_or_else(|| DspError::InvalidArgument("missing iteration count".into()))?;
        config.iterations = iterations
            .parse()
            .map_err(|_| {
                DspError::InvalidArgument(format!("bad iteration count {:?}", iterations))
            })?;

        if let Some(worker) = arg(2) {
            config.worker = worker.parse()?;
        }
        if let Some(policy) = arg(3) {
            config.edge_policy = policy
                .parse()
                .map_err(|e: ycc_kernel::ParsePolicyError| {
                    DspError::InvalidArgument(e.to_string())
                })?;
        }
        if let Some(ms) = arg(4) {
            let ms = ms
                .parse()
                .map_err(|_| DspError::InvalidArgument(format!("bad timeout {:?}", ms)))?;
            config.reclaim_timeout = Timeout::from_millis(Some(ms));
        }

        config.validate()?;
        Ok(config)
    }

    /// Inverse of `from_args`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.buffer_size.to_string(),
            self.iterations.to_string(),
            self.worker.to_string(),
            self.edge_policy.to_string(),
        ];
        match self.reclaim_timeout {
            Timeout::Forever => {}
            Timeout::NoWait => args.push("0".into()),
            Timeout::After(d) => args.push(d.as_millis().max(1).to_string()),
        }
        args
    }

    pub fn validate(&self) -> Result<(), DspError> {
        if self.buffer_size == 0 {
            return Err(DspError::InvalidArgument("buffer size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_args() {
        let config = DspConfig::from_args(&["4096", "12"]).unwrap();
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.iterations, 12);
        assert_eq!(config.worker, WorkerKind::Blocking);
        assert_eq!(config.edge_policy, EdgePolicy::Saturate);
        assert_eq!(config.reclaim_timeout, Timeout::Forever);
    }

    #[test]
    fn test_args_round_trip() {
        let config = DspConfig {
            buffer_size: 256,
            iterations: 0,
            worker: WorkerKind::EventDriven,
            edge_policy: EdgePolicy::Wrap,
            reclaim_timeout: Timeout::After(Duration::from_millis(40)),
        };
        assert_eq!(DspConfig::from_args(&config.to_args()).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_args() {
        assert!(matches!(
            DspConfig::from_args::<&str>(&[]),
            Err(DspError::InvalidArgument(_))
        ));
        assert!(DspConfig::from_args(&["0", "1"]).is_err());
        assert!(DspConfig::from_args(&["64", "-1"]).is_err());
        assert!(DspConfig::from_args(&["64", "1", "threads"]).is_err());
        assert!(DspConfig::from_args(&["64", "1", "event", "clip"]).is_err());
    }

    #[test]
    fn test_worker_aliases() {
        assert_eq!("SWI".parse::<WorkerKind>().unwrap(), WorkerKind::EventDriven);
        assert_eq!("tsk".parse::<WorkerKind>().unwrap(), WorkerKind::Blocking);
        assert_eq!(WorkerKind::EventDriven.buffers_needed(), 2);
    }
}
