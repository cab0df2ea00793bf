//! Scriptable stand-ins for the container runtime and work channel.
//!
//! Provides:
//! - [`StubRuntime`]: records every runtime call, registers started containers
//! - [`StubChannel`]: replays scripted health and work responses
//! - [`StubConnector`]: hands out pre-registered [`StubChannel`]s by base URL
//! - [`RecordingPause`]: records pauses without sleeping, optionally interrupting
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inspector_sidecar::testing::{StubChannel, StubRuntime};
//!
//! let runtime = Arc::new(StubRuntime::new());
//! let channel = StubChannel::healthy("http://localhost:8082");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{ChannelConnector, ConnectError, TransportError, WorkChannel, WorkOutcome};
use crate::platform::{ContainerHandle, ImageCoordinates, PlatformVariant};
use crate::runtime::{ContainerRuntime, RuntimeError, ServiceLaunch};
use crate::sidecar::ensurer::{Pause, PauseInterrupted};
use crate::sidecar::health::HEALTH_PATH;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A call observed by [`StubRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Pull(ImageCoordinates),
    Remove(String),
    Start(ServiceLaunch),
    Lookup {
        app_name: String,
        variant: PlatformVariant,
    },
    Copy {
        container: ContainerHandle,
        host_path: PathBuf,
        dest_dir: String,
    },
}

/// In-memory container runtime.
///
/// Started containers get their container name as id and are registered as
/// running for their variant. Container names are unique: starting under a
/// name that is still taken fails the way Docker reports a conflict. Copies
/// succeed when the host file exists.
#[derive(Default)]
pub struct StubRuntime {
    running: Mutex<HashMap<PlatformVariant, ContainerHandle>>,
    names: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RuntimeCall>>,
    fail_pull: AtomicBool,
    fail_copy: AtomicBool,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a container for `variant` is already running.
    pub fn with_running(self, variant: PlatformVariant, container: impl Into<String>) -> Self {
        let container = container.into();
        locked(&self.names).insert(container.clone());
        locked(&self.running).insert(variant, ContainerHandle::new(container));
        self
    }

    /// Pretend a stopped container called `name` is left over from an earlier run.
    pub fn with_stopped(self, name: impl Into<String>) -> Self {
        locked(&self.names).insert(name.into());
        self
    }

    /// Whether a container called `name` exists, running or not.
    pub fn has_container(&self, name: &str) -> bool {
        locked(&self.names).contains(name)
    }

    /// Make every pull fail.
    pub fn set_failing_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::Relaxed);
    }

    /// Make every copy fail, even for existing files.
    pub fn set_failing_copy(&self, fail: bool) {
        self.fail_copy.store(fail, Ordering::Relaxed);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        locked(&self.calls).clone()
    }

    pub fn pulls(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Pull(_)))
    }

    pub fn removals(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Remove(_)))
    }

    pub fn starts(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Start(_)))
    }

    pub fn copies(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Copy { .. }))
    }

    fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        locked(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: RuntimeCall) {
        locked(&self.calls).push(call);
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn pull_image(&self, image: &ImageCoordinates) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::Pull(image.clone()));
        if self.fail_pull.load(Ordering::Relaxed) {
            return Err(RuntimeError::ImagePullFailed {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        Ok(format!("sha256:{image}"))
    }

    async fn remove_container(&self, name: &str) -> Result<bool, RuntimeError> {
        self.record(RuntimeCall::Remove(name.to_string()));
        let removed = locked(&self.names).remove(name);
        if removed {
            let handle = ContainerHandle::new(name);
            locked(&self.running).retain(|_, running| *running != handle);
        }
        Ok(removed)
    }

    async fn start_container_as_service(
        &self,
        launch: &ServiceLaunch,
    ) -> Result<ContainerHandle, RuntimeError> {
        self.record(RuntimeCall::Start(launch.clone()));
        if !locked(&self.names).insert(launch.container_name.clone()) {
            return Err(RuntimeError::ContainerCreationFailed {
                name: launch.container_name.clone(),
                reason: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    launch.container_name
                ),
            });
        }
        let handle = ContainerHandle::new(launch.container_name.clone());
        locked(&self.running).insert(launch.variant, handle.clone());
        Ok(handle)
    }

    async fn running_container_by_app_name(
        &self,
        app_name: &str,
        variant: PlatformVariant,
    ) -> Result<Option<ContainerHandle>, RuntimeError> {
        self.record(RuntimeCall::Lookup {
            app_name: app_name.to_string(),
            variant,
        });
        Ok(locked(&self.running).get(&variant).cloned())
    }

    async fn copy_file_to_container(
        &self,
        container: &ContainerHandle,
        host_path: &Path,
        dest_dir: &str,
    ) -> std::io::Result<()> {
        self.record(RuntimeCall::Copy {
            container: container.clone(),
            host_path: host_path.to_path_buf(),
            dest_dir: dest_dir.to_string(),
        });
        if self.fail_copy.load(Ordering::Relaxed) {
            return Err(std::io::Error::other("container filesystem is read-only"));
        }
        std::fs::metadata(host_path).map(|_| ())
    }
}

/// A work submission observed by [`StubChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedWork {
    pub container_path: String,
    pub filename: String,
    pub cleanup: bool,
}

/// Scripted sidecar connection.
///
/// Health responses are consumed from a queue; once it is empty the fallback
/// answers (connection refused unless changed). Work responses behave alike,
/// falling back to an empty completed payload.
pub struct StubChannel {
    base_url: String,
    health: Mutex<VecDeque<Result<String, TransportError>>>,
    health_fallback: Mutex<Result<String, TransportError>>,
    work: Mutex<VecDeque<Result<WorkOutcome, TransportError>>>,
    health_probes: AtomicU32,
    submitted: Mutex<Vec<SubmittedWork>>,
}

impl StubChannel {
    /// A channel whose sidecar is not reachable until scripted otherwise.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            health: Mutex::new(VecDeque::new()),
            health_fallback: Mutex::new(Err(connection_refused())),
            work: Mutex::new(VecDeque::new()),
            health_probes: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// A channel whose sidecar always reports up.
    pub fn healthy(base_url: impl Into<String>) -> Self {
        let channel = Self::new(base_url);
        channel.set_health_fallback(Ok(r#"{"status":"UP"}"#.to_string()));
        channel
    }

    pub fn push_health(&self, response: Result<String, TransportError>) {
        locked(&self.health).push_back(response);
    }

    /// Queue `count` refused health checks.
    pub fn push_refusals(&self, count: usize) {
        let mut health = locked(&self.health);
        for _ in 0..count {
            health.push_back(Err(connection_refused()));
        }
    }

    pub fn set_health_fallback(&self, response: Result<String, TransportError>) {
        *locked(&self.health_fallback) = response;
    }

    pub fn push_work(&self, response: Result<WorkOutcome, TransportError>) {
        locked(&self.work).push_back(response);
    }

    /// Number of health checks answered so far.
    pub fn health_probes(&self) -> u32 {
        self.health_probes.load(Ordering::Relaxed)
    }

    pub fn submitted(&self) -> Vec<SubmittedWork> {
        locked(&self.submitted).clone()
    }
}

fn connection_refused() -> TransportError {
    TransportError::new(None, "Connection refused (os error 111)")
}

#[async_trait]
impl WorkChannel for StubChannel {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<String, TransportError> {
        if path.trim_start_matches('/') != HEALTH_PATH {
            return Err(TransportError::new(Some(404), "Not Found"));
        }
        self.health_probes.fetch_add(1, Ordering::Relaxed);
        let scripted = locked(&self.health).pop_front();
        scripted.unwrap_or_else(|| locked(&self.health_fallback).clone())
    }

    async fn submit_work(
        &self,
        container_path: &str,
        filename: &str,
        cleanup: bool,
    ) -> Result<WorkOutcome, TransportError> {
        locked(&self.submitted).push(SubmittedWork {
            container_path: container_path.to_string(),
            filename: filename.to_string(),
            cleanup,
        });
        let scripted = locked(&self.work).pop_front();
        scripted.unwrap_or_else(|| Ok(WorkOutcome::Completed(String::new())))
    }
}

/// Connector serving registered [`StubChannel`]s by base URL.
#[derive(Default)]
pub struct StubConnector {
    channels: HashMap<String, Arc<StubChannel>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<StubChannel>) -> Self {
        self.channels
            .insert(channel.base_url().trim_end_matches('/').to_string(), channel);
        self
    }

    /// Timeouts passed to `connect`, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        locked(&self.timeouts).clone()
    }
}

impl ChannelConnector for StubConnector {
    fn connect(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn WorkChannel>, ConnectError> {
        locked(&self.timeouts).push(timeout);
        self.channels
            .get(base_url.trim_end_matches('/'))
            .map(|channel| Arc::clone(channel) as Arc<dyn WorkChannel>)
            .ok_or_else(|| ConnectError::MalformedUrl {
                url: base_url.to_string(),
                reason: "no stub channel registered".to_string(),
            })
    }
}

/// Pause that returns immediately and remembers what it was asked to do.
#[derive(Default)]
pub struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
    interrupt: AtomicBool,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pause that reports every wait as interrupted.
    pub fn interrupting() -> Self {
        let pause = Self::default();
        pause.interrupt.store(true, Ordering::Relaxed);
        pause
    }

    pub fn pauses(&self) -> Vec<Duration> {
        locked(&self.pauses).clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) -> Result<(), PauseInterrupted> {
        locked(&self.pauses).push(duration);
        if self.interrupt.load(Ordering::Relaxed) {
            return Err(PauseInterrupted("interrupted by test".to_string()));
        }
        Ok(())
    }
}
