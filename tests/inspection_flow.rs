//! End-to-end inspection flows against scripted runtime and channel stubs.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use inspector_sidecar::channel::{RedirectSignal, WorkOutcome};
use inspector_sidecar::client::{ClientSelector, InspectorClient, OnDemandClient, OnDemandSettings};
use inspector_sidecar::config::InspectorConfig;
use inspector_sidecar::platform::PlatformVariant;
use inspector_sidecar::runtime::ServiceLaunch;
use inspector_sidecar::sidecar::{InspectorError, WorkRequest};
use inspector_sidecar::testing::{
    RecordingPause, RuntimeCall, StubChannel, StubConnector, StubRuntime,
};

const UBUNTU_URL: &str = "http://localhost:8082";

struct Fixture {
    _dir: tempfile::TempDir,
    manifest: PathBuf,
    artifact: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let manifest = dir.path().join("images.toml");
    std::fs::write(
        &manifest,
        "[images.ubuntu]\nrepository = \"insp\"\ntag = \"1.0\"\n",
    )
    .unwrap();

    let artifact = dir.path().join("image.tar");
    let mut file = std::fs::File::create(&artifact).unwrap();
    file.write_all(b"layer data").unwrap();

    Fixture {
        _dir: dir,
        manifest,
        artifact,
    }
}

fn config(fixture: &Fixture) -> InspectorConfig {
    InspectorConfig {
        image_manifest: Some(fixture.manifest.clone()),
        ..Default::default()
    }
}

fn request(fixture: &Fixture) -> WorkRequest {
    WorkRequest {
        host_path: fixture.artifact.clone(),
        container_path: "/opt/blackduck/shared/target/image.tar".to_string(),
        filename: "image_containerfs.tar.gz".to_string(),
        cleanup: true,
    }
}

fn on_demand(
    config: &InspectorConfig,
    runtime: Arc<StubRuntime>,
    channel: Arc<StubChannel>,
    pause: Arc<RecordingPause>,
) -> OnDemandClient {
    OnDemandClient::new(
        Arc::new(config.instance_directory()),
        runtime,
        Arc::new(StubConnector::new().with_channel(channel)),
        OnDemandSettings::from(config),
    )
    .with_pause(pause)
}

#[tokio::test]
async fn healthy_sidecar_returns_payload_without_starting_anything() {
    let fixture = fixture();
    let runtime = Arc::new(StubRuntime::new().with_running(PlatformVariant::Ubuntu, "insp-1"));
    let channel = Arc::new(StubChannel::healthy(UBUNTU_URL));
    channel.push_work(Ok(WorkOutcome::Completed("P".to_string())));
    let pause = Arc::new(RecordingPause::new());

    let outcome = on_demand(&config(&fixture), runtime.clone(), channel.clone(), pause.clone())
        .inspect(&request(&fixture))
        .await
        .unwrap();

    assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
    assert_eq!(runtime.pulls(), 0);
    assert_eq!(runtime.starts(), 0);
    assert_eq!(runtime.copies(), 1);
    assert_eq!(channel.health_probes(), 1);
    assert!(pause.pauses().is_empty());
}

#[tokio::test]
async fn cold_start_provisions_from_manifest_and_waits() {
    let fixture = fixture();
    let runtime = Arc::new(StubRuntime::new());
    let channel = Arc::new(StubChannel::new(UBUNTU_URL));
    // Initial probe plus three failed readiness probes, then up.
    channel.push_refusals(4);
    channel.set_health_fallback(Ok(r#"{"status":"UP"}"#.to_string()));
    channel.push_work(Ok(WorkOutcome::Completed("P".to_string())));
    let pause = Arc::new(RecordingPause::new());

    let outcome = on_demand(&config(&fixture), runtime.clone(), channel.clone(), pause.clone())
        .inspect(&request(&fixture))
        .await
        .unwrap();

    assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
    assert_eq!(channel.health_probes(), 5);
    assert_eq!(pause.pauses(), vec![Duration::from_secs(10); 4]);

    let calls = runtime.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(&calls[0], RuntimeCall::Pull(image) if image.to_string() == "insp:1.0"));
    assert_eq!(calls[1], RuntimeCall::Remove("insp-1".to_string()));
    assert_eq!(
        calls[2],
        RuntimeCall::Start(ServiceLaunch {
            image_id: "sha256:insp:1.0".to_string(),
            container_name: "insp-1".to_string(),
            app_name: "hub-imageinspector-ws".to_string(),
            variant: PlatformVariant::Ubuntu,
            host_port: 8082,
            container_port: 8082,
        })
    );
    assert!(matches!(
        &calls[3],
        RuntimeCall::Copy { dest_dir, .. } if dest_dir == "/opt/blackduck/shared/target"
    ));
}

#[tokio::test]
async fn sidecar_that_never_comes_up_times_out() {
    let fixture = fixture();
    let runtime = Arc::new(StubRuntime::new());
    let channel = Arc::new(StubChannel::new(UBUNTU_URL));
    let pause = Arc::new(RecordingPause::new());

    let err = on_demand(&config(&fixture), runtime.clone(), channel.clone(), pause.clone())
        .inspect(&request(&fixture))
        .await
        .unwrap_err();

    assert!(matches!(err, InspectorError::ProvisioningTimeout { attempts: 10, .. }));
    let message = err.to_string();
    assert!(message.contains("insp:1.0"), "{message}");
    assert!(message.contains(UBUNTU_URL), "{message}");
    assert_eq!(channel.health_probes(), 11);
    assert_eq!(pause.pauses().len(), 10);
    assert_eq!(runtime.starts(), 1);
    assert_eq!(runtime.copies(), 0);
    assert!(channel.submitted().is_empty());
}

#[tokio::test]
async fn redirect_reaches_the_caller() {
    let fixture = fixture();
    let runtime = Arc::new(StubRuntime::new().with_running(PlatformVariant::Ubuntu, "insp-1"));
    let channel = Arc::new(StubChannel::healthy(UBUNTU_URL));
    let signal = RedirectSignal {
        status: 302,
        target: Some(PlatformVariant::Alpine),
        location: Some("http://localhost:8080/getbdio".to_string()),
        body: "Image is Alpine; use the alpine inspector".to_string(),
    };
    channel.push_work(Ok(WorkOutcome::Redirected(signal.clone())));

    let outcome = on_demand(
        &config(&fixture),
        runtime,
        channel,
        Arc::new(RecordingPause::new()),
    )
    .inspect(&request(&fixture))
    .await
    .unwrap();

    assert_eq!(outcome, WorkOutcome::Redirected(signal));
}

#[tokio::test]
async fn leftover_container_from_earlier_run_is_replaced() {
    let fixture = fixture();
    let runtime = Arc::new(StubRuntime::new().with_stopped("insp-1"));
    let channel = Arc::new(StubChannel::new(UBUNTU_URL));
    channel.push_refusals(1);
    channel.set_health_fallback(Ok(r#"{"status":"UP"}"#.to_string()));
    channel.push_work(Ok(WorkOutcome::Completed("P".to_string())));

    let outcome = on_demand(
        &config(&fixture),
        runtime.clone(),
        channel,
        Arc::new(RecordingPause::new()),
    )
    .inspect(&request(&fixture))
    .await
    .unwrap();

    assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
    assert_eq!(runtime.removals(), 1);
    assert_eq!(runtime.starts(), 1);
    assert_eq!(runtime.copies(), 1);
}

#[tokio::test(start_paused = true)]
async fn selector_wires_on_demand_strategy_from_config() {
    let fixture = fixture();
    let config = config(&fixture);
    let runtime = Arc::new(StubRuntime::new());
    let channel = Arc::new(StubChannel::new(UBUNTU_URL));
    // Initial probe and first readiness probe fail.
    channel.push_refusals(2);
    channel.set_health_fallback(Ok(r#"{"status":"UP"}"#.to_string()));
    channel.push_work(Ok(WorkOutcome::Completed("P".to_string())));
    let connector = Arc::new(StubConnector::new().with_channel(channel.clone()));

    let selector = ClientSelector::from_config(&config, Some(runtime.clone()), connector.clone());
    let client = selector.select(&config.invocation_context()).unwrap();
    let started = tokio::time::Instant::now();

    let outcome = client.inspect(&request(&fixture)).await.unwrap();

    assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
    assert_eq!(started.elapsed(), Duration::from_secs(20));
    assert_eq!(connector.timeouts(), vec![Duration::from_secs(120)]);
    assert_eq!(runtime.starts(), 1);
}

#[tokio::test]
async fn selector_uses_running_service_when_start_disabled() {
    let fixture = fixture();
    let config = InspectorConfig {
        service_start: false,
        service_url: Some("http://inspector.internal:9000".to_string()),
        ..Default::default()
    };
    let channel = Arc::new(StubChannel::healthy("http://inspector.internal:9000"));
    channel.push_work(Ok(WorkOutcome::Completed("P".to_string())));
    let connector = Arc::new(StubConnector::new().with_channel(channel.clone()));

    let selector = ClientSelector::from_config(&config, None, connector);
    let client = selector.select(&config.invocation_context()).unwrap();
    let outcome = client.inspect(&request(&fixture)).await.unwrap();

    assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
    assert_eq!(channel.submitted().len(), 1);
}
