// Full-session tests: registry, acquisition, filter and visualizer
// ingestion nodes wired together over loopback.

use biostream::{
    find_free_ports, Consumer, ConsumerConfig, FilterCommand, PortRegistry, Producer,
    ProducerConfig, SourceConfig, Transform, TransformConfig, ViewHandle, FILTERED_STREAM,
    INFO_STREAM, RAW_STREAM,
};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const SAMPLE_RATE: f64 = 1000.0;
const CHUNK_SIZE: usize = 10;

/// Two-channel recording where every row is the same known pair, so any
/// sample that reaches the window is exactly predictable.
fn constant_recording() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "left,right").unwrap();
    for _ in 0..40 {
        writeln!(file, "1.5,-2.5").unwrap();
    }
    file.flush().unwrap();
    file
}

struct Session {
    view: ViewHandle,
    cancel: CancellationToken,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Stand up a complete session around `recording` and return the view
/// handle of a consumer configured with `filters` / `apply_car`.
async fn start_session(
    recording: &NamedTempFile,
    filters: FilterCommand,
    apply_car: bool,
) -> Session {
    let cancel = CancellationToken::new();
    let host = "127.0.0.1".to_string();

    let stream_ports = find_free_ports(&host, 3).unwrap();
    let table: HashMap<String, u16> = [INFO_STREAM, RAW_STREAM, FILTERED_STREAM]
        .iter()
        .zip(&stream_ports)
        .map(|(name, port)| (name.to_string(), *port))
        .collect();

    let registry = PortRegistry::bind(&host, 0, table).await.unwrap();
    let registry_port = registry.local_addr().unwrap().port();
    tokio::spawn(registry.serve(cancel.child_token()));

    let producer = Producer::configure(
        ProducerConfig {
            host: host.clone(),
            registry_port,
            source: SourceConfig::Playback {
                path: recording.path().to_path_buf(),
                sample_rate: SAMPLE_RATE,
                chunk_size: CHUNK_SIZE,
            },
        },
        cancel.clone(),
    )
    .await
    .unwrap();
    tokio::spawn(producer.run());

    let transform = Transform::configure(
        TransformConfig {
            host: host.clone(),
            registry_port,
        },
        cancel.clone(),
    )
    .await
    .unwrap();
    tokio::spawn(transform.run());

    let consumer = Consumer::configure(
        ConsumerConfig {
            host,
            registry_port,
            window_secs: 0.05,
            apply_car,
            filters,
        },
        cancel.clone(),
    )
    .await
    .unwrap();
    let view = consumer.view();
    tokio::spawn(consumer.run());

    Session { view, cancel }
}

async fn wait_until_full(view: &ViewHandle) {
    let target = view.window_len();
    for _ in 0..500 {
        if view.samples_buffered() >= target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "window never filled: {} of {target} samples",
        view.samples_buffered()
    );
}

#[tokio::test]
async fn playback_reaches_the_view_window_unchanged() {
    let recording = constant_recording();
    let session = start_session(&recording, FilterCommand::default(), false).await;
    let view = &session.view;

    assert_eq!(view.info().sample_rate, SAMPLE_RATE);
    assert_eq!(view.info().chunk_size, CHUNK_SIZE);
    assert_eq!(view.info().channels, vec!["left", "right"]);
    assert_eq!(view.window_len(), 50);

    wait_until_full(view).await;

    let snapshot = view.snapshot();
    assert_eq!(snapshot.len(), 50 * 2);
    for row in snapshot.chunks_exact(2) {
        assert_eq!(row, &[1.5, -2.5]);
    }
}

#[tokio::test]
async fn filter_preference_in_the_hello_shapes_the_stream() {
    let recording = constant_recording();
    let filters = FilterCommand {
        high_pass: Some(8.0),
        low_pass: None,
    };
    let session = start_session(&recording, filters, false).await;
    let view = &session.view;

    wait_until_full(view).await;
    // Let the high-pass settle on the constant input well past its time
    // constant before inspecting the newest samples.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = view.snapshot();
    let newest = &snapshot[snapshot.len() - 2..];
    assert!(
        newest[0].abs() < 0.2 && newest[1].abs() < 0.2,
        "high-passed constant did not decay: {newest:?}"
    );
}

#[tokio::test]
async fn filters_can_be_retuned_over_the_live_connection() {
    let recording = constant_recording();
    let session = start_session(&recording, FilterCommand::default(), false).await;
    let view = &session.view;

    wait_until_full(view).await;
    // Unfiltered to begin with: the raw constant fills the window.
    let snapshot = view.snapshot();
    assert_eq!(&snapshot[snapshot.len() - 2..], &[1.5, -2.5]);

    view.set_filters(FilterCommand {
        high_pass: Some(8.0),
        low_pass: None,
    })
    .await
    .unwrap();
    // Give the command time to reach the filter node and the rebuilt
    // chain time to settle on the constant input.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = view.snapshot();
    let newest = &snapshot[snapshot.len() - 2..];
    assert!(
        newest[0].abs() < 0.2 && newest[1].abs() < 0.2,
        "retuned chain did not reach the stream: {newest:?}"
    );
}

#[tokio::test]
async fn referencing_can_be_toggled_at_runtime() {
    let recording = constant_recording();
    let session = start_session(&recording, FilterCommand::default(), false).await;
    let view = &session.view;

    wait_until_full(view).await;
    let snapshot = view.snapshot();
    assert_eq!(&snapshot[snapshot.len() - 2..], &[1.5, -2.5]);

    view.set_car(true);
    // Long enough for re-referenced chunks to displace the whole window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = view.snapshot();
    assert_eq!(&snapshot[snapshot.len() - 2..], &[2.0, -2.0]);

    view.set_car(false);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = view.snapshot();
    assert_eq!(&snapshot[snapshot.len() - 2..], &[1.5, -2.5]);
}

#[tokio::test]
async fn common_average_referencing_is_applied_at_ingestion() {
    let recording = constant_recording();
    let session = start_session(&recording, FilterCommand::default(), true).await;
    let view = &session.view;

    wait_until_full(view).await;

    // Row mean of (1.5, -2.5) is -0.5; referencing shifts both channels.
    let snapshot = view.snapshot();
    for row in snapshot.chunks_exact(2) {
        assert_eq!(row, &[2.0, -2.0]);
    }
}
