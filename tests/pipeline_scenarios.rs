//! End-to-end pipeline scenarios against the public API.

use std::sync::atomic::Ordering;

use crowd_sentry::detect::backends::StubBackend;
use crowd_sentry::{
    decode, BackendStrategy, Frame, Pipeline, PipelineSettings, RawOutput, SessionState,
    SettingsUpdate, MAX_ESTIMATE, PERSON_CLASS,
};

fn default_settings() -> PipelineSettings {
    PipelineSettings {
        // Wide bucket so tests cannot straddle a boundary.
        cache_bucket_ms: 60_000,
        ..PipelineSettings::default()
    }
}

fn gray_frame() -> Frame {
    Frame::filled(640, 640, [128, 128, 128, 255])
}

#[test]
fn all_zero_model_output_yields_clean_zero_count() {
    let backend = StubBackend::zeros(640, 8400, 85);
    let mut pipeline = Pipeline::new(
        default_settings(),
        vec![Box::new(BackendStrategy::once("stub", backend))],
    );
    assert_eq!(pipeline.session_state(), SessionState::Ready);

    let result = pipeline.process(&gray_frame());
    assert_eq!(result.count, 0);
    assert_eq!(result.count, result.detections.len());
    assert!(!result.degraded);
    assert!(result.degraded_reason.is_none());
}

#[test]
fn throwing_backend_degrades_without_escaping() {
    // Warm-up passes, every later inference fails.
    let backend = StubBackend::zeros(640, 8400, 85).failing_after(1);
    let mut pipeline = Pipeline::new(
        default_settings(),
        vec![Box::new(BackendStrategy::once("stub", backend))],
    );

    for shade in 0..3u8 {
        let frame = Frame::filled(640, 640, [shade, 100, 100, 255]);
        let result = pipeline.process(&frame);
        assert!(result.degraded);
        assert!(result.count <= MAX_ESTIMATE);
        assert!(result.degraded_reason.is_some());
    }
}

#[test]
fn exhausted_cascade_degrades_without_escaping() {
    let mut pipeline = Pipeline::new(default_settings(), Vec::new());
    assert_eq!(pipeline.session_state(), SessionState::Failed);

    let result = pipeline.process(&gray_frame());
    assert!(result.degraded);
    assert!(result.count <= MAX_ESTIMATE);
    assert_eq!(result.model, "fallback");
}

#[test]
fn identical_frames_in_one_bucket_skip_the_backend() {
    let backend = StubBackend::zeros(640, 8400, 85);
    let counter = backend.call_counter();
    let mut pipeline = Pipeline::new(
        default_settings(),
        vec![Box::new(BackendStrategy::once("stub", backend))],
    );

    let first = pipeline.process(&gray_frame());
    let backend_calls = counter.load(Ordering::SeqCst);

    let second = pipeline.process(&gray_frame());
    assert_eq!(counter.load(Ordering::SeqCst), backend_calls);
    assert_eq!(second.count, first.count);
    assert_eq!(second.timestamp_ms, first.timestamp_ms);
    assert_eq!(second.processing_ms, first.processing_ms);
}

#[test]
fn decoder_keeps_only_the_clear_person_candidate() {
    let person = |cx: f32, cy: f32, objectness: f32, score: f32| {
        let mut row = vec![cx, cy, 60.0, 120.0, objectness];
        let mut scores = vec![0.0f32; 80];
        scores[PERSON_CLASS] = score;
        row.extend(scores);
        row
    };

    let rows = [
        person(100.0, 100.0, 0.4, 0.5),
        person(320.0, 320.0, 1.0, 0.9),
        person(500.0, 200.0, 0.5, 0.6),
    ];
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    let raw = RawOutput::new(data, vec![1, 3, 85]);

    let detections = decode(&raw, 0.5, 640, true);
    assert_eq!(detections.len(), 1);
    assert!((detections[0].confidence - 0.9).abs() < 1e-5);
    assert_eq!(detections[0].label, "person");
}

#[test]
fn model_detections_flow_through_to_a_full_result() {
    // Two well-separated people at 0.9 confidence.
    let mut data = Vec::new();
    for center in [160.0f32, 480.0] {
        data.extend_from_slice(&[center, center, 40.0, 90.0, 1.0]);
        let mut scores = vec![0.0f32; 80];
        scores[PERSON_CLASS] = 0.9;
        data.extend_from_slice(&scores);
    }
    let backend = StubBackend::with_output(640, RawOutput::new(data, vec![1, 2, 85]));

    let mut pipeline = Pipeline::new(
        default_settings(),
        vec![Box::new(BackendStrategy::once("stub", backend))],
    );
    let result = pipeline.process(&gray_frame());

    assert_eq!(result.count, 2);
    assert!(!result.degraded);
    assert!((result.mean_confidence - 0.9).abs() < 1e-5);
    let spatial = result.spatial.expect("non-empty result carries a summary");
    assert_eq!(spatial.cluster_count, 2);
    // Centers at 0.25 and 0.75 average to the frame middle.
    assert!((spatial.centroid.0 - 0.5).abs() < 0.05);
}

#[test]
fn invalid_settings_update_is_rejected_atomically() {
    let backend = StubBackend::zeros(640, 8400, 85);
    let mut pipeline = Pipeline::new(
        default_settings(),
        vec![Box::new(BackendStrategy::once("stub", backend))],
    );
    let before = pipeline.settings().clone();

    let err = pipeline
        .update_settings(&SettingsUpdate {
            confidence_threshold: Some(5.0),
            max_detections: Some(0),
            ..SettingsUpdate::default()
        })
        .unwrap_err();

    assert_eq!(err.violations.len(), 2);
    assert_eq!(pipeline.settings(), &before);

    // A valid update still lands afterwards.
    pipeline
        .update_settings(&SettingsUpdate {
            confidence_threshold: Some(0.3),
            ..SettingsUpdate::default()
        })
        .unwrap();
    assert!((pipeline.settings().confidence_threshold - 0.3).abs() < 1e-6);
}
