//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use beacon_live::voice::codec::{decode_base64, encode_base64, float_to_pcm16, pcm16_to_float};
use beacon_live::voice::resample::downsample;
use beacon_live::voice::{
    AudioBuffer, AudioPipeline, PipelineConfig, PlaybackScheduler, TARGET_SAMPLE_RATE,
};
use tokio_test::{assert_err, assert_ok};

mod common;
use common::FakeSpeaker;

/// Two PCM16 steps (2/32768)
///
/// Encoding scales positive samples by 32767 but decoding divides by 32768,
/// and the encoder truncates. A positive sample can therefore come back up to
/// one step low from truncation plus up to one more from the scale mismatch
/// near full scale. Negative samples stay within one step.
const PCM_TOLERANCE: f32 = 2.0 / 32768.0;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss)]
fn generate_sine_samples(frequency: f32, samples: usize, rate: u32, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn pipeline(speaker: &FakeSpeaker) -> AudioPipeline {
    AudioPipeline::new(PipelineConfig::default(), speaker.output())
}

#[test]
fn test_pcm16_round_trip() {
    let samples: Vec<f32> = (-100i16..=100).map(|i| f32::from(i) / 100.0).collect();
    let buffer = pcm16_to_float(&float_to_pcm16(&samples), 16_000, 1);

    assert_eq!(buffer.frames(), samples.len());
    for (original, decoded) in samples.iter().zip(buffer.channel(0)) {
        let tolerance = if *original < 0.0 {
            PCM_TOLERANCE / 2.0
        } else {
            PCM_TOLERANCE
        };
        assert!(
            (original - decoded).abs() <= tolerance,
            "{original} decoded as {decoded}"
        );
    }
}

#[test]
fn test_pcm16_clamps_out_of_range() {
    let buffer = pcm16_to_float(&float_to_pcm16(&[2.0, -3.0]), 16_000, 1);
    assert!((buffer.channel(0)[0] - 1.0).abs() <= PCM_TOLERANCE);
    assert!((buffer.channel(0)[1] + 1.0).abs() <= PCM_TOLERANCE);
}

#[test]
fn test_base64_round_trip() {
    let bytes: Vec<u8> = (0..=255).collect();
    assert_eq!(assert_ok!(decode_base64(&encode_base64(&bytes))), bytes);
    assert_err!(decode_base64("not base64!"));
}

#[test]
fn test_stereo_pcm_splits_channels() {
    let bytes = float_to_pcm16(&[0.5, -0.5, 0.25, -0.25]);
    let buffer = pcm16_to_float(&bytes, 24_000, 2);
    assert_eq!(buffer.channel_count(), 2);
    assert_eq!(buffer.frames(), 2);
    assert!(buffer.channel(1).iter().all(|s| *s < 0.0));
}

#[test]
fn test_resampler_identity_at_target_rate() {
    let input = generate_sine_samples(440.0, 1600, TARGET_SAMPLE_RATE, 0.5);
    let output = downsample(&input, TARGET_SAMPLE_RATE, TARGET_SAMPLE_RATE);
    assert_eq!(output.as_ref(), input.as_slice());
}

#[test]
fn test_resampler_output_length() {
    for (len, rate, expected) in [(4800, 48_000, 1600), (1001, 48_000, 334), (1000, 44_100, 363)] {
        let input = vec![0.1; len];
        assert_eq!(downsample(&input, rate, TARGET_SAMPLE_RATE).len(), expected, "{len}@{rate}");
    }
}

#[test]
fn test_silent_frames_are_never_sent() {
    let speaker = FakeSpeaker::default();
    let mut p = pipeline(&speaker);
    for _ in 0..8 {
        assert!(p.push_capture_frame(&[0.0; 3000], 48_000).is_empty());
    }
}

#[test]
fn test_any_audible_sample_is_sent() {
    let speaker = FakeSpeaker::default();
    let mut p = pipeline(&speaker);

    let mut frame = vec![0.0; 4096];
    frame[2048] = 0.01;
    let chunks = p.push_capture_frame(&frame, TARGET_SAMPLE_RATE);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].rms() > 0.0);

    let blob = chunks[0].clone().into_blob(TARGET_SAMPLE_RATE);
    assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
    assert_eq!(decode_base64(&blob.data).unwrap().len(), 4096 * 2);
}

#[test]
fn test_capture_resamples_before_chunking() {
    let speaker = FakeSpeaker::default();
    let mut p = pipeline(&speaker);
    let frame = generate_sine_samples(440.0, 12_288, 48_000, 0.3);
    let chunks = p.push_capture_frame(&frame, 48_000);
    assert_eq!(chunks.len(), 1);
    assert_eq!(p.pending_samples(), 0);
}

#[test]
fn test_playback_is_sequential() {
    let mut scheduler = PlaybackScheduler::new();
    let starts: Vec<f64> = [1.0, 0.5, 2.0]
        .into_iter()
        .map(|d| scheduler.schedule(d, 0.0).start_at)
        .collect();
    assert_eq!(starts, vec![0.0, 1.0, 1.5]);
    assert!((scheduler.next_start_time() - 3.5).abs() < 1e-9);
}

#[test]
fn test_playback_cursor_catches_up_after_drain() {
    let mut scheduler = PlaybackScheduler::new();
    let first = scheduler.schedule(0.5, 0.0);
    assert!(scheduler.complete(first.id));

    let second = scheduler.schedule(0.5, 3.0);
    assert!((second.start_at - 3.0).abs() < 1e-9);
}

#[test]
fn test_pipeline_schedules_received_audio_back_to_back() {
    let speaker = FakeSpeaker::default();
    let mut p = pipeline(&speaker);
    speaker.set_now(0.25);

    let bytes = float_to_pcm16(&[0.1; 2400]);
    let first = p.receive_audio(&bytes, 24_000, 1, |_| {}).unwrap();
    let second = p.receive_audio(&bytes, 24_000, 1, |_| {}).unwrap();
    assert!((first.start_at - 0.25).abs() < 1e-9);
    assert!((second.start_at - 0.35).abs() < 1e-9);
    assert_eq!(speaker.units().len(), 2);

    assert!(!p.finish_unit(first.id));
    assert!(p.finish_unit(second.id));
    assert!(!p.is_playing());
}

#[test]
fn test_interrupt_clears_queue() {
    let speaker = FakeSpeaker::default();
    let mut p = pipeline(&speaker);
    p.schedule_buffer(AudioBuffer::mono(vec![0.2; 24_000], 24_000), |_| {})
        .unwrap();
    assert!(p.is_playing());

    p.interrupt();
    assert!(!p.is_playing());
    assert_eq!(speaker.stops(), 1);
    assert!(p.scheduler().next_start_time().abs() < f64::EPSILON);
}
