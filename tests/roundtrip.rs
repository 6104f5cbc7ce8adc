//! End-to-end record, replay, and recovery tests over real files.

use avirec::recover::RecoveryOutcome;
use avirec::{
    recover_file, AviError, AviReader, AviWriter, DataChunk, WriterConfig, HEADER_BYTES,
};
use std::path::Path;

fn frame_fill(i: u32) -> u8 {
    (i % 251) as u8
}

fn record(path: &Path, frames: u32, frame_len: usize, audio_per_frame: usize) {
    let config = WriterConfig::new(640, 480, 30, *b"MJPG", 120);
    let mut writer = AviWriter::create(path, config).unwrap();
    for i in 0..frames {
        writer
            .write_video_frame(&vec![frame_fill(i); frame_len], i / 30)
            .unwrap();
        if audio_per_frame > 0 {
            writer
                .write_audio_frame(&vec![frame_fill(i); audio_per_frame], i / 30)
                .unwrap();
        }
    }
    writer.finalize().unwrap();
    writer.close();
}

#[test]
fn record_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 30, 1000, 0);

    let mut reader = AviReader::open(&path).unwrap();
    assert_eq!(reader.width(), 640);
    assert_eq!(reader.height(), 480);
    assert_eq!(reader.frame_count(), 30);
    assert_eq!(reader.frame_rate(), 30.0);
    assert_eq!(reader.compressor(), *b"MJPG");

    for i in 0..30 {
        assert!(reader.is_keyframe(i).unwrap());
        assert_eq!(reader.frame_size(i).unwrap(), 1000);
        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.len(), 1000);
        assert!(frame.iter().all(|&b| b == frame_fill(i)));
    }
    assert!(reader.read_frame().unwrap().is_none());
}

#[test]
fn random_access_after_seek() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 20, 640, 0);

    let mut reader = AviReader::open(&path).unwrap();
    for &n in &[15u32, 3, 19, 0, 7] {
        reader.seek_to_frame(n).unwrap();
        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame[0], frame_fill(n));
    }
    reader.seek_start();
    let frame = reader.read_frame().unwrap().unwrap();
    assert_eq!(frame[0], frame_fill(0));
}

#[test]
fn interleaved_audio_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 25, 500, 160);

    let mut reader = AviReader::open(&path).unwrap();
    assert!(reader.has_audio());
    assert_eq!(reader.audio_channels(), 1);
    assert_eq!(reader.audio_rate(), 8000);
    assert_eq!(reader.audio_bits(), 16);
    assert_eq!(reader.audio_bytes(), 25 * 160);

    // sequential read across every chunk boundary
    let mut all = vec![0u8; 25 * 160];
    assert_eq!(reader.read_audio(&mut all).unwrap(), 25 * 160);
    for i in 0..25u32 {
        let chunk = &all[(i as usize) * 160..(i as usize + 1) * 160];
        assert!(chunk.iter().all(|&b| b == frame_fill(i)));
    }

    // byte-addressed seek lands mid-chunk
    reader.seek_audio_byte(5 * 160 + 100).unwrap();
    let mut tail = vec![0u8; 60];
    assert_eq!(reader.read_audio(&mut tail).unwrap(), 60);
    assert!(tail.iter().all(|&b| b == frame_fill(5)));
}

#[test]
fn sequential_read_without_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 8, 300, 160);

    let mut reader = AviReader::open(&path).unwrap();
    reader.seek_movi().unwrap();
    let mut order = Vec::new();
    while let Some(chunk) = reader.read_data().unwrap() {
        order.push(match chunk {
            DataChunk::Video(d) => ('v', d.len()),
            DataChunk::Audio(d) => ('a', d.len()),
        });
    }
    assert_eq!(order.len(), 16);
    for pair in order.chunks(2) {
        assert_eq!(pair[0], ('v', 300));
        assert_eq!(pair[1], ('a', 160));
    }
}

#[test]
fn recovery_restores_interrupted_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 40, 800, 160);
    let intact = std::fs::read(&path).unwrap();

    // lose everything after the data region, as a power cut would
    let data_end = HEADER_BYTES as usize + 40 * ((8 + 800) + (8 + 160));
    std::fs::write(&path, &intact[..data_end]).unwrap();

    let report = match recover_file(&path) {
        RecoveryOutcome::Recovered(r) => r,
        other => panic!("expected recovery, got {:?}", other),
    };
    assert_eq!(report.frames, 40);
    assert_eq!(report.audio_bytes, 40 * 160);
    assert_eq!(std::fs::read(&path).unwrap(), intact);

    let mut reader = AviReader::open(&path).unwrap();
    assert_eq!(reader.frame_count(), 40);
    let frame = reader.read_frame().unwrap().unwrap();
    assert_eq!(frame.len(), 800);
}

#[test]
fn capacity_limit_rejects_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    let config = WriterConfig::new(640, 480, 30, *b"MJPG", 10).max_size(HEADER_BYTES + 3000);
    let mut writer = AviWriter::create(&path, config).unwrap();

    writer.write_video_frame(&[0u8; 1000], 0).unwrap();
    writer.write_video_frame(&[0u8; 1000], 0).unwrap();
    let err = writer.write_video_frame(&[0u8; 1000], 0).unwrap_err();
    assert!(matches!(err, AviError::CapacityExceeded(_)));

    // the rejected frame left no trace; the file still finalizes
    writer.finalize().unwrap();
    writer.close();
    let reader = AviReader::open(&path).unwrap();
    assert_eq!(reader.frame_count(), 2);
}

#[test]
fn in_memory_matches_file_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.avi");
    record(&path, 12, 256, 0);
    let from_file = std::fs::read(&path).unwrap();

    let config = WriterConfig::new(640, 480, 30, *b"MJPG", 120);
    let mut writer = AviWriter::in_memory(config).unwrap();
    for i in 0..12 {
        writer
            .write_video_frame(&vec![frame_fill(i); 256], i / 30)
            .unwrap();
    }
    writer.finalize().unwrap();
    let from_memory = writer.close().unwrap();

    assert_eq!(from_file, from_memory);
}
