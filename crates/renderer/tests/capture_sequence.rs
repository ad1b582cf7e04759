//! Drives the exporter and sketch clock the way the window loop does, with the
//! GPU readback replaced by pixels synthesised from the frame plan.

use std::fs;
use std::path::Path;

use renderer::{
    plan_frame, sequence_file_name, time_source_for, ExportProgress, ExportSettings,
    ExportState, FramePlan, FrameExporter, ShaderSketch,
};

const SIZE: (u32, u32) = (8, 4);

fn synthesise_pixels(plan: &FramePlan) -> Vec<u8> {
    let shade = (plan.uniforms.time * 60.0).round().clamp(0.0, 255.0) as u8;
    let (width, height) = plan.size;
    [shade, 0, 255, 255].repeat((width * height) as usize)
}

/// Runs frames until the exporter finishes or `max_frames` have been drawn.
fn run_frames(exporter: &mut FrameExporter, sketch: &mut ShaderSketch, max_frames: u64) -> u64 {
    for drawn in 1..=max_frames {
        let ticket = exporter.begin();
        let time = sketch.advance();
        let plan = plan_frame(time, SIZE);
        if let Some(ticket) = ticket {
            let pixels = synthesise_pixels(&plan);
            let progress = exporter
                .end(ticket, SIZE.0, SIZE.1, &pixels)
                .expect("write frame");
            if progress == ExportProgress::Finished && exporter.should_exit() {
                return drawn;
            }
        }
    }
    max_frames
}

fn sequence_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn capture_writes_inclusive_range_and_exits() {
    let temp = tempfile::tempdir().unwrap();
    let settings = ExportSettings {
        capture: true,
        output_dir: temp.path().join("out"),
        frame_start: 2,
        frame_end: 5,
        frame_rate: 60.0,
        ..ExportSettings::default()
    };
    let mut exporter = FrameExporter::from_settings(&settings, SIZE).unwrap();
    exporter.start_export().unwrap();
    let mut sketch = ShaderSketch::new(time_source_for(None, Some(exporter.frame_rate())));

    let drawn = run_frames(&mut exporter, &mut sketch, 100);
    assert_eq!(drawn, 6);
    assert_eq!(exporter.state(), ExportState::Finished);
    assert_eq!(exporter.written(), 4);

    let expected: Vec<String> = (2..=5).map(sequence_file_name).collect();
    assert_eq!(sequence_files(&settings.output_dir), expected);

    // Frame 3 at 60 fps is u_time = 0.05 s, shaded as 3.
    let image = image::open(settings.output_dir.join("frame_00003.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(image.dimensions(), SIZE);
    assert_eq!(image.get_pixel(0, 0).0, [3, 0, 255, 255]);
}

#[test]
fn disabled_capture_leaves_output_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("frame_00000.png"), b"previous run").unwrap();

    let settings = ExportSettings {
        output_dir: out.clone(),
        frame_start: 0,
        frame_end: 3,
        overwrite_sequence: true,
        auto_exit: true,
        ..ExportSettings::default()
    };
    let mut exporter = FrameExporter::from_settings(&settings, SIZE).unwrap();
    exporter.start_export().unwrap();
    let mut sketch = ShaderSketch::new(time_source_for(None, None));

    assert_eq!(run_frames(&mut exporter, &mut sketch, 20), 20);
    assert_eq!(exporter.state(), ExportState::Armed);
    assert!(!exporter.should_exit());
    assert_eq!(sequence_files(&out), vec!["frame_00000.png".to_string()]);
    assert_eq!(fs::read(out.join("frame_00000.png")).unwrap(), b"previous run");
}

#[test]
fn frozen_time_overrides_capture_clock() {
    let temp = tempfile::tempdir().unwrap();
    let settings = ExportSettings {
        capture: true,
        output_dir: temp.path().join("still"),
        frame_start: 0,
        frame_end: 2,
        auto_exit: false,
        ..ExportSettings::default()
    };
    let mut exporter = FrameExporter::from_settings(&settings, SIZE).unwrap();
    exporter.start_export().unwrap();
    let mut sketch = ShaderSketch::new(time_source_for(Some(1.0), Some(exporter.frame_rate())));

    assert_eq!(run_frames(&mut exporter, &mut sketch, 10), 10);
    assert_eq!(exporter.state(), ExportState::Finished);
    assert_eq!(exporter.written(), 3);
    for index in 0..=2 {
        let image = image::open(settings.output_dir.join(sequence_file_name(index)))
            .unwrap()
            .to_rgba8();
        assert_eq!(image.get_pixel(7, 3).0, [60, 0, 255, 255]);
    }
}

#[test]
fn capture_clock_steps_for_the_whole_session() {
    let temp = tempfile::tempdir().unwrap();
    let settings = ExportSettings {
        capture: true,
        output_dir: temp.path().join("stepped"),
        frame_start: 2,
        frame_end: 3,
        frame_rate: 30.0,
        auto_exit: false,
        ..ExportSettings::default()
    };
    let mut exporter = FrameExporter::from_settings(&settings, SIZE).unwrap();
    exporter.start_export().unwrap();
    let mut sketch = ShaderSketch::new(time_source_for(None, Some(exporter.frame_rate())));

    let mut times = Vec::new();
    for _ in 0..8 {
        let ticket = exporter.begin();
        let plan = plan_frame(sketch.advance(), SIZE);
        if let Some(ticket) = ticket {
            exporter
                .end(ticket, SIZE.0, SIZE.1, &synthesise_pixels(&plan))
                .unwrap();
        }
        times.push((plan.uniforms.frame, plan.uniforms.time));
    }

    assert_eq!(exporter.state(), ExportState::Finished);
    for (frame, time) in times {
        assert!((time - frame as f32 / 30.0).abs() < 1e-6, "frame {frame} at {time}");
    }
}
