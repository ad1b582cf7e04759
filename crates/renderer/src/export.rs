//! Numbered PNG sequence exporter.
//!
//! The exporter is configured once at startup and armed with
//! [`FrameExporter::start_export`]. Each frame the render loop asks
//! [`FrameExporter::begin`] for a [`CaptureTicket`]; when one is handed out the
//! frame is also rendered offscreen and its pixels are passed back through
//! [`FrameExporter::end`].
//!
//! Capture is an explicit mode. With it disabled the exporter still accepts
//! its whole configuration and reports itself armed, but never creates,
//! deletes or writes anything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::ExportSettings;

const SEQUENCE_PREFIX: &str = "frame_";
const SEQUENCE_EXTENSION: &str = ".png";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid exporter setup: {0}")]
    InvalidSetup(String),
    #[error("export frame range is inverted: end ({end}) is before start ({start})")]
    InvalidRange { start: u64, end: u64 },
    #[error("an image sequence already exists in {} and overwriting is disabled", .0.display())]
    SequenceExists(PathBuf),
    #[error("exporter is not armed; call start_export first")]
    NotArmed,
    #[error("export I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read back captured frame: {0}")]
    Readback(String),
    #[error("captured frame is {width}x{height} with {actual} bytes; expected {expected_width}x{expected_height} RGBA8 ({expected} bytes)")]
    PixelSize {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Configuring,
    Armed,
    Capturing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProgress {
    Capturing,
    Finished,
}

/// Permission to capture one frame, handed out by [`FrameExporter::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    index: u64,
}

impl CaptureTicket {
    /// Absolute frame index the captured image is written under.
    pub fn index(&self) -> u64 {
        self.index
    }
}

#[derive(Debug)]
pub struct FrameExporter {
    capture: bool,
    size: Option<(u32, u32)>,
    frame_rate: f32,
    frame_start: u64,
    frame_end: u64,
    output_dir: PathBuf,
    overwrite_sequence: bool,
    auto_exit: bool,
    state: ExportState,
    next_frame: u64,
    written: u64,
}

impl FrameExporter {
    pub fn new(capture: bool) -> Self {
        let defaults = ExportSettings::default();
        Self {
            capture,
            size: None,
            frame_rate: defaults.frame_rate,
            frame_start: defaults.frame_start,
            frame_end: defaults.frame_end,
            output_dir: defaults.output_dir,
            overwrite_sequence: defaults.overwrite_sequence,
            auto_exit: defaults.auto_exit,
            state: ExportState::Configuring,
            next_frame: 0,
            written: 0,
        }
    }

    /// Builds an exporter configured in the same order the sketch sets it up:
    /// size and rate, range, output directory, overwrite and auto-exit.
    pub fn from_settings(settings: &ExportSettings, size: (u32, u32)) -> Result<Self, ExportError> {
        let mut exporter = Self::new(settings.capture);
        exporter.setup(size.0, size.1, settings.frame_rate)?;
        exporter.set_frame_range(settings.frame_start, settings.frame_end)?;
        exporter.set_output_dir(&settings.output_dir);
        exporter.set_overwrite_sequence(settings.overwrite_sequence);
        exporter.set_auto_exit(settings.auto_exit);
        Ok(exporter)
    }

    pub fn setup(&mut self, width: u32, height: u32, frame_rate: f32) -> Result<(), ExportError> {
        self.ensure_configuring()?;
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidSetup(format!(
                "capture size must be non-zero, got {width}x{height}"
            )));
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(ExportError::InvalidSetup(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }
        self.size = Some((width, height));
        self.frame_rate = frame_rate;
        Ok(())
    }

    /// Sets the inclusive frame-index range to capture.
    pub fn set_frame_range(&mut self, start: u64, end: u64) -> Result<(), ExportError> {
        self.ensure_configuring()?;
        if end < start {
            return Err(ExportError::InvalidRange { start, end });
        }
        self.frame_start = start;
        self.frame_end = end;
        Ok(())
    }

    pub fn set_output_dir(&mut self, dir: impl AsRef<Path>) {
        self.output_dir = dir.as_ref().to_path_buf();
    }

    pub fn set_overwrite_sequence(&mut self, overwrite: bool) {
        self.overwrite_sequence = overwrite;
    }

    pub fn set_auto_exit(&mut self, auto_exit: bool) {
        self.auto_exit = auto_exit;
    }

    /// Arms the exporter.
    ///
    /// With capture enabled the output directory is created and an existing
    /// sequence is removed or rejected according to the overwrite flag. With
    /// capture disabled the filesystem is left alone.
    pub fn start_export(&mut self) -> Result<(), ExportError> {
        self.ensure_configuring()?;
        if self.size.is_none() {
            return Err(ExportError::InvalidSetup(
                "setup must be called before start_export".into(),
            ));
        }

        if !self.capture {
            tracing::info!(
                output_dir = %self.output_dir.display(),
                frame_start = self.frame_start,
                frame_end = self.frame_end,
                "exporter armed with capture disabled; no frames will be written"
            );
            self.state = ExportState::Armed;
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let existing = existing_sequence(&self.output_dir)?;
        if !existing.is_empty() {
            if !self.overwrite_sequence {
                return Err(ExportError::SequenceExists(self.output_dir.clone()));
            }
            for path in &existing {
                fs::remove_file(path).map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            tracing::info!(
                removed = existing.len(),
                output_dir = %self.output_dir.display(),
                "removed previous image sequence"
            );
        }

        tracing::info!(
            output_dir = %self.output_dir.display(),
            frame_start = self.frame_start,
            frame_end = self.frame_end,
            frame_rate = self.frame_rate,
            "exporter armed; capturing frames"
        );
        self.state = ExportState::Armed;
        Ok(())
    }

    /// Counts the next frame and returns a ticket when it should be captured.
    pub fn begin(&mut self) -> Option<CaptureTicket> {
        if !matches!(self.state, ExportState::Armed | ExportState::Capturing) {
            return None;
        }
        let index = self.next_frame;
        self.next_frame = self.next_frame.saturating_add(1);
        if self.capture && (self.frame_start..=self.frame_end).contains(&index) {
            Some(CaptureTicket { index })
        } else {
            None
        }
    }

    /// Writes the captured RGBA8 frame for `ticket` and advances the state.
    pub fn end(
        &mut self,
        ticket: CaptureTicket,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<ExportProgress, ExportError> {
        if !matches!(self.state, ExportState::Armed | ExportState::Capturing) {
            return Err(ExportError::NotArmed);
        }
        let (expected_width, expected_height) = self.size.ok_or(ExportError::NotArmed)?;
        let expected = expected_width as usize * expected_height as usize * 4;
        if (width, height) != (expected_width, expected_height) || pixels.len() != expected {
            return Err(ExportError::PixelSize {
                width,
                height,
                expected_width,
                expected_height,
                expected,
                actual: pixels.len(),
            });
        }

        let path = self.sequence_path(ticket.index);
        image::save_buffer_with_format(
            &path,
            pixels,
            width,
            height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|source| match source {
            image::ImageError::IoError(source) => ExportError::Io {
                path: path.clone(),
                source,
            },
            source => ExportError::Image {
                path: path.clone(),
                source,
            },
        })?;
        self.written += 1;
        tracing::debug!(frame = ticket.index, path = %path.display(), "wrote frame");

        if ticket.index >= self.frame_end {
            self.state = ExportState::Finished;
            tracing::info!(
                frames = self.written,
                output_dir = %self.output_dir.display(),
                "image sequence complete"
            );
            Ok(ExportProgress::Finished)
        } else {
            self.state = ExportState::Capturing;
            Ok(ExportProgress::Capturing)
        }
    }

    /// Whether the application should quit because the sequence is complete.
    pub fn should_exit(&self) -> bool {
        self.auto_exit && self.state == ExportState::Finished
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Number of frames written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File the frame with `index` is written to.
    pub fn sequence_path(&self, index: u64) -> PathBuf {
        self.output_dir.join(sequence_file_name(index))
    }

    fn ensure_configuring(&self) -> Result<(), ExportError> {
        if self.state == ExportState::Configuring {
            Ok(())
        } else {
            Err(ExportError::InvalidSetup(
                "exporter is already armed; configuration is fixed".into(),
            ))
        }
    }
}

pub fn sequence_file_name(index: u64) -> String {
    format!("{SEQUENCE_PREFIX}{index:05}{SEQUENCE_EXTENSION}")
}

fn is_sequence_file(name: &str) -> bool {
    name.strip_prefix(SEQUENCE_PREFIX)
        .and_then(|rest| rest.strip_suffix(SEQUENCE_EXTENSION))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn existing_sequence(dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    let io_error = |source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let is_file = entry.file_type().map_err(io_error)?.is_file();
        if is_file && entry.file_name().to_str().is_some_and(is_sequence_file) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, capture: bool, range: (u64, u64)) -> ExportSettings {
        ExportSettings {
            capture,
            output_dir: dir.to_path_buf(),
            frame_start: range.0,
            frame_end: range.1,
            ..ExportSettings::default()
        }
    }

    fn solid(width: u32, height: u32) -> Vec<u8> {
        [255u8, 64, 0, 255].repeat((width * height) as usize)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn sequence_names_are_zero_padded() {
        assert_eq!(sequence_file_name(0), "frame_00000.png");
        assert_eq!(sequence_file_name(42), "frame_00042.png");
        assert_eq!(sequence_file_name(123456), "frame_123456.png");
        assert!(is_sequence_file("frame_00007.png"));
        assert!(!is_sequence_file("frame_.png"));
        assert!(!is_sequence_file("frame_00007.jpg"));
        assert!(!is_sequence_file("frame_7a.png"));
        assert!(!is_sequence_file("notes.txt"));
    }

    #[test]
    fn disabled_capture_never_touches_the_disk() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("frame_00000.png"), b"old").unwrap();

        for (overwrite, auto_exit) in [(true, true), (false, false)] {
            let mut exporter =
                FrameExporter::from_settings(&settings(&out, false, (0, 3)), (4, 4)).unwrap();
            exporter.set_overwrite_sequence(overwrite);
            exporter.set_auto_exit(auto_exit);
            exporter.start_export().unwrap();
            assert_eq!(exporter.state(), ExportState::Armed);

            for _ in 0..10 {
                assert!(exporter.begin().is_none());
            }
            assert_eq!(exporter.state(), ExportState::Armed);
            assert!(!exporter.should_exit());
            assert_eq!(exporter.written(), 0);
        }

        assert_eq!(file_names(&out), vec!["frame_00000.png"]);
        assert_eq!(fs::read(out.join("frame_00000.png")).unwrap(), b"old");
    }

    #[test]
    fn disabled_capture_does_not_create_the_output_dir() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("never");
        let mut exporter =
            FrameExporter::from_settings(&settings(&out, false, (0, 1000)), (8, 8)).unwrap();
        exporter.start_export().unwrap();
        assert!(!out.exists());
    }

    #[test]
    fn captures_inclusive_range_then_finishes() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("seq");
        let mut exporter =
            FrameExporter::from_settings(&settings(&out, true, (2, 4)), (3, 2)).unwrap();
        exporter.start_export().unwrap();
        assert!(out.is_dir());

        let pixels = solid(3, 2);
        let mut progress = Vec::new();
        for _ in 0..8 {
            if let Some(ticket) = exporter.begin() {
                progress.push(exporter.end(ticket, 3, 2, &pixels).unwrap());
            }
            if exporter.should_exit() {
                break;
            }
        }

        assert_eq!(
            progress,
            vec![
                ExportProgress::Capturing,
                ExportProgress::Capturing,
                ExportProgress::Finished
            ]
        );
        assert_eq!(exporter.state(), ExportState::Finished);
        assert_eq!(exporter.written(), 3);
        assert_eq!(
            file_names(&out),
            vec!["frame_00002.png", "frame_00003.png", "frame_00004.png"]
        );

        let decoded = image::open(out.join("frame_00003.png")).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 64, 0, 255]);
    }

    #[test]
    fn finished_exporter_stops_handing_out_tickets() {
        let temp = tempfile::tempdir().unwrap();
        let mut exporter =
            FrameExporter::from_settings(&settings(temp.path(), true, (0, 0)), (1, 1)).unwrap();
        exporter.set_auto_exit(false);
        exporter.start_export().unwrap();
        let ticket = exporter.begin().unwrap();
        assert_eq!(
            exporter.end(ticket, 1, 1, &solid(1, 1)).unwrap(),
            ExportProgress::Finished
        );
        assert!(!exporter.should_exit());
        assert!(exporter.begin().is_none());
    }

    #[test]
    fn overwrite_replaces_only_sequence_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("frame_00000.png"), b"old").unwrap();
        fs::write(temp.path().join("frame_00999.png"), b"old").unwrap();
        fs::write(temp.path().join("notes.txt"), b"keep").unwrap();

        let mut exporter =
            FrameExporter::from_settings(&settings(temp.path(), true, (0, 0)), (2, 2)).unwrap();
        exporter.start_export().unwrap();
        assert_eq!(file_names(temp.path()), vec!["notes.txt"]);

        let ticket = exporter.begin().unwrap();
        exporter.end(ticket, 2, 2, &solid(2, 2)).unwrap();
        assert_eq!(
            file_names(temp.path()),
            vec!["frame_00000.png", "notes.txt"]
        );
    }

    #[test]
    fn existing_sequence_rejected_without_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("frame_00010.png"), b"old").unwrap();

        let mut exporter =
            FrameExporter::from_settings(&settings(temp.path(), true, (0, 5)), (2, 2)).unwrap();
        exporter.set_overwrite_sequence(false);
        let err = exporter.start_export().unwrap_err();
        assert!(matches!(err, ExportError::SequenceExists(_)));
        assert_eq!(exporter.state(), ExportState::Configuring);
        assert_eq!(fs::read(temp.path().join("frame_00010.png")).unwrap(), b"old");
    }

    #[test]
    fn setup_rejects_invalid_values() {
        let mut exporter = FrameExporter::new(true);
        assert!(matches!(
            exporter.setup(0, 720, 30.0),
            Err(ExportError::InvalidSetup(_))
        ));
        assert!(matches!(
            exporter.setup(1280, 720, 0.0),
            Err(ExportError::InvalidSetup(_))
        ));
        assert!(matches!(
            exporter.set_frame_range(10, 9),
            Err(ExportError::InvalidRange { start: 10, end: 9 })
        ));
        assert!(matches!(
            exporter.start_export(),
            Err(ExportError::InvalidSetup(_))
        ));
    }

    #[test]
    fn configuration_is_fixed_once_armed() {
        let temp = tempfile::tempdir().unwrap();
        let mut exporter =
            FrameExporter::from_settings(&settings(temp.path(), false, (0, 10)), (2, 2)).unwrap();
        exporter.start_export().unwrap();
        assert!(exporter.set_frame_range(0, 20).is_err());
        assert!(exporter.setup(4, 4, 60.0).is_err());
    }

    #[test]
    fn end_validates_state_and_pixels() {
        let temp = tempfile::tempdir().unwrap();
        let mut exporter =
            FrameExporter::from_settings(&settings(temp.path(), true, (0, 10)), (2, 2)).unwrap();
        let early = CaptureTicket { index: 0 };
        assert!(matches!(
            exporter.end(early, 2, 2, &solid(2, 2)),
            Err(ExportError::NotArmed)
        ));

        exporter.start_export().unwrap();
        let ticket = exporter.begin().unwrap();
        let err = exporter.end(ticket, 2, 2, &solid(2, 1)).unwrap_err();
        assert!(matches!(err, ExportError::PixelSize { actual: 8, expected: 16, .. }));
        let err = exporter.end(ticket, 4, 1, &solid(4, 1)).unwrap_err();
        assert!(matches!(err, ExportError::PixelSize { .. }));
        assert_eq!(exporter.written(), 0);
    }
}
