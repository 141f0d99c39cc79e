use std::ffi::OsString;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::Deserialize;

use super::{MediaBackend, VideoProbe, VideoReader, VideoWriter, WriterSpec};
use crate::error::MediaError;

const FFMPEG_ENV: &str = "BAGVIZ_FFMPEG";
const FFPROBE_ENV: &str = "BAGVIZ_FFPROBE";

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Runs `ffmpeg`/`ffprobe` from `PATH`, or from `BAGVIZ_FFMPEG`/`BAGVIZ_FFPROBE`.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: OsString,
    ffprobe: OsString,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffmpeg: std::env::var_os(FFMPEG_ENV).unwrap_or_else(|| "ffmpeg".into()),
            ffprobe: std::env::var_os(FFPROBE_ENV).unwrap_or_else(|| "ffprobe".into()),
        }
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoProbe, MediaError> {
        if !path.exists() {
            return Err(MediaError::VideoNotFound(path.to_path_buf()));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(MediaError::NotFound)?;
        if !output.status.success() {
            return Err(MediaError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::Parse(format!("{e}: {}", String::from_utf8_lossy(&output.stdout))))?;
        probe_from_output(&parsed)
    }

    fn open_reader(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoReader>, MediaError> {
        if !path.exists() {
            return Err(MediaError::VideoNotFound(path.to_path_buf()));
        }
        let reader = FfmpegReader::spawn(&self.ffmpeg, path, width, height)?;
        Ok(Box::new(reader))
    }

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>, MediaError> {
        let writer = FfmpegWriter::spawn(&self.ffmpeg, spec)?;
        Ok(Box::new(writer))
    }
}

fn probe_from_output(output: &FfprobeOutput) -> Result<VideoProbe, MediaError> {
    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::Parse("no video stream".to_string()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(MediaError::Parse("video stream has no dimensions".to_string()));
    };
    let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .filter_map(|rate| rate.as_deref().and_then(parse_fraction))
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0);
    let duration_secs = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoProbe {
        width,
        height,
        fps,
        duration_secs,
        codec: stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parses `"30/1"`-style rates; a bare number is accepted too.
pub(crate) fn parse_fraction(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.trim().parse().ok(),
    }
}

/// Pipes rgb24 frames into ffmpeg. Output goes to `<path>.partial` and is
/// renamed on [`VideoWriter::finish`]; dropping the writer kills ffmpeg and
/// removes the partial file.
pub struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    // Drained continuously so a chatty ffmpeg never blocks on a full pipe.
    stderr: Option<JoinHandle<String>>,
    partial: PathBuf,
    target: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfmpegWriter {
    fn spawn(ffmpeg: &OsString, spec: &WriterSpec) -> Result<Self, MediaError> {
        if let Some(parent) = spec.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let partial = partial_path(&spec.path);
        let fps = if spec.fps > 0.0 { spec.fps } else { 15.0 };

        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", spec.width, spec.height))
            .arg("-r")
            .arg(format!("{fps:.6}"))
            .args(["-i", "-"])
            .args(["-c:v", spec.codec.encoder(), "-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart", "-f", "mp4"])
            .arg(&partial)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(MediaError::NotFound)?;
        let stdin = child
            .stdin
            .take()
            .map(|stdin| BufWriter::with_capacity(1 << 20, stdin));
        let stderr = child.stderr.take().map(drain_stderr);

        tracing::debug!(
            "Encoding {} with {} at {}x{} @ {:.2} fps",
            spec.path.display(),
            spec.codec.encoder(),
            spec.width,
            spec.height,
            fps
        );

        Ok(Self {
            child: Some(child),
            stdin,
            stderr,
            partial,
            target: spec.path.clone(),
            width: spec.width,
            height: spec.height,
            frames: 0,
        })
    }

    fn abort(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            if self.partial.exists() {
                if let Err(e) = std::fs::remove_file(&self.partial) {
                    tracing::warn!("Failed to remove partial video {}: {}", self.partial.display(), e);
                }
            }
            tracing::warn!("Aborted video {} after {} frames", self.target.display(), self.frames);
        }
    }
}

impl VideoWriter for FfmpegWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))?;
        stdin.write_all(frame.as_raw())?;
        self.frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, MediaError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let Some(mut child) = self.child.take() else {
            return Err(MediaError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        };
        let status = child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            let _ = std::fs::remove_file(&self.partial);
            return Err(MediaError::ExecutionFailed {
                exit_code: status.code(),
                stderr,
            });
        }
        std::fs::rename(&self.partial, &self.target)?;
        tracing::info!("Wrote {} ({} frames)", self.target.display(), self.frames);
        Ok(self.target.clone())
    }
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        self.abort();
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Streams rgb24 frames scaled to a fixed size from ffmpeg's stdout.
pub struct FfmpegReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FfmpegReader {
    fn spawn(ffmpeg: &OsString, path: &Path, width: u32, height: u32) -> Result<Self, MediaError> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(MediaError::NotFound)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))?;
        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }
}

impl VideoReader for FfmpegReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError> {
        let mut buffer = vec![0u8; (self.width * self.height * 3) as usize];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.stdout.read(&mut buffer[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < buffer.len() {
            if filled > 0 {
                tracing::warn!("Discarding truncated trailing frame ({filled} bytes)");
            }
            return Ok(None);
        }
        Ok(RgbImage::from_raw(self.width, self.height, buffer))
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
