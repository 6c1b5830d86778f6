//! External detection engine runner.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::detector::{DetectedFrame, DetectionRequest, DetectionRun, Detector};
use crate::error::{MediaError, MediaResult};
use crate::protocol::{parse_line, EngineEvent};

/// Lines of stderr kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// How to launch the engine.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Program name or path
    pub program: String,
    /// Arguments placed before the detection arguments
    pub program_args: Vec<String>,
    pub model_path: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "yolo-detect".to_string(),
            program_args: Vec::new(),
            model_path: "yolov8n.pt".to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            program: std::env::var("DETECTOR_BIN").unwrap_or(defaults.program),
            program_args: std::env::var("DETECTOR_ARGS")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            model_path: std::env::var("MODEL_PATH").unwrap_or(defaults.model_path),
        }
    }
}

/// Detector backed by an external engine process.
#[derive(Debug, Clone)]
pub struct CliDetector {
    program: PathBuf,
    config: DetectorConfig,
}

impl CliDetector {
    /// Resolve the engine program on `PATH`.
    pub fn new(config: DetectorConfig) -> MediaResult<Self> {
        let program = which::which(&config.program)
            .map_err(|_| MediaError::EngineNotFound(config.program.clone()))?;
        Ok(Self { program, config })
    }

    pub fn from_env() -> MediaResult<Self> {
        Self::new(DetectorConfig::from_env())
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command(&self, request: &DetectionRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.config.program_args)
            .arg("--source")
            .arg(&request.input_path)
            .arg("--output")
            .arg(&request.output_path)
            .arg("--model")
            .arg(&self.config.model_path)
            .arg("--conf")
            .arg(request.confidence_threshold.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Detector for CliDetector {
    fn detect(&self, request: &DetectionRequest) -> MediaResult<DetectionRun> {
        if !request.input_path.is_file() {
            return Err(MediaError::FileNotFound(request.input_path.clone()));
        }

        debug!(
            program = %self.program.display(),
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            "Starting detection engine"
        );

        let mut child = self.command(request).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::detection_failed("engine stdout not captured"))?;
        let stderr_tail = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        let mut frames = EngineFrames {
            lines: BufReader::new(stdout).lines(),
            child: Some(child),
            stderr_tail,
            threshold: request.confidence_threshold,
            last_index: None,
            done: false,
        };

        let info = match frames.next_event() {
            Some(Ok(EngineEvent::Meta(info))) => info,
            Some(Ok(EngineEvent::Error { message })) => {
                frames.abort();
                return Err(MediaError::detection_failed(message));
            }
            Some(Ok(EngineEvent::Frame(_))) => {
                frames.abort();
                return Err(MediaError::protocol("frame received before meta header"));
            }
            Some(Err(e)) => {
                frames.abort();
                return Err(e);
            }
            None => {
                return Err(frames.finish().err().unwrap_or_else(|| {
                    MediaError::protocol("engine exited without a meta header")
                }))
            }
        };

        info!(
            fps = info.fps,
            total_frames = info.total_frames,
            width = info.width,
            height = info.height,
            "Detection engine started"
        );

        Ok(DetectionRun {
            info,
            frames: Box::new(frames),
        })
    }
}

/// Frame iterator over a running engine process.
struct EngineFrames {
    lines: Lines<BufReader<ChildStdout>>,
    child: Option<Child>,
    stderr_tail: Option<JoinHandle<String>>,
    threshold: f32,
    last_index: Option<u64>,
    done: bool,
}

impl EngineFrames {
    fn next_event(&mut self) -> Option<MediaResult<EngineEvent>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            match parse_line(&line) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Wait for the engine to exit and check its status.
    fn finish(&mut self) -> MediaResult<()> {
        self.done = true;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self.stderr_tail.take().and_then(|h| h.join().ok());

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::engine_failed(
                format!("engine exited with {}", status),
                stderr,
                status.code(),
            ))
        }
    }

    fn abort(&mut self) {
        self.done = true;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Engine already exited: {}", e);
            }
            let _ = child.wait();
        }
    }

    fn accept(&mut self, mut frame: DetectedFrame) -> MediaResult<DetectedFrame> {
        if let Some(last) = self.last_index {
            if frame.index <= last {
                return Err(MediaError::protocol(format!(
                    "frame index {} after {}",
                    frame.index, last
                )));
            }
        }
        self.last_index = Some(frame.index);
        frame.detections.retain(|d| d.confidence >= self.threshold);
        counter!("vdet_frames_detected_total").increment(1);
        Ok(frame)
    }
}

impl Iterator for EngineFrames {
    type Item = MediaResult<DetectedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match self.next_event() {
            Some(Ok(EngineEvent::Frame(frame))) => self.accept(frame),
            Some(Ok(EngineEvent::Error { message })) => Err(MediaError::detection_failed(message)),
            Some(Ok(EngineEvent::Meta(_))) => Err(MediaError::protocol("duplicate meta header")),
            Some(Err(e)) => Err(e),
            None => return self.finish().err().map(Err),
        };

        if result.is_err() {
            self.abort();
        }
        Some(result)
    }
}

impl Drop for EngineFrames {
    fn drop(&mut self) {
        if self.child.is_some() {
            warn!("Frame stream dropped before the engine finished, killing engine");
            self.abort();
        }
    }
}
