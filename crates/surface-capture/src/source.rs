//! Frame sources feeding the capture loop.
//!
//! Camera and video drivers live outside this crate: wrap them in a
//! [`FrameSource`], or push their frames through a [`ChannelSource`].

use crate::SourceError;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use surface_capture_core::Frame;

#[cfg(feature = "image")]
use std::path::{Path, PathBuf};

/// Produces one raw camera frame per call.
///
/// Called only from the thread that currently owns the pipeline. An error or
/// an empty frame counts as a failed acquisition for that cycle.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, SourceError>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<Frame, SourceError> + Send,
{
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self()
    }
}

/// Frames pushed from another thread, e.g. a platform capture callback.
pub struct ChannelSource {
    rx: Receiver<Frame>,
    timeout: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Frame>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(SourceError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }
}

/// Still images decoded from disk in order, one per cycle.
#[cfg(feature = "image")]
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

#[cfg(feature = "image")]
impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            next: 0,
            looping: false,
        }
    }

    /// All files in `dir` with a known image extension, sorted by name.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self::new(paths))
    }

    /// Restart from the first file instead of reporting exhaustion.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(feature = "image")]
impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if self.next >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Err(SourceError::Exhausted);
            }
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;
        crate::imageio::load_frame(path)
    }
}
