//! Shared fixtures for integration tests

#![allow(dead_code)]

use braindead_bgremove::{MattingParams, ModelId, RemovalBackend, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What the fake backend was asked to do
#[derive(Debug, Default)]
pub struct FakeLog {
    pub sessions: Vec<ModelId>,
    pub removals: Vec<(ModelId, Option<MattingParams>)>,
}

#[derive(Debug)]
pub struct FakeSession {
    pub model: ModelId,
}

/// Backend that returns a fixed 10x10 cutout and records every call
///
/// The log is shared so tests can inspect it after the backend has been moved
/// into a processor or worker.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    log: Arc<Mutex<FakeLog>>,
    output: Vec<u8>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(FakeLog::default())),
            output: png_bytes(&RgbaImage::from_pixel(10, 10, Rgba([200, 120, 40, 255]))),
        }
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    pub fn sessions_created(&self) -> usize {
        self.log.lock().unwrap().sessions.len()
    }

    pub fn removals(&self) -> Vec<(ModelId, Option<MattingParams>)> {
        self.log.lock().unwrap().removals.clone()
    }
}

impl RemovalBackend for FakeBackend {
    type Session = FakeSession;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn new_session(&mut self, model: ModelId) -> Result<FakeSession> {
        self.log.lock().unwrap().sessions.push(model);
        Ok(FakeSession { model })
    }

    fn remove(
        &mut self,
        _input: &[u8],
        session: &mut FakeSession,
        matting: Option<&MattingParams>,
    ) -> Result<Vec<u8>> {
        self.log
            .lock()
            .unwrap()
            .removals
            .push((session.model, matting.copied()));
        Ok(self.output.clone())
    }
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Write a small opaque RGB image as `name` inside `dir`
pub fn write_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut image = image::RgbImage::new(16, 12);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = image::Rgb([(x * 15) as u8, (y * 20) as u8, 90]);
    }
    image.save(&path).unwrap();
    path
}

/// Run `process` and collect the status lines it emitted
pub fn process_collecting<P: braindead_bgremove::Processor + ?Sized>(
    processor: &mut P,
    input: &Path,
    output: &Path,
    options: &braindead_bgremove::ProcessingOptions,
) -> (Result<RgbaImage>, Vec<String>) {
    let mut lines = Vec::new();
    let result = processor.process(input, output, options, &mut |s| lines.push(s.to_string()));
    (result, lines)
}
