//! Mock backend for exercising the processor without model files

use crate::{
    config::MattingParams,
    error::{BgRemovalError, Result},
    inference::RemovalBackend,
    models::ModelId,
};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Session handed out by [`MockBackend`]
#[derive(Debug)]
pub struct MockSession {
    pub model: ModelId,
    pub serial: usize,
}

/// Backend that records every call and returns a fixed PNG
#[derive(Debug)]
pub struct MockBackend {
    call_history: Vec<String>,
    session_models: Vec<ModelId>,
    remove_calls: Vec<Option<MattingParams>>,
    output: Vec<u8>,
    fail_session_for: Option<ModelId>,
    fail_remove: Option<String>,
    available: bool,
}

impl MockBackend {
    /// Mock returning a 10x10 half-transparent red PNG
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_history: Vec::new(),
            session_models: Vec::new(),
            remove_calls: Vec::new(),
            output: Self::png_bytes(&RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 128]))),
            fail_session_for: None,
            fail_remove: None,
            available: true,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn failing_session_for(mut self, model: ModelId) -> Self {
        self.fail_session_for = Some(model);
        self
    }

    #[must_use]
    pub fn failing_remove<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_remove = Some(message.into());
        self
    }

    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .expect("encoding an in-memory PNG cannot fail");
        buffer.into_inner()
    }

    /// Every backend call in order, e.g. `new_session:u2net`, `remove`
    pub fn call_history(&self) -> &[String] {
        &self.call_history
    }

    /// Number of sessions successfully created
    pub fn sessions_created(&self) -> usize {
        self.session_models.len()
    }

    /// Models of the successfully created sessions, in order
    pub fn session_models(&self) -> Vec<ModelId> {
        self.session_models.clone()
    }

    /// Matting parameters received by each `remove` call
    pub fn remove_calls(&self) -> Vec<Option<MattingParams>> {
        self.remove_calls.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RemovalBackend for MockBackend {
    type Session = MockSession;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn new_session(&mut self, model: ModelId) -> Result<MockSession> {
        self.call_history.push(format!("new_session:{model}"));
        if self.fail_session_for == Some(model) {
            return Err(BgRemovalError::processing(format!(
                "mock failed to load {model}"
            )));
        }
        self.session_models.push(model);
        Ok(MockSession {
            model,
            serial: self.session_models.len(),
        })
    }

    fn remove(
        &mut self,
        _input: &[u8],
        session: &mut MockSession,
        matting: Option<&MattingParams>,
    ) -> Result<Vec<u8>> {
        self.call_history
            .push(format!("remove:{}#{}", session.model, session.serial));
        self.remove_calls.push(matting.copied());
        if let Some(message) = &self.fail_remove {
            return Err(BgRemovalError::processing(message.clone()));
        }
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut backend = MockBackend::new();
        let mut session = backend.new_session(ModelId::U2Net).unwrap();
        let out = backend.remove(b"x", &mut session, None).unwrap();

        assert_eq!(backend.call_history(), ["new_session:u2net", "remove:u2net#1"]);
        assert_eq!(image::load_from_memory(&out).unwrap().width(), 10);
    }

    #[test]
    fn test_mock_failures() {
        let mut backend = MockBackend::new().failing_session_for(ModelId::Sam);
        assert!(backend.new_session(ModelId::Sam).is_err());
        assert_eq!(backend.sessions_created(), 0);

        let mut backend = MockBackend::new().failing_remove("nope");
        let mut session = backend.new_session(ModelId::U2Net).unwrap();
        assert!(backend.remove(b"x", &mut session, None).is_err());
    }
}
