//! In-memory provider and fixtures for executor tests

use std::collections::VecDeque;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use generation::{
    AssistOutput, AssistRequest, GenerationProvider, GenerationRequest, ImageData,
    ProgressCallback, ProviderCapabilities, ProviderError,
};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use parking_lot::Mutex;

/// Encode a solid-color PNG whose color is derived from `seed`
pub(crate) fn png(width: u32, height: u32, seed: u8) -> ImageData {
    let img = RgbaImage::from_pixel(width, height, Rgba([seed, seed.wrapping_mul(7), 255 - seed, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    ImageData::from_bytes(out.into_inner()).unwrap()
}

/// Write a JPEG fixture below `root`, creating directories
pub(crate) fn write_jpeg(root: &std::path::Path, name: &str, width: u32, height: u32) {
    let img = RgbImage::from_pixel(width, height, Rgb([180, 90, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, out.into_inner()).unwrap();
}

/// Write a PNG fixture below `root`, creating directories
pub(crate) fn write_png(root: &std::path::Path, name: &str, width: u32, height: u32) -> ImageData {
    let image = png(width, height, 99);
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, image.bytes()).unwrap();
    image
}

/// Deterministic provider
///
/// Each `generate_image` call pops the next scripted response; when the
/// script is empty it returns one 64x64 PNG whose color encodes the call
/// number. Every request is recorded.
pub(crate) struct ScriptedProvider {
    connected: bool,
    responses: Mutex<VecDeque<Result<Vec<ImageData>, ProviderError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    assist_output: Option<AssistOutput>,
    assist_requests: Mutex<Vec<AssistRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            connected: true,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            assist_output: None,
            assist_requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// `check_connection` answers false and every generation fails to connect
    pub(crate) fn unreachable() -> Self {
        let mut provider = Self::new();
        provider.connected = false;
        provider
    }

    pub(crate) fn then_fail(self, error: ProviderError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub(crate) fn then_return(self, images: Vec<ImageData>) -> Self {
        self.responses.lock().push_back(Ok(images));
        self
    }

    pub(crate) fn with_assist(mut self, output: AssistOutput) -> Self {
        self.assist_output = Some(output);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn generation_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn assist_requests(&self) -> Vec<AssistRequest> {
        self.assist_requests.lock().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            img2img: true,
            inpainting: true,
            moodboard: true,
            assist: self.assist_output.is_some(),
        }
    }

    async fn check_connection(&self) -> bool {
        self.connected
    }

    async fn generate_image(
        &self,
        request: &GenerationRequest,
        on_progress: &ProgressCallback<'_>,
    ) -> Result<Vec<ImageData>, ProviderError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        if !self.connected {
            return Err(ProviderError::ConnectionFailed("connection refused".into()));
        }

        on_progress(0.0);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        on_progress(1.0);

        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(vec![png(64, 64, call as u8)]),
        }
    }

    async fn assist(&self, request: &AssistRequest) -> Result<AssistOutput, ProviderError> {
        self.assist_requests.lock().push(request.clone());
        self.assist_output
            .clone()
            .ok_or_else(|| ProviderError::Unsupported(request.operation.label().to_string()))
    }
}
