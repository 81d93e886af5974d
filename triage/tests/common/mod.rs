#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use once_cell::sync::Lazy;
use reqwest::multipart::{Form, Part};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use triage::advice::{AdviceError, AdviceGenerator};
use triage::classifier::{Classifier, ClassifierError};
use triage::labels::LabelSet;
use triage::router::router;
use triage::severity::DEFAULT_THRESHOLD;
use triage::uploads::UploadStore;

pub static LABELS: Lazy<Arc<LabelSet>> = Lazy::new(|| {
    Arc::new(LabelSet::new(vec![
        "Acne".to_string(),
        "Eczema".to_string(),
        "Psoriasis".to_string(),
    ]))
});

/// Reads the probabilities straight off the top-left pixel: red, green and
/// blue map to the three labels, scaled to [0, 1].
#[derive(Clone, Default)]
pub struct PixelClassifier;

impl Classifier for PixelClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Vec<f32>, ClassifierError> {
        let rgb = image.to_rgb8();
        let pixel = rgb.get_pixel(0, 0);
        Ok(pixel.0.iter().map(|c| f32::from(*c) / 255.0).collect())
    }
}

/// Returns more probabilities than there are labels.
#[derive(Clone, Default)]
pub struct OversizedClassifier;

impl Classifier for OversizedClassifier {
    fn classify(&self, _image: &DynamicImage) -> Result<Vec<f32>, ClassifierError> {
        Ok(vec![0.5, 0.5, 0.5, 0.5])
    }
}

#[derive(Clone, Default)]
pub struct RecordingAdvice {
    pub calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl RecordingAdvice {
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdviceGenerator for RecordingAdvice {
    async fn advise(&self, symptoms: &str, disease: Option<&str>) -> Result<String, AdviceError> {
        self.calls
            .lock()
            .unwrap()
            .push((symptoms.to_string(), disease.map(str::to_owned)));
        Ok(format!("advice for {}", disease.unwrap_or("unknown")))
    }
}

#[derive(Clone, Default)]
pub struct FailingAdvice;

#[async_trait]
impl AdviceGenerator for FailingAdvice {
    async fn advise(&self, _symptoms: &str, _disease: Option<&str>) -> Result<String, AdviceError> {
        Err(AdviceError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

pub fn png(pixel: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb(pixel));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn image_part(name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str("image/png")
        .unwrap()
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    _tempdir: TempDir,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn start<C, A>(classifier: C, advice: A) -> ServerHandle
    where
        C: Classifier + Send + Sync + 'static,
        A: AdviceGenerator + Send + Sync + 'static,
    {
        let tempdir = tempfile::tempdir().unwrap();
        let upload_dir = tempdir.path().join("uploads");

        let app = router(
            classifier,
            advice,
            LABELS.clone(),
            UploadStore::new(upload_dir.clone()),
            DEFAULT_THRESHOLD,
            10 * 1024 * 1024,
            false,
        );

        Self::for_router(app, upload_dir, tempdir).await
    }

    async fn for_router(app: Router, upload_dir: PathBuf, tempdir: TempDir) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
        });

        ServerHandle {
            addr,
            upload_dir,
            _tempdir: tempdir,
            shutdown,
        }
    }

    pub async fn send_predict_request(&self, form: Form) -> reqwest::Response {
        let client = reqwest::Client::new();
        client
            .post(format!("http://{:?}/predict", self.addr))
            .multipart(form)
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn send_raw_predict_request(
        &self,
        content_type: Option<&str>,
        body: &'static str,
    ) -> reqwest::Response {
        let client = reqwest::Client::new();
        let mut req = client.post(format!("http://{:?}/predict", self.addr));
        if let Some(content_type) = content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        req.body(body).send().await.expect("failed to send request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(format!("http://{:?}{}", self.addr, path))
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
