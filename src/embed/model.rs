//! Vision encoder for image embeddings, via ONNX Runtime.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::error::{Error, Result};

/// Dimension of the produced embeddings (CLIP ViT-B/32 visual encoder).
pub const EMBEDDING_DIM: usize = 512;

static VISUAL_MODEL: OnceLock<Mutex<Session>> = OnceLock::new();

/// Pretrained image feature extractor. One dense, L2-normalized vector per
/// image; the underlying session is created lazily and shared.
pub struct ImageEncoder {
    _private: (),
}

impl ImageEncoder {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Load the encoder session (downloads the model on first use).
    pub fn init(&self) -> Result<()> {
        init_visual_model()
    }

    pub fn is_ready(&self) -> bool {
        VISUAL_MODEL.get().is_some()
    }

    /// Embed an image file. Unreadable or undecodable files are
    /// [`Error::CorruptImage`].
    pub fn embed_file(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path).map_err(|e| Error::CorruptImage {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.embed(&img)
    }

    /// Embed an already-decoded image.
    pub fn embed(&self, img: &DynamicImage) -> Result<Vec<f32>> {
        if !self.is_ready() {
            init_visual_model()?;
        }
        run_visual_encoder(img)
    }
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn models_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| Error::Encoder {
        reason: "no local data directory for model storage".to_string(),
    })?;
    let models_dir = data_dir.join("phototrail").join("models");
    std::fs::create_dir_all(&models_dir)?;
    Ok(models_dir)
}

/// Download a model file if it doesn't exist yet.
fn ensure_model(filename: &str, url: &str) -> Result<PathBuf> {
    let model_path = models_dir()?.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "downloading vision encoder...");
        let response = ureq::get(url).call().map_err(|e| Error::Encoder {
            reason: format!("model download failed: {e}"),
        })?;

        let mut file = std::fs::File::create(&model_path)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        tracing::info!(model = %filename, path = ?model_path, "vision encoder downloaded");
    }

    Ok(model_path)
}

fn init_visual_model() -> Result<()> {
    if VISUAL_MODEL.get().is_some() {
        return Ok(());
    }

    // Qdrant's CLIP ViT-B/32 visual encoder (ONNX)
    // Source: https://huggingface.co/Qdrant/clip-ViT-B-32-vision
    let model_path = ensure_model(
        "clip-vit-b32-vision.onnx",
        "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx",
    )?;

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(&model_path)?;

    let _ = VISUAL_MODEL.set(Mutex::new(session));
    Ok(())
}

fn run_visual_encoder(img: &DynamicImage) -> Result<Vec<f32>> {
    const INPUT_SIZE: u32 = 224;

    let mut model = VISUAL_MODEL
        .get()
        .ok_or_else(|| Error::Encoder {
            reason: "visual model not initialized".to_string(),
        })?
        .lock()
        .map_err(|e| Error::Encoder {
            reason: format!("failed to lock model: {e}"),
        })?;

    let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // CLIP normalization constants
    let mean = [0.48145466, 0.4578275, 0.40821073];
    let std = [0.26862954, 0.26130258, 0.27577711];

    // NCHW, normalized (pixel/255 - mean) / std
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];

    for y in 0..INPUT_SIZE as usize {
        for x in 0..INPUT_SIZE as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            let idx = y * INPUT_SIZE as usize + x;

            input_data[idx] = ((pixel[0] as f32 / 255.0) - mean[0]) / std[0];
            input_data[plane + idx] = ((pixel[1] as f32 / 255.0) - mean[1]) / std[1];
            input_data[2 * plane + idx] = ((pixel[2] as f32 / 255.0) - mean[2]) / std[2];
        }
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
        input_data.into_boxed_slice(),
    ))?;

    let outputs = model.run(ort::inputs!["pixel_values" => input_tensor])?;

    let embedding_output = outputs.iter().next().ok_or_else(|| Error::Encoder {
        reason: "encoder produced no output".to_string(),
    })?;

    let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

    // L2 normalize
    let embedding: Vec<f32> = embedding_data.to_vec();
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        Ok(embedding.iter().map(|x| x / norm).collect())
    } else {
        Ok(embedding)
    }
}
