// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition seam.
//
// Recognition itself is an external capability. This module defines the
// interface the batch layer calls, plus a process-wide registry that builds
// one engine per language tag on first use and shares it afterwards.
//
// With the `ocr` feature enabled, `OcrsRecognizer` provides an engine backed
// by the `ocrs` crate. It needs two model files per language directory:
//
// - `text-detection.rten`
// - `text-recognition.rten`
//
// Running `ocrs-cli` once downloads them to `~/.cache/ocrs`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use scanmaster_core::error::Result;
use scanmaster_core::types::LanguageTag;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::geometry::Quadrilateral;
use crate::image::RasterImage;

/// One recognised run of text and where it sits in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub bounds: Quadrilateral,
}

/// Everything recognised on one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    /// All span texts joined with newlines, in reading order.
    pub text: String,
    pub spans: Vec<TextSpan>,
}

impl RecognizedText {
    pub fn from_spans(spans: Vec<TextSpan>) -> Self {
        let text = spans
            .iter()
            .map(|span| span.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, spans }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// A loaded recognition engine for one language.
///
/// Implementations are shared across worker threads and must not rely on
/// interior mutation after construction.
pub trait TextRecognizer: Send + Sync {
    /// Recognise text in `image`. No implicit retry.
    fn recognize(&self, image: &RasterImage) -> Result<RecognizedText>;
}

/// Builds a recogniser for a language tag. Called at most once per tag by a
/// successful [`RecognizerRegistry`] lookup.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self, language: &LanguageTag) -> Result<Arc<dyn TextRecognizer>>;
}

impl<F> RecognizerFactory for F
where
    F: Fn(&LanguageTag) -> Result<Arc<dyn TextRecognizer>> + Send + Sync,
{
    fn create(&self, language: &LanguageTag) -> Result<Arc<dyn TextRecognizer>> {
        self(language)
    }
}

/// Slot holding one language's engine once it has been built.
type EngineSlot = Arc<Mutex<Option<Arc<dyn TextRecognizer>>>>;

/// Lazily-populated cache of recognisers keyed by language.
///
/// The map lock is only held to find or insert a language's slot. Each
/// engine is constructed under its own slot mutex, so concurrent first
/// callers for one language trigger exactly one construction while lookups
/// for other languages proceed. Failed constructions leave the slot empty;
/// the next caller retries.
pub struct RecognizerRegistry {
    factory: Box<dyn RecognizerFactory>,
    engines: RwLock<HashMap<LanguageTag, EngineSlot>>,
}

impl RecognizerRegistry {
    pub fn new(factory: impl RecognizerFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch (building on first use) the engine for `language`.
    pub fn engine(&self, language: &LanguageTag) -> Result<Arc<dyn TextRecognizer>> {
        let slot = self.slot(language);
        let mut engine = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = engine.as_ref() {
            return Ok(Arc::clone(engine));
        }

        info!(%language, "Constructing OCR engine");
        let built = self.factory.create(language)?;
        *engine = Some(Arc::clone(&built));
        Ok(built)
    }

    fn slot(&self, language: &LanguageTag) -> EngineSlot {
        if let Some(slot) = self
            .engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language)
        {
            return Arc::clone(slot);
        }
        let mut engines = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(engines.entry(language.clone()).or_default())
    }

    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn recognize(&self, image: &RasterImage, language: &LanguageTag) -> Result<RecognizedText> {
        let engine = self.engine(language)?;
        let text = engine.recognize(image)?;
        debug!(spans = text.spans.len(), "Recognition complete");
        Ok(text)
    }

    /// Languages with a constructed engine, sorted. Engines still being
    /// built are not listed.
    pub fn loaded_languages(&self) -> Vec<LanguageTag> {
        let mut tags: Vec<LanguageTag> = self
            .engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, slot)| match slot.try_lock() {
                Ok(engine) => engine.is_some(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => false,
            })
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        tags
    }
}

impl std::fmt::Debug for RecognizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerRegistry")
            .field("loaded", &self.loaded_languages())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "ocr")]
pub use self::engine::{OcrConfig, OcrsFactory, OcrsRecognizer};

#[cfg(feature = "ocr")]
mod engine {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
    use rten::Model;
    use scanmaster_core::error::{ProcessingError, Result};
    use scanmaster_core::types::LanguageTag;
    use tracing::{debug, info, instrument};

    use super::{RecognizedText, RecognizerFactory, TextRecognizer, TextSpan};
    use crate::geometry::{Point2D, Quadrilateral};
    use crate::image::RasterImage;

    const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
    const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

    /// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
    fn default_model_dir() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg).join("ocrs")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache").join("ocrs")
        } else {
            PathBuf::from("ocrs-models")
        }
    }

    /// Model file locations for one engine.
    #[derive(Debug, Clone)]
    pub struct OcrConfig {
        pub detection_model_path: PathBuf,
        pub recognition_model_path: PathBuf,
    }

    impl Default for OcrConfig {
        fn default() -> Self {
            Self::from_dir(default_model_dir())
        }
    }

    impl OcrConfig {
        pub fn from_dir(dir: impl AsRef<Path>) -> Self {
            let dir = dir.as_ref();
            Self {
                detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
                recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            }
        }

        pub fn validate(&self) -> Result<()> {
            for path in [&self.detection_model_path, &self.recognition_model_path] {
                if !path.exists() {
                    return Err(ProcessingError::Ocr(format!(
                        "model not found at {}; run `ocrs-cli` once to download models",
                        path.display()
                    )));
                }
            }
            Ok(())
        }
    }

    /// Recogniser backed by `ocrs`.
    pub struct OcrsRecognizer {
        engine: OcrEngine,
    }

    impl OcrsRecognizer {
        /// Load both models. This is the expensive step; build once and share.
        #[instrument(skip_all, fields(
            detection = %config.detection_model_path.display(),
            recognition = %config.recognition_model_path.display(),
        ))]
        pub fn new(config: OcrConfig) -> Result<Self> {
            config.validate()?;

            let load = |path: &Path| {
                Model::load_file(path).map_err(|err| {
                    ProcessingError::Ocr(format!(
                        "failed to load model from {}: {err}",
                        path.display()
                    ))
                })
            };
            info!("Loading OCR models");
            let detection_model = load(&config.detection_model_path)?;
            let recognition_model = load(&config.recognition_model_path)?;

            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|err| ProcessingError::Ocr(format!("failed to initialise OCR engine: {err}")))?;

            info!("OCR engine initialised");
            Ok(Self { engine })
        }
    }

    impl TextRecognizer for OcrsRecognizer {
        fn recognize(&self, image: &RasterImage) -> Result<RecognizedText> {
            let rgb = image.as_dynamic().to_rgb8();
            let (width, height) = rgb.dimensions();
            let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
                ProcessingError::Ocr(format!("failed to create image source ({width}x{height}): {err}"))
            })?;
            let input = self
                .engine
                .prepare_input(source)
                .map_err(|err| ProcessingError::Ocr(format!("preprocessing failed: {err}")))?;

            let words = self
                .engine
                .detect_words(&input)
                .map_err(|err| ProcessingError::Ocr(format!("word detection failed: {err}")))?;
            let lines = self.engine.find_text_lines(&input, &words);
            debug!(words = words.len(), lines = lines.len(), "Text layout found");

            let recognized = self
                .engine
                .recognize_text(&input, &lines)
                .map_err(|err| ProcessingError::Ocr(format!("line recognition failed: {err}")))?;

            let spans = recognized
                .iter()
                .flatten()
                .filter_map(|line| {
                    let text = line.to_string();
                    if text.trim().is_empty() {
                        return None;
                    }
                    let rect = line.bounding_rect();
                    let (left, top) = (rect.left() as f64, rect.top() as f64);
                    let (right, bottom) = (rect.right() as f64, rect.bottom() as f64);
                    Some(TextSpan {
                        text,
                        bounds: Quadrilateral::from_ordered([
                            Point2D::new(left, top),
                            Point2D::new(right, top),
                            Point2D::new(right, bottom),
                            Point2D::new(left, bottom),
                        ]),
                    })
                })
                .collect();
            Ok(RecognizedText::from_spans(spans))
        }
    }

    /// Builds an [`OcrsRecognizer`] from `<model_root>/<language>/`, or from
    /// `model_root` itself when no per-language directory exists.
    #[derive(Debug, Clone)]
    pub struct OcrsFactory {
        pub model_root: PathBuf,
    }

    impl OcrsFactory {
        pub fn new(model_root: Option<PathBuf>) -> Self {
            Self {
                model_root: model_root.unwrap_or_else(default_model_dir),
            }
        }
    }

    impl RecognizerFactory for OcrsFactory {
        fn create(&self, language: &LanguageTag) -> Result<Arc<dyn TextRecognizer>> {
            let per_language = self.model_root.join(language.as_str());
            let dir = if per_language.is_dir() {
                per_language
            } else {
                self.model_root.clone()
            };
            Ok(Arc::new(OcrsRecognizer::new(OcrConfig::from_dir(dir))?))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage};
    use scanmaster_core::error::ProcessingError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo(String);

    impl TextRecognizer for Echo {
        fn recognize(&self, _image: &RasterImage) -> Result<RecognizedText> {
            Ok(RecognizedText::from_spans(vec![TextSpan {
                text: self.0.clone(),
                bounds: Quadrilateral::rectangle(10.0, 5.0),
            }]))
        }
    }

    fn blank() -> RasterImage {
        RasterImage::from_dynamic(DynamicImage::ImageLuma8(GrayImage::new(4, 4)))
    }

    #[test]
    fn spans_join_into_page_text() {
        let text = RecognizedText::from_spans(vec![
            TextSpan {
                text: "first".into(),
                bounds: Quadrilateral::rectangle(1.0, 1.0),
            },
            TextSpan {
                text: "second".into(),
                bounds: Quadrilateral::rectangle(1.0, 1.0),
            },
        ]);
        assert_eq!(text.text, "first\nsecond");
        assert!(RecognizedText::default().is_empty());
    }

    #[test]
    fn engines_are_built_once_per_language() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let registry = Arc::new(RecognizerRegistry::new(
            move |lang: &LanguageTag| -> Result<Arc<dyn TextRecognizer>> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok(Arc::new(Echo(lang.to_string())))
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let lang = if i % 2 == 0 { "en" } else { "CH" };
                    registry.recognize(&blank(), &LanguageTag::new(lang)).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(
            registry.loaded_languages(),
            vec![LanguageTag::new("ch"), LanguageTag::new("en")]
        );
        let text = registry.recognize(&blank(), &LanguageTag::new("en")).unwrap();
        assert_eq!(text.text, "en");
    }

    #[test]
    fn slow_construction_does_not_block_other_languages() {
        use std::sync::Barrier;

        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let (on_start, on_release) = (Arc::clone(&started), Arc::clone(&release));
        let registry = Arc::new(RecognizerRegistry::new(
            move |lang: &LanguageTag| -> Result<Arc<dyn TextRecognizer>> {
                if lang.as_str() == "ja" {
                    on_start.wait();
                    on_release.wait();
                }
                Ok(Arc::new(Echo(lang.to_string())))
            },
        ));
        registry.engine(&LanguageTag::new("en")).unwrap();

        let loading = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.engine(&LanguageTag::new("ja")).is_ok())
        };
        started.wait();

        // "ja" is mid-construction here.
        let text = registry.recognize(&blank(), &LanguageTag::new("en")).unwrap();
        assert_eq!(text.text, "en");
        assert_eq!(registry.loaded_languages(), vec![LanguageTag::new("en")]);

        release.wait();
        assert!(loading.join().unwrap());
        assert_eq!(
            registry.loaded_languages(),
            vec![LanguageTag::new("en"), LanguageTag::new("ja")]
        );
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let registry = RecognizerRegistry::new(
            move |_: &LanguageTag| -> Result<Arc<dyn TextRecognizer>> {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProcessingError::Ocr("model missing".into()))
                } else {
                    Ok(Arc::new(Echo("ok".into())))
                }
            },
        );

        let lang = LanguageTag::new("en");
        assert!(registry.engine(&lang).is_err());
        assert!(registry.loaded_languages().is_empty());
        assert!(registry.engine(&lang).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
