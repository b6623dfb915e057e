//! # Image Encoder Module
//!
//! Astrazione sul codec: codifica un'immagine a una qualità (o livello PNG)
//! data e restituisce la dimensione in byte dell'output.
//!
//! ## Responsabilità:
//! - `ImageEncoder`: trait bloccante, iniettato nel worker pool e nel solver
//! - `EncodeSettings`: qualità del codec + flag di rimozione metadata
//! - `ImageCrateEncoder`: implementazione reale basata sul crate `image`
//!
//! ## Concorrenza:
//! L'encode è CPU-bound e bloccante: il lato async lo invoca sempre
//! tramite `tokio::task::spawn_blocking`.
//!
//! ## Metadata:
//! Il re-encode tramite `image` non copia mai blocchi EXIF/GPS, quindi la
//! rimozione dei metadata è sempre garantita.

use crate::error::EncodeError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder as _};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Quality parameter understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderQuality {
    /// JPEG quality on the encoder scale (the solver stays within 60-95)
    Lossy(u8),
    /// PNG compression level 0-9
    Lossless(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub quality: EncoderQuality,
    pub strip_metadata: bool,
}

/// Codifica un'immagine su `output` e restituisce la dimensione scritta
pub trait ImageEncoder: Send + Sync {
    fn encode(
        &self,
        input: &Path,
        settings: &EncodeSettings,
        output: &Path,
    ) -> Result<u64, EncodeError>;
}

/// Encoder basato sul crate `image` (JPEG per lossy, PNG per lossless)
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateEncoder;

impl ImageCrateEncoder {
    pub fn new() -> Self {
        Self
    }

    fn png_compression(level: u8) -> CompressionType {
        match level {
            0..=2 => CompressionType::Fast,
            3..=6 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }

    fn write_jpeg<W: Write>(img: &DynamicImage, quality: u8, writer: W) -> Result<(), EncodeError> {
        let rgb = img.to_rgb8();
        let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
        encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        Ok(())
    }

    fn write_png<W: Write>(img: &DynamicImage, level: u8, writer: W) -> Result<(), EncodeError> {
        if level > 9 {
            return Err(EncodeError::Unsupported(format!("PNG level {} out of range 0-9", level)));
        }
        let encoder =
            PngEncoder::new_with_quality(writer, Self::png_compression(level), FilterType::Adaptive);
        if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        } else {
            let rgb = img.to_rgb8();
            encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
        Ok(())
    }
}

impl ImageEncoder for ImageCrateEncoder {
    fn encode(
        &self,
        input: &Path,
        settings: &EncodeSettings,
        output: &Path,
    ) -> Result<u64, EncodeError> {
        let img = image::io::Reader::open(input)?
            .with_guessed_format()?
            .decode()?;

        if !settings.strip_metadata {
            debug!("Metadata cannot be carried over when re-encoding {}", input.display());
        }

        let mut writer = BufWriter::new(File::create(output)?);
        match settings.quality {
            EncoderQuality::Lossy(quality) => Self::write_jpeg(&img, quality, &mut writer)?,
            EncoderQuality::Lossless(level) => Self::write_png(&img, level, &mut writer)?,
        }
        writer.flush()?;
        drop(writer);

        Ok(std::fs::metadata(output)?.len())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Encoder sintetico per i test: scrive un numero deterministico di byte.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    type SizeFn = dyn Fn(u8) -> u64 + Send + Sync;

    pub struct SyntheticEncoder {
        size_for: Box<SizeFn>,
        delay: Duration,
        panic_on: Option<String>,
        sleep_on: Option<(String, Duration)>,
        in_flight: AtomicUsize,
        pub peak: AtomicUsize,
        pub calls: Mutex<Vec<EncodeSettings>>,
        /// (input file name, start, end) of every completed encode
        pub spans: Mutex<Vec<(String, Instant, Instant)>>,
    }

    impl SyntheticEncoder {
        pub fn new(size_for: impl Fn(u8) -> u64 + Send + Sync + 'static) -> Self {
            Self {
                size_for: Box::new(size_for),
                delay: Duration::ZERO,
                panic_on: None,
                sleep_on: None,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                spans: Mutex::new(Vec::new()),
            }
        }

        /// Dimensione lineare nella qualità del codec: `bytes_per_step * quality`
        pub fn linear(bytes_per_step: u64) -> Self {
            Self::new(move |quality| bytes_per_step * u64::from(quality))
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Panic when the input file name contains `needle`
        pub fn panicking_on(mut self, needle: &str) -> Self {
            self.panic_on = Some(needle.to_string());
            self
        }

        /// Sleep for `delay` when the input file name contains `needle`
        pub fn sleeping_on(mut self, needle: &str, delay: Duration) -> Self {
            self.sleep_on = Some((needle.to_string(), delay));
            self
        }

        pub fn into_arc(self) -> Arc<Self> {
            Arc::new(self)
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// First start and last end of the encodes for inputs containing `needle`
        pub fn span_of(&self, needle: &str) -> Option<(Instant, Instant)> {
            let spans = self.spans.lock().unwrap();
            let matching = spans.iter().filter(|(name, _, _)| name.contains(needle));
            let start = matching.clone().map(|(_, start, _)| *start).min()?;
            let end = matching.map(|(_, _, end)| *end).max()?;
            Some((start, end))
        }
    }

    impl ImageEncoder for SyntheticEncoder {
        fn encode(
            &self,
            input: &Path,
            settings: &EncodeSettings,
            output: &Path,
        ) -> Result<u64, EncodeError> {
            let started = Instant::now();
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            self.calls.lock().unwrap().push(*settings);

            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(needle) = &self.panic_on {
                if name.contains(needle.as_str()) {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    panic!("synthetic encoder panic for {}", name);
                }
            }
            if let Some((needle, delay)) = &self.sleep_on {
                if name.contains(needle.as_str()) {
                    std::thread::sleep(*delay);
                }
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            let quality = match settings.quality {
                EncoderQuality::Lossy(q) => q,
                EncoderQuality::Lossless(level) => level,
            };
            let size = (self.size_for)(quality);
            let written = std::fs::write(output, vec![0u8; size as usize]);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.spans.lock().unwrap().push((name, started, Instant::now()));
            written?;
            Ok(size)
        }
    }
}
