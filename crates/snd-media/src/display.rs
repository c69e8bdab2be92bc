//! Waveform and spectrogram rendering.
//!
//! Both images are painted from the PCM working file: the waveform from
//! per-column peak envelopes, the spectrogram from a Hann-windowed FFT
//! centred on each column.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use snd_models::{DisplaySize, FFT_WINDOW_SIZE};

use crate::error::{MediaError, MediaResult};

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const WAVE_COLOR: Rgb<u8> = Rgb([255, 160, 40]);
const CENTER_COLOR: Rgb<u8> = Rgb([60, 60, 60]);

/// Spectrogram dynamic range in dB.
const DB_RANGE: f32 = 100.0;

/// Palette stops from silence to full scale.
const PALETTE: [[f32; 3]; 5] = [
    [0.0, 0.0, 0.0],
    [58.0, 32.0, 130.0],
    [184.0, 40.0, 110.0],
    [245.0, 140.0, 40.0],
    [255.0, 250.0, 200.0],
];

/// Mono samples of a WAV file, read lazily.
struct MonoSamples<'a> {
    inner: Box<dyn Iterator<Item = hound::Result<f32>> + 'a>,
    channels: usize,
}

impl Iterator for MonoSamples<'_> {
    type Item = MediaResult<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sum = 0.0f32;
        for read in 0..self.channels {
            match self.inner.next() {
                Some(Ok(v)) => sum += v,
                Some(Err(e)) => return Some(Err(e.into())),
                // A truncated last frame is averaged over what was read
                None if read == 0 => return None,
                None => return Some(Ok(sum / read as f32)),
            }
        }
        Some(Ok(sum / self.channels as f32))
    }
}

/// Per-column data gathered in a single pass over the audio.
///
/// Memory is bounded by the image width and the FFT window, not by the
/// length of the recording.
#[derive(Debug, Clone)]
pub struct ColumnSummary {
    /// Number of mono frames read
    pub frames: usize,
    /// Min/max envelope per column
    pub peaks: Vec<(f32, f32)>,
    /// FFT input for each column, zero-padded past the end of the audio
    pub windows: Vec<Vec<f32>>,
}

/// Renderer for one display size.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRenderer {
    width: u32,
    height: u32,
    fft_size: usize,
}

impl DisplayRenderer {
    pub fn new(size: DisplaySize) -> Self {
        Self::with_dimensions(size.width(), size.height(), FFT_WINDOW_SIZE)
    }

    pub fn with_dimensions(width: u32, height: u32, fft_size: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fft_size: fft_size.max(2),
        }
    }

    /// Stream a PCM WAV file, mixing all channels down to mono.
    pub fn summarize_file(&self, path: &Path) -> MediaResult<ColumnSummary> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let frames = reader.duration() as usize;

        let inner: Box<dyn Iterator<Item = hound::Result<f32>> + '_> = match spec.sample_format {
            hound::SampleFormat::Float => Box::new(reader.samples::<f32>()),
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(MediaError::invalid_audio(format!(
                        "unsupported bit depth {}",
                        spec.bits_per_sample
                    )));
                }
                let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                Box::new(reader.samples::<i32>().map(move |s| s.map(|v| v as f32 / scale)))
            }
        };

        self.summarize(
            MonoSamples {
                inner,
                channels: usize::from(spec.channels.max(1)),
            },
            frames,
        )
    }

    /// Fold `frames` mono samples into per-column peaks and FFT windows.
    pub fn summarize<I>(&self, samples: I, frames: usize) -> MediaResult<ColumnSummary>
    where
        I: IntoIterator<Item = MediaResult<f32>>,
    {
        let width = self.width as usize;
        let n = self.fft_size;
        let mut windows = vec![vec![0.0f32; n]; width];
        if frames == 0 {
            return Ok(ColumnSummary {
                frames,
                peaks: vec![(0.0, 0.0); width],
                windows,
            });
        }

        // Both span lists are non-decreasing, so the columns touching a
        // sample form a contiguous run starting at a moving cursor
        let spans: Vec<(usize, usize)> = (0..width)
            .map(|x| {
                let start = (x * frames / width).min(frames - 1);
                let end = ((x + 1) * frames / width).clamp(start + 1, frames);
                (start, end)
            })
            .collect();
        let window_starts: Vec<usize> = (0..width)
            .map(|x| ((x * frames + frames / 2) / width).saturating_sub(n / 2))
            .collect();

        let mut peaks = vec![(1.0f32, -1.0f32); width];
        let mut first_span = 0;
        let mut first_window = 0;
        let mut read = 0;

        for (i, sample) in samples.into_iter().take(frames).enumerate() {
            let sample = sample?;
            read = i + 1;

            while first_span < width && spans[first_span].1 <= i {
                first_span += 1;
            }
            for x in first_span..width {
                let (start, end) = spans[x];
                if start > i {
                    break;
                }
                if i < end {
                    let s = sample.clamp(-1.0, 1.0);
                    peaks[x] = (peaks[x].0.min(s), peaks[x].1.max(s));
                }
            }

            while first_window < width && window_starts[first_window] + n <= i {
                first_window += 1;
            }
            for x in first_window..width {
                let start = window_starts[x];
                if start > i {
                    break;
                }
                windows[x][i - start] = sample;
            }
        }

        // Columns past a short read stay flat
        for peak in &mut peaks {
            if peak.0 > peak.1 {
                *peak = (0.0, 0.0);
            }
        }

        Ok(ColumnSummary {
            frames: read,
            peaks,
            windows,
        })
    }

    /// Paint the waveform image.
    pub fn waveform(&self, summary: &ColumnSummary) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let mid = (self.height - 1) as f32 / 2.0;
        for x in 0..self.width {
            img.put_pixel(x, mid.round() as u32, CENTER_COLOR);
        }

        if summary.frames == 0 {
            return img;
        }

        for (x, (lo, hi)) in summary.peaks.iter().enumerate() {
            let top = (mid - hi * mid).round().clamp(0.0, (self.height - 1) as f32) as u32;
            let bottom = (mid - lo * mid).round().clamp(0.0, (self.height - 1) as f32) as u32;
            for y in top..=bottom {
                img.put_pixel(x as u32, y, WAVE_COLOR);
            }
        }
        img
    }

    /// Paint the spectrogram image (low frequencies at the bottom, log scale).
    pub fn spectrogram(&self, summary: &ColumnSummary) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        if summary.frames == 0 {
            return img;
        }

        let n = self.fft_size;
        let bins = n / 2;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        let window = hann_window(n);
        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); n];

        // Row -> FFT bin, log-spaced from the first bin to Nyquist
        let max_bin = (bins - 1).max(1) as f32;
        let row_bins: Vec<usize> = (0..self.height)
            .map(|y| {
                let frac = if self.height > 1 {
                    (self.height - 1 - y) as f32 / (self.height - 1) as f32
                } else {
                    0.0
                };
                (max_bin.powf(frac).round() as usize).clamp(1, bins - 1)
            })
            .collect();

        for (x, samples) in summary.windows.iter().enumerate() {
            for ((slot, sample), w) in buffer.iter_mut().zip(samples).zip(&window) {
                *slot = Complex::new(sample * w, 0.0);
            }
            fft.process(&mut buffer);

            for (y, bin) in row_bins.iter().enumerate() {
                let magnitude = buffer[*bin].norm() / bins as f32;
                let db = 20.0 * magnitude.max(1e-10).log10();
                let level = ((db + DB_RANGE) / DB_RANGE).clamp(0.0, 1.0);
                img.put_pixel(x as u32, y as u32, palette(level));
            }
        }
        img
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
        .collect()
}

fn palette(level: f32) -> Rgb<u8> {
    let scaled = level * (PALETTE.len() - 1) as f32;
    let idx = (scaled.floor() as usize).min(PALETTE.len() - 2);
    let t = scaled - idx as f32;
    let (a, b) = (PALETTE[idx], PALETTE[idx + 1]);
    let mix = |i: usize| (a[i] + (b[i] - a[i]) * t).round().clamp(0.0, 255.0) as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// Render waveform and spectrogram images of one size. Blocking.
pub fn render_displays(
    input: &Path,
    waveform_path: &Path,
    spectrogram_path: &Path,
    size: DisplaySize,
) -> MediaResult<()> {
    let renderer = DisplayRenderer::new(size);
    let summary = renderer.summarize_file(input)?;

    renderer
        .waveform(&summary)
        .save_with_format(waveform_path, ImageFormat::Png)?;
    renderer
        .spectrogram(&summary)
        .save_with_format(spectrogram_path, ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sine(path: &Path, channels: u16, seconds: f32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (8000.0 * seconds) as usize;
        for i in 0..frames {
            let v = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 8000.0).sin();
            for _ in 0..channels {
                writer.write_sample((v * i16::MAX as f32 * 0.8) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn summarize(renderer: &DisplayRenderer, samples: &[f32]) -> ColumnSummary {
        renderer
            .summarize(samples.iter().map(|s| Ok(*s)), samples.len())
            .unwrap()
    }

    #[test]
    fn test_summarize_file_mixes_to_mono() {
        let dir = TempDir::new().unwrap();
        let wav = dir.path().join("stereo.wav");
        write_sine(&wav, 2, 0.5);

        let summary = DisplayRenderer::new(DisplaySize::Medium)
            .summarize_file(&wav)
            .unwrap();
        assert_eq!(summary.frames, 4000);
        assert_eq!(summary.peaks.len(), 120);
        assert!(summary
            .peaks
            .iter()
            .all(|(lo, hi)| (-1.0..=1.0).contains(lo) && (-1.0..=1.0).contains(hi)));
    }

    #[test]
    fn test_opposite_channels_cancel_out() {
        let dir = TempDir::new().unwrap();
        let wav = dir.path().join("phase.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav, spec).unwrap();
        for i in 0..800i16 {
            writer.write_sample(i * 10).unwrap();
            writer.write_sample(-i * 10).unwrap();
        }
        writer.finalize().unwrap();

        let summary = DisplayRenderer::with_dimensions(10, 10, 16)
            .summarize_file(&wav)
            .unwrap();
        assert_eq!(summary.frames, 800);
        assert!(summary.peaks.iter().all(|p| *p == (0.0, 0.0)));
    }

    #[test]
    fn test_peak_columns_cover_signal() {
        let renderer = DisplayRenderer::with_dimensions(4, 10, 16);
        let samples = [0.1, -0.5, 0.9, 0.2, -0.2, 0.3, 0.0, -1.5];
        let summary = summarize(&renderer, &samples);
        assert_eq!(summary.peaks.len(), 4);
        assert_eq!(summary.peaks[0], (-0.5, 0.1));
        assert_eq!(summary.peaks[1], (0.2, 0.9));
        assert_eq!(summary.peaks[3], (-1.0, 0.0));
    }

    #[test]
    fn test_peak_columns_wider_than_signal() {
        let renderer = DisplayRenderer::with_dimensions(8, 10, 16);
        let summary = summarize(&renderer, &[0.5, -0.5]);
        assert_eq!(summary.peaks.len(), 8);
        assert!(summary.peaks.iter().all(|(lo, hi)| lo <= hi));
        assert_eq!(summary.peaks[0], (0.5, 0.5));
        assert_eq!(summary.peaks[7], (-0.5, -0.5));
    }

    #[test]
    fn test_windows_are_centred_on_columns() {
        let renderer = DisplayRenderer::with_dimensions(2, 10, 4);
        let samples: Vec<f32> = (0..8).map(|i| i as f32 / 10.0).collect();
        let summary = summarize(&renderer, &samples);
        assert_eq!(summary.windows[0], vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(summary.windows[1], vec![0.4, 0.5, 0.6, 0.7]);
    }

    #[test]
    fn test_windows_are_zero_padded_past_the_end() {
        let renderer = DisplayRenderer::with_dimensions(1, 10, 8);
        let summary = summarize(&renderer, &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(
            summary.windows[0],
            vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_short_read_leaves_flat_columns() {
        let renderer = DisplayRenderer::with_dimensions(4, 10, 4);
        // Header claims 8 frames, only 2 arrive
        let summary = renderer
            .summarize([0.4f32, -0.4].into_iter().map(Ok), 8)
            .unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.peaks[0], (-0.4, 0.4));
        assert_eq!(summary.peaks[3], (0.0, 0.0));
    }

    #[test]
    fn test_render_displays_writes_sized_pngs() {
        let dir = TempDir::new().unwrap();
        let wav = dir.path().join("work.wav");
        write_sine(&wav, 2, 1.0);

        for size in DisplaySize::ALL {
            let wave = dir.path().join(format!("wave_{}.png", size.tag()));
            let spec = dir.path().join(format!("spec_{}.png", size.tag()));
            render_displays(&wav, &wave, &spec, size).unwrap();

            assert_eq!(
                image::image_dimensions(&wave).unwrap(),
                (size.width(), size.height())
            );
            assert_eq!(
                image::image_dimensions(&spec).unwrap(),
                (size.width(), size.height())
            );
        }
    }

    #[test]
    fn test_empty_audio_renders_blank_images() {
        let renderer = DisplayRenderer::new(DisplaySize::Medium);
        let summary = summarize(&renderer, &[]);
        let spec = renderer.spectrogram(&summary);
        assert!(spec.pixels().all(|p| *p == BACKGROUND));
        let wave = renderer.waveform(&summary);
        assert_eq!(wave.dimensions(), (120, 71));
    }

    #[test]
    fn test_palette_endpoints() {
        assert_eq!(palette(0.0), Rgb([0, 0, 0]));
        assert_eq!(palette(1.0), Rgb([255, 250, 200]));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = render_displays(
            &dir.path().join("nope.wav"),
            &dir.path().join("w.png"),
            &dir.path().join("s.png"),
            DisplaySize::Medium,
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::Wav(_)));
    }
}
