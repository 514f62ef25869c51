//! Audio file decoding

use crate::{resampling, AudioClip, AudioError, TARGET_SAMPLE_RATE};
use hound::WavReader;
use std::path::Path;

/// Load an audio file and return a 16 kHz mono clip
pub fn load_audio_file(path: &str) -> Result<AudioClip, AudioError> {
    let path = Path::new(path);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let clip = match ext.as_str() {
        "wav" => load_wav(path)?,
        "mp3" | "m4a" | "mp4" | "ogg" | "flac" => load_with_symphonia(path)?,
        _ => return Err(AudioError::UnsupportedFormat(ext)),
    };

    tracing::info!(
        "Loaded {:?}: {:.1}s at {} Hz",
        path.file_name().unwrap_or_default(),
        clip.duration_seconds(),
        clip.sample_rate()
    );

    Ok(clip)
}

/// Load a WAV file using hound
fn load_wav(path: &Path) -> Result<AudioClip, AudioError> {
    let reader = WavReader::open(path)
        .map_err(|e| AudioError::Unreadable(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
    };

    if samples.is_empty() {
        return Err(AudioError::Unreadable(format!(
            "{}: no decodable samples",
            path.display()
        )));
    }

    finish(samples, channels, sample_rate)
}

/// Load an audio file using symphonia (mp3, m4a, ogg, flac)
fn load_with_symphonia(path: &Path) -> Result<AudioClip, AudioError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let unreadable = |e: &dyn std::fmt::Display| {
        AudioError::Unreadable(format!("{}: {}", path.display(), e))
    };

    let file = std::fs::File::open(path).map_err(|e| unreadable(&e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let hint = Hint::new();
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| unreadable(&e))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| unreadable(&"no audio track found"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unreadable(&"unknown sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| unreadable(&"unknown channel count"))?
        .count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &decoder_opts)
        .map_err(|e| unreadable(&e))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Tolerate corrupt packets mid-stream; the file as a whole may
            // still decode.
            Err(_) => continue,
        };
        let spec = *decoded.spec();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(unreadable(&"no decodable samples"));
    }

    finish(samples, channels, sample_rate)
}

/// Downmix interleaved samples to mono and resample to the target rate
fn finish(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<AudioClip, AudioError> {
    let mono: Vec<f32> = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    let resampled = if sample_rate != TARGET_SAMPLE_RATE {
        resampling::resample(&mono, sample_rate, TARGET_SAMPLE_RATE)?
    } else {
        mono
    };

    Ok(AudioClip::new(resampled, TARGET_SAMPLE_RATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            let v = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_wav_mono_16k() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16_000.0).sin() * 0.5)
            .collect();
        write_wav(&path, 16_000, 1, &samples);

        let clip = load_audio_file(path.to_str().unwrap()).unwrap();
        assert_eq!(clip.sample_rate(), 16_000);
        assert_eq!(clip.samples().len(), 16_000);
        assert!((clip.duration_seconds() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_wav_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Interleaved L/R frames with opposite signs cancel to near silence
        let samples: Vec<f32> = (0..8_000).flat_map(|_| [0.5, -0.5]).collect();
        write_wav(&path, 16_000, 2, &samples);

        let clip = load_audio_file(path.to_str().unwrap()).unwrap();
        assert_eq!(clip.samples().len(), 8_000);
        assert!(clip.samples().iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_unsupported_format() {
        let err = load_audio_file("/tmp/notes.txt").unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a riff header").unwrap();

        let err = load_audio_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AudioError::Unreadable(_)));
    }
}
