use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Scale applied to negative samples; the full i16 negative range.
pub const PCM16_NEGATIVE_SCALE: f32 = 32768.0;
/// Scale applied to non-negative samples; the full i16 positive range.
pub const PCM16_POSITIVE_SCALE: f32 = 32767.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has an odd byte length ({0})")]
    OddLength(usize),
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Converts one normalized sample to PCM16.
///
/// The sample is clamped to [-1.0, 1.0]; negative values scale by 32768 and
/// non-negative values by 32767, truncating toward zero. The asymmetry is part
/// of the wire format and is not mirrored by [`pcm16_to_float`].
pub fn float_to_pcm16(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * PCM16_NEGATIVE_SCALE) as i16
    } else {
        (sample * PCM16_POSITIVE_SCALE) as i16
    }
}

/// Converts one PCM16 sample back to a normalized float. Always divides by 32768.
pub fn pcm16_to_float(sample: i16) -> f32 {
    sample as f32 / PCM16_NEGATIVE_SCALE
}

/// Encodes normalized samples as base64 PCM16 little-endian.
pub fn encode(pcm32: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm32.to_binary())
}

/// Decodes base64 PCM16 little-endian into normalized samples.
pub fn decode(base64_fragment: &str) -> Result<Vec<f32>, DecodeError> {
    Ok(decode_i16(base64_fragment)?
        .into_iter()
        .map(pcm16_to_float)
        .collect())
}

/// Decodes base64 PCM16 little-endian into raw i16 samples.
pub fn decode_i16(base64_fragment: &str) -> Result<Vec<i16>, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Serializes audio samples to PCM16 little-endian bytes.
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter().flat_map(|&sample| sample.to_le_bytes()).collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| float_to_pcm16(sample).to_le_bytes())
            .collect()
    }
}
