use base64::Engine;

/// Interprets raw little-endian PCM16 bytes as normalized f32 samples.
/// A trailing odd byte is dropped.
pub fn bytes_to_f32(pcm16_bytes: &[u8]) -> Vec<f32> {
    pcm16_bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Converts normalized f32 samples back to little-endian PCM16 bytes.
pub fn f32_to_bytes(pcm32: &[f32]) -> Vec<u8> {
    pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Encodes raw PCM16 bytes as base64 for a wire payload.
pub fn encode_base64(pcm16_bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm16_bytes)
}

/// Decodes a base64 wire payload to raw PCM16 bytes.
pub fn decode_base64(base64_fragment: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(base64_fragment).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bytes_to_f32_known_values() {
        // 16384 little endian = [0x00, 0x40]; normalized = 0.5
        let samples = bytes_to_f32(&[0x00, 0x40, 0x00, 0x80]);
        assert_eq!(samples.len(), 2);
        assert_abs_diff_eq!(samples[0], 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(samples[1], -1.0, epsilon = 0.0001);
    }

    #[test]
    fn test_bytes_to_f32_drops_trailing_odd_byte() {
        assert!(bytes_to_f32(&[0x00]).is_empty());
    }

    #[test]
    fn test_f32_round_trip() {
        let original = vec![0.5f32, -0.25, 0.0, 0.99];
        let bytes = f32_to_bytes(&original);
        let back = bytes_to_f32(&bytes);
        assert_eq!(back.len(), original.len());
        for (a, b) in original.iter().zip(back.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 0.001);
        }
    }

    #[test]
    fn test_f32_to_bytes_clamps_extremes() {
        let bytes = f32_to_bytes(&[2.0, -2.0, f32::NAN]);
        let back = bytes_to_f32(&bytes);
        for v in back {
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_base64_round_trip() {
        let data = vec![1u8, 2, 3, 4];
        assert_eq!(decode_base64(&encode_base64(&data)).unwrap(), data);
        assert!(decode_base64("not base64!").is_none());
    }
}
