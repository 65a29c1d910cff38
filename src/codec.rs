//! Per-sample codecs between on-disk bytes and `f64`.
//!
//! Integer PCM is normalized by `2^(w-1)`; on encode, values are clamped to
//! `[-1, 1]`, scaled, truncated toward zero and clipped to the signed range.
//! Floats pass through at native precision.

use byteorder::{BigEndian, LittleEndian};

use crate::types::{ByteOrder, SampleFormat};

/// Decodes one sample from `bytes_per_sample` bytes
pub(crate) type DecodeFn = fn(&[u8]) -> f64;
/// Encodes one sample into `bytes_per_sample` bytes
pub(crate) type EncodeFn = fn(f64, &mut [u8]);

/// Scale, truncate toward zero and clip to the signed `bits`-wide range
#[inline]
fn quantize(x: f64, bits: u32) -> i64 {
    let full = 1i64 << (bits - 1);
    // `as` saturates, and clamp(-1.0) * full == -full is already in range
    let v = (x.clamp(-1.0, 1.0) * full as f64) as i64;
    v.min(full - 1)
}

fn decode_u8(buf: &[u8]) -> f64 {
    (buf[0] as f64 - 128.0) / 128.0
}

fn encode_u8(x: f64, buf: &mut [u8]) {
    buf[0] = (quantize(x, 8) + 128) as u8;
}

fn decode_i8(buf: &[u8]) -> f64 {
    buf[0] as i8 as f64 / 128.0
}

fn encode_i8(x: f64, buf: &mut [u8]) {
    buf[0] = quantize(x, 8) as i8 as u8;
}

fn decode_i16<E: byteorder::ByteOrder>(buf: &[u8]) -> f64 {
    E::read_i16(buf) as f64 / 32_768.0
}

fn encode_i16<E: byteorder::ByteOrder>(x: f64, buf: &mut [u8]) {
    E::write_i16(buf, quantize(x, 16) as i16);
}

fn decode_i24<E: byteorder::ByteOrder>(buf: &[u8]) -> f64 {
    E::read_i24(buf) as f64 / 8_388_608.0
}

fn encode_i24<E: byteorder::ByteOrder>(x: f64, buf: &mut [u8]) {
    E::write_i24(buf, quantize(x, 24) as i32);
}

fn decode_i32<E: byteorder::ByteOrder>(buf: &[u8]) -> f64 {
    E::read_i32(buf) as f64 / 2_147_483_648.0
}

fn encode_i32<E: byteorder::ByteOrder>(x: f64, buf: &mut [u8]) {
    E::write_i32(buf, quantize(x, 32) as i32);
}

fn decode_f32<E: byteorder::ByteOrder>(buf: &[u8]) -> f64 {
    E::read_f32(buf) as f64
}

fn encode_f32<E: byteorder::ByteOrder>(x: f64, buf: &mut [u8]) {
    E::write_f32(buf, x as f32);
}

fn decode_f64<E: byteorder::ByteOrder>(buf: &[u8]) -> f64 {
    E::read_f64(buf)
}

fn encode_f64<E: byteorder::ByteOrder>(x: f64, buf: &mut [u8]) {
    E::write_f64(buf, x);
}

/// Look up the codec pair for a sample format in a given byte order.
///
/// Single-byte formats ignore the byte order.
pub(crate) fn sample_codec(format: SampleFormat, order: ByteOrder) -> (DecodeFn, EncodeFn) {
    match (format, order) {
        (SampleFormat::UInt8, _) => (decode_u8, encode_u8),
        (SampleFormat::Int8, _) => (decode_i8, encode_i8),
        (SampleFormat::Int16, ByteOrder::Little) => {
            (decode_i16::<LittleEndian>, encode_i16::<LittleEndian>)
        }
        (SampleFormat::Int16, ByteOrder::Big) => (decode_i16::<BigEndian>, encode_i16::<BigEndian>),
        (SampleFormat::Int24, ByteOrder::Little) => {
            (decode_i24::<LittleEndian>, encode_i24::<LittleEndian>)
        }
        (SampleFormat::Int24, ByteOrder::Big) => (decode_i24::<BigEndian>, encode_i24::<BigEndian>),
        (SampleFormat::Int32, ByteOrder::Little) => {
            (decode_i32::<LittleEndian>, encode_i32::<LittleEndian>)
        }
        (SampleFormat::Int32, ByteOrder::Big) => (decode_i32::<BigEndian>, encode_i32::<BigEndian>),
        (SampleFormat::Float32, ByteOrder::Little) => {
            (decode_f32::<LittleEndian>, encode_f32::<LittleEndian>)
        }
        (SampleFormat::Float32, ByteOrder::Big) => {
            (decode_f32::<BigEndian>, encode_f32::<BigEndian>)
        }
        (SampleFormat::Float64, ByteOrder::Little) => {
            (decode_f64::<LittleEndian>, encode_f64::<LittleEndian>)
        }
        (SampleFormat::Float64, ByteOrder::Big) => {
            (decode_f64::<BigEndian>, encode_f64::<BigEndian>)
        }
    }
}

/// 80-bit IEEE extended float, used only by the AIFF COMM sample-rate field.
///
/// Layout is big-endian: 1 sign bit, 15 exponent bits (bias 16383), 64
/// mantissa bits with an explicit integer bit. Only finite positive values
/// occur as sample rates, so that is all this codec handles.
pub(crate) mod extended {
    use crate::error::{AudioFileError, AudioFileResult};

    const EXPONENT_BIAS: i32 = 16383;

    /// Encode a finite positive double into the 10-byte extended format
    pub(crate) fn encode(value: f64) -> AudioFileResult<[u8; 10]> {
        if !value.is_finite() {
            return Err(AudioFileError::invalid_argument(format!(
                "cannot encode {} as an 80-bit sample rate",
                value
            )));
        }
        if value <= 0.0 {
            return Err(AudioFileError::invalid_argument(format!(
                "sample rate must be positive, got {}",
                value
            )));
        }

        let bits = value.to_bits();
        let exponent = ((bits >> 52) & 0x7ff) as i32;
        let fraction = bits & 0x000f_ffff_ffff_ffff;
        if exponent == 0 {
            // subnormal doubles are far below any representable sample rate
            return Err(AudioFileError::invalid_argument(
                "sample rate too small for the extended format",
            ));
        }

        let exponent80 = (exponent - 1023 + EXPONENT_BIAS) as u16;
        // explicit integer bit set, fraction left-aligned below it
        let mantissa = 0x8000_0000_0000_0000u64 | (fraction << 11);

        let mut out = [0u8; 10];
        out[0..2].copy_from_slice(&exponent80.to_be_bytes());
        out[2..10].copy_from_slice(&mantissa.to_be_bytes());
        Ok(out)
    }

    /// Decode the 10-byte extended format into a double
    pub(crate) fn decode(bytes: &[u8; 10]) -> AudioFileResult<f64> {
        let negative = bytes[0] & 0x80 != 0;
        let exponent = u16::from_be_bytes([bytes[0] & 0x7f, bytes[1]]) as i32;
        let mut mantissa_bytes = [0u8; 8];
        mantissa_bytes.copy_from_slice(&bytes[2..10]);
        let mantissa = u64::from_be_bytes(mantissa_bytes);

        if exponent == 0 && mantissa == 0 {
            return Ok(0.0);
        }
        if negative || exponent == 0x7fff {
            return Err(AudioFileError::malformed_header_simple(
                "invalid 80-bit sample rate",
                format!("sign {} exponent 0x{:04x}", u8::from(negative), exponent),
            ));
        }

        // mantissa is an integer scaled by 2^(exponent - bias - 63)
        Ok(mantissa as f64 * 2f64.powi(exponent - EXPONENT_BIAS - 63))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_codec_round_trip() {
        let (decode, encode) = sample_codec(SampleFormat::Int16, ByteOrder::Big);
        let mut buf = [0u8; 2];

        encode(0.5, &mut buf);
        assert_eq!(buf, [0x40, 0x00]); // 16384
        assert!((decode(&buf) - 0.5).abs() < 1e-9);

        encode(-1.0, &mut buf);
        assert_eq!(buf, [0x80, 0x00]); // -32768
        assert_eq!(decode(&buf), -1.0);

        // out-of-range input clips to the positive maximum
        encode(1.5, &mut buf);
        assert_eq!(buf, [0x7f, 0xff]); // 32767
    }

    #[test]
    fn test_u8_offset_codec() {
        let (decode, encode) = sample_codec(SampleFormat::UInt8, ByteOrder::Little);
        let mut buf = [0u8; 1];

        encode(0.0, &mut buf);
        assert_eq!(buf[0], 128);
        assert_eq!(decode(&buf), 0.0);

        encode(-1.0, &mut buf);
        assert_eq!(buf[0], 0);
        encode(1.0, &mut buf);
        assert_eq!(buf[0], 255);
    }

    #[test]
    fn test_i24_sign_extension() {
        let (decode_be, _) = sample_codec(SampleFormat::Int24, ByteOrder::Big);
        let (decode_le, encode_le) = sample_codec(SampleFormat::Int24, ByteOrder::Little);

        // -1 in packed 24-bit
        assert_eq!(decode_be(&[0xff, 0xff, 0xff]), -1.0 / 8_388_608.0);
        assert_eq!(decode_le(&[0xff, 0xff, 0xff]), -1.0 / 8_388_608.0);

        let mut buf = [0u8; 3];
        encode_le(-0.5, &mut buf);
        assert_eq!(buf, [0x00, 0x00, 0xc0]); // -4194304 little-endian
        assert_eq!(decode_le(&buf), -0.5);
    }

    #[test]
    fn test_truncation_error_bound() {
        for format in [SampleFormat::Int16, SampleFormat::Int24, SampleFormat::Int32] {
            let (decode, encode) = sample_codec(format, ByteOrder::Little);
            let bits = format.bits_per_sample() as i32;
            let tolerance = 2.02 / 2f64.powi(bits);
            let mut buf = [0u8; 8];
            for &x in &[0.0, 0.25, -0.25, 0.999, -0.999, 1.0 / 3.0, -2.0 / 7.0] {
                encode(x, &mut buf);
                let y = decode(&buf[..format.bytes_per_sample() as usize]);
                assert!(
                    (x - y).abs() <= tolerance,
                    "{format}: {x} -> {y}, tolerance {tolerance}"
                );
            }
        }
    }

    #[test]
    fn test_float_passthrough() {
        let (decode, encode) = sample_codec(SampleFormat::Float64, ByteOrder::Little);
        let mut buf = [0u8; 8];
        let x = core::f64::consts::PI;
        encode(x, &mut buf);
        assert_eq!(decode(&buf), x); // bit-exact

        let (decode32, encode32) = sample_codec(SampleFormat::Float32, ByteOrder::Big);
        let mut buf32 = [0u8; 4];
        encode32(x, &mut buf32);
        assert_eq!(decode32(&buf32), x as f32 as f64);
    }

    #[test]
    fn test_extended_known_rates() {
        // 44100.0 in 80-bit extended, the canonical AIFF rate field
        let bytes = extended::encode(44_100.0).unwrap();
        assert_eq!(bytes, [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]);
        assert_eq!(extended::decode(&bytes).unwrap(), 44_100.0);

        for rate in [8_000.0, 22_050.0, 44_100.0, 48_000.0, 96_000.0, 192_000.0] {
            let encoded = extended::encode(rate).unwrap();
            assert_eq!(extended::decode(&encoded).unwrap(), rate, "rate {}", rate);
        }
    }

    #[test]
    fn test_extended_rejects_non_finite() {
        assert!(extended::encode(f64::NAN).is_err());
        assert!(extended::encode(f64::INFINITY).is_err());
        assert!(extended::encode(-44_100.0).is_err());
        assert!(extended::encode(0.0).is_err());
    }

    #[test]
    fn test_extended_rejects_bad_fields() {
        // negative sign bit
        assert!(extended::decode(&[0xc0, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]).is_err());
        // all-ones exponent (inf/nan)
        assert!(extended::decode(&[0x7f, 0xff, 0x80, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // zero decodes to zero, callers validate range
        assert_eq!(extended::decode(&[0; 10]).unwrap(), 0.0);
    }
}
