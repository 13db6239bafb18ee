//! ITU-T G.711 companding (µ-law and A-law).
//!
//! Both directions operate on 16-bit linear PCM samples. µ-law uses the
//! standard 0x84 bias with clipping at 32635; A-law uses the 0x55 even-bit
//! inversion.

/// µ-law bias added before segment search.
const ULAW_BIAS: i32 = 0x84;

/// Largest magnitude representable before µ-law clipping.
const ULAW_CLIP: i32 = 32635;

/// Compress one linear PCM sample to µ-law.
#[inline]
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > ULAW_CLIP {
        pcm = ULAW_CLIP;
    }
    pcm += ULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask: i32 = 0x4000;
    while pcm & mask == 0 && exponent > 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Expand one µ-law byte to linear PCM.
#[inline]
pub fn ulaw_to_linear(encoded: u8) -> i16 {
    let inverted = !encoded;
    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i32;
    let mantissa = (inverted & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compress one linear PCM sample to A-law.
#[inline]
pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign_mask: i32 = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let encoded = if pcm < 0x100 {
        pcm >> 4
    } else {
        let mut exponent: i32 = 7;
        let mut mask: i32 = 0x4000;
        while pcm & mask == 0 {
            exponent -= 1;
            mask >>= 1;
        }
        let mantissa = (pcm >> (exponent + 3)) & 0x0F;
        (exponent << 4) | mantissa
    };

    (encoded ^ sign_mask) as u8
}

/// Expand one A-law byte to linear PCM.
#[inline]
pub fn alaw_to_linear(encoded: u8) -> i16 {
    let value = encoded ^ 0x55;
    let sign = value & 0x80;
    let exponent = ((value >> 4) & 0x07) as i32;
    let mantissa = (value & 0x0F) as i32;

    let mut magnitude = (mantissa << 4) + 8;
    if exponent != 0 {
        magnitude = (magnitude + 0x100) << (exponent - 1);
    }
    if sign != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}
