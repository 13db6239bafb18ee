//! Streaming linear-interpolation resampler.
//!
//! The resampler keeps exactly one sample of history between calls, so each
//! input block produces its output immediately and no more than one sample of
//! latency is ever held back.

/// Linear resampler carrying fractional position across blocks.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next block; `-1.0`
    /// addresses the carried `last` sample.
    position: f64,
    last: i16,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate as f64,
            position: 0.0,
            last: 0,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Resample one block of samples.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }

        let len = input.len() as f64;
        let mut output = Vec::with_capacity((len / self.step).ceil() as usize + 1);

        while self.position < len - 1.0 {
            let index = self.position.floor();
            let frac = self.position - index;
            let index = index as isize;

            let s0 = if index < 0 {
                self.last
            } else {
                input[index as usize]
            } as f64;
            let s1 = input[(index + 1) as usize] as f64;

            output.push((s0 + (s1 - s0) * frac).round() as i16);
            self.position += self.step;
        }

        self.position -= len;
        self.last = input[input.len() - 1];
        output
    }

    /// Forget carried history, e.g. after an interruption.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = 0;
    }
}
