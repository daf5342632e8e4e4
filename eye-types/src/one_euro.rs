//! The One-Euro low-pass filter (Casiez, Roussel, Vogel 2012), used to
//! smooth both gaze coordinates (OSC transmitter) and LEAP landmarks.

fn smoothing_factor(dt: f64, cutoff: f64) -> f64 {
    let r = 2.0 * std::f64::consts::PI * cutoff * dt;
    r / (r + 1.0)
}

fn exponential_smoothing(alpha: f64, value: f64, prev: f64) -> f64 {
    alpha * value + (1.0 - alpha) * prev
}

#[derive(Debug, Clone, Copy)]
struct Scalar {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_prev: f64,
    dx_prev: f64,
    initialized: bool,
}

impl Scalar {
    fn new(min_cutoff: f64, beta: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff: 1.0,
            x_prev: 0.0,
            dx_prev: 0.0,
            initialized: false,
        }
    }

    fn set_params(&mut self, min_cutoff: f64, beta: f64) {
        self.min_cutoff = min_cutoff;
        self.beta = beta;
    }

    fn filter(&mut self, x: f64, dt: f64) -> f64 {
        if !self.initialized {
            self.x_prev = x;
            self.dx_prev = 0.0;
            self.initialized = true;
            return x;
        }
        if dt <= 0.0 {
            return self.x_prev;
        }
        let dx = (x - self.x_prev) / dt;
        let a_d = smoothing_factor(dt, self.d_cutoff);
        let dx_hat = exponential_smoothing(a_d, dx, self.dx_prev);

        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let a = smoothing_factor(dt, cutoff);
        let x_hat = exponential_smoothing(a, x, self.x_prev);

        self.x_prev = x_hat;
        self.dx_prev = dx_hat;
        x_hat
    }
}

/// Filters an N-dimensional signal (2-vector gaze, 7x2 landmark set, ...)
/// one scalar filter per channel.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    channels: Vec<Scalar>,
}

impl OneEuroFilter {
    pub fn new(channels: usize, min_cutoff: f64, beta: f64) -> Self {
        Self {
            channels: vec![Scalar::new(min_cutoff, beta); channels],
        }
    }

    /// Updates every channel's cutoff/beta in place, preserving the filter's
    /// running state (`x_prev`/`dx_prev`) so a config change doesn't cause a
    /// smoothing discontinuity.
    pub fn set_params(&mut self, min_cutoff: f64, beta: f64) {
        for channel in &mut self.channels {
            channel.set_params(min_cutoff, beta);
        }
    }

    /// `dt <= 0.0` bypasses smoothing and returns `values` unchanged, per
    /// the transmitter's "bypass if delta_time is zero" contract.
    pub fn filter(&mut self, values: &[f64], dt: f64) -> Vec<f64> {
        if dt <= 0.0 {
            return values.to_vec();
        }
        values
            .iter()
            .zip(self.channels.iter_mut())
            .map(|(&v, ch)| ch.filter(v, dt))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through_unfiltered() {
        let mut f = OneEuroFilter::new(2, 0.9, 5.0);
        let out = f.filter(&[0.25, 0.75], 1.0 / 60.0);
        assert_eq!(out, vec![0.25, 0.75]);
    }

    #[test]
    fn zero_delta_time_bypasses_filtering() {
        let mut f = OneEuroFilter::new(2, 0.9, 5.0);
        f.filter(&[0.0, 0.0], 1.0 / 60.0);
        let out = f.filter(&[1.0, 1.0], 0.0);
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn smooths_a_step_toward_the_new_value() {
        let mut f = OneEuroFilter::new(1, 0.004, 5.0);
        f.filter(&[0.0], 1.0 / 60.0);
        let out = f.filter(&[1.0], 1.0 / 60.0);
        assert!(out[0] > 0.0 && out[0] < 1.0);
    }

    #[test]
    fn set_params_changes_subsequent_smoothing_without_resetting_state() {
        let mut f = OneEuroFilter::new(1, 0.004, 5.0);
        f.filter(&[0.0], 1.0 / 60.0);
        let before = f.filter(&[1.0], 1.0 / 60.0)[0];
        f.set_params(10.0, 5.0);
        let after = f.filter(&[1.0], 1.0 / 60.0)[0];
        // a much higher min_cutoff tracks the new value faster
        assert!(after > before);
    }
}
