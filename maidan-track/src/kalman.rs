//! Linear Kalman filter over fixed-size nalgebra matrices.
//!
//! All filter math runs in f64 for numerical stability; the f32 geometry
//! types convert at the boundary. The filter is deliberately dumb: the
//! owner configures the transition, observation and noise matrices per
//! step and drives predict/update explicitly.

use nalgebra::{SMatrix, SVector};

/// Kalman filter with an X-dimensional state and Z-dimensional
/// observations.
#[derive(Debug, Clone)]
pub struct KalmanFilter<const X: usize, const Z: usize> {
    /// State transition matrix F.
    pub f: SMatrix<f64, X, X>,
    /// Process noise Q.
    pub q: SMatrix<f64, X, X>,
    /// Observation matrix H.
    pub h: SMatrix<f64, Z, X>,
    /// Observation noise R.
    pub r: SMatrix<f64, Z, Z>,
    /// Pending observation for the next [`KalmanFilter::update`].
    pub z: SVector<f64, Z>,

    x: SVector<f64, X>,
    p: SMatrix<f64, X, X>,
}

impl<const X: usize, const Z: usize> KalmanFilter<X, Z> {
    pub fn new(x0: SVector<f64, X>, p0: SMatrix<f64, X, X>) -> Self {
        Self {
            f: SMatrix::identity(),
            q: SMatrix::zeros(),
            h: SMatrix::zeros(),
            r: SMatrix::identity(),
            z: SVector::zeros(),
            x: x0,
            p: p0,
        }
    }

    #[inline]
    pub fn state(&self) -> &SVector<f64, X> {
        &self.x
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut SVector<f64, X> {
        &mut self.x
    }

    #[inline]
    pub fn covariance(&self) -> &SMatrix<f64, X, X> {
        &self.p
    }

    /// State after applying F, without modifying the filter.
    pub fn predicted_state(&self) -> SVector<f64, X> {
        self.f * self.x
    }

    /// Advance the state: x = F x, P = F P Fᵀ + Q.
    pub fn predict(&mut self) {
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    /// Fold the pending observation `z` into the state.
    ///
    /// A singular innovation covariance skips the update instead of
    /// corrupting the state.
    pub fn update(&mut self) {
        let innovation = self.z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            log::warn!("singular innovation covariance, skipping update");
            return;
        };
        let k = self.p * self.h.transpose() * s_inv;

        self.x += k * innovation;
        // Joseph form keeps P symmetric positive definite
        let i_kh = SMatrix::<f64, X, X>::identity() - k * self.h;
        self.p = i_kh * self.p * i_kh.transpose() + k * self.r * k.transpose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector4};

    fn cv_filter(x0: Vector4<f64>) -> KalmanFilter<4, 2> {
        let mut kf = KalmanFilter::new(x0, Matrix4::identity());
        kf.h[(0, 0)] = 1.0;
        kf.h[(1, 1)] = 1.0;
        kf
    }

    fn set_dt(kf: &mut KalmanFilter<4, 2>, dt: f64) {
        kf.f = Matrix4::identity();
        kf.f[(0, 2)] = dt;
        kf.f[(1, 3)] = dt;
    }

    #[test]
    fn test_predict_constant_velocity() {
        let mut kf = cv_filter(Vector4::new(0.0, 0.0, 1.0, -0.5));
        set_dt(&mut kf, 2.0);
        kf.predict();
        assert_relative_eq!(kf.state()[0], 2.0);
        assert_relative_eq!(kf.state()[1], -1.0);
        assert_relative_eq!(kf.state()[2], 1.0);
    }

    #[test]
    fn test_update_reduces_uncertainty() {
        let mut kf = cv_filter(Vector4::new(1.0, 1.0, 0.0, 0.0));
        kf.r = nalgebra::Matrix2::identity() * 0.01;
        kf.z = nalgebra::Vector2::new(1.1, 0.9);

        let prior_trace = kf.covariance().trace();
        kf.update();
        assert!(kf.covariance().trace() < prior_trace);
        // state moved toward the measurement
        assert!(kf.state()[0] > 1.0);
        assert!(kf.state()[1] < 1.0);
    }

    #[test]
    fn test_repeated_measurements_converge() {
        let mut kf = cv_filter(Vector4::new(0.0, 0.0, 0.0, 0.0));
        kf.r = nalgebra::Matrix2::identity() * 0.01;
        set_dt(&mut kf, 1.0 / 60.0);
        for _ in 0..100 {
            kf.predict();
            kf.z = nalgebra::Vector2::new(0.5, -0.5);
            kf.update();
        }
        assert_relative_eq!(kf.state()[0], 0.5, epsilon = 1e-3);
        assert_relative_eq!(kf.state()[1], -0.5, epsilon = 1e-3);
    }
}
