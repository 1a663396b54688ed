//! Constant velocity Kalman filter over `(cx, cy, a, h)` box measurements.
//!
//! The 8-dimensional state is `(cx, cy, a, h, vx, vy, va, vh)`. Process and
//! measurement noise are scaled by the current box height, so objects that
//! appear larger are allowed to move further per frame.

use nalgebra::{Cholesky, Matrix4, U4, Vector4};
use ndarray::{Array1, Array2};

use crate::error::TrackerError;
use crate::tracker::rect::Rect;

/// 0.95 quantile of the chi-square distribution with 4 degrees of freedom.
pub const CHI2INV95_4DOF: f64 = 9.4877;

/// 0.95 quantile of the chi-square distribution with 2 degrees of freedom,
/// used when gating on position only.
pub const CHI2INV95_2DOF: f64 = 5.9915;

/// Gaussian estimate of one track's box.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    /// Mean vector (8)
    pub mean: Array1<f64>,
    /// Covariance matrix (8x8)
    pub covariance: Array2<f64>,
}

impl MotionState {
    /// Current box estimate in TLWH pixel coordinates.
    pub fn to_rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let ndim = 4;
        let mut motion_mat = Array2::eye(2 * ndim);
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((ndim, 2 * ndim));
        for i in 0..ndim {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create a track state from an unassociated measurement. Velocities
    /// start at zero with a wide uncertainty.
    pub fn initiate(&self, measurement: [f64; 4]) -> MotionState {
        let mut mean = Array1::zeros(8);
        for i in 0..4 {
            mean[i] = measurement[i];
        }

        let h = measurement[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ];

        MotionState {
            mean,
            covariance: diag_squared(&std),
        }
    }

    /// Advance the state by one frame.
    pub fn predict(&self, state: &MotionState) -> MotionState {
        let h = state.mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ];

        let mean = self.motion_mat.dot(&state.mean);
        let covariance = self
            .motion_mat
            .dot(&state.covariance)
            .dot(&self.motion_mat.t())
            + diag_squared(&std);

        MotionState { mean, covariance }
    }

    /// Project the state into measurement space.
    pub fn project(&self, state: &MotionState) -> (Array1<f64>, Array2<f64>) {
        let h = state.mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ];

        let mean_proj = self.update_mat.dot(&state.mean);
        let covariance_proj = self
            .update_mat
            .dot(&state.covariance)
            .dot(&self.update_mat.t())
            + diag_squared(&std);

        (mean_proj, covariance_proj)
    }

    /// Projected mean and Cholesky factor of the projected covariance, or
    /// `DegenerateCovariance` when it is not positive definite.
    pub fn innovation_factor(
        &self,
        state: &MotionState,
    ) -> Result<(Vector4<f64>, Cholesky<f64, U4>), TrackerError> {
        let (mean_proj, cov_proj) = self.project(state);
        let mean = Vector4::new(mean_proj[0], mean_proj[1], mean_proj[2], mean_proj[3]);
        if mean.iter().any(|v| !v.is_finite()) {
            return Err(TrackerError::DegenerateCovariance);
        }
        Ok((mean, cholesky4(&cov_proj)?))
    }

    /// Correct the state with an associated measurement.
    pub fn update(
        &self,
        state: &MotionState,
        measurement: [f64; 4],
    ) -> Result<MotionState, TrackerError> {
        let (projected_mean, projected_cov) = self.project(state);
        let factor = cholesky4(&projected_cov)?;

        // K = P H^T S^-1, solved row by row through the Cholesky factor of S.
        let pht = state.covariance.dot(&self.update_mat.t()); // 8x4
        let mut kalman_gain = Array2::<f64>::zeros((8, 4));
        for row in 0..8 {
            let b = Vector4::new(pht[[row, 0]], pht[[row, 1]], pht[[row, 2]], pht[[row, 3]]);
            let k = factor.solve(&b);
            for col in 0..4 {
                kalman_gain[[row, col]] = k[col];
            }
        }

        let innovation = Array1::from_vec(measurement.to_vec()) - projected_mean;

        let mean = &state.mean + &kalman_gain.dot(&innovation);
        let covariance =
            &state.covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Ok(MotionState { mean, covariance })
    }

    /// Squared Mahalanobis distance between the state distribution and each
    /// measurement. With `only_position` only the box center is compared.
    pub fn gating_distance(
        &self,
        state: &MotionState,
        measurements: &[[f64; 4]],
        only_position: bool,
    ) -> Result<Vec<f64>, TrackerError> {
        let (mean, factor) = self.innovation_factor(state)?;

        if only_position {
            let cov = factor.l() * factor.l().transpose();
            let pos_factor = cov
                .fixed_view::<2, 2>(0, 0)
                .into_owned()
                .cholesky()
                .ok_or(TrackerError::DegenerateCovariance)?;
            return Ok(measurements
                .iter()
                .map(|m| {
                    let d = nalgebra::Vector2::new(m[0] - mean[0], m[1] - mean[1]);
                    d.dot(&pos_factor.solve(&d))
                })
                .collect());
        }

        Ok(measurements
            .iter()
            .map(|m| {
                let d = Vector4::from(*m) - mean;
                d.dot(&factor.solve(&d))
            })
            .collect())
    }
}

fn diag_squared(std: &[f64]) -> Array2<f64> {
    let mut m = Array2::zeros((std.len(), std.len()));
    for (i, s) in std.iter().enumerate() {
        m[[i, i]] = s * s;
    }
    m
}

fn cholesky4(m: &Array2<f64>) -> Result<Cholesky<f64, U4>, TrackerError> {
    let nm = Matrix4::from_fn(|i, j| m[[i, j]]);
    if nm.iter().any(|v| !v.is_finite()) {
        return Err(TrackerError::DegenerateCovariance);
    }
    nm.cholesky().ok_or(TrackerError::DegenerateCovariance)
}
