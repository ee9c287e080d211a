//! Feature standardisation

use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column parameters of a fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64, // column mean
    scale: f64,  // sample standard deviation
}

/// Z-score scaler: (x - mean) / sd, with the sample (n-1) standard deviation.
///
/// Statistics come from the matrix passed to [`fit`](Self::fit) only, so a
/// scaler fitted on the training partition never sees test rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit column means and standard deviations. Constant columns keep
    /// scale 1.0.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(AnalysisError::DataError("cannot fit scaler on an empty matrix".to_string()));
        }

        self.params = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.mean().unwrap_or(0.0);
                let sd = if col.len() > 1 { col.std(1.0) } else { 0.0 };
                ScalerParams {
                    center: mean,
                    scale: if sd > 0.0 && sd.is_finite() { sd } else { 1.0 },
                }
            })
            .collect();

        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(AnalysisError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            col.mapv_inplace(|v| (v - p.center) / p.scale);
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Fitted column means
    pub fn means(&self) -> Array1<f64> {
        self.params.iter().map(|p| p.center).collect()
    }

    /// Fitted column scales (1.0 for constant columns)
    pub fn scales(&self) -> Array1<f64> {
        self.params.iter().map(|p| p.scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [4.0, 10.0], [5.0, 10.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        let mean = scaled.column(0).mean().unwrap();
        assert!(mean.abs() < 1e-10);
        assert!((scaled.column(0).std(1.0) - 1.0).abs() < 1e-10);
        // Constant column centres to zero without dividing by zero
        assert!(scaled.column(1).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_uses_training_statistics_only() {
        let train = array![[0.0], [2.0]];
        let test = array![[100.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&train).unwrap();
        let out = scaler.transform(&test).unwrap();
        // mean 1, sd sqrt(2)
        assert!((out[[0, 0]] - 99.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_not_fitted() {
        let scaler = StandardScaler::new();
        assert!(matches!(scaler.transform(&array![[1.0]]), Err(AnalysisError::ModelNotFitted)));
    }
}
