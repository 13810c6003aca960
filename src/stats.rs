//! Small descriptive statistics over ndarray views.

use ndarray::ArrayView1;

pub fn mean(x: ArrayView1<'_, f64>) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.sum() / x.len() as f64
}

/// Unbiased variance (ddof = 1); NaN below two samples.
pub fn sample_variance(x: ArrayView1<'_, f64>) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Population standard deviation (ddof = 0) of a slice; 0 for fewer than two values.
pub fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Pearson correlation. NaN when either side is constant.
pub fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return f64::NAN;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let (da, db) = (a - mx, b - my);
        sxy += da * db;
        sxx += da * da;
        syy += db * db;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn variance_and_std() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        assert!((sample_variance(x.view()) - 5.0 / 3.0).abs() < 1e-12);
        assert!((population_std(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(population_std(&[7.0]), 0.0);
    }

    #[test]
    fn pearson_of_scaled_column_is_one() {
        let x = array![1.0, 2.0, 5.0, 9.0];
        let y = &x * 3.0;
        assert!((pearson(x.view(), y.view()) - 1.0).abs() < 1e-12);
        let z = &x * -0.5;
        assert!((pearson(x.view(), z.view()) + 1.0).abs() < 1e-12);
        let c = array![2.0, 2.0, 2.0, 2.0];
        assert!(pearson(x.view(), c.view()).is_nan());
    }
}
