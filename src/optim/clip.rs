//! Gradient clipping

use crate::Tensor;

/// Clamp every gradient element to `[-clip_value, clip_value]`
pub fn clip_grad_value(params: &mut [Tensor], clip_value: f32) {
    let bound = clip_value.abs();
    for param in params.iter() {
        param.map_grad(|g| g.clamp(-bound, bound));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_clip_grad_value_clamps_elements() {
        let mut params = vec![Tensor::from_vec(vec![0.0, 0.0, 0.0], true)];
        params[0].set_grad(ndarray::arr1(&[0.5, -0.05, -3.0]));

        clip_grad_value(&mut params, 0.1);

        let grad = params[0].grad().unwrap();
        assert_abs_diff_eq!(grad[0], 0.1);
        assert_abs_diff_eq!(grad[1], -0.05);
        assert_abs_diff_eq!(grad[2], -0.1);
    }

    #[test]
    fn test_clip_grad_value_skips_missing_gradients() {
        let mut params = vec![Tensor::zeros(2, true)];
        clip_grad_value(&mut params, 0.1);
        assert!(params[0].grad().is_none());
    }
}
