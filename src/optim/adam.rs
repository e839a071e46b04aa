//! Adam over parameter groups

use super::optimizer::{check_layout, Optimizer, OptimizerState, ParamGroup};
use crate::{Error, Result, Tensor};
use ndarray::Array1;

/// How weight decay enters the update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightDecay {
    /// Added to the gradient (classic Adam)
    L2,
    /// Applied directly to the parameters (AdamW)
    Decoupled,
}

/// Adam with optional AMSGrad and weight decay
///
/// θ ← θ − lr · m̂ / (√v̂ + ε), where with AMSGrad v̂ uses the running maximum
/// of the second moment.
pub struct Adam {
    groups: Vec<ParamGroup>,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    decay_mode: WeightDecay,
    amsgrad: bool,
    t: u64,
    m: Vec<Option<Array1<f32>>>,
    v: Vec<Option<Array1<f32>>>,
    v_max: Vec<Option<Array1<f32>>>,
}

impl Adam {
    pub fn new(groups: Vec<ParamGroup>, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        let n_params = groups
            .iter()
            .flat_map(|g| g.params.iter().copied())
            .max()
            .map_or(0, |max| max + 1);
        Self {
            groups,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
            decay_mode: WeightDecay::L2,
            amsgrad: false,
            t: 0,
            m: vec![None; n_params],
            v: vec![None; n_params],
            v_max: vec![None; n_params],
        }
    }

    /// Adam with β = (0.9, 0.999) and ε = 1e-8
    pub fn default_params(groups: Vec<ParamGroup>) -> Self {
        Self::new(groups, 0.9, 0.999, 1e-8)
    }

    pub fn with_weight_decay(mut self, weight_decay: f32, mode: WeightDecay) -> Self {
        self.weight_decay = weight_decay;
        self.decay_mode = mode;
        self
    }

    pub fn with_amsgrad(mut self, amsgrad: bool) -> Self {
        self.amsgrad = amsgrad;
        self
    }

    fn kind(&self) -> &'static str {
        match self.decay_mode {
            WeightDecay::L2 => "adam",
            WeightDecay::Decoupled => "adamw",
        }
    }

    fn update(&mut self, i: usize, lr: f32, param: &mut Tensor) {
        let Some(mut grad) = param.grad() else {
            return;
        };

        if self.weight_decay > 0.0 {
            match self.decay_mode {
                WeightDecay::L2 => grad = &grad + &(param.data() * self.weight_decay),
                WeightDecay::Decoupled => {
                    let factor = 1.0 - lr * self.weight_decay;
                    param.data_mut().mapv_inplace(|x| x * factor);
                }
            }
        }

        // m_t = β1 m + (1 - β1) g,  v_t = β2 v + (1 - β2) g²
        let m_t = match &self.m[i] {
            Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
            None => &grad * (1.0 - self.beta1),
        };
        let grad_sq = &grad * &grad;
        let v_t = match &self.v[i] {
            Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
            None => &grad_sq * (1.0 - self.beta2),
        };

        let second = if self.amsgrad {
            let v_hat = match &self.v_max[i] {
                Some(prev) => ndarray::Zip::from(prev).and(&v_t).map_collect(|&a, &b| a.max(b)),
                None => v_t.clone(),
            };
            self.v_max[i] = Some(v_hat.clone());
            v_hat
        } else {
            v_t.clone()
        };

        let t = self.t as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);
        let step_size = lr / bias1;
        let denom = second.mapv(|x| x.sqrt() / bias2.sqrt() + self.epsilon);

        let update = &m_t / &denom * step_size;
        *param.data_mut() = param.data() - &update;

        self.m[i] = Some(m_t);
        self.v[i] = Some(v_t);
    }
}

fn to_vecs(buffers: &[Option<Array1<f32>>]) -> Vec<Option<Vec<f32>>> {
    buffers.iter().map(|b| b.as_ref().map(Array1::to_vec)).collect()
}

fn from_vecs(buffers: Vec<Option<Vec<f32>>>) -> Vec<Option<Array1<f32>>> {
    buffers.into_iter().map(|b| b.map(Array1::from)).collect()
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
            self.v_max.resize(params.len(), None);
        }
        self.t += 1;

        let assignments: Vec<(usize, f32)> = self
            .groups
            .iter()
            .flat_map(|g| g.params.iter().map(move |&i| (i, g.lr)))
            .collect();
        for (i, lr) in assignments {
            if let Some(param) = params.get_mut(i) {
                self.update(i, lr, param);
            }
        }
    }

    fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn set_group_lr(&mut self, group: usize, lr: f32) {
        if let Some(g) = self.groups.get_mut(group) {
            g.lr = lr;
        }
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: self.kind().to_string(),
            step: self.t,
            groups: self.groups.clone(),
            buffers: vec![
                ("exp_avg".to_string(), to_vecs(&self.m)),
                ("exp_avg_sq".to_string(), to_vecs(&self.v)),
                ("max_exp_avg_sq".to_string(), to_vecs(&self.v_max)),
            ],
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        if state.kind != self.kind() {
            return Err(Error::CheckpointCorrupt(format!(
                "optimizer kind {} does not match {}",
                state.kind,
                self.kind()
            )));
        }
        check_layout(&self.groups, &state.groups)?;

        let mut buffers = state.buffers.into_iter();
        let mut next = |expected: &str| -> Result<Vec<Option<Array1<f32>>>> {
            match buffers.next() {
                Some((name, values)) if name == expected => Ok(from_vecs(values)),
                _ => Err(Error::CheckpointCorrupt(format!(
                    "missing optimizer buffer {expected}"
                ))),
            }
        };
        let m = next("exp_avg")?;
        let v = next("exp_avg_sq")?;
        let v_max = next("max_exp_avg_sq")?;

        self.m = m;
        self.v = v;
        self.v_max = v_max;
        self.t = state.step;
        self.groups = state.groups;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::ParamGroupBuilder;
    use approx::assert_abs_diff_eq;

    fn single_group(lr: f32, n: usize) -> Vec<ParamGroup> {
        vec![ParamGroup {
            name: "all".to_string(),
            lr,
            params: (0..n).collect(),
        }]
    }

    #[test]
    fn test_adam_quadratic_convergence() {
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = Adam::default_params(single_group(0.1, 1));

        for _ in 0..200 {
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);
            optimizer.step(&mut params);
        }

        for &val in params[0].data().iter() {
            assert!(val.abs() < 0.5, "Value {} did not converge", val);
        }
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        // Bias-corrected first step is lr * sign(g)
        let mut params = vec![Tensor::from_vec(vec![1.0, -1.0], true)];
        let mut optimizer = Adam::default_params(single_group(0.01, 1));
        params[0].set_grad(ndarray::arr1(&[3.0, -0.5]));
        optimizer.step(&mut params);

        assert_abs_diff_eq!(params[0].data()[0], 0.99, epsilon = 1e-5);
        assert_abs_diff_eq!(params[0].data()[1], -0.99, epsilon = 1e-5);
    }

    #[test]
    fn test_groups_use_their_own_learning_rate() {
        let names = vec!["visual_extractor.w".to_string(), "decoder.w".to_string()];
        let groups = ParamGroupBuilder::new(0.001, 0.1).build(&names);
        let mut params = vec![
            Tensor::from_vec(vec![1.0], true),
            Tensor::from_vec(vec![1.0], true),
        ];
        let mut optimizer = Adam::default_params(groups);

        for p in &params {
            p.set_grad(ndarray::arr1(&[1.0]));
        }
        optimizer.step(&mut params);

        assert_abs_diff_eq!(params[0].data()[0], 0.999, epsilon = 1e-5);
        assert_abs_diff_eq!(params[1].data()[0], 0.9, epsilon = 1e-5);
    }

    #[test]
    fn test_amsgrad_keeps_running_maximum() {
        let mut params = vec![Tensor::from_vec(vec![0.0], true)];
        let mut optimizer = Adam::default_params(single_group(0.01, 1)).with_amsgrad(true);

        params[0].set_grad(ndarray::arr1(&[10.0]));
        optimizer.step(&mut params);
        params[0].set_grad(ndarray::arr1(&[0.1]));
        optimizer.step(&mut params);

        let state = optimizer.state();
        let v = state.buffers[1].1[0].clone().unwrap()[0];
        let v_max = state.buffers[2].1[0].clone().unwrap()[0];
        assert!(v_max >= v);
        assert_abs_diff_eq!(v_max, 0.1, epsilon = 1e-4);
    }

    #[test]
    fn test_l2_decay_shrinks_parameter_without_gradient_signal() {
        let mut params = vec![Tensor::from_vec(vec![2.0], true)];
        let mut optimizer = Adam::default_params(single_group(0.01, 1))
            .with_weight_decay(0.1, WeightDecay::L2);
        params[0].set_grad(ndarray::arr1(&[0.0]));
        optimizer.step(&mut params);
        assert!(params[0].data()[0] < 2.0);
    }

    #[test]
    fn test_decoupled_decay_scales_parameters() {
        let mut params = vec![Tensor::from_vec(vec![2.0], true)];
        let mut optimizer = Adam::default_params(single_group(0.1, 1))
            .with_weight_decay(0.5, WeightDecay::Decoupled);
        params[0].set_grad(ndarray::arr1(&[0.0]));
        optimizer.step(&mut params);
        // Zero gradient: only the decay factor (1 - 0.1 * 0.5) applies
        assert_abs_diff_eq!(params[0].data()[0], 1.9, epsilon = 1e-5);
    }

    #[test]
    fn test_state_roundtrip_resumes_identically() {
        let mut a_params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        let mut a = Adam::default_params(single_group(0.05, 1)).with_amsgrad(true);
        for _ in 0..3 {
            a_params[0].set_grad(a_params[0].data().clone());
            a.step(&mut a_params);
        }

        let mut b = Adam::default_params(single_group(0.05, 1)).with_amsgrad(true);
        b.load_state(a.state()).unwrap();
        let mut b_params = vec![Tensor::from_vec(a_params[0].to_vec(), true)];

        a_params[0].set_grad(a_params[0].data().clone());
        b_params[0].set_grad(b_params[0].data().clone());
        a.step(&mut a_params);
        b.step(&mut b_params);

        assert_eq!(a_params[0].to_vec(), b_params[0].to_vec());
    }

    #[test]
    fn test_load_state_rejects_other_kind() {
        let adamw = Adam::default_params(single_group(0.1, 1))
            .with_weight_decay(0.01, WeightDecay::Decoupled);
        let mut adam = Adam::default_params(single_group(0.1, 1));
        assert!(adam.load_state(adamw.state()).is_err());
    }
}
