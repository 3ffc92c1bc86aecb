//! Single-layer LSTM regressor with a small dense head.
//!
//! Architecture: LSTM(hidden) over a scalar-per-step sequence, then
//! Dense(dense, relu) and Dense(1). Trained with Adam on mean squared
//! error through full backpropagation through time.

use ndarray::{s, Array, Array1, Array2, Axis, Dimension, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::forecasting::{
    build_windows, EpochMetrics, SequenceModel, SequenceWindows, TrainingHistory, TrainingParams,
    TRAIN_FRACTION,
};
use super::preprocessing::MinMaxScaler;
use crate::errors::ServiceError;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

fn glorot(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-limit..limit))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Params {
    /// Gate kernel, rows ordered input/forget/cell/output, columns [x, h]
    w: Array2<f64>,
    b: Array1<f64>,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: Array1<f64>,
}

impl Params {
    fn init(hidden: usize, dense: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut b = Array1::zeros(4 * hidden);
        // Forget gate starts open
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            w: glorot(rng, 4 * hidden, 1 + hidden),
            b,
            w1: glorot(rng, dense, hidden),
            b1: Array1::zeros(dense),
            w2: glorot(rng, 1, dense).row(0).to_owned(),
            b2: Array1::zeros(1),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
            w1: Array2::zeros(self.w1.raw_dim()),
            b1: Array1::zeros(self.b1.raw_dim()),
            w2: Array1::zeros(self.w2.raw_dim()),
            b2: Array1::zeros(self.b2.raw_dim()),
        }
    }

    fn scale(&mut self, k: f64) {
        self.w *= k;
        self.b *= k;
        self.w1 *= k;
        self.b1 *= k;
        self.w2 *= k;
        self.b2 *= k;
    }
}

struct StepCache {
    z: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    c_prev: Array1<f64>,
}

struct ForwardPass {
    steps: Vec<StepCache>,
    h: Array1<f64>,
    u: Array1<f64>,
    r: Array1<f64>,
    y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Adam {
    learning_rate: f64,
    t: i32,
    m: Params,
    v: Params,
}

impl Adam {
    fn new(learning_rate: f64, like: &Params) -> Self {
        Self {
            learning_rate,
            t: 0,
            m: like.zeros_like(),
            v: like.zeros_like(),
        }
    }

    fn step(&mut self, params: &mut Params, grads: &Params) {
        self.t += 1;
        let step = AdamStep {
            lr: self.learning_rate,
            bias1: 1.0 - ADAM_BETA1.powi(self.t),
            bias2: 1.0 - ADAM_BETA2.powi(self.t),
        };
        let (m, v) = (&mut self.m, &mut self.v);
        step.apply(&mut params.w, &grads.w, &mut m.w, &mut v.w);
        step.apply(&mut params.b, &grads.b, &mut m.b, &mut v.b);
        step.apply(&mut params.w1, &grads.w1, &mut m.w1, &mut v.w1);
        step.apply(&mut params.b1, &grads.b1, &mut m.b1, &mut v.b1);
        step.apply(&mut params.w2, &grads.w2, &mut m.w2, &mut v.w2);
        step.apply(&mut params.b2, &grads.b2, &mut m.b2, &mut v.b2);
    }
}

struct AdamStep {
    lr: f64,
    bias1: f64,
    bias2: f64,
}

impl AdamStep {
    fn apply<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        Zip::from(param)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / self.bias1;
                let v_hat = *v / self.bias2;
                *p -= self.lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            });
    }
}

/// LSTM network over already-normalised values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmNetwork {
    hidden: usize,
    dense: usize,
    params: Params,
}

impl LstmNetwork {
    pub fn new(hidden: usize, dense: usize, seed: u64) -> Self {
        let hidden = hidden.max(1);
        let dense = dense.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            hidden,
            dense,
            params: Params::init(hidden, dense, &mut rng),
        }
    }

    pub fn predict(&self, sequence: &[f64]) -> f64 {
        self.forward(sequence).y
    }

    fn forward(&self, sequence: &[f64]) -> ForwardPass {
        let n = self.hidden;
        let p = &self.params;
        let mut h = Array1::<f64>::zeros(n);
        let mut c = Array1::<f64>::zeros(n);
        let mut steps = Vec::with_capacity(sequence.len());

        for &x in sequence {
            let mut z = Array1::<f64>::zeros(1 + n);
            z[0] = x;
            z.slice_mut(s![1..]).assign(&h);

            let a = p.w.dot(&z) + &p.b;
            let i = a.slice(s![0..n]).mapv(sigmoid);
            let f = a.slice(s![n..2 * n]).mapv(sigmoid);
            let g = a.slice(s![2 * n..3 * n]).mapv(f64::tanh);
            let o = a.slice(s![3 * n..4 * n]).mapv(sigmoid);

            let c_prev = c;
            c = &f * &c_prev + &i * &g;
            h = &o * &c.mapv(f64::tanh);

            steps.push(StepCache {
                z,
                i,
                f,
                g,
                o,
                c: c.clone(),
                c_prev,
            });
        }

        let u = p.w1.dot(&h) + &p.b1;
        let r = u.mapv(|v| v.max(0.0));
        let y = p.w2.dot(&r) + p.b2[0];
        ForwardPass { steps, h, u, r, y }
    }

    /// Accumulates d(loss)/d(params) into `grads` given d(loss)/dy.
    fn backward(&self, pass: &ForwardPass, dy: f64, grads: &mut Params) {
        let n = self.hidden;
        let p = &self.params;

        grads.w2.scaled_add(dy, &pass.r);
        grads.b2[0] += dy;

        let dr = &p.w2 * dy;
        let du = Zip::from(&dr)
            .and(&pass.u)
            .map_collect(|&d, &u| if u > 0.0 { d } else { 0.0 });
        grads.w1 += &outer(&du, &pass.h);
        grads.b1 += &du;

        let mut dh = p.w1.t().dot(&du);
        let mut dc = Array1::<f64>::zeros(n);

        for step in pass.steps.iter().rev() {
            let tanh_c = step.c.mapv(f64::tanh);
            let d_o = &dh * &tanh_c;
            dc = dc + &dh * &step.o * &tanh_c.mapv(|t| 1.0 - t * t);

            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;

            let mut da = Array1::<f64>::zeros(4 * n);
            da.slice_mut(s![0..n])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![n..2 * n])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![2 * n..3 * n])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            da.slice_mut(s![3 * n..4 * n])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.w += &outer(&da, &step.z);
            grads.b += &da;

            let dz = p.w.t().dot(&da);
            dh = dz.slice(s![1..]).to_owned();
            dc = &dc * &step.f;
        }
    }

    /// Mean squared error and mean absolute error over `data`.
    pub fn evaluate(&self, data: &SequenceWindows) -> Option<(f64, f64)> {
        if data.is_empty() {
            return None;
        }
        let (se, ae) = data
            .windows
            .iter()
            .zip(&data.targets)
            .fold((0.0, 0.0), |(se, ae), (w, &t)| {
                let err = self.predict(w) - t;
                (se + err * err, ae + err.abs())
            });
        let n = data.len() as f64;
        Some((se / n, ae / n))
    }

    /// Mini-batch training in window order.
    pub fn fit(
        &mut self,
        train: &SequenceWindows,
        validation: &SequenceWindows,
        epochs: usize,
        batch_size: usize,
        learning_rate: f64,
    ) -> TrainingHistory {
        let mut adam = Adam::new(learning_rate, &self.params);
        let mut history = TrainingHistory::default();
        let batch_size = batch_size.max(1);

        for epoch in 1..=epochs {
            for start in (0..train.len()).step_by(batch_size) {
                let end = (start + batch_size).min(train.len());
                let mut grads = self.params.zeros_like();
                for idx in start..end {
                    let pass = self.forward(&train.windows[idx]);
                    let dy = 2.0 * (pass.y - train.targets[idx]);
                    self.backward(&pass, dy, &mut grads);
                }
                grads.scale(1.0 / (end - start) as f64);
                adam.step(&mut self.params, &grads);
            }

            let (loss, mae) = self.evaluate(train).unwrap_or((0.0, 0.0));
            let val = self.evaluate(validation);
            debug!(epoch, loss, mae, val_loss = ?val.map(|v| v.0), "Epoch finished");
            history.epochs.push(EpochMetrics {
                epoch,
                loss,
                mae,
                val_loss: val.map(|v| v.0),
                val_mae: val.map(|v| v.1),
            });
        }
        history
    }
}

/// Trained LSTM plus the normalisation it was trained under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmForecaster {
    network: LstmNetwork,
    scaler: MinMaxScaler,
    window_size: usize,
    history: TrainingHistory,
}

impl LstmForecaster {
    /// Fits the scaler on `series`, builds windows, splits them 80/20 in
    /// time order and trains.
    pub fn train(series: &[f64], params: &TrainingParams) -> Result<Self, ServiceError> {
        let scaler = MinMaxScaler::fit(series)?;
        let normalised = scaler.transform_all(series);
        let windows = build_windows(&normalised, params.window_size);
        if windows.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "series of {} values yields no windows of size {}",
                series.len(),
                params.window_size
            )));
        }
        let (train, validation) = windows.split_temporal(TRAIN_FRACTION);

        let mut network = LstmNetwork::new(params.hidden_units, params.dense_units, params.seed);
        let history = network.fit(
            &train,
            &validation,
            params.epochs,
            params.batch_size,
            params.learning_rate,
        );

        Ok(Self {
            network,
            scaler,
            window_size: params.window_size,
            history,
        })
    }
}

impl SequenceModel for LstmForecaster {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        let scaled = self.scaler.transform_all(window);
        self.scaler.inverse(self.network.predict(&scaled))
    }

    fn history(&self) -> &TrainingHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loss_of(net: &LstmNetwork, seq: &[f64], target: f64) -> f64 {
        let e = net.predict(seq) - target;
        e * e
    }

    #[test]
    fn gradients_match_finite_differences() {
        let net = LstmNetwork::new(3, 2, 11);
        let seq = [0.2, 0.7, 0.4];
        let target = 0.9;

        let pass = net.forward(&seq);
        let mut grads = net.params.zeros_like();
        net.backward(&pass, 2.0 * (pass.y - target), &mut grads);

        let eps = 1e-6;
        for &(r, c) in &[(0usize, 0usize), (4, 1), (7, 2), (10, 3)] {
            let mut plus = net.clone();
            plus.params.w[[r, c]] += eps;
            let mut minus = net.clone();
            minus.params.w[[r, c]] -= eps;
            let numeric = (loss_of(&plus, &seq, target) - loss_of(&minus, &seq, target)) / (2.0 * eps);
            assert!(
                (numeric - grads.w[[r, c]]).abs() < 1e-5,
                "w[{r},{c}]: numeric {numeric} vs analytic {}",
                grads.w[[r, c]]
            );
        }

        let mut plus = net.clone();
        plus.params.b2[0] += eps;
        let mut minus = net.clone();
        minus.params.b2[0] -= eps;
        let numeric = (loss_of(&plus, &seq, target) - loss_of(&minus, &seq, target)) / (2.0 * eps);
        assert!((numeric - grads.b2[0]).abs() < 1e-5);
    }

    #[test]
    fn same_seed_same_weights() {
        let a = LstmNetwork::new(4, 3, 5);
        let b = LstmNetwork::new(4, 3, 5);
        assert_eq!(a.predict(&[0.1, 0.2]), b.predict(&[0.1, 0.2]));
    }

    #[test]
    fn training_reduces_loss_on_a_ramp() {
        let series: Vec<f64> = (0..60).map(|i| (i % 20) as f64).collect();
        let params = TrainingParams {
            window_size: 5,
            epochs: 30,
            hidden_units: 8,
            dense_units: 4,
            learning_rate: 0.01,
            batch_size: 8,
            seed: 42,
        };
        let model = LstmForecaster::train(&series, &params).unwrap();
        let history = model.history();
        assert_eq!(history.epochs.len(), 30);
        assert!(history.epochs[29].loss < history.epochs[0].loss);
        assert!(history.epochs[0].val_loss.is_some());
    }
}
