use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// One LSTM direction. The four gate pre-activations are produced by a pair
/// of dense projections (input-to-hidden with bias, hidden-to-hidden
/// without) and split along the feature axis in i, f, g, o order.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    gates_x: Linear<B>,
    gates_h: Linear<B>,
    d_hidden: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            gates_x: LinearConfig::new(d_input, 4 * d_hidden)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            gates_h: LinearConfig::new(d_hidden, 4 * d_hidden)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            d_hidden,
        }
    }

    fn step(
        &self,
        x: Tensor<B, 2>,
        hidden: Tensor<B, 2>,
        cell: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let d = self.d_hidden;
        let n = x.dims()[0];
        let gates = self.gates_x.forward(x) + self.gates_h.forward(hidden);

        let input_gate = activation::sigmoid(gates.clone().slice([0..n, 0..d]));
        let forget_gate = activation::sigmoid(gates.clone().slice([0..n, d..2 * d]));
        let candidate = activation::tanh(gates.clone().slice([0..n, 2 * d..3 * d]));
        let output_gate = activation::sigmoid(gates.slice([0..n, 3 * d..4 * d]));

        let cell = forget_gate * cell + input_gate * candidate;
        let hidden = output_gate * activation::tanh(cell.clone());
        (hidden, cell)
    }

    /// Runs over a `[n, timesteps, d_input]` sequence and returns every
    /// hidden state, aligned with the input timesteps. With `reversed` the
    /// sequence is consumed back to front.
    pub fn run(&self, sequence: Tensor<B, 3>, reversed: bool) -> Tensor<B, 3> {
        let [n, timesteps, d_input] = sequence.dims();
        let device = sequence.device();
        let mut hidden = Tensor::zeros([n, self.d_hidden], &device);
        let mut cell = Tensor::zeros([n, self.d_hidden], &device);

        let order: Vec<usize> = if reversed {
            (0..timesteps).rev().collect()
        } else {
            (0..timesteps).collect()
        };

        let mut outputs = Vec::with_capacity(timesteps);
        for t in order {
            let x = sequence
                .clone()
                .slice([0..n, t..t + 1, 0..d_input])
                .reshape([n, d_input]);
            let (next_hidden, next_cell) = self.step(x, hidden, cell);
            hidden = next_hidden;
            cell = next_cell;
            outputs.push(hidden.clone().reshape([n, 1, self.d_hidden]));
        }
        if reversed {
            outputs.reverse();
        }
        Tensor::cat(outputs, 1)
    }

    /// Final hidden state only, `[n, d_hidden]`.
    pub fn last(&self, sequence: Tensor<B, 3>, reversed: bool) -> Tensor<B, 2> {
        let [n, timesteps, d_input] = sequence.dims();
        let device = sequence.device();
        let mut hidden = Tensor::zeros([n, self.d_hidden], &device);
        let mut cell = Tensor::zeros([n, self.d_hidden], &device);

        let order: Vec<usize> = if reversed {
            (0..timesteps).rev().collect()
        } else {
            (0..timesteps).collect()
        };

        for t in order {
            let x = sequence
                .clone()
                .slice([0..n, t..t + 1, 0..d_input])
                .reshape([n, d_input]);
            let (next_hidden, next_cell) = self.step(x, hidden, cell);
            hidden = next_hidden;
            cell = next_cell;
        }
        hidden
    }
}

/// Two independent LSTM directions over the same sequence.
#[derive(Module, Debug)]
pub struct BiLstm<B: Backend> {
    forward_cell: LstmCell<B>,
    backward_cell: LstmCell<B>,
}

impl<B: Backend> BiLstm<B> {
    pub fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            forward_cell: LstmCell::new(d_input, d_hidden, device),
            backward_cell: LstmCell::new(d_input, d_hidden, device),
        }
    }

    /// Full sequence output `[n, timesteps, 2 * d_hidden]`, forward
    /// direction first along the feature axis.
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Tensor<B, 3> {
        let forward = self.forward_cell.run(sequence.clone(), false);
        let backward = self.backward_cell.run(sequence, true);
        Tensor::cat(vec![forward, backward], 2)
    }

    /// Concatenated final hidden states of both directions,
    /// `[n, 2 * d_hidden]`.
    pub fn summary(&self, sequence: Tensor<B, 3>) -> Tensor<B, 2> {
        let forward = self.forward_cell.last(sequence.clone(), false);
        let backward = self.backward_cell.last(sequence, true);
        Tensor::cat(vec![forward, backward], 1)
    }
}
