// External imports
use burn::module::{Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// Single LSTM layer unrolled over the sequence dimension
#[derive(Module, Debug)]
pub struct DailyLSTM<B: Backend> {
    input_size: usize,
    hidden_size: usize,

    // Input and recurrent projections for the four gates (i, f, g, o), fused
    input_gates: Linear<B>,
    recurrent_gates: Linear<B>,
}

impl<B: Backend> DailyLSTM<B> {
    /// Create a new LSTM layer
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features per time step
    /// * `hidden_size` - Size of hidden state
    /// * `device` - Device to place tensors on
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let glorot = Initializer::XavierUniform { gain: 1.0 };
        let mut input_gates = LinearConfig::new(input_size, 4 * hidden_size)
            .with_initializer(glorot.clone())
            .init(device);
        input_gates.bias = Some(Param::from_tensor(gate_bias(hidden_size, device)));
        let recurrent_gates = LinearConfig::new(hidden_size, 4 * hidden_size)
            .with_initializer(glorot)
            .with_bias(false)
            .init(device);

        Self {
            input_size,
            hidden_size,
            input_gates,
            recurrent_gates,
        }
    }

    /// Forward pass over a whole sequence
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape [batch_size, sequence_length, input_size]
    ///
    /// # Returns
    ///
    /// Hidden states of every time step, shape [batch_size, sequence_length, hidden_size]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let device = x.device();
        let [batch_size, sequence_length, _] = x.dims();

        let mut h = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut c = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut outputs = Vec::with_capacity(sequence_length);

        for t in 0..sequence_length {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let gates = self.input_gates.forward(x_t) + self.recurrent_gates.forward(h.clone());
            let hs = self.hidden_size;

            let i_t = activation::sigmoid(gates.clone().narrow(1, 0, hs));
            let f_t = activation::sigmoid(gates.clone().narrow(1, hs, hs));
            let g_t = activation::tanh(gates.clone().narrow(1, 2 * hs, hs));
            let o_t = activation::sigmoid(gates.narrow(1, 3 * hs, hs));

            c = f_t * c + i_t * g_t;
            h = o_t * activation::tanh(c.clone());
            outputs.push(h.clone());
        }

        Tensor::stack::<3>(outputs, 1)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

/// Gate bias: zero except the forget gate, which starts at one so the cell
/// keeps its state early in training
fn gate_bias<B: Backend>(hidden_size: usize, device: &B::Device) -> Tensor<B, 1> {
    Tensor::cat(
        vec![
            Tensor::zeros([hidden_size], device),
            Tensor::ones([hidden_size], device),
            Tensor::zeros([2 * hidden_size], device),
        ],
        0,
    )
}
