//! Rule-driven mode switching with DFA-ODE
//!
//! A thermostat: the room heats up in mode 0 and cools down in mode 1, and
//! interval rules on the temperature flip between the two. A second run
//! plugs untrained merge cells into the same rules.

use burn::backend::NdArray;
use burn::tensor::backend::Backend as BurnBackend;
use burn::tensor::Tensor;
use dfa_ode::prelude::*;

type Backend = NdArray<f32>;

/// Newtonian heating towards `target` at `rate`.
struct Relax {
    target: f32,
    rate: f32,
}

impl<B: BurnBackend> ModeDynamics<B> for Relax {
    fn advance(&self, latent: Tensor<B, 2>, _input: Tensor<B, 2>, dt: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, width] = latent.dims();
        let decay = dt.mul_scalar(-self.rate).exp().expand([n, width]);
        (latent.sub_scalar(self.target) * decay).add_scalar(self.target)
    }
}

fn main() -> Result<()> {
    println!("=== DFA-ODE Rule Switching Example ===\n");
    let device = Default::default();

    // Example 1: hand-written dynamics
    println!("Example 1: Thermostat with hand-written dynamics");
    let config = HybridConfig::new(2, 1, 1, 1)
        .with_modes(vec![ModeSpec::new("heating"), ModeSpec::new("cooling")])
        .with_transform(0, 1, vec![Rule::geq(0, 22.0)])
        .with_transform(1, 0, vec![Rule::leq(0, 18.0)]);
    let dynamics: Vec<Box<dyn ModeDynamics<Backend>>> = vec![
        Box::new(Relax { target: 30.0, rate: 0.3 }),
        Box::new(Relax { target: 10.0, rate: 0.3 }),
    ];
    let rnn = HybridRnn::new(HybridCell::with_dynamics(&config, dynamics, &device)?);

    let steps = 40;
    let start = Tensor::<Backend, 2>::from_data([[16.0f32, 16.0, 0.0, 0.0]], &device);
    let input = Tensor::<Backend, 3>::zeros([1, steps, 1], &device);
    let rollout = rnn.forward(input, Some(start), None, None)?;

    let temperatures: Vec<f32> = rollout.outputs.into_data().iter::<f32>().collect();
    for (t, (temperature, modes)) in temperatures.iter().zip(&rollout.modes).enumerate() {
        let name = &rnn.cell().mode_specs()[modes[0]].name;
        println!("  t={:2}  y={:6.2}  mode={}", t, temperature, name);
    }
    let switches = rollout
        .modes
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .count();
    println!("  {} mode switches in {} steps", switches, steps);
    println!();

    // Example 2: untrained merge cells, forced modes
    println!("Example 2: Merge cells with forced modes");
    let config = HybridConfig::new(2, 3, 1, 8).with_layers(1);
    let rnn = HybridRnn::<Backend>::new(HybridCell::new(&config, &device)?);

    let input = Tensor::<Backend, 3>::random(
        [4, 10, 3],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let forced: Vec<Vec<usize>> = (0..10).map(|t| vec![t % 2, 0, 1, (t / 5) % 2]).collect();
    let rollout = rnn.forward(input, None, None, Some(&forced))?;

    println!("  Output shape: {:?}", rollout.outputs.dims());
    println!("  State shape:  {:?}", rollout.state.dims());
    println!("  Final modes:  {:?}", rollout.modes.last());

    println!("\n=== Done ===");
    Ok(())
}
