//! Reactive controllers mapping a food-ahead observation to an action.

use crate::error::{EvolveError, Result};
use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const OUTPUTS: usize = 4;

pub trait Controller: Send {
    fn param_count(&self) -> usize;
    fn set_parameters(&mut self, params: &[f64]) -> Result<()>;
    fn decide(&mut self, food_ahead: bool) -> Action;
}

/// Immutable controller description. Cheap to clone and ship to workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerBlueprint {
    /// Two food inputs, sigmoid hidden layer with self-recurrence, linear
    /// four-way output.
    Recurrent { hidden: usize, in_to_out: bool },
    /// Feed-forward network fed by the last `taps` food observations.
    DelayLine {
        taps: usize,
        hidden: usize,
        in_to_out: bool,
    },
}

impl ControllerBlueprint {
    /// Built-in controller catalog.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            1 => Ok(ControllerBlueprint::Recurrent {
                hidden: 5,
                in_to_out: true,
            }),
            2 => Ok(ControllerBlueprint::DelayLine {
                taps: 5,
                hidden: 5,
                in_to_out: true,
            }),
            other => Err(EvolveError::Configuration(format!(
                "controller_id {} is not in the catalog (known ids: 1, 2)",
                other
            ))),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ControllerBlueprint::Recurrent { hidden, .. } => {
                format!("Jefferson 2,{},4 NN v1", hidden)
            }
            ControllerBlueprint::DelayLine { taps, hidden, .. } => {
                format!("Jefferson-like MDL{} {},{},4 NN v1", taps, taps * 2, hidden)
            }
        }
    }

    fn inputs(&self) -> usize {
        match self {
            ControllerBlueprint::Recurrent { .. } => 2,
            ControllerBlueprint::DelayLine { taps, .. } => taps * 2,
        }
    }

    pub fn param_count(&self) -> usize {
        let inputs = self.inputs();
        match *self {
            ControllerBlueprint::Recurrent { hidden, in_to_out } => {
                inputs * hidden
                    + hidden * OUTPUTS
                    + if in_to_out { inputs * OUTPUTS } else { 0 }
                    + hidden * hidden
            }
            ControllerBlueprint::DelayLine {
                hidden, in_to_out, ..
            } => {
                inputs * hidden + hidden * OUTPUTS + if in_to_out { inputs * OUTPUTS } else { 0 }
            }
        }
    }

    pub fn instantiate(&self) -> NeuralController {
        NeuralController::new(self)
    }
}

/// Small fully connected network: sigmoid hidden layer, linear outputs.
///
/// Parameter layout: input→hidden, hidden→output, input→output (optional),
/// hidden→hidden (recurrent only), each row-major by destination unit.
#[derive(Debug, Clone)]
pub struct NeuralController {
    inputs: usize,
    hidden: usize,
    in_to_out: bool,
    recurrent: bool,
    taps: usize,
    params: Vec<f64>,
    hidden_state: Vec<f64>,
    history: VecDeque<bool>,
}

impl NeuralController {
    pub fn new(blueprint: &ControllerBlueprint) -> Self {
        let (hidden, in_to_out, recurrent, taps) = match *blueprint {
            ControllerBlueprint::Recurrent { hidden, in_to_out } => (hidden, in_to_out, true, 0),
            ControllerBlueprint::DelayLine {
                taps,
                hidden,
                in_to_out,
            } => (hidden, in_to_out, false, taps),
        };
        Self {
            inputs: blueprint.inputs(),
            hidden,
            in_to_out,
            recurrent,
            taps,
            params: vec![0.0; blueprint.param_count()],
            hidden_state: vec![0.0; hidden],
            history: std::iter::repeat(false).take(taps).collect(),
        }
    }

    fn encode_inputs(&mut self, food_ahead: bool) -> Vec<f64> {
        let encode = |seen: bool| if seen { [1.0, 0.0] } else { [0.0, 1.0] };
        if self.taps == 0 {
            return encode(food_ahead).to_vec();
        }
        self.history.push_front(food_ahead);
        self.history.truncate(self.taps);
        self.history.iter().flat_map(|&seen| encode(seen)).collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Controller for NeuralController {
    fn param_count(&self) -> usize {
        self.params.len()
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(EvolveError::Controller(format!(
                "expected {} parameters, got {}",
                self.params.len(),
                params.len()
            )));
        }
        self.params.copy_from_slice(params);
        Ok(())
    }

    fn decide(&mut self, food_ahead: bool) -> Action {
        let x = self.encode_inputs(food_ahead);
        let (n_in, n_hid) = (self.inputs, self.hidden);

        let (w_ih, rest) = self.params.split_at(n_in * n_hid);
        let (w_ho, rest) = rest.split_at(n_hid * OUTPUTS);
        let (w_io, w_hh) = if self.in_to_out {
            rest.split_at(n_in * OUTPUTS)
        } else {
            rest.split_at(0)
        };

        let mut hidden = vec![0.0; n_hid];
        for (j, h) in hidden.iter_mut().enumerate() {
            let mut sum: f64 = (0..n_in).map(|i| w_ih[j * n_in + i] * x[i]).sum();
            if self.recurrent {
                sum += (0..n_hid)
                    .map(|k| w_hh[j * n_hid + k] * self.hidden_state[k])
                    .sum::<f64>();
            }
            *h = sigmoid(sum);
        }

        let mut out = [0.0; OUTPUTS];
        for (o, value) in out.iter_mut().enumerate() {
            *value = (0..n_hid).map(|j| w_ho[o * n_hid + j] * hidden[j]).sum();
            if self.in_to_out {
                *value += (0..n_in).map(|i| w_io[o * n_in + i] * x[i]).sum::<f64>();
            }
        }

        if self.recurrent {
            self.hidden_state = hidden;
        }

        // First maximum wins; NaN never wins.
        let mut best = 0;
        for o in 1..OUTPUTS {
            if out[o] > out[best] {
                best = o;
            }
        }
        Action::from_index(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_param_counts() {
        assert_eq!(ControllerBlueprint::from_id(1).unwrap().param_count(), 63);
        assert_eq!(ControllerBlueprint::from_id(2).unwrap().param_count(), 110);
        assert!(ControllerBlueprint::from_id(9).is_err());
    }

    #[test]
    fn test_set_parameters_checks_length() {
        let mut c = ControllerBlueprint::from_id(1).unwrap().instantiate();
        assert!(c.set_parameters(&[0.0; 10]).is_err());
        assert!(c.set_parameters(&[0.0; 63]).is_ok());
    }

    #[test]
    fn test_zero_weights_choose_none() {
        let mut c = ControllerBlueprint::from_id(2).unwrap().instantiate();
        c.set_parameters(&vec![0.0; 110]).unwrap();
        assert_eq!(c.decide(true), Action::None);
    }

    #[test]
    fn test_direct_connection_drives_forward_on_food() {
        // Only the input→output block is non-zero: food input feeds the
        // forward output, no-food input feeds the right-turn output.
        let bp = ControllerBlueprint::Recurrent {
            hidden: 2,
            in_to_out: true,
        };
        let mut params = vec![0.0; bp.param_count()];
        let w_io_offset = 2 * 2 + 2 * OUTPUTS;
        params[w_io_offset + 3 * 2] = 1.0; // forward <- food
        params[w_io_offset + 2 * 2 + 1] = 1.0; // right <- no food

        let mut c = bp.instantiate();
        c.set_parameters(&params).unwrap();
        assert_eq!(c.decide(true), Action::Forward);
        assert_eq!(c.decide(false), Action::Right);
    }

    #[test]
    fn test_delay_line_remembers_history() {
        let bp = ControllerBlueprint::DelayLine {
            taps: 2,
            hidden: 1,
            in_to_out: true,
        };
        let mut params = vec![0.0; bp.param_count()];
        // Input 2 is "food seen one step ago"; wire it to the left output.
        let w_io_offset = 4 + OUTPUTS;
        params[w_io_offset + 4 + 2] = 1.0;

        let mut c = bp.instantiate();
        c.set_parameters(&params).unwrap();
        assert_eq!(c.decide(true), Action::None);
        assert_eq!(c.decide(false), Action::Left);
        assert_eq!(c.decide(false), Action::None);
    }
}
