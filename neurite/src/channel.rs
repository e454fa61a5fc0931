//! Hodgkin-Huxley-style ion-channel current model.
//!
//! A channel is conductance, reversal potential, and an ordered set of
//! gating variables. Its current is `g * (v - E) * total`, where `total`
//! sums `c * (alpha(v) - beta(v))` over every coefficient of every gating
//! variable. The weighted-sum activation term stands in for the classical
//! power-law gating product; it is a deliberate model choice, not an
//! approximation of one.

/// A voltage-dependent kinetic rate. Implemented for any `Fn(f64) -> f64`,
/// so kinetic models plug in as plain closures.
///
/// Outputs are not validated: a rate that divides by zero hands its
/// NaN/infinity straight through [`IonChannel::current`], and a rate that
/// panics unwinds through it.
pub trait Rate {
    fn eval(&self, voltage: f64) -> f64;
}

impl<F: Fn(f64) -> f64> Rate for F {
    fn eval(&self, voltage: f64) -> f64 {
        self(voltage)
    }
}

pub struct GatingVariable {
    name: String,
    alpha: Box<dyn Rate + Send + Sync>,
    beta: Box<dyn Rate + Send + Sync>,
    /// Weights applied to `alpha - beta`; order is part of the result
    coefficients: Vec<f64>,
}

impl GatingVariable {
    pub fn new(
        name: impl Into<String>,
        alpha: impl Rate + Send + Sync + 'static,
        beta: impl Rate + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            alpha: Box::new(alpha),
            beta: Box::new(beta),
            coefficients: Vec::new(),
        }
    }

    pub fn with_coefficients(mut self, coefficients: Vec<f64>) -> Self {
        self.coefficients = coefficients;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

pub struct IonChannel {
    name: String,
    /// g, non-negative
    conductance: f64,
    /// E
    reversal_potential: f64,
    /// Insertion order fixes summation order, which fixes rounding
    gating_variables: Vec<GatingVariable>,
}

impl IonChannel {
    pub fn new(name: impl Into<String>, conductance: f64, reversal_potential: f64) -> Self {
        debug_assert!(conductance >= 0.0);
        Self {
            name: name.into(),
            conductance,
            reversal_potential,
            gating_variables: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_gating_variable(&mut self, gating_variable: GatingVariable) {
        self.gating_variables.push(gating_variable);
    }

    /// Removes every gating variable with this name; silently does nothing
    /// when none matches.
    pub fn remove_gating_variable(&mut self, name: &str) {
        self.gating_variables.retain(|gv| gv.name != name);
    }

    /// Transmembrane current at `voltage`. Stateless and reproducible:
    /// the same voltage and configuration always give the same bits.
    pub fn current(&self, voltage: f64) -> f64 {
        let mut total = 0.0;

        for gv in &self.gating_variables {
            let alpha = gv.alpha.eval(voltage);
            let beta = gv.beta.eval(voltage);
            for &coefficient in &gv.coefficients {
                total += coefficient * (alpha - beta);
            }
        }

        self.conductance * (voltage - self.reversal_potential) * total
    }
}
