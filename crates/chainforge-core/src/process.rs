//! Immutable recipes ([`Process`]) and their lazy augmentation pipeline
//! ([`AugmentedProcess`] / [`Augment`]).

use crate::ingredients::Ingredients;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("process has no duration, so it has no transfer rate")]
    UndefinedRate,
    #[error("mul_speed by zero is undefined")]
    DivisionByZero,
    #[error("unknown augment primitive: {0}")]
    UnknownAugment(String),
}

/// An immutable recipe: a declarative mapping from inputs to outputs, optionally
/// timed.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub outputs: Ingredients,
    pub inputs: Ingredients,
    pub duration: Option<f64>,
    pub process: Option<String>,
}

impl Process {
    pub fn new(outputs: Ingredients, inputs: Ingredients) -> Self {
        Self {
            outputs,
            inputs,
            duration: None,
            process: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.process = Some(tag.into());
        self
    }

    /// Splits a `transfer` vector (positive components become outputs, negative
    /// become inputs) back into a fresh, untagged `Process`.
    pub fn from_transfer(transfer: &Ingredients) -> Self {
        let mut outputs = Vec::new();
        let mut inputs = Vec::new();
        for (name, coefficient, basis) in transfer.triples() {
            if coefficient > 0.0 {
                outputs.push((name, coefficient, basis));
            } else if coefficient < 0.0 {
                inputs.push((name, -coefficient, basis));
            }
        }
        Self::new(Ingredients::from_triples(outputs), Ingredients::from_triples(inputs))
    }

    /// `outputs - inputs`.
    pub fn transfer(&self) -> Ingredients {
        self.outputs.clone() - self.inputs.clone()
    }

    /// `transfer / duration`. Fails with [`ProcessError::UndefinedRate`] when
    /// `duration` is absent.
    pub fn transfer_rate(&self) -> Result<Ingredients, ProcessError> {
        match self.duration {
            Some(d) if d != 0.0 => Ok((1.0 / d) * self.transfer()),
            _ => Err(ProcessError::UndefinedRate),
        }
    }
}

/// A pure transform `Process -> Process`, represented as a tagged variant
/// rather than an opaque closure so that an augment list is data: it can be
/// stored, compared, and replayed without capturing environment state.
#[derive(Debug, Clone, PartialEq)]
pub enum Augment {
    MulDuration(f64),
    MulSpeed(f64),
    MulInputs(f64),
    MulOutputs(f64),
    AddInput(Ingredients),
    AddOutput(Ingredients),
    IncreaseEnergyPct { kind: String, percent: f64 },
    Composed(Vec<Augment>),
}

impl Augment {
    /// Applies this augment to `p`, producing the transformed process.
    pub fn apply(&self, p: &Process) -> Result<Process, ProcessError> {
        match self {
            Augment::MulDuration(k) => {
                let duration = p.duration.map(|d| k * d);
                Ok(Process { duration, ..p.clone() })
            }
            Augment::MulSpeed(k) => {
                if *k == 0.0 {
                    return Err(ProcessError::DivisionByZero);
                }
                let duration = match p.duration {
                    Some(d) => Some(d / k),
                    None => return Err(ProcessError::UndefinedRate),
                };
                Ok(Process { duration, ..p.clone() })
            }
            Augment::MulInputs(k) => Ok(Process {
                inputs: *k * p.inputs.clone(),
                ..p.clone()
            }),
            Augment::MulOutputs(k) => Ok(Process {
                outputs: *k * p.outputs.clone(),
                ..p.clone()
            }),
            Augment::AddInput(v) => Ok(Process {
                inputs: p.inputs.clone() + v.clone(),
                ..p.clone()
            }),
            Augment::AddOutput(v) => Ok(Process {
                outputs: p.outputs.clone() + v.clone(),
                ..p.clone()
            }),
            Augment::IncreaseEnergyPct { kind, percent } => {
                let current = p.inputs.get(kind);
                if current == 0.0 {
                    return Ok(p.clone());
                }
                let scaled = (1.0 + percent / 100.0) * p.inputs.project(kind);
                let inputs = (p.inputs.clone() - p.inputs.project(kind)) + scaled;
                Ok(Process { inputs, ..p.clone() })
            }
            Augment::Composed(augments) => {
                let mut current = p.clone();
                for augment in augments {
                    current = augment.apply(&current)?;
                }
                Ok(current)
            }
        }
    }
}

/// A recipe plus an ordered, lazily-folded sequence of [`Augment`]s. Every
/// derived property re-folds the augment list over the base process; nothing
/// is cached, and `with_augment` never mutates in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedProcess {
    base: Process,
    augments: Vec<Augment>,
}

impl AugmentedProcess {
    pub fn new(process: Process, augments: Vec<Augment>) -> Self {
        Self { base: process, augments }
    }

    pub fn from_process(process: Process) -> Self {
        Self::new(process, Vec::new())
    }

    /// Returns a new value with `augment` appended. The receiver is untouched.
    pub fn with_augment(&self, augment: Augment) -> Self {
        let mut augments = self.augments.clone();
        augments.push(augment);
        Self { base: self.base.clone(), augments }
    }

    /// Folds the augment list left-to-right over the base process.
    fn effective(&self) -> Result<Process, ProcessError> {
        let mut current = self.base.clone();
        for augment in &self.augments {
            current = augment.apply(&current)?;
        }
        Ok(current)
    }

    pub fn outputs(&self) -> Result<Ingredients, ProcessError> {
        Ok(self.effective()?.outputs)
    }

    pub fn inputs(&self) -> Result<Ingredients, ProcessError> {
        Ok(self.effective()?.inputs)
    }

    pub fn duration(&self) -> Result<Option<f64>, ProcessError> {
        Ok(self.effective()?.duration)
    }

    pub fn process_tag(&self) -> Result<Option<String>, ProcessError> {
        Ok(self.effective()?.process)
    }

    pub fn transfer(&self) -> Result<Ingredients, ProcessError> {
        Ok(self.effective()?.transfer())
    }

    pub fn transfer_rate(&self) -> Result<Ingredients, ProcessError> {
        self.effective()?.transfer_rate()
    }

    pub fn augments(&self) -> &[Augment] {
        &self.augments
    }

    pub fn base(&self) -> &Process {
        &self.base
    }
}
