use crate::model::ExpectedStep;

#[derive(thiserror::Error, Debug)]
pub enum SequenceError {
    #[error("step index {0} out of range")]
    OutOfRange(usize),
    #[error("malformed step at index {index}: {reason}")]
    Malformed { index: usize, reason: String },
}

/// Notation-side contract: an ordered, randomly-seekable sequence of
/// expected steps plus a cursor the controller moves after each accepted
/// step. Implementations may be backed by a rendering engine; the in-memory
/// one below backs headless sessions and tests.
pub trait StepProvider: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn step(&self, index: usize) -> Result<ExpectedStep, SequenceError>;

    fn move_cursor(&mut self, index: usize) -> Result<(), SequenceError>;

    fn cursor(&self) -> usize;
}

#[derive(Debug)]
pub struct VecStepProvider {
    steps: Vec<ExpectedStep>,
    cursor: usize,
}

impl VecStepProvider {
    /// Validates every step and the measure-index monotonicity invariant
    /// up front so the controller never has to.
    pub fn new(steps: Vec<ExpectedStep>) -> Result<Self, SequenceError> {
        let mut last_measure = 0u32;
        for (index, step) in steps.iter().enumerate() {
            step.validate().map_err(|e| SequenceError::Malformed {
                index,
                reason: e.to_string(),
            })?;
            if step.measure_index < last_measure {
                return Err(SequenceError::Malformed {
                    index,
                    reason: format!(
                        "measure index decreased from {} to {}",
                        last_measure, step.measure_index
                    ),
                });
            }
            last_measure = step.measure_index;
        }
        Ok(Self { steps, cursor: 0 })
    }
}

impl StepProvider for VecStepProvider {
    fn len(&self) -> usize {
        self.steps.len()
    }

    fn step(&self, index: usize) -> Result<ExpectedStep, SequenceError> {
        self.steps
            .get(index)
            .cloned()
            .ok_or(SequenceError::OutOfRange(index))
    }

    fn move_cursor(&mut self, index: usize) -> Result<(), SequenceError> {
        if index >= self.steps.len() {
            return Err(SequenceError::OutOfRange(index));
        }
        self.cursor = index;
        Ok(())
    }

    fn cursor(&self) -> usize {
        self.cursor
    }
}
