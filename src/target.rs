// src/target.rs

//! Which Ritz values the outer solver is after, and the order that realizes it.

use crate::error::ProjectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Algebraically smallest eigenvalues first.
    Smallest,
    /// Algebraically largest eigenvalues first.
    Largest,
    /// Closest to the shift from above (`>= shift`), ascending, then the rest ascending.
    ClosestGeq,
    /// Closest to the shift from below (`<= shift`), descending, then the rest descending.
    ClosestLeq,
    /// Closest to the shift in absolute distance.
    ClosestAbs,
}

impl Target {
    pub fn is_interior(self) -> bool {
        matches!(self, Target::ClosestGeq | Target::ClosestLeq | Target::ClosestAbs)
    }
}

/// A target together with the shifts used by interior targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub target: Target,
    pub shifts: Vec<f64>,
}

impl TargetSpec {
    pub fn smallest() -> Self {
        TargetSpec { target: Target::Smallest, shifts: Vec::new() }
    }

    pub fn largest() -> Self {
        TargetSpec { target: Target::Largest, shifts: Vec::new() }
    }

    pub fn interior(target: Target, shifts: Vec<f64>) -> Result<Self, ProjectionError> {
        let spec = TargetSpec { target, shifts };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.target.is_interior() && self.shifts.is_empty() {
            return Err(ProjectionError::InvalidInput(format!(
                "target {:?} requires at least one shift",
                self.target
            )));
        }
        if let Some(bad) = self.shifts.iter().find(|s| !s.is_finite()) {
            return Err(ProjectionError::InvalidInput(format!("shift {bad} is not finite")));
        }
        Ok(())
    }

    /// The shift in force once `num_locked` pairs have been locked.
    ///
    /// Each locked pair moves on to the next shift; once the list runs out the last shift
    /// stays active. Returns `None` when no shifts were given.
    pub fn active_shift(&self, num_locked: usize) -> Option<f64> {
        let last = self.shifts.len().checked_sub(1)?;
        Some(self.shifts[num_locked.min(last)])
    }
}

/// Computes the reordering of ascending `h_vals` for `target` around `shift`.
///
/// `perm[i]` is the index of the value that must end up at position `i`. Extreme targets
/// yield the identity: ascending order already serves `Smallest`, and `Largest` is solved
/// on the negated matrix.
pub fn ordering_permutation(target: Target, h_vals: &[f64], shift: f64) -> Vec<usize> {
    let n = h_vals.len();
    match target {
        Target::Smallest | Target::Largest => (0..n).collect(),
        Target::ClosestGeq => {
            let j = first_at_or_above(h_vals, shift);
            (j..n).chain(0..j).collect()
        }
        Target::ClosestLeq => match h_vals.iter().rposition(|&v| v <= shift) {
            Some(j) => (0..=j).rev().chain((j + 1..n).rev()).collect(),
            None => (0..n).rev().collect(),
        },
        Target::ClosestAbs => {
            let crossing = first_at_or_above(h_vals, shift);
            // `left` is one past the next candidate below the shift, `right` the next one above.
            let mut left = crossing;
            let mut right = crossing;
            let mut perm = Vec::with_capacity(n);

            while left > 0 && right < n {
                if (h_vals[left - 1] - shift).abs() < (h_vals[right] - shift).abs() {
                    left -= 1;
                    perm.push(left);
                } else {
                    perm.push(right);
                    right += 1;
                }
            }
            perm.extend(right..n);
            perm.extend((0..left).rev());
            perm
        }
    }
}

fn first_at_or_above(h_vals: &[f64], shift: f64) -> usize {
    h_vals.iter().position(|&v| v >= shift).unwrap_or(h_vals.len())
}
