//! The phase signal: one scalar per projection, tagging each with its place
//! in the motion cycle.
//!
//! Loaded in full before any scheduling happens. The file format is plain
//! whitespace/newline-separated floats; exactly as many well-formed values as
//! there are projections must be present, and any mismatch is reported as a
//! configuration error up front rather than silently padded or truncated.

use std::path::Path;

use ordered_float::OrderedFloat;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct PhaseSignal(Vec<f64>);

impl PhaseSignal {
    pub fn from_values(values: Vec<f64>) -> Self { Self(values) }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("could not read signal file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut values = vec![];
        for token in text.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                Error::config(format!("malformed phase value {token:?} in signal"))
            })?;
            values.push(value);
        }
        if values.is_empty() {
            return Err(Error::config("signal contains no phase values"));
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn value(&self, projection: usize) -> Result<f64> {
        self.0.get(projection).copied().ok_or_else(|| Error::config(format!(
            "projection {projection} outside signal of length {}",
            self.0.len()
        )))
    }

    pub fn values(&self) -> &[f64] { &self.0 }

    /// One phase value per projection, checked before any kernel is launched
    pub fn validate_length(&self, n_projections: usize) -> Result<()> {
        if self.0.len() != n_projections {
            return Err(Error::config(format!(
                "signal holds {} phase values but the stack has {n_projections} projections",
                self.0.len()
            )));
        }
        Ok(())
    }

    /// Permutation of projection indices sorted ascending by phase.
    /// Processing projections in this order lets phase-adjacent ones reuse
    /// the interpolated deformation field; it never changes the accumulated
    /// result, only the order intermediate work happens in.
    pub fn sorting_permutation(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.0.len()).collect();
        order.sort_by_key(|&i| OrderedFloat(self.0[i]));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use std::io::Write;

    #[test]
    fn parses_whitespace_and_newline_separated_values() {
        let s = PhaseSignal::parse("0.1 0.9\n0.3\t0.7\n").unwrap();
        assert_eq!(s.values(), &[0.1, 0.9, 0.3, 0.7]);
    }

    #[test]
    fn reads_exactly_the_values_in_the_file() {
        // No trailing duplicate from reading past the last value
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0.25 0.50 0.75\n").unwrap();
        let s = PhaseSignal::from_file(file.path()).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.value(2).unwrap(), 0.75);
    }

    #[test]
    fn out_of_range_slot_is_a_configuration_error() {
        let s = PhaseSignal::from_values(vec![0.1, 0.2]);
        assert_eq!(s.value(1).unwrap(), 0.2);
        assert!(matches!(s.value(2), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_values_are_a_configuration_error() {
        assert!(matches!(PhaseSignal::parse("0.1 wheeze 0.3"), Err(Error::Config(_))));
    }

    #[test]
    fn empty_signal_is_a_configuration_error() {
        assert!(matches!(PhaseSignal::parse("  \n "), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let missing = Path::new("/no/such/signal.txt");
        assert!(matches!(PhaseSignal::from_file(missing), Err(Error::Config(_))));
    }

    #[test]
    fn length_validation() {
        let s = PhaseSignal::from_values(vec![0.1; 10]);
        assert!(s.validate_length(10).is_ok());
        assert!(matches!(s.validate_length(20), Err(Error::Config(_))));
    }

    #[test]
    fn permutation_sorts_indices_by_phase() {
        let s = PhaseSignal::from_values(vec![0.9, 0.1, 0.5, 0.1]);
        assert_eq!(s.sorting_permutation(), vec![1, 3, 2, 0]);
    }
}
